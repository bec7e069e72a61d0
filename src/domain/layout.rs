//! Composite layout plans: which panes a composite dialog is made of.

use crate::domain::PaneIndex;
use crate::error::{ContractResult, ContractViolation};

/// Layout variant of a composite dialog
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaneLayout {
    /// Linear strip of one or more panes (tabbed or stacked)
    Strip,
    /// Binary split of exactly two panes
    Split,
}

/// Dialog-specific launch arguments for a single pane.
///
/// The compositor passes these through to the worker untouched; only the
/// pane's dialog interprets them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaneSpec {
    pub args: Vec<String>,
}

impl PaneSpec {
    pub fn new(args: Vec<String>) -> Self {
        Self { args }
    }
}

/// A full composite plan: the layout variant plus one spec per pane.
///
/// Pane count is fixed at construction; the slot table it implies can never
/// be exceeded later.
#[derive(Debug, Clone)]
pub struct CompositePlan {
    layout: PaneLayout,
    panes: Vec<PaneSpec>,
}

impl CompositePlan {
    /// A strip of one or more panes
    pub fn strip(panes: Vec<PaneSpec>) -> ContractResult<Self> {
        if panes.is_empty() {
            return Err(ContractViolation::ZeroCapacity);
        }
        Ok(Self {
            layout: PaneLayout::Strip,
            panes,
        })
    }

    /// A two-way split; the pane count makes this infallible
    pub fn split(first: PaneSpec, second: PaneSpec) -> Self {
        Self {
            layout: PaneLayout::Split,
            panes: vec![first, second],
        }
    }

    pub fn layout(&self) -> PaneLayout {
        self.layout
    }

    pub fn pane_count(&self) -> usize {
        self.panes.len()
    }

    pub fn panes(&self) -> &[PaneSpec] {
        &self.panes
    }

    /// The spec for one pane, if the index is within the plan
    pub fn pane(&self, index: PaneIndex) -> Option<&PaneSpec> {
        self.panes.get(index.raw() - 1)
    }
}
