//! Pane identity and slot value types.

use std::fmt;

/// Sentinel pid for a pane slot that has never been assigned
pub const UNASSIGNED_PID: i64 = -1;

/// Sentinel window handle for a pane that has not published yet
pub const UNPUBLISHED_HANDLE: u64 = 0;

/// Numeric key identifying one composite dialog's slot table.
///
/// Both sides of the composite derive the shared segment's name from this
/// key alone, so a coordinator and its workers rendezvous without any other
/// channel between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TableKey(u32);

impl TableKey {
    pub fn new(raw: u32) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }

    /// OS name of the shared segment for this key
    pub(crate) fn segment_name(&self) -> String {
        format!("/panemux-{}", self.0)
    }
}

impl fmt::Display for TableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 1-based index of a pane slot.
///
/// Slot 0 of the table holds metadata and never addresses a pane, so index 0
/// is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PaneIndex(usize);

impl PaneIndex {
    /// The first pane slot
    pub const FIRST: PaneIndex = PaneIndex(1);

    /// Build a pane index; returns None for 0
    pub fn new(raw: usize) -> Option<Self> {
        (raw >= 1).then_some(Self(raw))
    }

    pub fn raw(&self) -> usize {
        self.0
    }

    /// All pane indexes of a table with the given capacity, in order
    pub fn range(capacity: usize) -> impl Iterator<Item = PaneIndex> {
        (1..=capacity).map(PaneIndex)
    }
}

impl fmt::Display for PaneIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque, process-transferable identifier of a pane's top-level window.
///
/// The compositor never interprets the value; it only requires that 0 stays
/// reserved as the unpublished sentinel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowHandle(u64);

impl WindowHandle {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for WindowHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Point-in-time copy of one pane slot's fields.
///
/// Readers get a snapshot, never a live reference into shared memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub owner_pid: i64,
    pub window_handle: u64,
}

impl Slot {
    /// The value every pane slot holds before its worker publishes
    pub const UNASSIGNED: Slot = Slot {
        owner_pid: UNASSIGNED_PID,
        window_handle: UNPUBLISHED_HANDLE,
    };

    /// A pane is ready once its window handle is published
    pub fn is_ready(&self) -> bool {
        self.window_handle != UNPUBLISHED_HANDLE
    }

    /// The published handle, if this slot is ready
    pub fn handle(&self) -> Option<WindowHandle> {
        self.is_ready().then(|| WindowHandle::new(self.window_handle))
    }
}
