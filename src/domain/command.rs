//! Control commands of the pane protocol.

use std::fmt;

/// A control command the coordinator broadcasts to its panes.
///
/// The protocol has exactly two commands; anything richer (geometry changes,
/// focus transfer) travels over other channels and is out of scope here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlCommand {
    /// Ask a pane to produce its current result text; the pane keeps running
    EmitResult,
    /// Ask a pane to exit immediately without emitting a result
    Terminate,
}

impl ControlCommand {
    pub fn name(&self) -> &'static str {
        match self {
            ControlCommand::EmitResult => "EMIT_RESULT",
            ControlCommand::Terminate => "TERMINATE",
        }
    }
}

impl fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_names() {
        assert_eq!(ControlCommand::EmitResult.to_string(), "EMIT_RESULT");
        assert_eq!(ControlCommand::Terminate.to_string(), "TERMINATE");
    }
}
