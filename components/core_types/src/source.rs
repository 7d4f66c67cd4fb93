//! Frame descriptions used in error traces.

use std::fmt;

use serde::Serialize;

/// One entry of an error trace: the function being executed and the
/// bytecode address where the error passed through it.
///
/// # Examples
///
/// ```
/// use core_types::StackFrame;
///
/// let frame = StackFrame::new("fib", 12);
/// assert_eq!(frame.to_string(), "in fib at pc 12");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StackFrame {
    /// Name of the function
    pub function_name: String,
    /// Bytecode address of the failing (or calling) instruction
    pub pc: usize,
    /// Source line, when the bytecode carries position information
    pub line: Option<u32>,
}

impl StackFrame {
    /// Create a frame without line information.
    pub fn new(function_name: impl Into<String>, pc: usize) -> Self {
        Self {
            function_name: function_name.into(),
            pc,
            line: None,
        }
    }

    /// Attach a source line.
    pub fn with_line(mut self, line: Option<u32>) -> Self {
        self.line = line;
        self
    }
}

impl fmt::Display for StackFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.line {
            Some(line) => write!(f, "in {} at pc {} (line {})", self.function_name, self.pc, line),
            None => write!(f, "in {} at pc {}", self.function_name, self.pc),
        }
    }
}
