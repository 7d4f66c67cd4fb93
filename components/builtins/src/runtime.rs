//! Helper-library state owned by one VM: the heap and the output sink

use std::io::Write;

use core_types::{ErrorKind, RuntimeError, TaggedValue};
use tracing::trace;

use crate::exceptions::EXCEPTION_TYPES;
use crate::functions::BuiltinFn;
use crate::heap::Heap;
use crate::object::HeapObject;

/// Destination of `print` output.
pub trait OutputWriter {
    /// Write one line (without the trailing newline)
    fn write_line(&mut self, line: &str) -> std::io::Result<()>;

    /// Text captured so far, if this writer captures
    fn captured(&self) -> &str {
        ""
    }

    /// Take the captured text, leaving the buffer empty
    fn take(&mut self) -> String {
        String::new()
    }
}

/// Writes to the process stdout.
#[derive(Debug, Default)]
pub struct StdoutWriter;

impl OutputWriter for StdoutWriter {
    fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        let stdout = std::io::stdout();
        let mut lock = stdout.lock();
        writeln!(lock, "{}", line)
    }
}

/// Buffers output in memory, for embedding and tests.
#[derive(Debug, Default)]
pub struct CaptureWriter {
    buffer: String,
}

impl OutputWriter for CaptureWriter {
    fn write_line(&mut self, line: &str) -> std::io::Result<()> {
        self.buffer.push_str(line);
        self.buffer.push('\n');
        Ok(())
    }

    fn captured(&self) -> &str {
        &self.buffer
    }

    fn take(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }
}

/// Heap plus output sink.
pub struct Runtime {
    /// Object arena
    pub heap: Heap,
    writer: Box<dyn OutputWriter>,
}

impl Runtime {
    /// Runtime printing to stdout
    pub fn new() -> Self {
        Self::with_writer(Box::new(StdoutWriter))
    }

    /// Runtime capturing output in memory
    pub fn capturing() -> Self {
        Self::with_writer(Box::new(CaptureWriter::default()))
    }

    /// Runtime with a custom output sink
    pub fn with_writer(writer: Box<dyn OutputWriter>) -> Self {
        Runtime {
            heap: Heap::new(),
            writer,
        }
    }

    /// Emit one line of program output.
    pub fn write_line(&mut self, line: &str) -> Result<(), RuntimeError> {
        trace!(len = line.len(), "print");
        self.writer.write_line(line).map_err(|e| {
            RuntimeError::new(ErrorKind::InternalError, format!("output error: {}", e))
        })
    }

    /// Captured output (empty when printing to stdout)
    pub fn output(&self) -> &str {
        self.writer.captured()
    }

    /// Take captured output
    pub fn take_output(&mut self) -> String {
        self.writer.take()
    }

    /// Allocate the builtin namespace: functions and exception classes.
    pub fn builtin_namespace(&mut self) -> Vec<(&'static str, TaggedValue)> {
        let mut names = Vec::with_capacity(BuiltinFn::ALL.len() + EXCEPTION_TYPES.len());
        for f in BuiltinFn::ALL {
            names.push((f.name(), self.heap.alloc(HeapObject::Builtin(f))));
        }
        for &kind in EXCEPTION_TYPES {
            names.push((
                kind.python_name(),
                self.heap.alloc(HeapObject::ExceptionType(kind)),
            ));
        }
        names
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("objects", &self.heap.len())
            .finish()
    }
}
