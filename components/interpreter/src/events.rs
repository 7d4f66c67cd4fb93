//! JIT diagnostics
//!
//! Every promotion attempt produces one [`JitEvent`]. Events are logged via
//! `tracing` and kept in a [`JitEventLog`] that embedders and tests can
//! inspect.

use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;

/// Outcome of one promotion attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum JitEvent {
    /// Native code was installed for a loop
    Compiled {
        /// Function containing the loop
        function: String,
        /// Loop header address
        header: usize,
        /// Address of the back-edge closing the loop
        back_edge: usize,
        /// Registers held in native variables
        registers: usize,
    },
    /// The loop stays interpreted for good
    Rejected {
        /// Function containing the loop
        function: String,
        /// Loop header address
        header: usize,
        /// Why compilation failed
        reason: String,
    },
}

impl JitEvent {
    /// Whether this event reports installed code
    pub fn is_compiled(&self) -> bool {
        matches!(self, JitEvent::Compiled { .. })
    }

    /// Loop header address
    pub fn header(&self) -> usize {
        match self {
            JitEvent::Compiled { header, .. } | JitEvent::Rejected { header, .. } => *header,
        }
    }
}

impl fmt::Display for JitEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JitEvent::Compiled {
                function, header, ..
            } => write!(f, "JIT: Compiled loop {} at PC {}", function, header),
            JitEvent::Rejected {
                function,
                header,
                reason,
            } => write!(f, "JIT: Rejected loop {} at PC {}: {}", function, header, reason),
        }
    }
}

/// Shared, append-only list of events
#[derive(Debug, Clone, Default)]
pub struct JitEventLog {
    events: Arc<Mutex<Vec<JitEvent>>>,
}

impl JitEventLog {
    /// Empty log
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an event
    pub fn record(&self, event: JitEvent) {
        self.events.lock().push(event);
    }

    /// Copy of every event so far
    pub fn snapshot(&self) -> Vec<JitEvent> {
        self.events.lock().clone()
    }

    /// Number of `Compiled` events
    pub fn compiled_count(&self) -> usize {
        self.events.lock().iter().filter(|e| e.is_compiled()).count()
    }

    /// Number of events
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether no event was recorded
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Drop every event
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let compiled = JitEvent::Compiled {
            function: "main".to_string(),
            header: 3,
            back_edge: 9,
            registers: 4,
        };
        assert_eq!(compiled.to_string(), "JIT: Compiled loop main at PC 3");

        let rejected = JitEvent::Rejected {
            function: "main".to_string(),
            header: 3,
            reason: "PushTry in loop".to_string(),
        };
        assert_eq!(
            rejected.to_string(),
            "JIT: Rejected loop main at PC 3: PushTry in loop"
        );
    }

    #[test]
    fn test_log_is_shared_between_clones() {
        let log = JitEventLog::new();
        let other = log.clone();
        other.record(JitEvent::Rejected {
            function: "f".to_string(),
            header: 0,
            reason: "x".to_string(),
        });
        assert_eq!(log.len(), 1);
        assert_eq!(log.compiled_count(), 0);
        log.clear();
        assert!(other.is_empty());
    }

    #[test]
    fn test_serialize() {
        let event = JitEvent::Compiled {
            function: "main".to_string(),
            header: 1,
            back_edge: 5,
            registers: 2,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "compiled");
        assert_eq!(json["header"], 1);
    }
}
