//! VM configuration

use core_types::HOT_LOOP_THRESHOLD;
use serde::{Deserialize, Serialize};

/// Default bound on nested calls
pub const DEFAULT_MAX_CALL_DEPTH: usize = 1000;

/// Tunables of one VM.
///
/// Values come from (in increasing priority) the defaults, a JSON document,
/// the environment and explicit builder calls.
///
/// # Examples
///
/// ```
/// use interpreter::VmConfig;
///
/// let config = VmConfig::default().with_threshold(100).with_jit(false);
/// assert_eq!(config.hot_loop_threshold, 100);
/// assert!(!config.jit_enabled);
///
/// let parsed = VmConfig::from_json(r#"{"trace_jit": true}"#).unwrap();
/// assert!(parsed.trace_jit);
/// assert_eq!(parsed.hot_loop_threshold, 10_000);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VmConfig {
    /// Promote hot loops to native code
    pub jit_enabled: bool,
    /// Backward branches before a loop is promoted
    pub hot_loop_threshold: u32,
    /// Maximum number of active frames
    pub max_call_depth: usize,
    /// Echo JIT events to stderr
    pub trace_jit: bool,
    /// Buffer `print` output instead of writing to stdout
    pub capture_output: bool,
}

impl Default for VmConfig {
    fn default() -> Self {
        Self {
            jit_enabled: true,
            hot_loop_threshold: HOT_LOOP_THRESHOLD,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            trace_jit: false,
            capture_output: false,
        }
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

impl VmConfig {
    /// Defaults overridden by `BASALT_*` environment variables
    pub fn from_env() -> Self {
        Self::default().with_env()
    }

    /// Parse a JSON document; missing fields keep their defaults
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Apply `BASALT_JIT`, `BASALT_JIT_THRESHOLD` and `BASALT_TRACE_JIT`.
    ///
    /// Unparseable values are ignored.
    pub fn with_env(self) -> Self {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(enabled) = lookup("BASALT_JIT").as_deref().and_then(parse_flag) {
            self.jit_enabled = enabled;
        }
        if let Some(threshold) = lookup("BASALT_JIT_THRESHOLD").and_then(|v| v.trim().parse().ok()) {
            self = self.with_threshold(threshold);
        }
        if let Some(trace) = lookup("BASALT_TRACE_JIT").as_deref().and_then(parse_flag) {
            self.trace_jit = trace;
        }
        self
    }

    /// Enable or disable promotion
    pub fn with_jit(mut self, enabled: bool) -> Self {
        self.jit_enabled = enabled;
        self
    }

    /// Set the promotion threshold (at least 1)
    pub fn with_threshold(mut self, threshold: u32) -> Self {
        self.hot_loop_threshold = threshold.max(1);
        self
    }

    /// Set the call depth limit
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// Echo JIT events to stderr
    pub fn with_trace_jit(mut self, trace: bool) -> Self {
        self.trace_jit = trace;
        self
    }

    /// Capture `print` output in memory
    pub fn with_capture_output(mut self, capture: bool) -> Self {
        self.capture_output = capture;
        self
    }
}
