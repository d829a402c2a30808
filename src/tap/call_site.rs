//! Call-site resolution.
//!
//! The call-site of an invocation is the first frame, walking outward from
//! the innermost one, that was not pushed by the runtime's own internal
//! dispatch. For a constructor this skips the engine frame behind
//! `instantiate` and lands on the line that asked for the new instance.

use crate::event::Frame;
use serde::Serialize;
use std::fmt;

/// Path reported when no external frame exists
pub const UNKNOWN_PATH: &str = "<unknown>";

/// File and line an invocation was made from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct CallSite {
    pub filepath: &'static str,
    pub line_number: u32,
}

impl CallSite {
    pub fn unknown() -> Self {
        Self {
            filepath: UNKNOWN_PATH,
            line_number: 0,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.filepath == UNKNOWN_PATH
    }
}

impl fmt::Display for CallSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.filepath, self.line_number)
    }
}

/// Resolve the call-site from a frame snapshot (innermost first)
pub fn resolve(frames: &[Frame]) -> CallSite {
    frames
        .iter()
        .find(|frame| !frame.is_engine())
        .map(|frame| CallSite {
            filepath: frame.path,
            line_number: frame.line,
        })
        .unwrap_or_else(CallSite::unknown)
}

/// Frames that belong to the traced program, innermost first
pub fn external_frames(frames: &[Frame]) -> Vec<Frame> {
    frames.iter().filter(|frame| !frame.is_engine()).cloned().collect()
}
