//! Error types and result aliases for the calltap library.
//!
//! This module defines the core error type [`TapError`] and the [`Result`] type alias
//! used throughout the library. Registration, stopping and host-runtime operations
//! all return `Result<T>`; handler failures are wrapped as [`TapError::Handler`].

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TapError {
    #[error("target object should be {expected}, got {got}")]
    InvalidTarget { expected: &'static str, got: String },

    #[error("tap {tap_id} handler failed: {message}")]
    Handler { tap_id: String, message: String },

    #[error("Invalid path pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("undefined method `{method}` for {receiver}")]
    NoMethod { receiver: String, method: String },

    #[error("wrong number of arguments for `{method}` (given {given}, expected {expected})")]
    Arity {
        method: String,
        expected: usize,
        given: usize,
    },

    #[error("{0} is not a class")]
    NotAClass(String),

    #[error("Method error: {0}")]
    Method(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, TapError>;
