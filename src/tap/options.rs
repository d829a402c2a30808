//! Per-tap options
//!
//! [`TapOptions`] is a builder collected at registration time and compiled
//! into the tap's ordered [`Filter`] list. Path patterns are regular
//! expressions matched against the call-site file path.

use super::matcher::{Filter, FilterContext, Predicate};
use crate::{Result, TapError};
use regex::Regex;
use std::fmt;
use std::sync::Arc;

enum PendingFilter {
    FilterPaths(Vec<String>),
    ExcludePaths(Vec<String>),
    Condition(Predicate),
}

/// Options applied to one tap
///
/// # Examples
///
/// ```
/// use calltap::TapOptions;
///
/// let options = TapOptions::new()
///     .exclude_paths(["/vendor/"])
///     .with_condition(|ctx| ctx.event.method_name != "to_s");
/// assert_eq!(options.len(), 2);
/// ```
#[derive(Default)]
pub struct TapOptions {
    pending: Vec<PendingFilter>,
}

impl TapOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ignore calls made from files whose path matches any pattern
    pub fn exclude_paths<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending
            .push(PendingFilter::ExcludePaths(patterns.into_iter().map(Into::into).collect()));
        self
    }

    /// Only observe calls made from files whose path matches some pattern
    pub fn filter_paths<I, S>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending
            .push(PendingFilter::FilterPaths(patterns.into_iter().map(Into::into).collect()));
        self
    }

    /// Only observe events for which `predicate` returns true
    pub fn with_condition<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&FilterContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.pending.push(PendingFilter::Condition(Arc::new(predicate)));
        self
    }

    /// Number of filters these options produce
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Compile the options into filters, in the order they were added
    pub fn into_filters(self) -> Result<Vec<Filter>> {
        self.pending
            .into_iter()
            .map(|filter| -> Result<Filter> {
                Ok(match filter {
                    PendingFilter::FilterPaths(patterns) => {
                        Filter::FilterPaths(compile(&patterns)?)
                    }
                    PendingFilter::ExcludePaths(patterns) => {
                        Filter::ExcludePaths(compile(&patterns)?)
                    }
                    PendingFilter::Condition(predicate) => Filter::Condition(predicate),
                })
            })
            .collect()
    }
}

impl fmt::Debug for TapOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TapOptions").field("filters", &self.pending.len()).finish()
    }
}

fn compile(patterns: &[String]) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|pattern| Regex::new(pattern).map_err(TapError::from))
        .collect()
}
