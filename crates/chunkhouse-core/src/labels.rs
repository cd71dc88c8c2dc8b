//! Label Sets and Matchers
//!
//! A time series is identified by its label set - a mapping from label name
//! to label value. The distinguished `__name__` label carries the metric
//! name and is treated specially by the index (it becomes part of the hash
//! key rather than a range-key entry).
//!
//! Queries select series with matchers. Four operators are supported:
//!
//! | Operator | Meaning |
//! |---|---|
//! | `=`  | value equals |
//! | `!=` | value differs |
//! | `=~` | value matches regex (fully anchored) |
//! | `!~` | value does not match regex |
//!
//! ## Design Decisions
//! - `LabelSet` wraps a `BTreeMap` so iteration order is deterministic;
//!   index writes derived from a label set must be reproducible on retry.
//! - Regex patterns are compiled once at matcher construction and fully
//!   anchored (`^(?:pat)$`), so `job=~"api"` does not match `"api-2"`.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// The label that carries the metric name.
pub const METRIC_NAME: &str = "__name__";

/// An ordered mapping from label name to label value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LabelSet(BTreeMap<String, String>);

impl LabelSet {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Build a label set from `(name, value)` pairs.
    pub fn from_pairs<N, V>(pairs: impl IntoIterator<Item = (N, V)>) -> Self
    where
        N: Into<String>,
        V: Into<String>,
    {
        Self(
            pairs
                .into_iter()
                .map(|(n, v)| (n.into(), v.into()))
                .collect(),
        )
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// The value of the `__name__` label, if present.
    pub fn metric_name(&self) -> Option<&str> {
        self.get(METRIC_NAME)
    }

    /// Iterate `(name, value)` pairs in lexicographic name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(n, v)| (n.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Merge `other` into `self`, overwriting on conflict.
    pub fn extend(&mut self, other: &LabelSet) {
        for (n, v) in other.iter() {
            self.insert(n, v);
        }
    }
}

/// Matcher operator.
#[derive(Debug, Clone)]
pub enum MatchOp {
    Equal,
    NotEqual,
    Regex(Regex),
    NotRegex(Regex),
}

/// A predicate over a single label.
#[derive(Debug, Clone)]
pub struct Matcher {
    pub name: String,
    pub op: MatchOp,
    pub value: String,
}

impl Matcher {
    pub fn equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op: MatchOp::Equal,
            value: value.into(),
        }
    }

    pub fn not_equal(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            op: MatchOp::NotEqual,
            value: value.into(),
        }
    }

    pub fn regex(name: impl Into<String>, pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        let re = Regex::new(&format!("^(?:{pattern})$"))?;
        Ok(Self {
            name: name.into(),
            op: MatchOp::Regex(re),
            value: pattern,
        })
    }

    pub fn not_regex(name: impl Into<String>, pattern: impl Into<String>) -> Result<Self> {
        let pattern = pattern.into();
        let re = Regex::new(&format!("^(?:{pattern})$"))?;
        Ok(Self {
            name: name.into(),
            op: MatchOp::NotRegex(re),
            value: pattern,
        })
    }

    /// Whether this matcher is an equality matcher.
    pub fn is_equality(&self) -> bool {
        matches!(self.op, MatchOp::Equal)
    }

    /// Apply the matcher to a label value.
    pub fn matches(&self, value: &str) -> bool {
        match &self.op {
            MatchOp::Equal => value == self.value,
            MatchOp::NotEqual => value != self.value,
            MatchOp::Regex(re) => re.is_match(value),
            MatchOp::NotRegex(re) => !re.is_match(value),
        }
    }
}
