// src/name.rs
//! Qualified names: dotted identifier paths used as registry keys.

use std::fmt;
use std::str::FromStr;

use crate::error::LazyError;

/// A non-empty, ordered sequence of identifier segments such as `science.pack.slow`.
///
/// Ordering is segment-wise, so a parent always sorts before its children.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QualifiedName {
    segments: Vec<String>,
}

impl QualifiedName {
    /// Parse and validate a dotted name.
    pub fn parse(raw: &str) -> Result<Self, LazyError> {
        let segments: Vec<String> = raw.split('.').map(str::to_owned).collect();
        if segments.iter().any(|s| !is_identifier(s)) {
            return Err(LazyError::InvalidName(raw.to_owned()));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().map(String::as_str)
    }

    /// Number of segments (always >= 1).
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Last segment, e.g. `slow` for `science.pack.slow`.
    pub fn leaf(&self) -> &str {
        // segments is never empty
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// The immediate parent, or `None` for a top-level name.
    pub fn parent(&self) -> Option<QualifiedName> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// All proper ancestors, shallowest first.
    pub fn ancestors(&self) -> Vec<QualifiedName> {
        (1..self.segments.len())
            .map(|n| Self {
                segments: self.segments[..n].to_vec(),
            })
            .collect()
    }

    /// Append a segment, validating it.
    pub fn child(&self, segment: &str) -> Result<QualifiedName, LazyError> {
        if !is_identifier(segment) {
            return Err(LazyError::InvalidName(format!("{self}.{segment}")));
        }
        let mut segments = self.segments.clone();
        segments.push(segment.to_owned());
        Ok(Self { segments })
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_alphanumeric())
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

impl FromStr for QualifiedName {
    type Err = LazyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<&str> for QualifiedName {
    type Error = LazyError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}
