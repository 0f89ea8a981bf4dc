//! Dotted key-path parsing.
//!
//! `progress.alice.totalPoints` parses into three segments. Segments are
//! taken literally: there is no escaping, so a `.` can never appear inside
//! one. Empty paths and empty segments are rejected.

use std::fmt;

use crate::error::AppError;

/// A parsed, non-empty dotted path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct KeyPath {
    segments: Vec<String>,
}

impl KeyPath {
    pub fn parse(input: &str) -> Result<Self, AppError> {
        if input.is_empty() {
            return Err(AppError::Path("empty path".into()));
        }
        let mut segments = Vec::new();
        for part in input.split('.') {
            if part.is_empty() {
                return Err(AppError::Path(format!("empty segment in path '{input}'")));
            }
            segments.push(part.to_string());
        }
        Ok(Self { segments })
    }

    /// Build a path from already-split segments (each must be non-empty and
    /// free of `.`).
    pub fn from_segments<I, S>(segments: I) -> Result<Self, AppError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let segments: Vec<String> = segments.into_iter().map(Into::into).collect();
        if segments.is_empty() {
            return Err(AppError::Path("empty path".into()));
        }
        if let Some(bad) = segments.iter().find(|s| s.is_empty() || s.contains('.')) {
            return Err(AppError::Path(format!("invalid segment '{bad}'")));
        }
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Final segment, the key assigned on write.
    pub fn last(&self) -> &str {
        // A KeyPath always has at least one segment.
        &self.segments[self.segments.len() - 1]
    }

    /// Path with the last segment dropped; `None` for a top-level key.
    pub fn parent(&self) -> Option<KeyPath> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Self { segments: self.segments[..self.segments.len() - 1].to_vec() })
    }

    /// Proper prefixes of this path, nearest first. The root is excluded.
    pub fn ancestors(&self) -> Vec<KeyPath> {
        (1..self.segments.len())
            .rev()
            .map(|n| Self { segments: self.segments[..n].to_vec() })
            .collect()
    }

    /// Append one segment.
    pub fn child(&self, segment: &str) -> Result<KeyPath, AppError> {
        let mut segments = self.segments.clone();
        segments.push(segment.to_string());
        Self::from_segments(segments)
    }

    pub fn to_dotted(&self) -> String {
        self.segments.join(".")
    }
}

impl fmt::Display for KeyPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_dotted())
    }
}

impl std::str::FromStr for KeyPath {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
