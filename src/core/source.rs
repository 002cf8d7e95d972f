//! Source position metadata attached to scalars and substitutions.
//!
//! Positions point into the blueprint document a value was parsed from and
//! are carried through resolution so that call-stack frames and errors can
//! name the offending expression.

use serde::{Deserialize, Serialize};

/// A 1-based line/column position in a blueprint document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourcePos {
    pub line: usize,
    pub col: usize,
}

impl SourcePos {
    pub fn new(line: usize, col: usize) -> Self {
        Self { line, col }
    }
}

/// A span in a blueprint document: start position, optional end position and
/// the file the document was loaded from (when known).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SourceSpan {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start: Option<SourcePos>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<SourcePos>,
}

impl SourceSpan {
    pub fn new(line: usize, col: usize) -> Self {
        Self {
            file: None,
            start: Some(SourcePos::new(line, col)),
            end: None,
        }
    }

    pub fn with_end(mut self, line: usize, col: usize) -> Self {
        self.end = Some(SourcePos::new(line, col));
        self
    }

    pub fn with_file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }
}

impl std::fmt::Display for SourceSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.file, &self.start) {
            (Some(file), Some(start)) => write!(f, "{}:{}:{}", file, start.line, start.col),
            (None, Some(start)) => write!(f, "{}:{}", start.line, start.col),
            (Some(file), None) => write!(f, "{}", file),
            (None, None) => write!(f, "<unknown>"),
        }
    }
}
