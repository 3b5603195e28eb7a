use std::fmt;

use serde::{Deserialize, Serialize};

/// One step of a response path: an object key or a list index.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    Index(usize),
    Field(String),
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Field(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Field(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(index) => write!(f, "{index}"),
            PathSegment::Field(key) => f.write_str(key),
        }
    }
}

/// Path of a value within a response, from the root.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ErrorPath(Vec<PathSegment>);

impl ErrorPath {
    pub fn new(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }

    pub fn first(&self) -> Option<&PathSegment> {
        self.0.first()
    }

    pub fn push(&mut self, segment: impl Into<PathSegment>) {
        self.0.push(segment.into());
    }

    pub fn pop(&mut self) -> Option<PathSegment> {
        self.0.pop()
    }

    pub fn child(&self, segment: impl Into<PathSegment>) -> ErrorPath {
        let mut path = self.clone();
        path.push(segment);
        path
    }

    /// The path `prefix ++ self`.
    pub fn prefixed_with(&self, prefix: &[PathSegment]) -> ErrorPath {
        let mut segments = Vec::with_capacity(prefix.len() + self.0.len());
        segments.extend_from_slice(prefix);
        segments.extend_from_slice(&self.0);
        ErrorPath(segments)
    }

    /// Drops the first `n` segments.
    pub fn strip_leading(&self, n: usize) -> ErrorPath {
        ErrorPath(self.0.iter().skip(n).cloned().collect())
    }

    pub fn starts_with(&self, prefix: &[PathSegment]) -> bool {
        self.0.starts_with(prefix)
    }

    pub fn first_mut(&mut self) -> Option<&mut PathSegment> {
        self.0.first_mut()
    }
}

impl From<Vec<PathSegment>> for ErrorPath {
    fn from(segments: Vec<PathSegment>) -> Self {
        Self(segments)
    }
}

impl FromIterator<PathSegment> for ErrorPath {
    fn from_iter<I: IntoIterator<Item = PathSegment>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for ErrorPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            write!(f, "{segment}")?;
        }
        Ok(())
    }
}

/// A GraphQL error as found in the `errors` list of a response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphqlError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<ErrorPath>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub extensions: serde_json::Map<String, serde_json::Value>,
}

impl GraphqlError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            path: None,
            extensions: Default::default(),
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<ErrorPath>) -> Self {
        self.path = Some(path.into());
        self
    }

    #[must_use]
    pub fn with_code(self, code: &str) -> Self {
        self.with_extension("code", serde_json::Value::String(code.to_string()))
    }

    #[must_use]
    pub fn with_extension(mut self, key: &str, value: serde_json::Value) -> Self {
        self.extensions.insert(key.to_string(), value);
        self
    }

    pub fn code(&self) -> Option<&str> {
        self.extensions.get("code").and_then(|code| code.as_str())
    }
}

impl fmt::Display for GraphqlError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.path {
            Some(path) if !path.is_empty() => write!(f, "{} (at {path})", self.message),
            _ => f.write_str(&self.message),
        }
    }
}
