//! JSON paths used to locate problems inside a search document
//!
//! A path is the list of object keys and array indices walked from the
//! document root. It serialises as a plain JSON array (`["AND", 0, "name"]`)
//! and displays in dotted form (`$.AND.0.name`, or `$` for the root).

use serde::{Deserialize, Serialize};
use std::fmt;

/// One step of a [`JsonPath`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Array index
    Index(usize),
    /// Object key
    Key(String),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PathSegment::Index(i) => write!(f, "{}", i),
            PathSegment::Key(k) => write!(f, "{}", k),
        }
    }
}

impl From<&str> for PathSegment {
    fn from(key: &str) -> Self {
        PathSegment::Key(key.to_string())
    }
}

impl From<String> for PathSegment {
    fn from(key: String) -> Self {
        PathSegment::Key(key)
    }
}

impl From<usize> for PathSegment {
    fn from(index: usize) -> Self {
        PathSegment::Index(index)
    }
}

/// Location of a value inside a JSON document, relative to its root
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonPath(Vec<PathSegment>);

impl JsonPath {
    /// The document root (`$`)
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// A new path extended by one segment
    #[must_use]
    pub fn child(&self, segment: impl Into<PathSegment>) -> Self {
        let mut segments = self.0.clone();
        segments.push(segment.into());
        Self(segments)
    }

    /// A new path extended by every segment of `other`
    #[must_use]
    pub fn join(&self, other: &JsonPath) -> Self {
        let mut segments = self.0.clone();
        segments.extend(other.0.iter().cloned());
        Self(segments)
    }

    /// Whether this path points at the document root
    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Number of segments
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the path has no segments
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// The segments, root first
    pub fn segments(&self) -> &[PathSegment] {
        &self.0
    }
}

impl fmt::Display for JsonPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for segment in &self.0 {
            write!(f, ".{}", segment)?;
        }
        Ok(())
    }
}

impl<S: Into<PathSegment>> FromIterator<S> for JsonPath {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_root_display() {
        assert_eq!(JsonPath::root().to_string(), "$");
        assert!(JsonPath::root().is_root());
    }

    #[test]
    fn test_nested_display() {
        let path = JsonPath::root().child("AND").child(0).child("name");
        assert_eq!(path.to_string(), "$.AND.0.name");
        assert_eq!(path.len(), 3);
    }

    #[test]
    fn test_serializes_as_array() {
        let path = JsonPath::root().child("OR").child(2usize);
        assert_eq!(
            serde_json::to_value(&path).unwrap(),
            serde_json::json!(["OR", 2])
        );
    }

    #[test]
    fn test_join() {
        let base = JsonPath::root().child("NOT");
        let rel: JsonPath = ["ORDER"].into_iter().collect();
        assert_eq!(base.join(&rel).to_string(), "$.NOT.ORDER");
    }

    #[test]
    fn test_child_leaves_parent_untouched() {
        let parent = JsonPath::root().child("a");
        let _ = parent.child("b");
        assert_eq!(parent.to_string(), "$.a");
    }
}
