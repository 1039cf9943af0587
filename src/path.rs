//! Decode paths: where inside the container hierarchy an event happened.
//!
//! A [`DecodePath`] is a chain of key and index segments leading from the
//! top-level container to one element, rendered like `users[3].name`. Errors
//! carry one so a failure can be localized without re-reading the input.

use std::fmt;

use smallvec::SmallVec;

/// One step in a decode path: an object key or a sequence index.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PathSegment {
    /// Field name inside an object/keyed container.
    Key(String),
    /// Zero-based position inside an array/sequence container.
    Index(usize),
}

impl From<&str> for PathSegment {
    fn from(value: &str) -> Self {
        PathSegment::Key(value.to_owned())
    }
}

impl From<String> for PathSegment {
    fn from(value: String) -> Self {
        PathSegment::Key(value)
    }
}

impl From<usize> for PathSegment {
    fn from(value: usize) -> Self {
        PathSegment::Index(value)
    }
}

/// Ordered chain of segments from the decode root to one element.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DecodePath {
    segments: SmallVec<[PathSegment; 8]>,
}

impl DecodePath {
    /// Path pointing at the decode root itself.
    pub fn root() -> Self {
        Self {
            segments: SmallVec::new(),
        }
    }

    /// True when no segment has been recorded (the root).
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Append one segment at the leaf end.
    pub fn push<T: Into<PathSegment>>(&mut self, seg: T) {
        self.segments.push(seg.into());
    }

    /// Remove the leaf segment, if any.
    pub fn pop(&mut self) {
        self.segments.pop();
    }

    /// Builder-style [`push`](Self::push).
    pub fn join<T: Into<PathSegment>>(mut self, seg: T) -> Self {
        self.push(seg);
        self
    }

    /// Insert a segment at the root end. Used when an inner error is wrapped
    /// with the position of the element that produced it.
    pub fn prepend(&mut self, seg: PathSegment) {
        self.segments.insert(0, seg);
    }

    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }
}

impl fmt::Display for DecodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str(".");
        }
        for (i, seg) in self.segments.iter().enumerate() {
            match seg {
                PathSegment::Key(name) => {
                    if i > 0 {
                        f.write_str(".")?;
                    }
                    f.write_str(name)?;
                }
                PathSegment::Index(idx) => write!(f, "[{idx}]")?,
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_renders_as_dot() {
        assert_eq!(DecodePath::root().to_string(), ".");
    }

    #[test]
    fn mixed_segments_render_compactly() {
        let path = DecodePath::root().join("users").join(3).join("name");
        assert_eq!(path.to_string(), "users[3].name");
    }

    #[test]
    fn leading_index_has_no_dot() {
        let path = DecodePath::root().join(2).join("x");
        assert_eq!(path.to_string(), "[2].x");
    }

    #[test]
    fn prepend_inserts_at_root_end() {
        let mut path = DecodePath::root().join("inner");
        path.prepend(PathSegment::Index(7));
        assert_eq!(path.to_string(), "[7].inner");
    }
}
