//! Defines the decode error and its path information.
use std::fmt;

use crate::identity::RefId;
use crate::limits::LimitBreach;
use crate::options::CoercionShape;
use crate::path::{DecodePath, PathSegment};

/// Error raised while decoding a token stream.
///
/// Every variant carries a [`DecodePath`] locating the failure inside the
/// container hierarchy; an empty path means the failure happened at the
/// decode root (or before any container was opened).
#[derive(Debug)]
pub enum Error {
    /// Free-form error with optional path.
    Message {
        msg: String,
        path: DecodePath,
    },
    /// Unexpected end of input.
    Eof {
        expected: &'static str,
        path: DecodePath,
    },
    /// Structural mismatch: something else than the expected token was seen.
    Malformed {
        expected: &'static str,
        found: &'static str,
        path: DecodePath,
    },
    /// An element converter failed; the element position is recorded here,
    /// the converter's own error is preserved as the source.
    Conversion {
        source: Box<dyn std::error::Error + Send + Sync>,
        path: DecodePath,
    },
    /// A null/empty/blank/single value appeared where policy forbids the
    /// implicit conversion.
    CoercionRejected {
        shape: CoercionShape,
        expected: &'static str,
        path: DecodePath,
    },
    /// A mapping key appeared twice under the erroring duplicate-key policy.
    DuplicateKey {
        key: String,
        path: DecodePath,
    },
    /// The decode finished with forward references still unresolved.
    UnresolvedReferences {
        ids: Vec<RefId>,
        path: DecodePath,
    },
    /// A decode limit was exceeded.
    LimitExceeded {
        breach: LimitBreach,
        path: DecodePath,
    },
}

impl Error {
    /// Construct a `Message` error with no path.
    pub(crate) fn msg<S: Into<String>>(s: S) -> Self {
        Error::Message {
            msg: s.into(),
            path: DecodePath::root(),
        }
    }

    /// Free-form error for element converters.
    pub fn custom<T: fmt::Display>(msg: T) -> Self {
        Error::msg(msg.to_string())
    }

    /// Wrap a foreign failure raised inside an element converter, keeping it
    /// available through `source()`.
    pub fn convert_failed<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::conversion(source)
    }

    /// Construct an unexpected end-of-input error naming what was expected.
    pub(crate) fn eof(expected: &'static str) -> Self {
        Error::Eof {
            expected,
            path: DecodePath::root(),
        }
    }

    /// Convenience for a `Malformed` error pre-filled with human phrases.
    pub(crate) fn malformed(expected: &'static str, found: &'static str) -> Self {
        Error::Malformed {
            expected,
            found,
            path: DecodePath::root(),
        }
    }

    /// Wrap a converter failure, keeping it available through `source()`.
    pub(crate) fn conversion<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error::Conversion {
            source: Box::new(source),
            path: DecodePath::root(),
        }
    }

    /// Construct a `CoercionRejected` error for the given input shape.
    pub(crate) fn coercion_rejected(shape: CoercionShape, expected: &'static str) -> Self {
        Error::CoercionRejected {
            shape,
            expected,
            path: DecodePath::root(),
        }
    }

    pub(crate) fn duplicate_key<S: Into<String>>(key: S) -> Self {
        Error::DuplicateKey {
            key: key.into(),
            path: DecodePath::root(),
        }
    }

    pub(crate) fn unresolved(ids: Vec<RefId>) -> Self {
        Error::UnresolvedReferences {
            ids,
            path: DecodePath::root(),
        }
    }

    pub(crate) fn limit(breach: LimitBreach) -> Self {
        Error::LimitExceeded {
            breach,
            path: DecodePath::root(),
        }
    }

    /// Attach/override the path of this error and return it.
    ///
    /// Called by decode loops once the failing position is known.
    pub(crate) fn with_path(mut self, set_path: DecodePath) -> Self {
        *self.path_mut() = set_path;
        self
    }

    /// Prefix the existing path with the position of the element whose
    /// decoding produced this error. Used when wrapping converter errors so
    /// the recorded path grows outward as the failure propagates.
    pub(crate) fn nested_under(mut self, seg: PathSegment) -> Self {
        self.path_mut().prepend(seg);
        self
    }

    /// The path at which the error occurred, when one was recorded.
    pub fn path(&self) -> Option<&DecodePath> {
        let path = self.path_ref();
        if path.is_root() { None } else { Some(path) }
    }

    fn path_ref(&self) -> &DecodePath {
        match self {
            Error::Message { path, .. }
            | Error::Eof { path, .. }
            | Error::Malformed { path, .. }
            | Error::Conversion { path, .. }
            | Error::CoercionRejected { path, .. }
            | Error::DuplicateKey { path, .. }
            | Error::UnresolvedReferences { path, .. }
            | Error::LimitExceeded { path, .. } => path,
        }
    }

    fn path_mut(&mut self) -> &mut DecodePath {
        match self {
            Error::Message { path, .. }
            | Error::Eof { path, .. }
            | Error::Malformed { path, .. }
            | Error::Conversion { path, .. }
            | Error::CoercionRejected { path, .. }
            | Error::DuplicateKey { path, .. }
            | Error::UnresolvedReferences { path, .. }
            | Error::LimitExceeded { path, .. } => path,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Message { msg, path } => fmt_with_path(f, msg, path),
            Error::Eof { expected, path } => fmt_with_path(
                f,
                &format!("unexpected end of input: expected {expected}"),
                path,
            ),
            Error::Malformed {
                expected,
                found,
                path,
            } => fmt_with_path(f, &format!("expected {expected}, found {found}"), path),
            Error::Conversion { source, path } => {
                fmt_with_path(f, &format!("element conversion failed: {source}"), path)
            }
            Error::CoercionRejected {
                shape,
                expected,
                path,
            } => fmt_with_path(
                f,
                &format!("{shape} is not accepted where {expected} is expected"),
                path,
            ),
            Error::DuplicateKey { key, path } => {
                fmt_with_path(f, &format!("duplicate key: {key}"), path)
            }
            Error::UnresolvedReferences { ids, path } => {
                let rendered: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
                fmt_with_path(
                    f,
                    &format!("unresolved forward references: [{}]", rendered.join(", ")),
                    path,
                )
            }
            Error::LimitExceeded { breach, path } => {
                fmt_with_path(f, &format!("decode limit breached: {breach:?}"), path)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Conversion { source, .. } => Some(source.as_ref()),
            _ => None,
        }
    }
}

/// Print a message optionally suffixed with "at <path>".
fn fmt_with_path(f: &mut fmt::Formatter<'_>, msg: &str, path: &DecodePath) -> fmt::Result {
    if path.is_root() {
        write!(f, "{msg}")
    } else {
        write!(f, "{msg} at {path}")
    }
}
