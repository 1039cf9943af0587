use std::fmt;

use serde::{Deserialize, Serialize};

use crate::limits::Limits;

/// Duplicate key handling policy for keyed containers.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DuplicateKeyPolicy {
    /// Error out on encountering a duplicate key.
    Error,
    /// First key wins: later duplicate pairs are consumed and ignored.
    FirstWins,
    /// Last key wins: later duplicate pairs overwrite in place, keeping the
    /// original key position.
    LastWins,
    /// Duplicate values are collected into an array under the shared key:
    /// the second occurrence turns the slot into an array of both values,
    /// further occurrences append.
    Coalesce,
}

/// What to do with a null element inside a typed container.
///
/// Generic trees are not affected: there a null decodes to a null node.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NullPolicy {
    /// Reject the element, citing its index or key.
    Fail,
    /// Drop the element; it still counts toward element indexes.
    Skip,
    /// Replace the element with the converter's null substitute. Errors when
    /// the converter has no substitute to offer.
    Substitute,
}

/// What to do when an empty or blank text scalar (or a bare null) appears
/// where a container is expected.
#[non_exhaustive]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmptyShapePolicy {
    /// Reject the input.
    Fail,
    /// Produce the container's empty/absent form.
    AsNull,
    /// Produce an empty container.
    AsEmpty,
    /// Hand the scalar to the element converter as a single element
    /// (single-value unwrap, regardless of the unwrap flag).
    TryConvert,
}

/// Shape of an input that needed an implicit conversion decision. Recorded
/// in coercion errors so the message can name what was actually seen.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CoercionShape {
    /// A zero-length text scalar.
    EmptyText,
    /// A text scalar containing only whitespace.
    BlankText,
    /// An explicit null token.
    NullToken,
    /// A bare scalar or sub-structure where a container was expected.
    SingleValue,
}

impl fmt::Display for CoercionShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            CoercionShape::EmptyText => "an empty string",
            CoercionShape::BlankText => "a blank string",
            CoercionShape::NullToken => "a null value",
            CoercionShape::SingleValue => "a single value",
        };
        f.write_str(text)
    }
}

/// Decode configuration.
///
/// Use this to configure duplicate-key policy, null handling, implicit
/// coercions and per-decode [`Limits`].
///
/// ```rust
/// use graft::{DuplicateKeyPolicy, NullPolicy};
///
/// let options = graft::options! {
///     duplicate_keys: DuplicateKeyPolicy::Coalesce,
///     nulls: NullPolicy::Skip,
/// };
/// assert!(matches!(options.nulls, NullPolicy::Skip));
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Options {
    /// Optional limits enforced while tokens are consumed. `None` disables
    /// enforcement entirely (counters are still kept).
    pub limits: Option<Limits>,
    /// Policy for duplicate keys in keyed containers.
    pub duplicate_keys: DuplicateKeyPolicy,
    /// Policy for null elements in typed containers.
    pub nulls: NullPolicy,
    /// Policy for empty/blank scalars (and bare nulls) where a container is
    /// expected.
    pub empty_shapes: EmptyShapePolicy,
    /// If true, a bare value where a sequence is expected decodes as a
    /// one-element sequence instead of a structural error.
    pub unwrap_single_value: bool,
    /// If true (default), element converter failures are wrapped with the
    /// offending index/key before propagating. If false, the converter's
    /// error is returned exactly as raised.
    pub wrap_conversion_errors: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            limits: Some(Limits::default()),
            duplicate_keys: DuplicateKeyPolicy::LastWins,
            nulls: NullPolicy::Fail,
            empty_shapes: EmptyShapePolicy::Fail,
            unwrap_single_value: false,
            wrap_conversion_errors: true,
        }
    }
}
