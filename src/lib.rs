//! Streaming token-to-value decoding engine.
//!
//! `graft` turns a forward-only stream of structural/scalar token events
//! into native in-memory values: generic [`Node`] trees, sequences, keyed
//! maps, sets and exact-sized arrays.
//!
//! What it handles:
//! - Arbitrary nesting depth without call-stack recursion (an explicit,
//!   pooled frame stack).
//! - Forward references: an element may be "the object with id X" before X
//!   has been constructed; an ordered ledger splices values back into
//!   stream order once they resolve.
//! - Pluggable per-element conversion through the [`ElementConverter`]
//!   capability, with polymorphic dispatch per element.
//! - Configurable null handling, duplicate-key policy, empty-shape coercion
//!   and single-value-as-sequence unwrapping.
//! - Accumulation of unknown-length output through pooled segmented buffers
//!   with exact final sizing.
//! - Merge ("update") decoding into an existing tree or map.
//!
//! Tokenization is not this crate's concern: callers supply any
//! [`TokenCursor`], and [`ReplayCursor`] replays recorded token vectors.
//!
//! ```rust
//! use graft::{decode_tree, ReplayCursor, Scalar, Token};
//!
//! let mut cursor = ReplayCursor::new([
//!     Token::ObjectStart,
//!     Token::FieldName("answer".into()),
//!     Token::Scalar(Scalar::Int(42)),
//!     Token::ObjectEnd,
//! ]);
//! let tree = decode_tree(&mut cursor).unwrap();
//! assert_eq!(tree.get("answer").and_then(|n| n.as_i64()), Some(42));
//! ```

pub use crate::assembler::{
    Converted, DecodeContext, ElementConverter, FnConverter, KeyedMap, MapError, NodeConverter,
    SeqError, ValueSet, decode_array, decode_map, decode_seq, decode_set,
};
pub use crate::buffer::{BufferPool, SegmentedBuffer};
pub use crate::error::Error;
pub use crate::identity::{IdentityScope, RefId};
pub use crate::limits::{LimitBreach, LimitReport, LimitTracker, Limits};
pub use crate::node::{Fields, Node, Number, Opaque};
pub use crate::options::{
    CoercionShape, DuplicateKeyPolicy, EmptyShapePolicy, NullPolicy, Options,
};
pub use crate::path::{DecodePath, PathSegment};
pub use crate::refs::{KeyedRefLedger, RefLedger, Unresolved};
pub use crate::tokens::{ReplayCursor, Scalar, Token, TokenCursor};
pub use crate::tree::TreeBuilder;

pub mod assembler;
pub mod buffer;
pub mod error;
pub mod identity;
pub mod limits;
mod macros;
pub mod node;
pub mod options;
pub mod path;
pub mod refs;
pub mod scalars;
pub mod tokens;
pub mod tree;

/// Decode one generic tree with default [`Options`].
///
/// The cursor must be positioned at the value's first token; on success it
/// is positioned just past the value's last token.
pub fn decode_tree(cursor: &mut dyn TokenCursor) -> Result<Node, Error> {
    decode_tree_with_options(cursor, &Options::default())
}

/// Decode one generic tree with explicit [`Options`].
pub fn decode_tree_with_options(
    cursor: &mut dyn TokenCursor,
    options: &Options,
) -> Result<Node, Error> {
    TreeBuilder::new(options).decode(cursor)
}

/// Decode one value and merge it into an existing tree.
///
/// Existing children of matching container kind are merged recursively; a
/// kind mismatch or a new key inserts the freshly decoded value, and array
/// content is always appended. On error the target is left empty.
pub fn merge_tree(
    cursor: &mut dyn TokenCursor,
    target: &mut Node,
    options: &Options,
) -> Result<(), Error> {
    TreeBuilder::new(options).merge(cursor, target)
}
