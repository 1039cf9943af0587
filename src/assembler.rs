//! Container assembly: one full typed-container decode per call.
//!
//! An assembler owns the skeleton of a container decode — entry-shape
//! handling, the element loop, null policy, forward-reference bookkeeping,
//! the end token — and delegates every element to an [`ElementConverter`],
//! which may itself recurse into the engine for nested containers. The
//! converter is a capability value, not a type hierarchy: assemblers are
//! generic over it and never over concrete element types.
//!
//! Entry points exist per target shape: [`decode_seq`] (growable sequence,
//! optionally appending to an existing one), [`decode_array`] (exact-sized,
//! buffered through [`SegmentedBuffer`](crate::buffer::SegmentedBuffer)),
//! [`decode_set`], and [`decode_map`] (keyed, insertion-ordered, optionally
//! merging over an existing map).

use std::collections::HashSet;
use std::fmt;
use std::marker::PhantomData;

use indexmap::IndexMap;

use crate::buffer::{BufferPool, SegmentedBuffer};
use crate::error::Error;
use crate::identity::{IdentityScope, RefId};
use crate::limits::LimitTracker;
use crate::node::Node;
use crate::options::{CoercionShape, DuplicateKeyPolicy, EmptyShapePolicy, NullPolicy, Options};
use crate::path::{DecodePath, PathSegment};
use crate::refs::{KeyedRefLedger, RefLedger};
use crate::scalars::is_blank;
use crate::tokens::{Scalar, Token, TokenCursor};
use crate::tree::TreeBuilder;

/// Insertion-ordered keyed container produced by [`decode_map`].
pub type KeyedMap<V> = IndexMap<String, V, ahash::RandomState>;

/// Unordered unique-element container produced by [`decode_set`].
pub type ValueSet<V> = HashSet<V, ahash::RandomState>;

/// Shared state of one top-level decode: configuration, the identity
/// registry, limit accounting, buffer recycling and the current path.
///
/// One context serves one decode call tree on one thread; converters receive
/// it on every call and may recurse back into the assembler with it.
pub struct DecodeContext<'o, V> {
    pub options: &'o Options,
    /// Reference ids bound to constructed values so far.
    pub identity: IdentityScope<V>,
    pub(crate) tracker: LimitTracker,
    pub(crate) buffers: BufferPool<V>,
    path: DecodePath,
}

impl<'o, V> DecodeContext<'o, V> {
    pub fn new(options: &'o Options) -> Self {
        Self {
            options,
            identity: IdentityScope::new(),
            tracker: LimitTracker::new(options.limits),
            buffers: BufferPool::new(),
            path: DecodePath::root(),
        }
    }

    /// Bind a reference id to its constructed value. Converters call this
    /// when they finish building an object that carries an identity; any
    /// element deferred on that id resolves before the enclosing container
    /// decode returns.
    pub fn bind(&mut self, id: RefId, value: V) -> Result<(), Error> {
        self.identity.bind(id, value)
    }

    /// Path from the decode root to the element currently being converted.
    pub fn path(&self) -> &DecodePath {
        &self.path
    }

    /// Counters accumulated so far.
    pub fn report(&self) -> crate::limits::LimitReport {
        self.tracker.report()
    }

    /// Account for a token this assembler consumed itself.
    fn observe(&mut self, token: &Token) -> Result<(), Error> {
        self.tracker
            .observe(token)
            .map_err(|breach| Error::limit(breach).with_path(self.path.clone()))
    }

    /// Attach the current path to an error that does not carry one yet.
    fn localize(&self, err: Error) -> Error {
        if err.path().is_none() {
            err.with_path(self.path.clone())
        } else {
            err
        }
    }

    fn seg_path(&self, seg: &PathSegment) -> DecodePath {
        self.path.clone().join(seg.clone())
    }
}

/// Outcome of converting one element.
pub enum Converted<V> {
    /// The element's value, fully constructed.
    Value(V),
    /// The element references an object under this id which may not have
    /// been constructed yet.
    Reference(RefId),
}

/// Per-element conversion capability.
///
/// `convert` is entered with the cursor positioned at the element's first
/// token and must consume exactly through the element's last token. It may
/// recurse into [`decode_seq`]/[`decode_map`]/[`TreeBuilder`] for nested
/// containers.
pub trait ElementConverter {
    type Value;

    fn convert(
        &mut self,
        cursor: &mut dyn TokenCursor,
        ctx: &mut DecodeContext<'_, Self::Value>,
    ) -> Result<Converted<Self::Value>, Error>;

    /// Whether values of this type carry identities. Only then does the
    /// assembler engage the forward-reference ledger; converters that never
    /// return [`Converted::Reference`] keep the default.
    fn supports_identity(&self) -> bool {
        false
    }

    /// The value standing in for an explicit null under
    /// [`NullPolicy::Substitute`]. `None` (the default) makes that policy an
    /// error for this element type.
    fn null_value(&mut self, ctx: &mut DecodeContext<'_, Self::Value>) -> Option<Self::Value> {
        let _ = ctx;
        None
    }
}

/// Adapter turning a closure into an [`ElementConverter`] without identity
/// support.
pub struct FnConverter<V, F> {
    convert: F,
    _marker: PhantomData<fn() -> V>,
}

impl<V, F> FnConverter<V, F>
where
    F: FnMut(&mut dyn TokenCursor, &mut DecodeContext<'_, V>) -> Result<Converted<V>, Error>,
{
    pub fn new(convert: F) -> Self {
        Self {
            convert,
            _marker: PhantomData,
        }
    }
}

impl<V, F> ElementConverter for FnConverter<V, F>
where
    F: FnMut(&mut dyn TokenCursor, &mut DecodeContext<'_, V>) -> Result<Converted<V>, Error>,
{
    type Value = V;

    fn convert(
        &mut self,
        cursor: &mut dyn TokenCursor,
        ctx: &mut DecodeContext<'_, V>,
    ) -> Result<Converted<V>, Error> {
        (self.convert)(cursor, ctx)
    }
}

/// Converter whose elements are generic subtrees.
pub struct NodeConverter;

impl ElementConverter for NodeConverter {
    type Value = Node;

    fn convert(
        &mut self,
        cursor: &mut dyn TokenCursor,
        ctx: &mut DecodeContext<'_, Node>,
    ) -> Result<Converted<Node>, Error> {
        let mut builder = TreeBuilder::new(ctx.options);
        builder.decode(cursor).map(Converted::Value)
    }

    fn null_value(&mut self, _ctx: &mut DecodeContext<'_, Node>) -> Option<Node> {
        Some(Node::Null)
    }
}

/// Sequence decode failure carrying what was built before it.
pub struct SeqError<V> {
    /// Elements settled before the failure, in stream order; positions still
    /// deferred at failure time are omitted.
    pub partial: Vec<V>,
    /// Index of the offending element within this decode.
    pub index: usize,
    pub source: Error,
}

impl<V> fmt::Debug for SeqError<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeqError")
            .field("index", &self.index)
            .field("partial_len", &self.partial.len())
            .field("source", &self.source)
            .finish()
    }
}

impl<V> fmt::Display for SeqError<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl<V> std::error::Error for SeqError<V> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl<V> From<SeqError<V>> for Error {
    fn from(err: SeqError<V>) -> Self {
        err.source
    }
}

/// Keyed decode failure carrying what was built before it.
pub struct MapError<V> {
    /// Entries settled before the failure, folded last-wins.
    pub partial: KeyedMap<V>,
    /// Key of the offending entry, when the failure happened inside one.
    pub key: Option<String>,
    pub source: Error,
}

impl<V> fmt::Debug for MapError<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapError")
            .field("key", &self.key)
            .field("partial_len", &self.partial.len())
            .field("source", &self.source)
            .finish()
    }
}

impl<V> fmt::Display for MapError<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl<V> std::error::Error for MapError<V> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

impl<V> From<MapError<V>> for Error {
    fn from(err: MapError<V>) -> Self {
        err.source
    }
}

/// How a sequence decode enters, after shape coercion.
enum SeqEntry {
    /// Start token consumed; elements follow until the end token.
    Elements,
    /// Coerced to the empty container.
    Empty,
    /// A bare value stands in for a one-element container.
    Single,
}

/// Outcome of one element slot.
enum Element<V> {
    Value(V),
    Deferred(RefId),
    Skipped,
}

/// Decide how a sequence decode starts: a real array, a coerced empty/blank
/// shape, or a single value to unwrap. Consumes the start token (or the
/// coerced scalar); leaves a single value in place for the converter.
fn open_sequence<V>(
    cursor: &mut dyn TokenCursor,
    ctx: &mut DecodeContext<'_, V>,
) -> Result<SeqEntry, Error> {
    enum Peeked {
        Start,
        Shaped(CoercionShape),
        Other(&'static str),
    }
    let peeked = match cursor.peek()? {
        None => return Err(ctx.localize(Error::eof("array start"))),
        Some(Token::ArrayStart) => Peeked::Start,
        Some(Token::Null) => Peeked::Shaped(CoercionShape::NullToken),
        Some(Token::Scalar(Scalar::Text(text))) if text.is_empty() => {
            Peeked::Shaped(CoercionShape::EmptyText)
        }
        Some(Token::Scalar(Scalar::Text(text))) if is_blank(text) => {
            Peeked::Shaped(CoercionShape::BlankText)
        }
        Some(other) => Peeked::Other(other.describe()),
    };
    match peeked {
        Peeked::Start => {
            consume(cursor, ctx, "array start")?;
            Ok(SeqEntry::Elements)
        }
        Peeked::Shaped(shape) => match ctx.options.empty_shapes {
            EmptyShapePolicy::Fail => Err(ctx.localize(Error::coercion_rejected(shape, "an array"))),
            EmptyShapePolicy::AsNull | EmptyShapePolicy::AsEmpty => {
                consume(cursor, ctx, "coerced scalar")?;
                Ok(SeqEntry::Empty)
            }
            EmptyShapePolicy::TryConvert => Ok(SeqEntry::Single),
        },
        Peeked::Other(found) => {
            if ctx.options.unwrap_single_value {
                Ok(SeqEntry::Single)
            } else {
                Err(ctx.localize(Error::malformed("array start", found)))
            }
        }
    }
}

/// Consume the already-peeked token and account for it.
fn consume<V>(
    cursor: &mut dyn TokenCursor,
    ctx: &mut DecodeContext<'_, V>,
    expected: &'static str,
) -> Result<Token, Error> {
    match cursor.next()? {
        Some(token) => {
            ctx.observe(&token)?;
            Ok(token)
        }
        None => Err(ctx.localize(Error::eof(expected))),
    }
}

/// Convert the element at the cursor, applying null policy and identity
/// handling. Errors come back with their path already attached.
fn decode_element<C: ElementConverter>(
    cursor: &mut dyn TokenCursor,
    converter: &mut C,
    ctx: &mut DecodeContext<'_, C::Value>,
    seg: PathSegment,
) -> Result<Element<C::Value>, Error>
where
    C::Value: Clone,
{
    if matches!(cursor.peek()?, Some(Token::Null)) {
        consume(cursor, ctx, "null")?;
        return match ctx.options.nulls {
            NullPolicy::Fail => Err(Error::coercion_rejected(
                CoercionShape::NullToken,
                "a non-null element",
            )
            .with_path(ctx.seg_path(&seg))),
            NullPolicy::Skip => Ok(Element::Skipped),
            NullPolicy::Substitute => match converter.null_value(ctx) {
                Some(value) => Ok(Element::Value(value)),
                None => Err(Error::coercion_rejected(
                    CoercionShape::NullToken,
                    "an element with a null substitute",
                )
                .with_path(ctx.seg_path(&seg))),
            },
        };
    }

    ctx.path.push(seg.clone());
    let converted = converter.convert(cursor, ctx);
    ctx.path.pop();

    match converted {
        Ok(Converted::Value(value)) => Ok(Element::Value(value)),
        Ok(Converted::Reference(id)) => {
            if !converter.supports_identity() {
                return Err(Error::msg(format!(
                    "converter deferred reference id {id} without declaring identity support"
                ))
                .with_path(ctx.seg_path(&seg)));
            }
            match ctx.identity.get(id) {
                Some(value) => Ok(Element::Value(value)),
                None => {
                    if let Err(breach) = ctx.tracker.on_defer() {
                        return Err(Error::limit(breach).with_path(ctx.seg_path(&seg)));
                    }
                    Ok(Element::Deferred(id))
                }
            }
        }
        Err(err) => {
            if ctx.options.wrap_conversion_errors && err.path().is_none() {
                Err(err.with_path(ctx.seg_path(&seg)))
            } else {
                Err(err)
            }
        }
    }
}

/// Splice every pending reference whose id has been bound since the last
/// element, preserving stream order.
fn drain_ready<V: Clone>(ledger: &mut RefLedger<V>, ctx: &mut DecodeContext<'_, V>) {
    loop {
        let ready = ledger
            .pending_ids()
            .into_iter()
            .find(|id| ctx.identity.contains(*id));
        match ready {
            Some(id) => {
                if let Some(value) = ctx.identity.get(id) {
                    ledger.resolve(id, value);
                    ctx.tracker.on_resolve();
                }
            }
            None => break,
        }
    }
}

fn drain_ready_keyed<V: Clone>(ledger: &mut KeyedRefLedger<V>, ctx: &mut DecodeContext<'_, V>) {
    loop {
        let ready = ledger
            .pending_ids()
            .into_iter()
            .find(|id| ctx.identity.contains(*id));
        match ready {
            Some(id) => {
                if let Some(value) = ctx.identity.get(id) {
                    ledger.resolve(id, value);
                    ctx.tracker.on_resolve();
                }
            }
            None => break,
        }
    }
}

/// Decode a sequence container into a `Vec`.
///
/// The cursor must be positioned at the container's first token; on success
/// it is positioned just past the matching end token. With `existing`, the
/// decoded elements append after the ones already present.
pub fn decode_seq<C: ElementConverter>(
    cursor: &mut dyn TokenCursor,
    converter: &mut C,
    ctx: &mut DecodeContext<'_, C::Value>,
    existing: Option<Vec<C::Value>>,
) -> Result<Vec<C::Value>, SeqError<C::Value>>
where
    C::Value: Clone,
{
    let mut ledger = match existing {
        Some(items) => RefLedger::with_target(items),
        None => RefLedger::new(),
    };
    let mut index = 0usize;
    match run_seq(cursor, converter, ctx, &mut ledger, &mut index) {
        Ok(()) => {
            drain_ready(&mut ledger, ctx);
            if ledger.has_pending() {
                let source = ctx.localize(Error::unresolved(ledger.pending_ids()));
                return Err(SeqError {
                    partial: ledger.into_partial(),
                    index,
                    source,
                });
            }
            match ledger.finish() {
                Ok(items) => Ok(items),
                Err(source) => Err(SeqError {
                    partial: Vec::new(),
                    index,
                    source,
                }),
            }
        }
        Err(source) => Err(SeqError {
            partial: ledger.into_partial(),
            index,
            source,
        }),
    }
}

fn run_seq<C: ElementConverter>(
    cursor: &mut dyn TokenCursor,
    converter: &mut C,
    ctx: &mut DecodeContext<'_, C::Value>,
    ledger: &mut RefLedger<C::Value>,
    index: &mut usize,
) -> Result<(), Error>
where
    C::Value: Clone,
{
    match open_sequence(cursor, ctx)? {
        SeqEntry::Empty => Ok(()),
        SeqEntry::Single => {
            seq_element(cursor, converter, ctx, ledger, index)?;
            Ok(())
        }
        SeqEntry::Elements => {
            loop {
                let at_end = match cursor.peek()? {
                    None => return Err(ctx.localize(Error::eof("array element or array end"))),
                    Some(Token::ArrayEnd) => true,
                    Some(_) => false,
                };
                if at_end {
                    consume(cursor, ctx, "array end")?;
                    return Ok(());
                }
                seq_element(cursor, converter, ctx, ledger, index)?;
            }
        }
    }
}

fn seq_element<C: ElementConverter>(
    cursor: &mut dyn TokenCursor,
    converter: &mut C,
    ctx: &mut DecodeContext<'_, C::Value>,
    ledger: &mut RefLedger<C::Value>,
    index: &mut usize,
) -> Result<(), Error>
where
    C::Value: Clone,
{
    let seg = PathSegment::Index(*index);
    match decode_element(cursor, converter, ctx, seg)? {
        Element::Value(value) => ledger.push(value),
        Element::Deferred(id) => {
            ledger.defer(id);
        }
        Element::Skipped => {}
    }
    *index += 1;
    drain_ready(ledger, ctx);
    Ok(())
}

/// Decode a sequence container into an exactly-sized boxed slice.
///
/// Without identity support the elements stream through a pooled
/// [`SegmentedBuffer`], so nothing is over-allocated no matter how many
/// growth boundaries the unknown length crosses. Identity-capable converters
/// take the ledger path instead, since deferred elements cannot live in a
/// flat buffer.
pub fn decode_array<C: ElementConverter>(
    cursor: &mut dyn TokenCursor,
    converter: &mut C,
    ctx: &mut DecodeContext<'_, C::Value>,
) -> Result<Box<[C::Value]>, SeqError<C::Value>>
where
    C::Value: Clone,
{
    if converter.supports_identity() {
        return decode_seq(cursor, converter, ctx, None).map(Vec::into_boxed_slice);
    }
    let mut buffer = ctx.buffers.lease();
    let mut segment = buffer.begin();
    let mut index = 0usize;
    let outcome = run_array(cursor, converter, ctx, &mut buffer, &mut segment, &mut index);
    match outcome {
        Ok(()) => {
            let out = buffer.complete_boxed(segment);
            ctx.buffers.release(buffer);
            Ok(out)
        }
        Err(source) => {
            let partial = buffer.complete(segment);
            ctx.buffers.release(buffer);
            Err(SeqError {
                partial,
                index,
                source,
            })
        }
    }
}

fn run_array<C: ElementConverter>(
    cursor: &mut dyn TokenCursor,
    converter: &mut C,
    ctx: &mut DecodeContext<'_, C::Value>,
    buffer: &mut SegmentedBuffer<C::Value>,
    segment: &mut Vec<C::Value>,
    index: &mut usize,
) -> Result<(), Error>
where
    C::Value: Clone,
{
    let push = |buffer: &mut SegmentedBuffer<C::Value>,
                segment: &mut Vec<C::Value>,
                value: C::Value| {
        if segment.len() == segment.capacity() {
            *segment = buffer.grow(std::mem::take(segment));
        }
        segment.push(value);
    };
    match open_sequence(cursor, ctx)? {
        SeqEntry::Empty => Ok(()),
        SeqEntry::Single => {
            let seg = PathSegment::Index(*index);
            match decode_element(cursor, converter, ctx, seg)? {
                Element::Value(value) => push(buffer, segment, value),
                Element::Deferred(_) => {
                    return Err(Error::msg("deferred reference in buffered array decode"));
                }
                Element::Skipped => {}
            }
            *index += 1;
            Ok(())
        }
        SeqEntry::Elements => loop {
            let at_end = match cursor.peek()? {
                None => return Err(ctx.localize(Error::eof("array element or array end"))),
                Some(Token::ArrayEnd) => true,
                Some(_) => false,
            };
            if at_end {
                consume(cursor, ctx, "array end")?;
                return Ok(());
            }
            let seg = PathSegment::Index(*index);
            match decode_element(cursor, converter, ctx, seg)? {
                Element::Value(value) => push(buffer, segment, value),
                Element::Deferred(_) => {
                    return Err(Error::msg("deferred reference in buffered array decode"));
                }
                Element::Skipped => {}
            }
            *index += 1;
        },
    }
}

/// Decode a sequence container into a set. Element order is not observable
/// in the target, so deferred references are resolved in one pass at the
/// end instead of through the ledger.
pub fn decode_set<C: ElementConverter>(
    cursor: &mut dyn TokenCursor,
    converter: &mut C,
    ctx: &mut DecodeContext<'_, C::Value>,
) -> Result<ValueSet<C::Value>, SeqError<C::Value>>
where
    C::Value: Clone + Eq + std::hash::Hash,
{
    let mut set = ValueSet::default();
    let mut deferred: Vec<RefId> = Vec::new();
    let mut index = 0usize;
    let outcome = run_set(cursor, converter, ctx, &mut set, &mut deferred, &mut index);
    let fail = |set: ValueSet<C::Value>, index: usize, source: Error| SeqError {
        partial: set.into_iter().collect(),
        index,
        source,
    };
    if let Err(source) = outcome {
        return Err(fail(set, index, source));
    }
    let mut unresolved = Vec::new();
    for id in deferred {
        match ctx.identity.get(id) {
            Some(value) => {
                set.insert(value);
                ctx.tracker.on_resolve();
            }
            None => unresolved.push(id),
        }
    }
    if unresolved.is_empty() {
        Ok(set)
    } else {
        let source = ctx.localize(Error::unresolved(unresolved));
        Err(fail(set, index, source))
    }
}

fn run_set<C: ElementConverter>(
    cursor: &mut dyn TokenCursor,
    converter: &mut C,
    ctx: &mut DecodeContext<'_, C::Value>,
    set: &mut ValueSet<C::Value>,
    deferred: &mut Vec<RefId>,
    index: &mut usize,
) -> Result<(), Error>
where
    C::Value: Clone + Eq + std::hash::Hash,
{
    let one = |cursor: &mut dyn TokenCursor,
               converter: &mut C,
               ctx: &mut DecodeContext<'_, C::Value>,
               set: &mut ValueSet<C::Value>,
               deferred: &mut Vec<RefId>,
               index: &mut usize|
     -> Result<(), Error> {
        let seg = PathSegment::Index(*index);
        match decode_element(cursor, converter, ctx, seg)? {
            Element::Value(value) => {
                set.insert(value);
            }
            Element::Deferred(id) => deferred.push(id),
            Element::Skipped => {}
        }
        *index += 1;
        Ok(())
    };
    match open_sequence(cursor, ctx)? {
        SeqEntry::Empty => Ok(()),
        SeqEntry::Single => one(cursor, converter, ctx, set, deferred, index),
        SeqEntry::Elements => loop {
            let at_end = match cursor.peek()? {
                None => return Err(ctx.localize(Error::eof("array element or array end"))),
                Some(Token::ArrayEnd) => true,
                Some(_) => false,
            };
            if at_end {
                consume(cursor, ctx, "array end")?;
                return Ok(());
            }
            one(cursor, converter, ctx, set, deferred, index)?;
        },
    }
}

/// Decode a keyed container into an insertion-ordered map.
///
/// The cursor may be positioned at the object's start token, or already at
/// its first field name; either way the decode consumes through the matching
/// end token. With `existing`, decoded entries merge over it: every decoded
/// key overwrites, the duplicate-key policy applies among the decoded
/// entries themselves.
pub fn decode_map<C: ElementConverter>(
    cursor: &mut dyn TokenCursor,
    converter: &mut C,
    ctx: &mut DecodeContext<'_, C::Value>,
    existing: Option<KeyedMap<C::Value>>,
) -> Result<KeyedMap<C::Value>, MapError<C::Value>>
where
    C::Value: Clone,
{
    let mut ledger = KeyedRefLedger::new();
    let mut last_key: Option<String> = None;
    match run_map(cursor, converter, ctx, &mut ledger, &mut last_key) {
        Ok(()) => {
            drain_ready_keyed(&mut ledger, ctx);
            if ledger.has_pending() {
                let source = ctx.localize(Error::unresolved(ledger.pending_ids()));
                return Err(MapError {
                    partial: fold_pairs_last_wins(existing, ledger.into_partial()),
                    key: last_key,
                    source,
                });
            }
            let pairs = match ledger.finish() {
                Ok(pairs) => pairs,
                Err(source) => {
                    return Err(MapError {
                        partial: KeyedMap::default(),
                        key: last_key,
                        source,
                    });
                }
            };
            fold_pairs(ctx, existing, pairs).map_err(|(partial, key, source)| MapError {
                partial,
                key,
                source,
            })
        }
        Err(source) => Err(MapError {
            partial: fold_pairs_last_wins(existing, ledger.into_partial()),
            key: last_key,
            source,
        }),
    }
}

fn run_map<C: ElementConverter>(
    cursor: &mut dyn TokenCursor,
    converter: &mut C,
    ctx: &mut DecodeContext<'_, C::Value>,
    ledger: &mut KeyedRefLedger<C::Value>,
    last_key: &mut Option<String>,
) -> Result<(), Error>
where
    C::Value: Clone,
{
    enum Opening {
        Start,
        AtFirstField,
        Shaped(CoercionShape),
        Other(&'static str),
    }
    let opening = match cursor.peek()? {
        None => return Err(ctx.localize(Error::eof("object start"))),
        Some(Token::ObjectStart) => Opening::Start,
        Some(Token::FieldName(_)) => Opening::AtFirstField,
        Some(Token::Null) => Opening::Shaped(CoercionShape::NullToken),
        Some(Token::Scalar(Scalar::Text(text))) if text.is_empty() => {
            Opening::Shaped(CoercionShape::EmptyText)
        }
        Some(Token::Scalar(Scalar::Text(text))) if is_blank(text) => {
            Opening::Shaped(CoercionShape::BlankText)
        }
        Some(other) => Opening::Other(other.describe()),
    };
    match opening {
        Opening::Start => {
            consume(cursor, ctx, "object start")?;
        }
        Opening::AtFirstField => {}
        Opening::Shaped(shape) => match ctx.options.empty_shapes {
            EmptyShapePolicy::AsNull | EmptyShapePolicy::AsEmpty => {
                consume(cursor, ctx, "coerced scalar")?;
                return Ok(());
            }
            // A bare scalar cannot stand in for a keyed container: there is
            // no key to store it under.
            EmptyShapePolicy::Fail | EmptyShapePolicy::TryConvert => {
                return Err(ctx.localize(Error::coercion_rejected(shape, "an object")));
            }
        },
        Opening::Other(found) => {
            return Err(ctx.localize(Error::malformed("object start", found)));
        }
    }

    loop {
        let token = consume(cursor, ctx, "field name or object end")?;
        let name = match token {
            Token::ObjectEnd => return Ok(()),
            Token::FieldName(name) => name,
            other => {
                return Err(
                    ctx.localize(Error::malformed("field name or object end", other.describe()))
                );
            }
        };
        *last_key = Some(name.clone());
        let seg = PathSegment::Key(name.clone());
        match decode_element(cursor, converter, ctx, seg)? {
            Element::Value(value) => ledger.push(name, value),
            Element::Deferred(id) => {
                ledger.defer(name, id);
            }
            Element::Skipped => {}
        }
        drain_ready_keyed(ledger, ctx);
    }
}

/// Fold decoded pairs over the optional existing target, applying the
/// duplicate-key policy among the decoded pairs. `Coalesce` has no typed
/// representation here and behaves as last-wins.
fn fold_pairs<V>(
    ctx: &DecodeContext<'_, V>,
    existing: Option<KeyedMap<V>>,
    pairs: Vec<(String, V)>,
) -> Result<KeyedMap<V>, (KeyedMap<V>, Option<String>, Error)> {
    let mut out = existing.unwrap_or_default();
    let mut seen: HashSet<String, ahash::RandomState> = HashSet::default();
    let check_duplicates = matches!(
        ctx.options.duplicate_keys,
        DuplicateKeyPolicy::Error | DuplicateKeyPolicy::FirstWins
    );
    for (key, value) in pairs {
        if check_duplicates {
            let duplicate = !seen.insert(key.clone());
            if duplicate {
                match ctx.options.duplicate_keys {
                    DuplicateKeyPolicy::FirstWins => continue,
                    DuplicateKeyPolicy::Error => {
                        let seg = PathSegment::Key(key.clone());
                        let err =
                            Error::duplicate_key(key.clone()).with_path(ctx.seg_path(&seg));
                        return Err((out, Some(key), err));
                    }
                    _ => {}
                }
            }
        }
        out.insert(key, value);
    }
    Ok(out)
}

fn fold_pairs_last_wins<V>(existing: Option<KeyedMap<V>>, pairs: Vec<(String, V)>) -> KeyedMap<V> {
    let mut out = existing.unwrap_or_default();
    for (key, value) in pairs {
        out.insert(key, value);
    }
    out
}
