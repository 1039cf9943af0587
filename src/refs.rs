//! Ordered ledger for container elements whose value is not yet available.
//!
//! A forward reference means "the object with id X", where X has not been
//! fully constructed yet at the point the element is read. The ledger keeps
//! the container's final enumeration order equal to stream-encounter order no
//! matter how many elements were deferred or in what order they resolve:
//! every value appended while at least one reference is pending goes into the
//! trailing bucket of the *most recently* registered pending entry, and
//! resolving an entry splices its value plus that bucket back exactly where
//! the entry sat in the stream.
//!
//! One ledger serves one container within one top-level decode.

use smallvec::SmallVec;

use crate::error::Error;
use crate::identity::RefId;

/// Resolution token returned when an element is registered as unresolved.
///
/// Hand it to whatever subsystem learns about constructed objects; its id is
/// the key to [`RefLedger::resolve`] / [`KeyedRefLedger::resolve`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Unresolved {
    id: RefId,
}

impl Unresolved {
    pub fn id(&self) -> RefId {
        self.id
    }
}

/// One registered unresolved element and everything appended after it.
#[derive(Debug)]
struct PendingSlot<E> {
    id: RefId,
    bucket: SmallVec<[E; 2]>,
}

/// Forward-reference accumulator for sequence containers.
#[derive(Debug, Default)]
pub struct RefLedger<V> {
    settled: Vec<V>,
    pending: Vec<PendingSlot<V>>,
}

impl<V> RefLedger<V> {
    pub fn new() -> Self {
        Self {
            settled: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// A ledger whose settled prefix is a pre-existing target; decoded
    /// elements append after it.
    pub fn with_target(existing: Vec<V>) -> Self {
        Self {
            settled: existing,
            pending: Vec::new(),
        }
    }

    /// Append a value at the current stream position.
    pub fn push(&mut self, value: V) {
        match self.pending.last_mut() {
            Some(slot) => slot.bucket.push(value),
            None => self.settled.push(value),
        }
    }

    /// Register the element at the current stream position as unresolved.
    pub fn defer(&mut self, id: RefId) -> Unresolved {
        self.pending.push(PendingSlot {
            id,
            bucket: SmallVec::new(),
        });
        Unresolved { id }
    }

    /// Supply the value for a previously registered reference.
    ///
    /// The value and the entry's trailing bucket are spliced back into the
    /// position the entry occupied in the stream. When the same id was
    /// registered more than once, one call resolves the earliest entry.
    ///
    /// # Panics
    ///
    /// Panics if `id` was never registered with [`defer`](Self::defer): that
    /// is a caller bug, not an input condition.
    pub fn resolve(&mut self, id: RefId, value: V) {
        let idx = match self.pending.iter().position(|slot| slot.id == id) {
            Some(idx) => idx,
            None => panic!("resolve() called for reference id {id} that was never registered"),
        };
        let slot = self.pending.remove(idx);
        if idx == 0 {
            self.settled.push(value);
            self.settled.extend(slot.bucket);
        } else {
            let prev = &mut self.pending[idx - 1];
            prev.bucket.push(value);
            prev.bucket.extend(slot.bucket);
        }
    }

    /// True while at least one reference is unresolved.
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Ids still unresolved, in registration order.
    pub fn pending_ids(&self) -> Vec<RefId> {
        self.pending.iter().map(|slot| slot.id).collect()
    }

    /// Total number of values held, settled or still bucketed.
    pub fn len(&self) -> usize {
        self.settled.len()
            + self
                .pending
                .iter()
                .map(|slot| slot.bucket.len())
                .sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Final container. Errors when references are still unresolved, naming
    /// them in registration order.
    pub fn finish(self) -> Result<Vec<V>, Error> {
        if self.pending.is_empty() {
            Ok(self.settled)
        } else {
            Err(Error::unresolved(self.pending_ids()))
        }
    }

    /// Everything held so far in stream order, with unresolved positions
    /// omitted. This is the partial container surfaced inside errors.
    pub fn into_partial(self) -> Vec<V> {
        let mut out = self.settled;
        for slot in self.pending {
            out.extend(slot.bucket);
        }
        out
    }
}

/// Forward-reference accumulator for keyed containers.
///
/// Same ordering contract as [`RefLedger`], with each value (and each
/// pending entry) carrying the key it will be stored under.
#[derive(Debug, Default)]
pub struct KeyedRefLedger<V> {
    settled: Vec<(String, V)>,
    pending: Vec<KeyedPendingSlot<V>>,
}

#[derive(Debug)]
struct KeyedPendingSlot<V> {
    id: RefId,
    key: String,
    bucket: SmallVec<[(String, V); 2]>,
}

impl<V> KeyedRefLedger<V> {
    pub fn new() -> Self {
        Self {
            settled: Vec::new(),
            pending: Vec::new(),
        }
    }

    /// Append a key/value pair at the current stream position.
    pub fn push(&mut self, key: String, value: V) {
        match self.pending.last_mut() {
            Some(slot) => slot.bucket.push((key, value)),
            None => self.settled.push((key, value)),
        }
    }

    /// Register the entry for `key` as unresolved.
    pub fn defer(&mut self, key: String, id: RefId) -> Unresolved {
        self.pending.push(KeyedPendingSlot {
            id,
            key,
            bucket: SmallVec::new(),
        });
        Unresolved { id }
    }

    /// Supply the value for a previously registered reference.
    ///
    /// # Panics
    ///
    /// Panics if `id` was never registered with [`defer`](Self::defer).
    pub fn resolve(&mut self, id: RefId, value: V) {
        let idx = match self.pending.iter().position(|slot| slot.id == id) {
            Some(idx) => idx,
            None => panic!("resolve() called for reference id {id} that was never registered"),
        };
        let slot = self.pending.remove(idx);
        if idx == 0 {
            self.settled.push((slot.key, value));
            self.settled.extend(slot.bucket);
        } else {
            let prev = &mut self.pending[idx - 1];
            prev.bucket.push((slot.key, value));
            prev.bucket.extend(slot.bucket);
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    pub fn pending_ids(&self) -> Vec<RefId> {
        self.pending.iter().map(|slot| slot.id).collect()
    }

    /// Final pairs in stream order. Errors when references are still
    /// unresolved.
    pub fn finish(self) -> Result<Vec<(String, V)>, Error> {
        if self.pending.is_empty() {
            Ok(self.settled)
        } else {
            Err(Error::unresolved(self.pending_ids()))
        }
    }

    /// Pairs held so far in stream order, unresolved positions omitted.
    pub fn into_partial(self) -> Vec<(String, V)> {
        let mut out = self.settled;
        for slot in self.pending {
            out.extend(slot.bucket);
        }
        out
    }
}
