//! Per-decode registry of values that carry an identity.
//!
//! When elements of a document share objects by reference id, each fully
//! constructed object is bound here under its id. Converters that encounter a
//! reference consult the scope; if the id is not bound yet, the element is
//! deferred through the forward-reference ledger and picked up as soon as the
//! binding appears. The scope lives exactly as long as one top-level decode.

use std::collections::HashMap;
use std::fmt;

use crate::error::Error;

/// Identity of an object shared by reference within one document.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RefId(pub u64);

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference ids bound to their constructed values for one decode.
///
/// Values are handed out by clone; types decoded by identity-aware
/// converters are expected to be cheaply clonable (typically `Rc`/`Arc`
/// handles), which is also what makes the sharing observable in the output.
#[derive(Clone, Debug)]
pub struct IdentityScope<V> {
    bound: HashMap<RefId, V, ahash::RandomState>,
}

impl<V> Default for IdentityScope<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> IdentityScope<V> {
    pub fn new() -> Self {
        Self {
            bound: HashMap::default(),
        }
    }

    /// Bind `id` to its constructed value.
    ///
    /// Binding the same id twice is an input error: two objects claimed the
    /// same identity.
    pub fn bind(&mut self, id: RefId, value: V) -> Result<(), Error> {
        if self.bound.contains_key(&id) {
            return Err(Error::msg(format!(
                "reference id {id} is defined more than once"
            )));
        }
        self.bound.insert(id, value);
        Ok(())
    }

    /// True if `id` has been bound already.
    pub fn contains(&self, id: RefId) -> bool {
        self.bound.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }
}

impl<V: Clone> IdentityScope<V> {
    /// Fetch a clone of the value bound to `id`, if any.
    pub fn get(&self, id: RefId) -> Option<V> {
        self.bound.get(&id).cloned()
    }
}
