//! Iterative construction of generic trees from the token stream.
//!
//! The builder never recurses: one `current` node is under construction at a
//! time, and every ancestor waits in an explicit frame stack. Frames are
//! addressed by depth index into one vector, and that vector is recycled
//! through a thread-local pool, so deeply nested input costs heap, not call
//! stack, and repeated decodes stop allocating frames altogether.
//!
//! The same loop also implements merge ("update") decoding: pointed at an
//! existing tree, it descends only into existing children of matching kind
//! and overwrites or appends everywhere else.

use std::cell::RefCell;
use std::mem;

use crate::error::Error;
use crate::limits::LimitTracker;
use crate::node::{Fields, Node, scalar_node};
use crate::options::{DuplicateKeyPolicy, Options};
use crate::path::{DecodePath, PathSegment};
use crate::tokens::{Token, TokenCursor, next_or_eof};

/// One open container: the partially built node and the key under which the
/// child currently being built will be reattached (`None` for array parents,
/// whose children reattach by position).
#[derive(Debug)]
struct Frame {
    node: Node,
    key: Option<String>,
}

thread_local! {
    static FRAME_POOL: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

fn take_frames() -> Vec<Frame> {
    FRAME_POOL.with(|pool| mem::take(&mut *pool.borrow_mut()))
}

fn put_frames(mut frames: Vec<Frame>) {
    frames.clear();
    FRAME_POOL.with(|pool| *pool.borrow_mut() = frames);
}

/// Which container kind a descend is about to open.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Wanted {
    Object,
    Array,
}

/// Stack-based builder of [`Node`] trees.
///
/// One builder serves one thread; it may be reused across any number of
/// decode calls. Frame slots are cleared and reused rather than reallocated.
pub struct TreeBuilder<'o> {
    options: &'o Options,
    frames: Vec<Frame>,
    depth: usize,
    tracker: LimitTracker,
    update: bool,
}

impl Drop for TreeBuilder<'_> {
    fn drop(&mut self) {
        put_frames(mem::take(&mut self.frames));
    }
}

impl<'o> TreeBuilder<'o> {
    pub fn new(options: &'o Options) -> Self {
        Self {
            options,
            frames: take_frames(),
            depth: 0,
            tracker: LimitTracker::new(options.limits),
            update: false,
        }
    }

    /// Decode one complete value from the cursor.
    ///
    /// The cursor must be positioned at the value's first token; on success
    /// it is positioned just past the value's last token.
    pub fn decode(&mut self, cursor: &mut dyn TokenCursor) -> Result<Node, Error> {
        self.reset();
        let first = self.pull(cursor, "a value")?;
        self.decode_from(cursor, first)
    }

    /// Merge one decoded value into an existing tree.
    ///
    /// Only existing children of matching container kind are descended into
    /// and merged recursively; a kind mismatch or a new key inserts the
    /// freshly decoded value, and array content is always appended, never
    /// merged element-wise. On error the target is left empty.
    pub fn merge(&mut self, cursor: &mut dyn TokenCursor, target: &mut Node) -> Result<(), Error> {
        self.reset();
        let first = self.pull(cursor, "a value")?;
        let compatible = matches!(
            (&*target, &first),
            (Node::Object(_), Token::ObjectStart) | (Node::Array(_), Token::ArrayStart)
        );
        if !compatible {
            *target = self.decode_from(cursor, first)?;
            return Ok(());
        }
        self.update = true;
        let seed = mem::replace(target, Node::Null);
        *target = self.fill(cursor, seed)?;
        Ok(())
    }

    /// Counters accumulated by the most recent decode.
    pub fn report(&self) -> crate::limits::LimitReport {
        self.tracker.report()
    }

    fn reset(&mut self) {
        self.depth = 0;
        self.tracker = LimitTracker::new(self.options.limits);
        self.update = false;
    }

    fn decode_from(&mut self, cursor: &mut dyn TokenCursor, first: Token) -> Result<Node, Error> {
        let current = match first {
            Token::ObjectStart => Node::object(),
            Token::ArrayStart => Node::array(),
            Token::Null => return Ok(Node::Null),
            Token::Scalar(scalar) => return Ok(scalar_node(scalar)),
            other => return Err(Error::malformed("a value", other.describe())),
        };
        self.fill(cursor, current)
    }

    /// Main loop: `current` is an open container whose start token has been
    /// consumed; runs until its matching end token closes the outermost
    /// frame.
    fn fill(&mut self, cursor: &mut dyn TokenCursor, mut current: Node) -> Result<Node, Error> {
        loop {
            let expected = if current.is_object() {
                "field name or object end"
            } else {
                "array element or array end"
            };
            let token = self.pull(cursor, expected)?;
            match token {
                Token::ObjectEnd => {
                    if !current.is_object() {
                        return Err(self.fail(Error::malformed(expected, "object end")));
                    }
                    if let Some(done) = self.close(&mut current)? {
                        return Ok(done);
                    }
                }
                Token::ArrayEnd => {
                    if !current.is_array() {
                        return Err(self.fail(Error::malformed(expected, "array end")));
                    }
                    if let Some(done) = self.close(&mut current)? {
                        return Ok(done);
                    }
                }
                Token::FieldName(name) => {
                    if !current.is_object() {
                        return Err(self.fail(Error::malformed(expected, "field name")));
                    }
                    self.field(cursor, &mut current, name)?;
                }
                Token::ObjectStart => {
                    if !current.is_array() {
                        return Err(self.fail(Error::malformed(expected, "object start")));
                    }
                    self.descend(&mut current, None, Wanted::Object);
                }
                Token::ArrayStart => {
                    if !current.is_array() {
                        return Err(self.fail(Error::malformed(expected, "array start")));
                    }
                    self.descend(&mut current, None, Wanted::Array);
                }
                Token::Null => match &mut current {
                    Node::Array(items) => items.push(Node::Null),
                    _ => return Err(self.fail(Error::malformed(expected, "null"))),
                },
                Token::Scalar(scalar) => match &mut current {
                    Node::Array(items) => items.push(scalar_node(scalar)),
                    _ => {
                        return Err(
                            self.fail(Error::malformed(expected, scalar.type_name()))
                        );
                    }
                },
            }
        }
    }

    /// Read a field's value token and either insert a leaf or descend into a
    /// nested container remembered under `name`.
    fn field(
        &mut self,
        cursor: &mut dyn TokenCursor,
        current: &mut Node,
        name: String,
    ) -> Result<(), Error> {
        let token = self.pull(cursor, "a value for the field")?;
        match token {
            Token::ObjectStart => {
                self.descend(current, Some(name), Wanted::Object);
                Ok(())
            }
            Token::ArrayStart => {
                self.descend(current, Some(name), Wanted::Array);
                Ok(())
            }
            Token::Null => self.insert_field(current, name, Node::Null),
            Token::Scalar(scalar) => self.insert_field(current, name, scalar_node(scalar)),
            other => Err(self.fail_at(
                Error::malformed("a value for the field", other.describe()),
                Some(PathSegment::Key(name)),
            )),
        }
    }

    /// Park `current` in a frame and continue inside a child container.
    ///
    /// In update mode, an existing child of the wanted kind is pulled out of
    /// its slot (the slot keeps its position) and extended in place;
    /// otherwise the child starts empty.
    fn descend(&mut self, current: &mut Node, key: Option<String>, wanted: Wanted) {
        if self.update {
            let extracted = key
                .as_ref()
                .and_then(|name| extract_matching_child(current, name, wanted));
            if let Some(child) = extracted {
                let parent = mem::replace(current, child);
                self.push_frame(parent, key);
                return;
            }
        }
        let fresh = match wanted {
            Wanted::Object => Node::object(),
            Wanted::Array => Node::array(),
        };
        let parent = mem::replace(current, fresh);
        self.push_frame(parent, key);
    }

    /// `current` just saw its matching end token. Returns the finished tree
    /// when the outermost container closed, otherwise reattaches `current`
    /// to its parent and continues there.
    fn close(&mut self, current: &mut Node) -> Result<Option<Node>, Error> {
        let completed = mem::replace(current, Node::Null);
        if self.depth == 0 {
            return Ok(Some(completed));
        }
        let (parent, key) = self.pop_frame();
        *current = parent;
        match key {
            Some(name) => self.insert_field(current, name, completed)?,
            None => match &mut *current {
                Node::Array(items) => items.push(completed),
                _ => unreachable!("keyless frames always hold array parents"),
            },
        }
        Ok(None)
    }

    /// Insert a finished value under `name`, honoring the duplicate-key
    /// policy (plain mode) or overwriting in place (update mode).
    fn insert_field(&mut self, current: &mut Node, name: String, value: Node) -> Result<(), Error> {
        let duplicate_policy = self.options.duplicate_keys;
        let update = self.update;
        let Node::Object(fields) = current else {
            unreachable!("field insertion targets an object node");
        };
        if update {
            fields.insert(name, value);
            return Ok(());
        }
        match duplicate_policy {
            DuplicateKeyPolicy::LastWins => {
                fields.insert(name, value);
            }
            DuplicateKeyPolicy::FirstWins => {
                if !fields.contains_key(&name) {
                    fields.insert(name, value);
                }
            }
            DuplicateKeyPolicy::Error => {
                if fields.contains_key(&name) {
                    let seg = PathSegment::Key(name.clone());
                    return Err(self.fail_at(Error::duplicate_key(name), Some(seg)));
                }
                fields.insert(name, value);
            }
            DuplicateKeyPolicy::Coalesce => coalesce_field(fields, name, value),
        }
        Ok(())
    }

    fn push_frame(&mut self, node: Node, key: Option<String>) {
        if self.depth < self.frames.len() {
            let slot = &mut self.frames[self.depth];
            slot.node = node;
            slot.key = key;
        } else {
            self.frames.push(Frame { node, key });
        }
        self.depth += 1;
    }

    fn pop_frame(&mut self) -> (Node, Option<String>) {
        self.depth -= 1;
        let slot = &mut self.frames[self.depth];
        (mem::replace(&mut slot.node, Node::Null), slot.key.take())
    }

    /// Pull and account for one token.
    fn pull(&mut self, cursor: &mut dyn TokenCursor, expected: &'static str) -> Result<Token, Error> {
        let token =
            next_or_eof(cursor, expected).map_err(|err| err.with_path(self.path_here(None)))?;
        if let Err(breach) = self.tracker.observe(&token) {
            return Err(Error::limit(breach).with_path(self.path_here(None)));
        }
        Ok(token)
    }

    /// Path from the decode root down to the container currently open, with
    /// an optional extra leaf segment.
    fn path_here(&self, leaf: Option<PathSegment>) -> DecodePath {
        let mut path = DecodePath::root();
        for frame in &self.frames[..self.depth] {
            match &frame.key {
                Some(key) => path.push(PathSegment::Key(key.clone())),
                None => {
                    if let Node::Array(items) = &frame.node {
                        path.push(PathSegment::Index(items.len()));
                    }
                }
            }
        }
        if let Some(seg) = leaf {
            path.push(seg);
        }
        path
    }

    fn fail(&self, err: Error) -> Error {
        err.with_path(self.path_here(None))
    }

    fn fail_at(&self, err: Error, leaf: Option<PathSegment>) -> Error {
        err.with_path(self.path_here(leaf))
    }
}

/// Pull the child at `name` out of an object slot when its kind matches the
/// one the stream is opening. The emptied slot keeps its map position and is
/// refilled when the merged child reattaches.
fn extract_matching_child(current: &mut Node, name: &str, wanted: Wanted) -> Option<Node> {
    let Node::Object(fields) = current else {
        return None;
    };
    let existing = fields.get_mut(name)?;
    let matching = matches!(
        (&*existing, wanted),
        (Node::Object(_), Wanted::Object) | (Node::Array(_), Wanted::Array)
    );
    if matching {
        Some(mem::replace(existing, Node::Null))
    } else {
        None
    }
}

/// Second and later occurrences of a key collect into an array slot.
///
/// If the existing slot is already an array, the new value appends; anything
/// else is wrapped together with the new value into a two-element array.
fn coalesce_field(fields: &mut Fields, name: String, value: Node) {
    match fields.get_mut(&name) {
        None => {
            fields.insert(name, value);
        }
        Some(Node::Array(items)) => items.push(value),
        Some(existing) => {
            let old = mem::replace(existing, Node::Null);
            *existing = Node::Array(vec![old, value]);
        }
    }
}
