//! Dynamically-typed tree values assembled without a statically known target.
//!
//! A [`Node`] is the untyped output of a decode: scalars at the leaves,
//! insertion-ordered objects and arrays inside. The tree itself is always
//! acyclic; values shared by reference id are handled a layer above, in the
//! ledgers, and enter trees only as [`Opaque`] leaves if the caller wants
//! them embedded.

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

use crate::tokens::{Scalar, Token};

/// Insertion-ordered field map of an object node.
pub type Fields = IndexMap<String, Node, ahash::RandomState>;

/// Numeric scalar payload.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Number {
    Int(i64),
    UInt(u64),
    Float(f64),
}

impl Number {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Number::Int(i) => Some(*i),
            Number::UInt(u) => num_traits::cast(*u),
            Number::Float(f) => {
                let i = *f as i64;
                if i as f64 == *f { Some(i) } else { None }
            }
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Number::Int(i) => num_traits::cast(*i),
            Number::UInt(u) => Some(*u),
            Number::Float(f) => {
                if *f >= 0.0 {
                    let u = *f as u64;
                    if u as f64 == *f { Some(u) } else { None }
                } else {
                    None
                }
            }
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Number::Int(i) => Some(*i as f64),
            Number::UInt(u) => Some(*u as f64),
            Number::Float(f) => Some(*f),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(i) => write!(f, "{i}"),
            Number::UInt(u) => write!(f, "{u}"),
            Number::Float(x) => write!(f, "{x}"),
        }
    }
}

/// A value decoded outside the engine, carried through as a leaf.
///
/// Behaves like a shared handle: clones point at the same payload, and
/// equality is pointer identity, which is what makes shared leaves
/// observable after a decode.
#[derive(Clone)]
pub struct Opaque(Rc<dyn Any>);

impl Opaque {
    pub fn new<T: Any>(value: T) -> Self {
        Opaque(Rc::new(value))
    }

    /// Borrow the payload if it is a `T`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl PartialEq for Opaque {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
impl Eq for Opaque {}

impl fmt::Debug for Opaque {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opaque({:p})", Rc::as_ptr(&self.0))
    }
}

/// One dynamically-typed value: a scalar leaf, an array, or an object with
/// insertion-ordered keys.
#[derive(Clone, Debug, PartialEq)]
pub enum Node {
    Null,
    Bool(bool),
    Number(Number),
    Text(String),
    Binary(Vec<u8>),
    Opaque(Opaque),
    Array(Vec<Node>),
    Object(Fields),
}

impl Node {
    /// An empty object node.
    pub fn object() -> Self {
        Node::Object(Fields::default())
    }

    /// An empty array node.
    pub fn array() -> Self {
        Node::Array(Vec::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Node::Null)
    }

    pub fn is_object(&self) -> bool {
        matches!(self, Node::Object(_))
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Node::Array(_))
    }

    pub fn as_object(&self) -> Option<&Fields> {
        match self {
            Node::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut Fields> {
        match self {
            Node::Object(fields) => Some(fields),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Node]> {
        match self {
            Node::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_array_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Node::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Node::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Node::Number(n) => n.as_i64(),
            _ => None,
        }
    }

    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Node::Number(n) => n.as_u64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Node::Number(n) => n.as_f64(),
            _ => None,
        }
    }

    /// Field lookup on object nodes; `None` elsewhere.
    pub fn get(&self, key: &str) -> Option<&Node> {
        self.as_object().and_then(|fields| fields.get(key))
    }

    /// Element lookup on array nodes; `None` elsewhere.
    pub fn at(&self, index: usize) -> Option<&Node> {
        self.as_array().and_then(|items| items.get(index))
    }

    /// Short human phrase naming the node kind, for error messages.
    pub fn describe(&self) -> &'static str {
        match self {
            Node::Null => "null",
            Node::Bool(_) => "boolean",
            Node::Number(_) => "number",
            Node::Text(_) => "text",
            Node::Binary(_) => "binary",
            Node::Opaque(_) => "opaque value",
            Node::Array(_) => "array",
            Node::Object(_) => "object",
        }
    }

    /// Re-emit this tree as the token event stream that would decode back
    /// into it. Walks with an explicit stack, so arbitrarily deep trees are
    /// safe.
    pub fn to_tokens(&self) -> Vec<Token> {
        enum EmitFrame<'a> {
            Array(std::slice::Iter<'a, Node>),
            Object(indexmap::map::Iter<'a, String, Node>),
        }

        let mut out = Vec::new();
        let mut stack: Vec<EmitFrame<'_>> = Vec::new();
        let mut pending: Option<&Node> = Some(self);
        loop {
            if let Some(node) = pending.take() {
                match node {
                    Node::Array(items) => {
                        out.push(Token::ArrayStart);
                        stack.push(EmitFrame::Array(items.iter()));
                    }
                    Node::Object(fields) => {
                        out.push(Token::ObjectStart);
                        stack.push(EmitFrame::Object(fields.iter()));
                    }
                    leaf => out.push(leaf_token(leaf)),
                }
                continue;
            }
            match stack.last_mut() {
                None => break,
                Some(EmitFrame::Array(items)) => match items.next() {
                    Some(child) => pending = Some(child),
                    None => {
                        out.push(Token::ArrayEnd);
                        stack.pop();
                    }
                },
                Some(EmitFrame::Object(fields)) => match fields.next() {
                    Some((key, child)) => {
                        out.push(Token::FieldName(key.clone()));
                        pending = Some(child);
                    }
                    None => {
                        out.push(Token::ObjectEnd);
                        stack.pop();
                    }
                },
            }
        }
        out
    }
}

/// Token for a leaf node. Containers are handled by the emit loop.
fn leaf_token(node: &Node) -> Token {
    match node {
        Node::Null => Token::Null,
        Node::Bool(b) => Token::Scalar(Scalar::Bool(*b)),
        Node::Number(Number::Int(i)) => Token::Scalar(Scalar::Int(*i)),
        Node::Number(Number::UInt(u)) => Token::Scalar(Scalar::UInt(*u)),
        Node::Number(Number::Float(f)) => Token::Scalar(Scalar::Float(*f)),
        Node::Text(text) => Token::Scalar(Scalar::Text(text.clone())),
        Node::Binary(data) => Token::Scalar(Scalar::Binary(data.clone())),
        Node::Opaque(opaque) => Token::Scalar(Scalar::Opaque(opaque.clone())),
        Node::Array(_) | Node::Object(_) => unreachable!("containers are emitted by the walk"),
    }
}

/// Build a leaf node from a scalar token payload.
pub(crate) fn scalar_node(scalar: Scalar) -> Node {
    match scalar {
        Scalar::Text(text) => Node::Text(text),
        Scalar::Bool(b) => Node::Bool(b),
        Scalar::Int(i) => Node::Number(Number::Int(i)),
        Scalar::UInt(u) => Node::Number(Number::UInt(u)),
        Scalar::Float(f) => Node::Number(Number::Float(f)),
        Scalar::Binary(data) => Node::Binary(data),
        Scalar::Opaque(opaque) => Node::Opaque(opaque),
    }
}

impl Serialize for Node {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Node::Null => serializer.serialize_unit(),
            Node::Bool(b) => serializer.serialize_bool(*b),
            Node::Number(Number::Int(i)) => serializer.serialize_i64(*i),
            Node::Number(Number::UInt(u)) => serializer.serialize_u64(*u),
            Node::Number(Number::Float(f)) => serializer.serialize_f64(*f),
            Node::Text(text) => serializer.serialize_str(text),
            Node::Binary(data) => serializer.serialize_bytes(data),
            Node::Opaque(_) => Err(serde::ser::Error::custom(
                "opaque values cannot be serialized",
            )),
            Node::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Node::Object(fields) => {
                let mut map = serializer.serialize_map(Some(fields.len()))?;
                for (key, value) in fields {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
        }
    }
}
