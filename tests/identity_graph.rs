//! End-to-end decoding of documents whose elements share objects by id.
//!
//! The converter used here follows a common wire convention: an object
//! `{"@ref": N}` stands for "the object with id N", and an object carrying
//! `"@id": N` defines that object. References may appear before their
//! definition; the engine restores stream order once they resolve.

use std::rc::Rc;

use graft::{
    Converted, DecodeContext, ElementConverter, Error, Node, Options, RefId, ReplayCursor, Scalar,
    Token, TokenCursor, decode_map, decode_seq,
};

struct GraphConverter;

impl ElementConverter for GraphConverter {
    type Value = Rc<Node>;

    fn convert(
        &mut self,
        cursor: &mut dyn TokenCursor,
        ctx: &mut DecodeContext<'_, Rc<Node>>,
    ) -> Result<Converted<Rc<Node>>, Error> {
        let node = graft::decode_tree_with_options(cursor, ctx.options)?;
        if let Some(fields) = node.as_object() {
            if let Some(id) = fields.get("@ref").and_then(Node::as_u64) {
                return Ok(Converted::Reference(RefId(id)));
            }
            if let Some(id) = fields.get("@id").and_then(Node::as_u64) {
                let value = Rc::new(node.clone());
                ctx.bind(RefId(id), value.clone())?;
                return Ok(Converted::Value(value));
            }
        }
        Ok(Converted::Value(Rc::new(node)))
    }

    fn supports_identity(&self) -> bool {
        true
    }
}

fn obj(entries: &[(&str, Token)]) -> Vec<Token> {
    let mut tokens = vec![Token::ObjectStart];
    for (key, value) in entries {
        tokens.push(Token::FieldName((*key).to_string()));
        tokens.push(value.clone());
    }
    tokens.push(Token::ObjectEnd);
    tokens
}

#[test]
fn forward_reference_resolves_in_stream_order() {
    // [<ref 2>, "a", <id 2>, "b"]
    let mut tokens = vec![Token::ArrayStart];
    tokens.extend(obj(&[("@ref", Token::Scalar(Scalar::UInt(2)))]));
    tokens.push(Token::Scalar(Scalar::Text("a".into())));
    tokens.extend(obj(&[
        ("@id", Token::Scalar(Scalar::UInt(2))),
        ("name", Token::Scalar(Scalar::Text("shared".into()))),
    ]));
    tokens.push(Token::Scalar(Scalar::Text("b".into())));
    tokens.push(Token::ArrayEnd);

    let options = Options::default();
    let mut ctx = DecodeContext::new(&options);
    let mut cursor = ReplayCursor::new(tokens);
    let out = decode_seq(&mut cursor, &mut GraphConverter, &mut ctx, None).unwrap();

    assert_eq!(out.len(), 4);
    assert_eq!(out[1].as_str(), Some("a"));
    assert_eq!(out[3].as_str(), Some("b"));
    // Positions 0 and 2 are the same shared object.
    assert!(Rc::ptr_eq(&out[0], &out[2]));
    assert_eq!(
        out[0].get("name").and_then(Node::as_str),
        Some("shared")
    );
    assert!(cursor.is_exhausted());
}

#[test]
fn backward_reference_resolves_immediately() {
    let mut tokens = vec![Token::ArrayStart];
    tokens.extend(obj(&[("@id", Token::Scalar(Scalar::UInt(1)))]));
    tokens.extend(obj(&[("@ref", Token::Scalar(Scalar::UInt(1)))]));
    tokens.push(Token::ArrayEnd);

    let options = Options::default();
    let mut ctx = DecodeContext::new(&options);
    let mut cursor = ReplayCursor::new(tokens);
    let out = decode_seq(&mut cursor, &mut GraphConverter, &mut ctx, None).unwrap();
    assert_eq!(out.len(), 2);
    assert!(Rc::ptr_eq(&out[0], &out[1]));
}

#[test]
fn several_forward_references_to_one_object() {
    let mut tokens = vec![Token::ArrayStart];
    tokens.extend(obj(&[("@ref", Token::Scalar(Scalar::UInt(5)))]));
    tokens.extend(obj(&[("@ref", Token::Scalar(Scalar::UInt(5)))]));
    tokens.extend(obj(&[("@id", Token::Scalar(Scalar::UInt(5)))]));
    tokens.push(Token::ArrayEnd);

    let options = Options::default();
    let mut ctx = DecodeContext::new(&options);
    let mut cursor = ReplayCursor::new(tokens);
    let out = decode_seq(&mut cursor, &mut GraphConverter, &mut ctx, None).unwrap();
    assert_eq!(out.len(), 3);
    assert!(Rc::ptr_eq(&out[0], &out[1]));
    assert!(Rc::ptr_eq(&out[1], &out[2]));
}

#[test]
fn dangling_reference_fails_with_partial_container() {
    let mut tokens = vec![Token::ArrayStart];
    tokens.push(Token::Scalar(Scalar::Text("kept".into())));
    tokens.extend(obj(&[("@ref", Token::Scalar(Scalar::UInt(404)))]));
    tokens.push(Token::Scalar(Scalar::Text("bucketed".into())));
    tokens.push(Token::ArrayEnd);

    let options = Options::default();
    let mut ctx = DecodeContext::new(&options);
    let mut cursor = ReplayCursor::new(tokens);
    let err = decode_seq(&mut cursor, &mut GraphConverter, &mut ctx, None).unwrap_err();
    assert_eq!(
        err.source.to_string(),
        "unresolved forward references: [404]"
    );
    // The partial container holds what was actually constructed.
    let texts: Vec<&str> = err.partial.iter().filter_map(|n| n.as_str()).collect();
    assert_eq!(texts, ["kept", "bucketed"]);
}

#[test]
fn keyed_container_shares_objects_too() {
    let mut tokens = vec![Token::ObjectStart];
    tokens.push(Token::FieldName("early".into()));
    tokens.extend(obj(&[("@ref", Token::Scalar(Scalar::UInt(3)))]));
    tokens.push(Token::FieldName("definition".into()));
    tokens.extend(obj(&[
        ("@id", Token::Scalar(Scalar::UInt(3))),
        ("kind", Token::Scalar(Scalar::Text("node".into()))),
    ]));
    tokens.push(Token::ObjectEnd);

    let options = Options::default();
    let mut ctx = DecodeContext::new(&options);
    let mut cursor = ReplayCursor::new(tokens);
    let out = decode_map(&mut cursor, &mut GraphConverter, &mut ctx, None).unwrap();

    let keys: Vec<&str> = out.keys().map(String::as_str).collect();
    assert_eq!(keys, ["early", "definition"]);
    assert!(Rc::ptr_eq(&out["early"], &out["definition"]));
}

#[test]
fn duplicate_identity_definition_is_an_input_error() {
    let mut tokens = vec![Token::ArrayStart];
    tokens.extend(obj(&[("@id", Token::Scalar(Scalar::UInt(1)))]));
    tokens.extend(obj(&[("@id", Token::Scalar(Scalar::UInt(1)))]));
    tokens.push(Token::ArrayEnd);

    let options = Options::default();
    let mut ctx = DecodeContext::new(&options);
    let mut cursor = ReplayCursor::new(tokens);
    let err = decode_seq(&mut cursor, &mut GraphConverter, &mut ctx, None).unwrap_err();
    assert!(
        err.source
            .to_string()
            .contains("defined more than once")
    );
    // The failing element is the second definition.
    assert_eq!(err.index, 1);
}
