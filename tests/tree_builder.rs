use graft::{
    DuplicateKeyPolicy, Node, Number, Opaque, ReplayCursor, Scalar, Token, decode_tree,
    decode_tree_with_options,
};

fn obj_tokens() -> Vec<Token> {
    vec![
        Token::ObjectStart,
        Token::FieldName("name".into()),
        Token::Scalar(Scalar::Text("John".into())),
        Token::FieldName("age".into()),
        Token::Scalar(Scalar::Int(80)),
        Token::FieldName("details".into()),
        Token::ObjectStart,
        Token::FieldName("city".into()),
        Token::Scalar(Scalar::Text("Paris".into())),
        Token::ObjectEnd,
        Token::ObjectEnd,
    ]
}

#[test]
fn simple_nested_object() {
    let mut cursor = ReplayCursor::new(obj_tokens());
    let tree = decode_tree(&mut cursor).unwrap();
    assert_eq!(tree.get("name").and_then(Node::as_str), Some("John"));
    assert_eq!(tree.get("age").and_then(Node::as_i64), Some(80));
    assert_eq!(
        tree.get("details").and_then(|d| d.get("city")).and_then(Node::as_str),
        Some("Paris")
    );
    assert!(cursor.is_exhausted());
}

#[test]
fn arrays_nest_inside_objects() {
    let mut cursor = ReplayCursor::new(vec![
        Token::ObjectStart,
        Token::FieldName("seq".into()),
        Token::ArrayStart,
        Token::ArrayStart,
        Token::Scalar(Scalar::Int(1)),
        Token::Scalar(Scalar::Int(2)),
        Token::ArrayEnd,
        Token::Null,
        Token::ArrayEnd,
        Token::ObjectEnd,
    ]);
    let tree = decode_tree(&mut cursor).unwrap();
    let seq = tree.get("seq").and_then(Node::as_array).unwrap();
    assert_eq!(seq.len(), 2);
    assert_eq!(seq[0].as_array().map(<[Node]>::len), Some(2));
    assert!(seq[1].is_null());
}

#[test]
fn key_insertion_order_is_preserved() {
    let mut cursor = ReplayCursor::new(vec![
        Token::ObjectStart,
        Token::FieldName("zulu".into()),
        Token::Scalar(Scalar::Int(1)),
        Token::FieldName("alpha".into()),
        Token::Scalar(Scalar::Int(2)),
        Token::FieldName("mike".into()),
        Token::Scalar(Scalar::Int(3)),
        Token::ObjectEnd,
    ]);
    let tree = decode_tree(&mut cursor).unwrap();
    let keys: Vec<&str> = tree
        .as_object()
        .unwrap()
        .keys()
        .map(String::as_str)
        .collect();
    assert_eq!(keys, ["zulu", "alpha", "mike"]);
}

fn duplicate_tokens() -> Vec<Token> {
    vec![
        Token::ObjectStart,
        Token::FieldName("x".into()),
        Token::Scalar(Scalar::Int(1)),
        Token::FieldName("x".into()),
        Token::Scalar(Scalar::Int(2)),
        Token::ObjectEnd,
    ]
}

fn decode_with_policy(policy: DuplicateKeyPolicy) -> Result<Node, graft::Error> {
    let options = graft::options! { duplicate_keys: policy };
    let mut cursor = ReplayCursor::new(duplicate_tokens());
    decode_tree_with_options(&mut cursor, &options)
}

#[test]
fn duplicate_keys_last_wins() {
    let tree = decode_with_policy(DuplicateKeyPolicy::LastWins).unwrap();
    assert_eq!(tree.get("x").and_then(Node::as_i64), Some(2));
    assert_eq!(tree.as_object().unwrap().len(), 1);
}

#[test]
fn duplicate_keys_first_wins() {
    let tree = decode_with_policy(DuplicateKeyPolicy::FirstWins).unwrap();
    assert_eq!(tree.get("x").and_then(Node::as_i64), Some(1));
}

#[test]
fn duplicate_keys_error_cites_the_key() {
    let err = decode_with_policy(DuplicateKeyPolicy::Error).unwrap_err();
    assert_eq!(err.to_string(), "duplicate key: x at x");
}

#[test]
fn duplicate_keys_coalesce_into_array() {
    let tree = decode_with_policy(DuplicateKeyPolicy::Coalesce).unwrap();
    let coalesced = tree.get("x").and_then(Node::as_array).unwrap();
    assert_eq!(coalesced.len(), 2);
    assert_eq!(coalesced[0].as_i64(), Some(1));
    assert_eq!(coalesced[1].as_i64(), Some(2));
}

#[test]
fn duplicate_keys_coalesce_three_occurrences() {
    let options = graft::options! { duplicate_keys: DuplicateKeyPolicy::Coalesce };
    let mut cursor = ReplayCursor::new(vec![
        Token::ObjectStart,
        Token::FieldName("x".into()),
        Token::Scalar(Scalar::Int(1)),
        Token::FieldName("x".into()),
        Token::Scalar(Scalar::Int(2)),
        Token::FieldName("x".into()),
        Token::Scalar(Scalar::Int(3)),
        Token::ObjectEnd,
    ]);
    let tree = decode_tree_with_options(&mut cursor, &options).unwrap();
    let coalesced = tree.get("x").and_then(Node::as_array).unwrap();
    let values: Vec<i64> = coalesced.iter().filter_map(Node::as_i64).collect();
    assert_eq!(values, [1, 2, 3]);
}

#[test]
fn duplicate_container_values_follow_policy_too() {
    let options = graft::options! { duplicate_keys: DuplicateKeyPolicy::FirstWins };
    let mut cursor = ReplayCursor::new(vec![
        Token::ObjectStart,
        Token::FieldName("cfg".into()),
        Token::ObjectStart,
        Token::FieldName("a".into()),
        Token::Scalar(Scalar::Int(1)),
        Token::ObjectEnd,
        Token::FieldName("cfg".into()),
        Token::ObjectStart,
        Token::FieldName("b".into()),
        Token::Scalar(Scalar::Int(2)),
        Token::ObjectEnd,
        Token::ObjectEnd,
    ]);
    let tree = decode_tree_with_options(&mut cursor, &options).unwrap();
    let cfg = tree.get("cfg").unwrap();
    assert!(cfg.get("a").is_some());
    assert!(cfg.get("b").is_none());
}

#[test]
fn opaque_scalars_become_leaves() {
    #[derive(Debug, PartialEq)]
    struct Blob(Vec<u8>);

    let payload = Opaque::new(Blob(vec![1, 2, 3]));
    let mut cursor = ReplayCursor::new(vec![
        Token::ArrayStart,
        Token::Scalar(Scalar::Opaque(payload.clone())),
        Token::Scalar(Scalar::Int(9)),
        Token::ArrayEnd,
    ]);
    let tree = decode_tree(&mut cursor).unwrap();
    match tree.at(0) {
        Some(Node::Opaque(leaf)) => {
            assert_eq!(leaf.downcast_ref::<Blob>(), Some(&Blob(vec![1, 2, 3])));
            assert_eq!(leaf, &payload);
        }
        other => panic!("expected opaque leaf, got {other:?}"),
    }
    assert_eq!(tree.at(1).and_then(Node::as_i64), Some(9));
}

#[test]
fn top_level_scalars_decode_directly() {
    let mut cursor = ReplayCursor::new(vec![Token::Scalar(Scalar::Float(2.5))]);
    assert_eq!(
        decode_tree(&mut cursor).unwrap(),
        Node::Number(Number::Float(2.5))
    );
    let mut cursor = ReplayCursor::new(vec![Token::Null]);
    assert!(decode_tree(&mut cursor).unwrap().is_null());
    let mut cursor = ReplayCursor::new(vec![Token::Scalar(Scalar::Binary(vec![7, 8]))]);
    assert_eq!(decode_tree(&mut cursor).unwrap(), Node::Binary(vec![7, 8]));
}

#[test]
fn field_name_inside_array_is_malformed() {
    let mut cursor = ReplayCursor::new(vec![
        Token::ArrayStart,
        Token::FieldName("bad".into()),
        Token::ArrayEnd,
    ]);
    let err = decode_tree(&mut cursor).unwrap_err();
    assert!(err.to_string().contains("found field name"));
}

#[test]
fn truncated_stream_reports_eof_with_path() {
    let mut cursor = ReplayCursor::new(vec![
        Token::ObjectStart,
        Token::FieldName("outer".into()),
        Token::ArrayStart,
        Token::Scalar(Scalar::Int(1)),
    ]);
    let err = decode_tree(&mut cursor).unwrap_err();
    assert_eq!(
        err.to_string(),
        "unexpected end of input: expected array element or array end at outer"
    );
}

#[test]
fn end_token_with_no_start_is_rejected() {
    let mut cursor = ReplayCursor::new(vec![Token::ObjectEnd]);
    let err = decode_tree(&mut cursor).unwrap_err();
    assert!(err.to_string().contains("expected a value"));
}
