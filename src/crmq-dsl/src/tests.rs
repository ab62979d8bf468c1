//! Tests for the search DSL parser
//!
//! These tests drive whole documents through [`SearchDslParser`] and check
//! the resulting AST, control values and error codes.

use super::*;
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

fn registry() -> FieldRegistry {
    FieldRegistry::builder()
        .field("name", FieldType::String)
        .field("email", FieldType::String)
        .field_with_operators("status", FieldType::String, ["EQ", "NEQ", "IN", "NIN"])
        .field("age", FieldType::Number)
        .field("createdAt", FieldType::Date)
        .field("isActive", FieldType::Boolean)
        .build()
        .expect("test registry is valid")
}

fn parse_success(input: Value) -> ParsedQuery {
    let registry = registry();
    parse_search_dsl(&input, &registry)
        .unwrap_or_else(|e| panic!("Failed to parse {}: {}", input, format_error(&e).human))
}

fn parse_failure(input: Value) -> SearchDslError {
    let registry = registry();
    match parse_search_dsl(&input, &registry) {
        Ok(parsed) => panic!(
            "Expected parse failure for: {}, but got: {:?}",
            input, parsed
        ),
        Err(e) => e,
    }
}

fn clause(op: Operator, value: Value) -> OpClause {
    OpClause::new(op, value)
}

#[test]
fn test_single_field() {
    let parsed = parse_success(json!({"name": {"EQ": "a"}}));
    assert_eq!(
        parsed.root,
        Node::field("name", vec![clause(Operator::Eq, json!("a"))])
    );
    assert_eq!(
        serde_json::to_value(&parsed.root).unwrap(),
        json!({"kind": "field", "field": "name", "ops": [{"op": "EQ", "value": "a"}]})
    );
    assert!(parsed.control.order.is_empty());
    assert_eq!(parsed.control.limit, None);
    assert_eq!(parsed.control.offset, None);
}

#[test]
fn test_and_of_two_fields() {
    let registry = FieldRegistry::builder()
        .field("a", FieldType::Number)
        .field("b", FieldType::Number)
        .build()
        .unwrap();
    let parsed = parse_search_dsl(&json!({"AND": [{"a": {"EQ": 1}}, {"b": {"EQ": 2}}]}), &registry)
        .unwrap();
    assert_eq!(parsed.root.kind(), "and");
    assert!(matches!(parsed.root, Node::And { ref items } if items.len() == 2));
}

#[test]
fn test_or_preserves_order() {
    let parsed = parse_success(json!({
        "OR": [
            {"email": {"LIKE": "%@example.com"}},
            {"name": {"EQ": "Ann"}},
            {"age": {"GTE": 21}}
        ]
    }));
    assert_eq!(parsed.root.referenced_fields(), vec!["email", "name", "age"]);
}

#[test]
fn test_not_wraps_single_fragment() {
    let parsed = parse_success(json!({"NOT": {"isActive": {"EQ": true}}}));
    assert_eq!(
        parsed.root,
        Node::Not {
            item: Box::new(Node::field(
                "isActive",
                vec![clause(Operator::Eq, json!(true))]
            ))
        }
    );
}

#[test]
fn test_not_rejects_array() {
    let err = parse_failure(json!({"NOT": [{"age": {"EQ": 1}}]}));
    assert_eq!(err.code, ErrorCode::NotArray);
    assert_eq!(err.path.unwrap().to_string(), "$.NOT");
}

#[test]
fn test_multiple_operators_on_one_field() {
    let parsed = parse_success(json!({"age": {"GTE": 18, "LT": 65, "NIN": [30, 40]}}));
    assert_eq!(
        parsed.root,
        Node::field(
            "age",
            vec![
                clause(Operator::Gte, json!(18)),
                clause(Operator::Lt, json!(65)),
                clause(Operator::Nin, json!([30, 40])),
            ]
        )
    );
}

#[test]
fn test_field_local_and_normalises_dates() {
    let parsed = parse_success(json!({
        "createdAt": {"AND": [{"AFTER": "2024-01-01"}, {"BEFORE": "2024-02-01T00:00:00Z"}]}
    }));
    assert_eq!(
        parsed.root,
        Node::And {
            items: vec![
                Node::field(
                    "createdAt",
                    vec![clause(Operator::After, json!("2024-01-01T00:00:00.000Z"))]
                ),
                Node::field(
                    "createdAt",
                    vec![clause(Operator::Before, json!("2024-02-01T00:00:00.000Z"))]
                ),
            ]
        }
    );
    if let Node::And { items } = &parsed.root {
        for item in items {
            let Node::Field(field) = item else {
                panic!("expected field node, got {:?}", item);
            };
            assert_eq!(field.ops.len(), 1);
            assert!(field.ops[0].value.as_str().unwrap().ends_with('Z'));
        }
    }
}

#[test]
fn test_field_local_or() {
    let parsed = parse_success(json!({"age": {"OR": [{"LT": 18}, {"GT": 65}]}}));
    assert!(matches!(parsed.root, Node::Or { ref items } if items.len() == 2));
}

#[test]
fn test_field_local_and_takes_precedence() {
    let parsed = parse_success(json!({
        "age": {"EQ": "ignored", "AND": [{"GT": 1}], "OR": [{"LT": 0}]}
    }));
    assert_eq!(
        parsed.root,
        Node::And {
            items: vec![Node::field("age", vec![clause(Operator::Gt, json!(1))])]
        }
    );
}

#[test]
fn test_field_local_errors() {
    let err = parse_failure(json!({"age": {"AND": []}}));
    assert_eq!(err.code, ErrorCode::FieldLogicalArrayRequired);
    assert_eq!(err.message, "AND inside field 'age' must be a non-empty array");
    assert_eq!(err.path.unwrap().to_string(), "$.age.AND");

    let err = parse_failure(json!({"age": {"OR": [5]}}));
    assert_eq!(err.code, ErrorCode::FieldOperatorClauseInvalid);
    assert_eq!(err.detail.as_deref(), Some("Expected object, got number"));
    assert_eq!(err.path.unwrap().to_string(), "$.age.OR.0");

    let err = parse_failure(json!({"age": {"AND": [{"GT": 1, "LT": 3}]}}));
    assert_eq!(err.code, ErrorCode::FieldOperatorClauseShape);

    let err = parse_failure(json!({"age": {"AND": [{}]}}));
    assert_eq!(err.code, ErrorCode::FieldOperatorClauseShape);

    let err = parse_failure(json!({"age": {"AND": [{"LIKE": "1%"}]}}));
    assert_eq!(err.code, ErrorCode::OperatorNotAllowed);
    assert_eq!(err.path.unwrap().to_string(), "$.age.AND.0.LIKE");

    let err = parse_failure(json!({"createdAt": {"AND": [{"AFTER": "soon"}]}}));
    assert_eq!(err.code, ErrorCode::OperatorValueInvalid);
    assert_eq!(err.detail.as_deref(), Some("Invalid date string"));
}

#[test]
fn test_number_operand_rejects_string() {
    let err = parse_failure(json!({"age": {"GT": "18"}}));
    assert_eq!(err.code, ErrorCode::OperatorValueInvalid);
    assert_eq!(err.detail.as_deref(), Some("Expected a number"));
    assert_eq!(err.context.field.as_deref(), Some("age"));
    assert_eq!(err.context.field_type, Some(FieldType::Number));
    assert_eq!(err.context.operator, Some(Operator::Gt));
}

#[test]
fn test_unknown_field_lists_allowed_fields() {
    let err = parse_failure(json!({"unknownField": {"EQ": "x"}}));
    assert_eq!(err.code, ErrorCode::UnknownField);
    assert_eq!(
        err.context.allowed_fields,
        Some(vec![
            "name".to_string(),
            "email".to_string(),
            "status".to_string(),
            "age".to_string(),
            "createdAt".to_string(),
            "isActive".to_string(),
        ])
    );
}

#[test]
fn test_empty_in_list() {
    let err = parse_failure(json!({"status": {"IN": []}}));
    assert_eq!(err.code, ErrorCode::OperatorValueInvalid);
    assert_eq!(err.detail.as_deref(), Some("Array must be non-empty"));
}

#[test]
fn test_operator_override_restricts_field() {
    let err = parse_failure(json!({"status": {"LIKE": "act%"}}));
    assert_eq!(err.code, ErrorCode::OperatorNotAllowed);
    assert_eq!(err.detail.as_deref(), Some("Allowed operators: EQ, NEQ, IN, NIN"));
    assert_eq!(
        err.context.allowed_operators,
        Some(vec![Operator::Eq, Operator::Neq, Operator::In, Operator::Nin])
    );
    assert_eq!(
        err.message,
        "Operator 'LIKE' not allowed for field 'status' (string)"
    );
}

#[test]
fn test_custom_operator_from_override() {
    let registry = FieldRegistry::builder()
        .field_with_operators("score", FieldType::Number, ["EQ", "BETWEEN"])
        .build()
        .unwrap();
    let parsed = parse_search_dsl(&json!({"score": {"BETWEEN": 4}}), &registry).unwrap();
    assert_eq!(
        parsed.root,
        Node::field(
            "score",
            vec![clause(Operator::Custom("BETWEEN".to_string()), json!(4))]
        )
    );
}

#[test]
fn test_field_expects_object() {
    let err = parse_failure(json!({"name": "Ann"}));
    assert_eq!(err.code, ErrorCode::FieldExpectedObject);
    assert_eq!(err.detail.as_deref(), Some("Expected operator object, got string"));

    let err = parse_failure(json!({"name": ["Ann"]}));
    assert_eq!(err.detail.as_deref(), Some("Expected operator object, got array"));
}

#[test]
fn test_field_without_operators() {
    let err = parse_failure(json!({"name": {}}));
    assert_eq!(err.code, ErrorCode::FieldNoOperators);
    assert_eq!(err.detail.as_deref(), Some("Operator object was empty"));
}

#[test]
fn test_invalid_fragments() {
    let err = parse_failure(json!([{"name": {"EQ": "a"}}]));
    assert_eq!(err.code, ErrorCode::InvalidFragment);
    assert_eq!(err.detail.as_deref(), Some("Expected object, got array"));
    assert!(err.path.unwrap().is_root());

    let err = parse_failure(json!({"AND": [{"name": {"EQ": "a"}}, null]}));
    assert_eq!(err.code, ErrorCode::InvalidFragment);
    assert_eq!(err.path.unwrap().to_string(), "$.AND.1");
}

#[test]
fn test_fragment_shape() {
    let err = parse_failure(json!({}));
    assert_eq!(err.code, ErrorCode::InvalidFragmentShape);

    let err = parse_failure(json!({"name": {"EQ": "a"}, "age": {"EQ": 1}}));
    assert_eq!(err.code, ErrorCode::InvalidFragmentShape);

    let err = parse_failure(json!({"LIMIT": 5}));
    assert_eq!(err.code, ErrorCode::InvalidFragmentShape);
}

#[test]
fn test_logical_requires_non_empty_array() {
    let err = parse_failure(json!({"AND": []}));
    assert_eq!(err.code, ErrorCode::LogicalArrayRequired);
    assert_eq!(err.message, "AND must be a non-empty array");

    let err = parse_failure(json!({"OR": {"name": {"EQ": "a"}}}));
    assert_eq!(err.code, ErrorCode::LogicalArrayRequired);
    assert_eq!(err.path.unwrap().to_string(), "$.OR");
}

#[test]
fn test_root_control_keys() {
    let parsed = parse_success(json!({
        "name": {"LIKE": "A%"},
        "ORDER": [{"createdAt": "DESC"}, {"name": "ASC"}],
        "LIMIT": 20,
        "OFFSET": 40
    }));
    assert_eq!(
        parsed.control,
        Control {
            order: vec![
                OrderItem::new("createdAt", Direction::Desc),
                OrderItem::new("name", Direction::Asc),
            ],
            limit: Some(20),
            offset: Some(40),
        }
    );
}

#[test]
fn test_order_fields_are_not_checked_against_registry() {
    let parsed = parse_success(json!({"name": {"EQ": "a"}, "ORDER": {"notInRegistry": "ASC"}}));
    assert_eq!(
        parsed.control.order,
        vec![OrderItem::new("notInRegistry", Direction::Asc)]
    );
}

#[test]
fn test_invalid_control_keys_collects_issues() {
    let err = parse_failure(json!({
        "name": {"EQ": "a"},
        "ORDER": {"name": "sideways"},
        "LIMIT": -3
    }));
    assert_eq!(err.code, ErrorCode::InvalidControlKeys);
    let paths: Vec<String> = err
        .issues()
        .iter()
        .map(|issue| issue.path.to_string())
        .collect();
    assert_eq!(paths, vec!["$.ORDER.name", "$.LIMIT"]);
    assert_eq!(
        err.detail.as_deref(),
        Some("Invalid enum value. Expected 'ASC' | 'DESC', received 'sideways'")
    );
}

#[test]
fn test_nested_control_keys_are_validated() {
    let err = parse_failure(json!({"NOT": {"name": {"EQ": "a"}, "LIMIT": 0}}));
    assert_eq!(err.code, ErrorCode::InvalidControlKeys);
    assert_eq!(err.issues()[0].path.to_string(), "$.NOT.LIMIT");
}

#[test]
fn test_nested_control_keys_are_ignored_by_default() {
    let parsed = parse_success(json!({
        "AND": [{"name": {"EQ": "a"}, "LIMIT": 5, "ORDER": {"name": "ASC"}}]
    }));
    assert_eq!(parsed.control, Control::default());
}

#[test]
fn test_nested_control_keys_can_be_rejected() {
    let registry = registry();
    let parser = SearchDslParser::with_options(
        &registry,
        ParserOptions {
            nested_control: NestedControl::Reject,
            ..ParserOptions::default()
        },
    );

    let err = parser
        .parse(&json!({"AND": [{"name": {"EQ": "a"}, "OFFSET": 5}]}))
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidControlKeys);
    assert_eq!(err.issues()[0].path.to_string(), "$.AND.0.OFFSET");
    assert_eq!(err.issues()[0].message, "Control keys are only allowed at the root");

    // root-level control keys remain fine
    let parsed = parser
        .parse(&json!({"name": {"EQ": "a"}, "OFFSET": 5}))
        .unwrap();
    assert_eq!(parsed.control.offset, Some(5));
}

#[test]
fn test_max_depth() {
    let registry = registry();
    let parser = SearchDslParser::with_options(
        &registry,
        ParserOptions {
            max_depth: 3,
            ..ParserOptions::default()
        },
    );

    let ok = json!({"NOT": {"NOT": {"name": {"EQ": "a"}}}});
    assert!(parser.parse(&ok).is_ok());

    let too_deep = json!({"NOT": {"NOT": {"NOT": {"name": {"EQ": "a"}}}}});
    let err = parser.parse(&too_deep).unwrap_err();
    assert_eq!(err.code, ErrorCode::MaxDepthExceeded);
    assert_eq!(err.path.unwrap().to_string(), "$.NOT.NOT.NOT");
    assert_eq!(err.context.max_depth, Some(3));
}

#[test]
fn test_default_depth_stops_adversarial_nesting() {
    let mut doc = json!({"name": {"EQ": "a"}});
    for _ in 0..200 {
        doc = json!({ "NOT": doc });
    }
    let err = parse_failure(doc);
    assert_eq!(err.code, ErrorCode::MaxDepthExceeded);
}

#[test]
fn test_parse_str() {
    let registry = registry();
    let parsed = parse_search_dsl_str(r#"{"isActive": {"NEQ": false}}"#, &registry).unwrap();
    assert_eq!(
        parsed.root,
        Node::field("isActive", vec![clause(Operator::Neq, json!(false))])
    );

    let err = parse_search_dsl_str("{not json", &registry).unwrap_err();
    assert_eq!(err.code, ErrorCode::InvalidJson);
    assert_eq!(err.message, "searchDsl must be valid JSON");
    assert!(err.detail.is_some());
    assert!(err.path.is_none());
}

#[test]
fn test_meta_echoes_registry_order() {
    let parsed = parse_success(json!({"name": {"EQ": "a"}}));
    assert_eq!(
        parsed.meta.allowed_fields,
        vec!["name", "email", "status", "age", "createdAt", "isActive"]
    );
}

#[test]
fn test_nested_error_paths() {
    let err = parse_failure(json!({
        "AND": [
            {"name": {"EQ": "a"}},
            {"OR": [{"age": {"GT": 1}}, {"NOT": {"email": {"EQ": 3}}}]}
        ]
    }));
    assert_eq!(err.code, ErrorCode::OperatorValueInvalid);
    assert_eq!(err.path.unwrap().to_string(), "$.AND.1.OR.1.NOT.email.EQ");
}

#[test]
fn test_full_document_serialization() {
    let parsed = parse_success(json!({
        "AND": [
            {"status": {"IN": ["active", "invited"]}},
            {"createdAt": {"GTE": "2024-06-01T08:00:00+02:00"}}
        ],
        "ORDER": {"createdAt": "DESC"},
        "LIMIT": 10
    }));
    assert_eq!(
        serde_json::to_value(&parsed).unwrap(),
        json!({
            "root": {
                "kind": "and",
                "items": [
                    {"kind": "field", "field": "status", "ops": [{"op": "IN", "value": ["active", "invited"]}]},
                    {"kind": "field", "field": "createdAt", "ops": [{"op": "GTE", "value": "2024-06-01T06:00:00.000Z"}]}
                ]
            },
            "control": {"order": [{"createdAt": "DESC"}], "limit": 10},
            "meta": {"allowedFields": ["name", "email", "status", "age", "createdAt", "isActive"]}
        })
    );
}

#[test]
fn test_error_report_for_unknown_field() {
    let err = parse_failure(json!({"AND": [{"nickname": {"EQ": "x"}}]}));
    let report = format_error(&err);
    assert_eq!(
        report.human,
        "Unknown field 'nickname'\n- $.AND.0.nickname: Field 'nickname' is not allowed here"
    );
    let machine = report.machine_json();
    assert_eq!(machine["code"], json!("DSL_UNKNOWN_FIELD"));
    assert_eq!(machine["issues"][0]["pathString"], json!("$.AND.0.nickname"));
    assert_eq!(machine["allowedFields"][0], json!("name"));
}

#[test]
fn test_parser_is_reusable() {
    let registry = registry();
    let parser = SearchDslParser::new(&registry);
    let first = parser.parse(&json!({"age": {"EQ": 1}})).unwrap();
    let second = parser.parse(&json!({"age": {"EQ": 1}})).unwrap();
    assert_eq!(first, second);
}
