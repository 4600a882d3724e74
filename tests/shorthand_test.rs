//! Data-driven tests for the field shorthand grammar and expression
//! rendering across targets.

use pretty_assertions::assert_eq;
use rstest::rstest;
use specforge::{Entity, Expr, FieldType};

fn parse_field(shorthand: &str) -> specforge::Field {
    let doc = format!("entity: Probe\nfields:\n  sample: \"{shorthand}\"\n");
    let entity = Entity::from_yaml(&doc).unwrap();
    entity.field("sample").unwrap().clone()
}

#[rstest]
#[case("text", false, false, None)]
#[case("text!", true, false, None)]
#[case("text! unique", true, true, None)]
#[case("text = hello", false, false, Some("hello"))]
#[case("integer! = 0", true, false, Some("0"))]
fn shorthand_modifiers(
    #[case] shorthand: &str,
    #[case] required: bool,
    #[case] unique: bool,
    #[case] default: Option<&str>,
) {
    let field = parse_field(shorthand);
    assert_eq!(!field.nullable, required, "{shorthand}");
    assert_eq!(field.unique, unique, "{shorthand}");
    assert_eq!(field.default.as_deref(), default, "{shorthand}");
}

#[rstest]
#[case("text", FieldType::Text)]
#[case("integer", FieldType::Integer)]
#[case("decimal", FieldType::Decimal)]
#[case("boolean", FieldType::Boolean)]
#[case("timestamp", FieldType::Timestamp)]
#[case("date", FieldType::Date)]
#[case("json", FieldType::Json)]
fn scalar_types(#[case] shorthand: &str, #[case] expected: FieldType) {
    assert_eq!(parse_field(shorthand).ty, expected);
}

#[test]
fn enum_shorthand_keeps_value_order() {
    let field = parse_field("enum(lead, customer, churned)");
    assert_eq!(
        field.ty,
        FieldType::Enum(vec!["lead".into(), "customer".into(), "churned".into()])
    );
}

#[rstest]
#[case("ref(Company)", None, "Company")]
#[case("ref(billing.Invoice)", Some("billing"), "Invoice")]
fn reference_shorthand(
    #[case] shorthand: &str,
    #[case] schema: Option<&str>,
    #[case] entity: &str,
) {
    match parse_field(shorthand).ty {
        FieldType::Ref(target) => {
            assert_eq!(target.schema.as_deref(), schema);
            assert_eq!(target.entity, entity);
        }
        other => panic!("expected a reference, got {other:?}"),
    }
}

#[rstest]
#[case("varchar")]
#[case("enum()")]
#[case("ref()")]
fn malformed_shorthand_is_a_parse_error(#[case] shorthand: &str) {
    let doc = format!("entity: Probe\nfields:\n  sample: \"{shorthand}\"\n");
    assert!(Entity::from_yaml(&doc).is_err(), "{shorthand}");
}

#[rstest]
#[case("status = 'lead'", "v_status = 'lead'", "row[\"status\"] == \"lead\"")]
#[case("score > 50", "v_score > 50", "row[\"score\"] > 50")]
#[case(
    "status = 'lead' and score > 50",
    "(v_status = 'lead' AND v_score > 50)",
    "(row[\"status\"] == \"lead\" and row[\"score\"] > 50)"
)]
#[case("deleted_at = null", "v_deleted_at IS NULL", "row[\"deleted_at\"] is None")]
fn expressions_render_per_target(
    #[case] source: &str,
    #[case] sql: &str,
    #[case] python: &str,
) {
    let expr = Expr::parse(source).unwrap();
    assert_eq!(expr.to_sql(), sql);
    assert_eq!(expr.to_python(), python);
}

#[test]
fn yaml_round_trip_preserves_the_hash() {
    let doc = r#"
entity: Contact
schema: crm
fields:
  email: text! unique
  status: enum(lead, customer) = lead
actions:
  - name: promote
    steps:
      - update: "Contact SET status = 'customer'"
"#;
    let entity = Entity::from_yaml(doc).unwrap();
    let reparsed = Entity::from_yaml(&entity.to_yaml().unwrap()).unwrap();
    assert_eq!(entity.hash(), reparsed.hash());
}
