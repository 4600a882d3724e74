//! Rust backend: one struct per entity, one free function per action
//!
//! Nullable fields become `Option` struct fields; conditions and
//! assignments over them lift the other side through `Some` (with
//! `as_deref` for string-typed fields) so the emitted code type-checks.
//! Null literals in conditions have no direct rendering against a plain
//! struct field, so emission fails for them instead of guessing at
//! `Option` semantics the record may not have.

use crate::compile::{CompiledAction, CompiledOp};
use crate::expr::{BinOp, Expr};
use crate::render::{provenance, Backend, EmissionError, FileMap};
use crate::spec::{Entity, Field, FieldType};
use crate::util::to_snake_case;
use crate::validate::Ir;

pub fn emit_entity(
    _ir: &Ir,
    entity: &Entity,
    actions: &[CompiledAction],
) -> Result<FileMap, EmissionError> {
    for action in actions {
        for op in &action.ops {
            if let CompiledOp::CheckAuth { condition } | CompiledOp::Validate { condition, .. } =
                op
            {
                if condition.contains_null() {
                    return Err(EmissionError::new(
                        Backend::Rust,
                        &entity.name,
                        "null literal in condition has no rendering for a plain struct field"
                            .to_string(),
                    )
                    .with_action(&action.name));
                }
            }
        }
    }

    let mut out = String::new();

    out.push_str(&format!("// {}\n", provenance(entity)));
    if let Some(desc) = &entity.description {
        out.push_str(&format!("//! {}\n", desc));
    }
    out.push('\n');

    out.push_str("#[derive(Debug, Clone)]\n");
    out.push_str(&format!("pub struct {} {{\n", entity.name));
    for f in &entity.fields {
        out.push_str(&format!("    pub {}: {},\n", f.name, rust_type(f)));
    }
    out.push_str("}\n\n");

    out.push_str(
        "#[derive(Debug, Clone)]\npub enum Effect {\n    Apply {\n        kind: String,\n        entity: String,\n        values: Vec<(String, String)>,\n    },\n    Call {\n        function: String,\n    },\n    Notify {\n        recipient: String,\n        message: String,\n    },\n}\n\n",
    );
    out.push_str(
        "#[derive(Debug, Clone)]\npub struct MutationResult {\n    pub status: String,\n    pub message: String,\n    pub effects: Vec<Effect>,\n}\n",
    );

    for action in actions {
        out.push('\n');
        render_action(&mut out, entity, action);
    }

    let mut files = FileMap::new();
    files.insert(format!("rust/{}.rs", to_snake_case(&entity.name)), out);
    Ok(files)
}

fn render_action(out: &mut String, entity: &Entity, action: &CompiledAction) {
    out.push_str(&format!(
        "pub fn {}(row: &mut {}) -> MutationResult {{\n",
        action.name, entity.name
    ));
    out.push_str("    let mut effects = Vec::new();\n");

    for op in &action.ops {
        match op {
            CompiledOp::CheckAuth { condition } => {
                push_guard(
                    out,
                    &render_condition(entity, condition),
                    "failed:not_authorized",
                    &format!("{} not authorized", action.name),
                );
            }
            CompiledOp::Validate { condition, tag } => {
                push_guard(
                    out,
                    &render_condition(entity, condition),
                    &format!("failed:{}", tag),
                    &format!("{} rejected: {}", action.name, tag),
                );
            }
            CompiledOp::Update {
                entity: target,
                assignments,
                ..
            } if target == &entity.name => {
                for a in assignments {
                    out.push_str(&format!(
                        "    row.{} = {};\n",
                        a.field,
                        render_assign(entity, &a.field, &a.value)
                    ));
                }
            }
            CompiledOp::Update {
                entity: target,
                assignments,
                ..
            }
            | CompiledOp::Insert {
                entity: target,
                assignments,
                ..
            } => {
                let kind = if matches!(op, CompiledOp::Insert { .. }) {
                    "insert"
                } else {
                    "update"
                };
                let pairs: Vec<String> = assignments
                    .iter()
                    .map(|a| {
                        format!(
                            "(\"{}\".to_string(), {}.to_string())",
                            a.field,
                            render_value(entity, &a.value)
                        )
                    })
                    .collect();
                out.push_str(&format!(
                    "    effects.push(Effect::Apply {{\n        kind: \"{}\".to_string(),\n        entity: \"{}\".to_string(),\n        values: vec![{}],\n    }});\n",
                    kind,
                    target,
                    pairs.join(", ")
                ));
            }
            CompiledOp::Call { function } => {
                out.push_str(&format!(
                    "    effects.push(Effect::Call {{ function: \"{}\".to_string() }});\n",
                    function
                ));
            }
            CompiledOp::Notify { recipient, message } => {
                out.push_str(&format!(
                    "    effects.push(Effect::Notify {{\n        recipient: \"{}\".to_string(),\n        message: \"{}\".to_string(),\n    }});\n",
                    recipient, message
                ));
            }
        }
    }

    out.push_str(&format!(
        "    MutationResult {{\n        status: \"success\".to_string(),\n        message: \"{} completed\".to_string(),\n        effects,\n    }}\n}}\n",
        action.name
    ));
}

fn push_guard(out: &mut String, condition: &str, status: &str, message: &str) {
    out.push_str(&format!("    if !({}) {{\n", condition));
    out.push_str(&format!(
        "        return MutationResult {{\n            status: \"{}\".to_string(),\n            message: \"{}\".to_string(),\n            effects,\n        }};\n    }}\n",
        status, message
    ));
}

/// Boolean expression over the `row` struct. Non-nullable fields render
/// directly; nullable fields need their `Option` type acknowledged on
/// every access.
fn render_condition(entity: &Entity, expr: &Expr) -> String {
    match expr {
        Expr::Field(name) => match entity.field(name) {
            Some(f) if f.nullable && is_string_field(f) => {
                format!("row.{}.clone().unwrap_or_default()", name)
            }
            Some(f) if f.nullable => format!("row.{}.unwrap_or_default()", name),
            _ => format!("row.{}", name),
        },
        Expr::Not(inner) => format!("!({})", render_condition(entity, inner)),
        Expr::Binary { op, lhs, rhs } if matches!(op, BinOp::And | BinOp::Or) => {
            format!(
                "({} {} {})",
                render_condition(entity, lhs),
                comparison_symbol(*op),
                render_condition(entity, rhs)
            )
        }
        Expr::Binary { op, lhs, rhs } => render_comparison(entity, *op, lhs, rhs),
        Expr::Literal(_) => expr.to_rust(),
    }
}

/// A comparison against a nullable field lifts the literal side into
/// `Some`, using `as_deref` where the field holds an owned string
fn render_comparison(entity: &Entity, op: BinOp, lhs: &Expr, rhs: &Expr) -> String {
    let symbol = comparison_symbol(op);
    if let (Expr::Field(name), Expr::Literal(_)) = (lhs, rhs) {
        if let Some(f) = entity.field(name) {
            if f.nullable {
                return if is_string_field(f) {
                    format!("row.{}.as_deref() {} Some({})", name, symbol, rhs.to_rust())
                } else {
                    format!("row.{} {} Some({})", name, symbol, rhs.to_rust())
                };
            }
        }
    }
    if let (Expr::Literal(_), Expr::Field(name)) = (lhs, rhs) {
        if let Some(f) = entity.field(name) {
            if f.nullable {
                return if is_string_field(f) {
                    format!("Some({}) {} row.{}.as_deref()", lhs.to_rust(), symbol, name)
                } else {
                    format!("Some({}) {} row.{}", lhs.to_rust(), symbol, name)
                };
            }
        }
    }
    format!(
        "{} {} {}",
        render_condition(entity, lhs),
        symbol,
        render_condition(entity, rhs)
    )
}

fn comparison_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Eq => "==",
        BinOp::Ne => "!=",
        BinOp::Lt => "<",
        BinOp::Le => "<=",
        BinOp::Gt => ">",
        BinOp::Ge => ">=",
        BinOp::And => "&&",
        BinOp::Or => "||",
    }
}

fn is_string_field(field: &Field) -> bool {
    matches!(
        field.ty,
        FieldType::Text
            | FieldType::Enum(_)
            | FieldType::Timestamp
            | FieldType::Date
            | FieldType::Json
    )
}

/// Right-hand side of a field assignment; `Option` destinations wrap the
/// value and string-typed fields need an owned value
fn render_assign(entity: &Entity, field: &str, value: &str) -> String {
    let dest = entity.field(field);
    let dest_nullable = dest.map(|f| f.nullable).unwrap_or(false);
    let dest_string = dest.map(is_string_field).unwrap_or(false);

    if let Ok(Expr::Field(name)) = Expr::parse(value) {
        if let Some(src) = entity.field(&name) {
            let base = format!("row.{}.clone()", name);
            return match (dest_nullable, src.nullable) {
                (true, false) => format!("Some({})", base),
                (false, true) => format!("{}.unwrap_or_default()", base),
                _ => base,
            };
        }
    }

    let mut rendered = match Expr::parse(value) {
        Ok(expr) => expr.to_rust(),
        Err(_) => format!("\"{}\"", value.replace('"', "\\\"")),
    };
    if dest_string && rendered.starts_with('"') {
        rendered = format!("{}.to_string()", rendered);
    }
    if dest_nullable {
        format!("Some({})", rendered)
    } else {
        rendered
    }
}

/// Stringly-typed effect value; nullable sources flatten to their
/// default so the `.to_string()` call site stays uniform
fn render_value(entity: &Entity, value: &str) -> String {
    match Expr::parse(value) {
        Ok(Expr::Field(name)) => match entity.field(&name) {
            Some(f) if f.nullable => format!("row.{}.clone().unwrap_or_default()", name),
            Some(_) => format!("row.{}.clone()", name),
            None => format!("row.{}", name),
        },
        Ok(expr) => expr.to_rust(),
        Err(_) => format!("\"{}\"", value.replace('"', "\\\"")),
    }
}

fn rust_type(field: &Field) -> String {
    let base = match &field.ty {
        FieldType::Text
        | FieldType::Enum(_)
        | FieldType::Timestamp
        | FieldType::Date
        | FieldType::Json => "String",
        FieldType::Integer | FieldType::Ref(_) => "i64",
        FieldType::Decimal => "f64",
        FieldType::Boolean => "bool",
    };
    if field.nullable {
        format!("Option<{}>", base)
    } else {
        base.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile_entity;
    use crate::spec::Entity;
    use crate::validate::validate;

    fn ir_for(yaml: &str) -> Ir {
        validate(&[Entity::from_yaml(yaml).unwrap()]).unwrap()
    }

    #[test]
    fn struct_and_action_rendering() {
        let ir = ir_for(
            r#"
entity: Contact
schema: crm
fields:
  email: text!
  status: enum(lead, customer)!
actions:
  - name: promote
    steps:
      - validate: "status = 'lead'"
        error: not_a_lead
      - update: "Contact SET status = 'customer'"
"#,
        );
        let entity = ir.entity("crm", "Contact").unwrap();
        let actions = compile_entity(&ir, entity).unwrap();
        let files = emit_entity(&ir, entity, &actions).unwrap();
        let rs = &files["rust/contact.rs"];
        assert!(rs.contains("pub struct Contact {"));
        assert!(rs.contains("    pub email: String,"));
        assert!(rs.contains("pub fn promote(row: &mut Contact) -> MutationResult {"));
        assert!(rs.contains("if !((row.status == \"lead\"))" ) || rs.contains("if !(row.status == \"lead\")"));
        assert!(rs.contains("failed:not_a_lead"));
        assert!(rs.contains("row.status = \"customer\".to_string();"));
    }

    #[test]
    fn nullable_fields_lift_through_option() {
        let ir = ir_for(
            r#"
entity: Contact
schema: crm
fields:
  email: text!
  status: enum(lead, customer) = lead
  score: integer
actions:
  - name: promote
    requires: "score > 50"
    steps:
      - validate: "status = 'lead'"
        error: not_a_lead
      - update: "Contact SET status = 'customer'"
"#,
        );
        let entity = ir.entity("crm", "Contact").unwrap();
        let actions = compile_entity(&ir, entity).unwrap();
        let files = emit_entity(&ir, entity, &actions).unwrap();
        let rs = &files["rust/contact.rs"];
        assert!(rs.contains("pub status: Option<String>,"));
        assert!(rs.contains("pub score: Option<i64>,"));
        assert!(rs.contains("row.score > Some(50)"));
        assert!(rs.contains("row.status.as_deref() == Some(\"lead\")"));
        assert!(rs.contains("row.status = Some(\"customer\".to_string());"));
    }

    #[test]
    fn null_literal_condition_fails_emission() {
        let ir = ir_for(
            r#"
entity: Contact
schema: crm
fields:
  email: text
actions:
  - name: check
    steps:
      - validate: "email != null"
"#,
        );
        let entity = ir.entity("crm", "Contact").unwrap();
        let actions = compile_entity(&ir, entity).unwrap();
        let err = emit_entity(&ir, entity, &actions).unwrap_err();
        assert_eq!(err.backend, Backend::Rust);
        assert_eq!(err.action.as_deref(), Some("check"));
    }
}
