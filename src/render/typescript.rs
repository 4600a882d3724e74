//! TypeScript backend: one interface per entity, one exported function
//! per action operating on a record in place

use crate::compile::{CompiledAction, CompiledOp};
use crate::expr::Expr;
use crate::render::{provenance, EmissionError, FileMap};
use crate::spec::{Entity, Field, FieldType};
use crate::util::to_snake_case;
use crate::validate::Ir;

pub fn emit_entity(
    _ir: &Ir,
    entity: &Entity,
    actions: &[CompiledAction],
) -> Result<FileMap, EmissionError> {
    let mut out = String::new();

    out.push_str(&format!("// {}\n", provenance(entity)));
    if let Some(desc) = &entity.description {
        out.push_str(&format!("// {}\n", desc));
    }
    out.push('\n');

    out.push_str(&format!("export interface {} {{\n", entity.name));
    for f in &entity.fields {
        out.push_str(&format!("  {}{}: {};\n", f.name, opt(f), ts_type(f)));
    }
    out.push_str("}\n\n");

    out.push_str(
        "export interface Effect {\n  kind: string;\n  detail: Record<string, string>;\n}\n\n",
    );
    out.push_str(
        "export interface MutationResult {\n  status: string;\n  message: string;\n  effects: Effect[];\n}\n",
    );

    for action in actions {
        out.push('\n');
        render_action(&mut out, entity, action);
    }

    let mut files = FileMap::new();
    files.insert(
        format!("typescript/{}.ts", to_snake_case(&entity.name)),
        out,
    );
    Ok(files)
}

fn render_action(out: &mut String, entity: &Entity, action: &CompiledAction) {
    out.push_str(&format!(
        "export function {}(row: {}): MutationResult {{\n",
        action.name, entity.name
    ));
    out.push_str("  const effects: Effect[] = [];\n");

    for op in &action.ops {
        match op {
            CompiledOp::CheckAuth { condition } => {
                out.push_str(&format!("  if (!({})) {{\n", condition.to_typescript()));
                out.push_str(&format!(
                    "    return {{ status: \"failed:not_authorized\", message: \"{} not authorized\", effects }};\n  }}\n",
                    action.name
                ));
            }
            CompiledOp::Validate { condition, tag } => {
                out.push_str(&format!("  if (!({})) {{\n", condition.to_typescript()));
                out.push_str(&format!(
                    "    return {{ status: \"failed:{}\", message: \"{} rejected: {}\", effects }};\n  }}\n",
                    tag, action.name, tag
                ));
            }
            CompiledOp::Update {
                entity: target,
                assignments,
                ..
            } if target == &entity.name => {
                for a in assignments {
                    out.push_str(&format!(
                        "  row.{} = {};\n",
                        a.field,
                        render_value(entity, &a.value)
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
                    .map(|a| format!("{}: String({})", a.field, render_value(entity, &a.value)))
                    .collect();
                out.push_str(&format!(
                    "  effects.push({{ kind: \"{}\", detail: {{ entity: \"{}\", {} }} }});\n",
                    kind,
                    target,
                    pairs.join(", ")
                ));
            }
            CompiledOp::Call { function } => {
                out.push_str(&format!(
                    "  effects.push({{ kind: \"call\", detail: {{ function: \"{}\" }} }});\n",
                    function
                ));
            }
            CompiledOp::Notify { recipient, message } => {
                out.push_str(&format!(
                    "  effects.push({{ kind: \"notify\", detail: {{ recipient: \"{}\", message: \"{}\" }} }});\n",
                    recipient, message
                ));
            }
        }
    }

    out.push_str(&format!(
        "  return {{ status: \"success\", message: \"{} completed\", effects }};\n}}\n",
        action.name
    ));
}

fn render_value(entity: &Entity, value: &str) -> String {
    match Expr::parse(value) {
        Ok(Expr::Field(name)) if entity.field(&name).is_some() => format!("row.{}", name),
        Ok(expr) => expr.to_typescript(),
        Err(_) => format!("\"{}\"", value.replace('"', "\\\"")),
    }
}

fn opt(field: &Field) -> &'static str {
    if field.nullable {
        "?"
    } else {
        ""
    }
}

fn ts_type(field: &Field) -> String {
    let base = match &field.ty {
        FieldType::Text | FieldType::Enum(_) | FieldType::Timestamp | FieldType::Date => "string",
        FieldType::Integer | FieldType::Decimal | FieldType::Ref(_) => "number",
        FieldType::Boolean => "boolean",
        FieldType::Json => "unknown",
    };
    if field.nullable {
        format!("{} | null", base)
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

    fn emit_contact() -> String {
        let entities = vec![Entity::from_yaml(
            r#"
entity: Contact
schema: crm
fields:
  email: text!
  status: enum(lead, customer) = lead
actions:
  - name: promote
    steps:
      - validate: "status = 'lead'"
        error: not_a_lead
      - update: "Contact SET status = 'customer'"
"#,
        )
        .unwrap()];
        let ir = validate(&entities).unwrap();
        let entity = ir.entity("crm", "Contact").unwrap();
        let actions = compile_entity(&ir, entity).unwrap();
        let files = emit_entity(&ir, entity, &actions).unwrap();
        files["typescript/contact.ts"].clone()
    }

    #[test]
    fn interface_maps_types_and_nullability() {
        let ts = emit_contact();
        assert!(ts.contains("export interface Contact {"));
        assert!(ts.contains("  email: string;"));
        assert!(ts.contains("  status?: string | null;"));
    }

    #[test]
    fn action_function_mirrors_compiled_ops() {
        let ts = emit_contact();
        assert!(ts.contains("export function promote(row: Contact): MutationResult {"));
        assert!(ts.contains("if (!(row.status === \"lead\"))"));
        assert!(ts.contains("status: \"failed:not_a_lead\""));
        assert!(ts.contains("row.status = \"customer\";"));
        assert!(ts.contains("status: \"success\""));
    }
}
