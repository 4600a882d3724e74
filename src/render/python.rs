//! Python backend: one dataclass per entity, one method per action
//!
//! Conditions and field mutations run against the in-memory instance.
//! Side effects a record cannot perform itself (inserts into other
//! entities, calls, notifications) are collected on the returned result's
//! `effects` list so the caller can apply them; nothing is silently
//! dropped.

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

    out.push_str(&format!("# {}\n", provenance(entity)));
    if let Some(desc) = &entity.description {
        out.push_str(&format!("\"\"\"{}\"\"\"\n", desc));
    }
    out.push_str("from dataclasses import dataclass\nfrom typing import Any, Optional\n\n\n");
    out.push_str("@dataclass\nclass ");
    out.push_str(&entity.name);
    out.push_str(":\n");

    // dataclass rule: fields without defaults come first
    let (required, defaulted): (Vec<&Field>, Vec<&Field>) = entity
        .fields
        .iter()
        .partition(|f| !f.nullable && f.default.is_none());
    for f in &required {
        out.push_str(&format!("    {}: {}\n", f.name, py_type(f)));
    }
    for f in &defaulted {
        out.push_str(&format!(
            "    {}: {} = {}\n",
            f.name,
            py_type(f),
            py_default(f)
        ));
    }
    if entity.fields.is_empty() {
        out.push_str("    pass\n");
    }

    for action in actions {
        out.push('\n');
        render_action(&mut out, entity, action);
    }

    let mut files = FileMap::new();
    files.insert(
        format!("python/{}.py", to_snake_case(&entity.name)),
        out,
    );
    Ok(files)
}

fn render_action(out: &mut String, entity: &Entity, action: &CompiledAction) {
    out.push_str(&format!("    def {}(self) -> dict:\n", action.name));
    out.push_str("        row = self.__dict__\n");
    out.push_str("        effects: list = []\n");

    for op in &action.ops {
        match op {
            CompiledOp::CheckAuth { condition } => {
                out.push_str(&format!(
                    "        if not ({}):\n",
                    condition.to_python()
                ));
                out.push_str(&format!(
                    "            return {{\"status\": \"failed:not_authorized\", \"message\": \"{} not authorized\", \"effects\": effects}}\n",
                    action.name
                ));
            }
            CompiledOp::Validate { condition, tag } => {
                out.push_str(&format!(
                    "        if not ({}):\n",
                    condition.to_python()
                ));
                out.push_str(&format!(
                    "            return {{\"status\": \"failed:{}\", \"message\": \"{} rejected: {}\", \"effects\": effects}}\n",
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
                        "        self.{} = {}\n",
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
                    .map(|a| format!("\"{}\": {}", a.field, render_value(entity, &a.value)))
                    .collect();
                out.push_str(&format!(
                    "        effects.append({{\"kind\": \"{}\", \"entity\": \"{}\", \"values\": {{{}}}}})\n",
                    kind,
                    target,
                    pairs.join(", ")
                ));
            }
            CompiledOp::Call { function } => {
                out.push_str(&format!(
                    "        effects.append({{\"kind\": \"call\", \"function\": \"{}\"}})\n",
                    function
                ));
            }
            CompiledOp::Notify { recipient, message } => {
                out.push_str(&format!(
                    "        effects.append({{\"kind\": \"notify\", \"recipient\": \"{}\", \"message\": \"{}\"}})\n",
                    recipient, message
                ));
            }
        }
    }

    out.push_str(&format!(
        "        return {{\"status\": \"success\", \"message\": \"{} completed\", \"effects\": effects}}\n",
        action.name
    ));
}

fn render_value(entity: &Entity, value: &str) -> String {
    match Expr::parse(value) {
        Ok(Expr::Field(name)) if entity.field(&name).is_some() => format!("self.{}", name),
        Ok(expr) => expr.to_python(),
        Err(_) => format!("\"{}\"", value.replace('"', "\\\"")),
    }
}

fn py_type(field: &Field) -> String {
    let base = match &field.ty {
        FieldType::Text | FieldType::Enum(_) | FieldType::Timestamp | FieldType::Date => "str",
        FieldType::Integer | FieldType::Ref(_) => "int",
        FieldType::Decimal => "float",
        FieldType::Boolean => "bool",
        FieldType::Json => "Any",
    };
    if field.nullable {
        format!("Optional[{}]", base)
    } else {
        base.to_string()
    }
}

fn py_default(field: &Field) -> String {
    match &field.default {
        None => "None".to_string(),
        Some(d) => match &field.ty {
            FieldType::Boolean => {
                if d == "true" {
                    "True".into()
                } else {
                    "False".into()
                }
            }
            FieldType::Integer | FieldType::Decimal | FieldType::Ref(_) => d.clone(),
            _ => format!("\"{}\"", d.replace('"', "\\\"")),
        },
    }
}
