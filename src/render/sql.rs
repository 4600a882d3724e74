//! Relational backend: PostgreSQL DDL and PL/pgSQL action functions
//!
//! Table layout follows the trinity convention: a surrogate
//! `pk_{entity} INTEGER` identity primary key for joins, a public
//! `id UUID` for the outside world, and audit columns. Reference fields
//! become `fk_{field}` columns pointing at the target's `pk_*`.
//!
//! Each action becomes one PL/pgSQL function returning the shared
//! `app.mutation_result` composite. A failing validate short-circuits the
//! function with status `failed:{tag}`; since the whole body runs in the
//! caller's transaction, no partial mutation is ever visible.

use crate::compile::{CompiledAction, CompiledOp};
use crate::expr::Expr;
use crate::render::{provenance, Backend, EmissionError, FileMap};
use crate::spec::{Entity, Field, FieldType};
use crate::util::{pk_column, routine_name, table_name, to_snake_case};
use crate::validate::Ir;

/// Batch-level support file: the shared mutation result type
pub fn prelude() -> FileMap {
    let mut files = FileMap::new();
    files.insert(
        "sql/app/types.sql".to_string(),
        "\
-- Shared composite result type for all generated mutations.
CREATE SCHEMA IF NOT EXISTS app;

CREATE TYPE app.mutation_result AS (
    id UUID,
    updated_fields TEXT[],
    status TEXT,
    message TEXT,
    object_data JSONB
);
"
        .to_string(),
    );
    files
}

pub fn emit_entity(
    ir: &Ir,
    entity: &Entity,
    actions: &[CompiledAction],
) -> Result<FileMap, EmissionError> {
    let mut files = FileMap::new();

    let snake = to_snake_case(&entity.name);
    files.insert(
        format!("sql/{}/tb_{}.sql", entity.schema, snake),
        render_ddl(entity),
    );

    for action in actions {
        files.insert(
            format!(
                "sql/{}/fn_{}.sql",
                entity.schema,
                routine_name(&entity.name, &action.name)
            ),
            render_action(ir, entity, action)?,
        );
    }

    Ok(files)
}

// ============================================================================
// DDL
// ============================================================================

fn render_ddl(entity: &Entity) -> String {
    let table = table_name(&entity.name);
    let snake = to_snake_case(&entity.name);
    let mut out = String::new();

    out.push_str(&format!("-- {}\n", provenance(entity)));
    if let Some(desc) = &entity.description {
        out.push_str(&format!("-- {}\n", desc));
    }
    out.push_str(&format!("CREATE SCHEMA IF NOT EXISTS {};\n\n", entity.schema));
    out.push_str(&format!("CREATE TABLE {}.{} (\n", entity.schema, table));

    let mut columns = vec![
        format!(
            "    {} INTEGER GENERATED ALWAYS AS IDENTITY PRIMARY KEY",
            pk_column(&entity.name)
        ),
        "    id UUID NOT NULL UNIQUE DEFAULT gen_random_uuid()".to_string(),
    ];

    for field in &entity.fields {
        columns.push(format!("    {}", render_column(entity, field)));
    }

    columns.push("    created_at TIMESTAMPTZ NOT NULL DEFAULT now()".to_string());
    columns.push("    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()".to_string());
    if entity.soft_delete {
        columns.push("    deleted_at TIMESTAMPTZ".to_string());
    }

    out.push_str(&columns.join(",\n"));
    out.push_str("\n);\n");

    for (i, idx) in entity.indexes.iter().enumerate() {
        let unique = if idx.unique { "UNIQUE " } else { "" };
        let idx_cols: Vec<String> = idx
            .fields
            .iter()
            .map(|f| column_name(entity, f))
            .collect();
        out.push_str(&format!(
            "\nCREATE {}INDEX idx_{}_{} ON {}.{} ({});\n",
            unique,
            snake,
            i + 1,
            entity.schema,
            table,
            idx_cols.join(", ")
        ));
    }

    out
}

fn render_column(entity: &Entity, field: &Field) -> String {
    let mut parts = vec![column_name(entity, &field.name), sql_type(&field.ty)];

    // ref target existence is guaranteed by validation
    if let FieldType::Ref(target) = &field.ty {
        let schema = target.schema_or(&entity.schema);
        parts.push(format!(
            "REFERENCES {}.{}({})",
            schema,
            table_name(&target.entity),
            pk_column(&target.entity)
        ));
    }

    if !field.nullable {
        parts.push("NOT NULL".to_string());
    }
    if field.unique {
        parts.push("UNIQUE".to_string());
    }
    if let Some(default) = &field.default {
        parts.push(format!("DEFAULT {}", sql_default(&field.ty, default)));
    }
    if let FieldType::Enum(values) = &field.ty {
        let quoted: Vec<String> = values.iter().map(|v| format!("'{}'", v)).collect();
        parts.push(format!(
            "CONSTRAINT chk_{}_{} CHECK ({} IN ({}))",
            to_snake_case(&entity.name),
            field.name,
            field.name,
            quoted.join(", ")
        ));
    }

    parts.join(" ")
}

/// Column name for a field: reference fields carry an `fk_` prefix
pub fn column_name(entity: &Entity, field_name: &str) -> String {
    match entity.field(field_name).map(|f| &f.ty) {
        Some(FieldType::Ref(_)) => format!("fk_{}", field_name),
        _ => field_name.to_string(),
    }
}

fn sql_type(ty: &FieldType) -> String {
    match ty {
        FieldType::Text | FieldType::Enum(_) => "TEXT".to_string(),
        FieldType::Integer | FieldType::Ref(_) => "INTEGER".to_string(),
        FieldType::Decimal => "DECIMAL".to_string(),
        FieldType::Boolean => "BOOLEAN".to_string(),
        FieldType::Timestamp => "TIMESTAMPTZ".to_string(),
        FieldType::Date => "DATE".to_string(),
        FieldType::Json => "JSONB".to_string(),
    }
}

fn sql_default(ty: &FieldType, default: &str) -> String {
    match ty {
        FieldType::Text | FieldType::Enum(_) | FieldType::Date => {
            format!("'{}'", default.replace('\'', "''"))
        }
        FieldType::Timestamp if default.eq_ignore_ascii_case("now") => "now()".to_string(),
        _ => default.to_string(),
    }
}

// ============================================================================
// Action functions
// ============================================================================

fn render_action(
    ir: &Ir,
    entity: &Entity,
    action: &CompiledAction,
) -> Result<String, EmissionError> {
    let table = table_name(&entity.name);
    let pk = pk_column(&entity.name);
    let routine = routine_name(&entity.name, &action.name);

    // every field a condition or assignment value reads gets a local
    // v_ variable
    let mut read_fields: Vec<&str> = Vec::new();
    for op in &action.ops {
        match op {
            CompiledOp::CheckAuth { condition } | CompiledOp::Validate { condition, .. } => {
                for f in condition.fields() {
                    if !read_fields.contains(&f) {
                        read_fields.push(f);
                    }
                }
            }
            CompiledOp::Update { assignments, .. } | CompiledOp::Insert { assignments, .. } => {
                for a in assignments {
                    if let Ok(Expr::Field(name)) = Expr::parse(&a.value) {
                        if let Some(field) = entity.field(&name) {
                            if !read_fields.contains(&field.name.as_str()) {
                                read_fields.push(&field.name);
                            }
                        }
                    }
                }
            }
            _ => {}
        }
    }

    let mut out = String::new();
    out.push_str(&format!("-- {}\n", provenance(entity)));
    out.push_str(&format!(
        "CREATE OR REPLACE FUNCTION {}.{}(p_id UUID)\n",
        entity.schema, routine
    ));
    out.push_str("RETURNS app.mutation_result AS $$\n");
    out.push_str("DECLARE\n");
    out.push_str("    v_result app.mutation_result;\n");
    out.push_str("    v_pk INTEGER;\n");
    for field in &read_fields {
        let ty = entity
            .field(field)
            .map(|f| sql_type(&f.ty))
            .unwrap_or_else(|| "TEXT".to_string());
        out.push_str(&format!("    v_{} {};\n", field, ty));
    }
    out.push_str("BEGIN\n");
    out.push_str("    v_result.id := p_id;\n\n");

    out.push_str(&format!(
        "    SELECT {} INTO v_pk FROM {}.{} WHERE id = p_id;\n",
        pk, entity.schema, table
    ));
    out.push_str("    IF v_pk IS NULL THEN\n");
    out.push_str("        v_result.status := 'failed:not_found';\n");
    out.push_str(&format!(
        "        v_result.message := '{} not found';\n",
        entity.name
    ));
    out.push_str("        RETURN v_result;\n    END IF;\n");

    if !read_fields.is_empty() {
        let cols: Vec<String> = read_fields
            .iter()
            .map(|f| column_name(entity, f))
            .collect();
        let vars: Vec<String> = read_fields.iter().map(|f| format!("v_{}", f)).collect();
        out.push_str(&format!(
            "\n    SELECT {} INTO {} FROM {}.{} WHERE {} = v_pk;\n",
            cols.join(", "),
            vars.join(", "),
            entity.schema,
            table,
            pk
        ));
    }

    let mut updated_fields: Vec<&str> = Vec::new();

    for op in &action.ops {
        out.push('\n');
        match op {
            CompiledOp::CheckAuth { condition } => {
                out.push_str(&format!("    IF NOT ({}) THEN\n", condition.to_sql()));
                out.push_str("        v_result.status := 'failed:not_authorized';\n");
                out.push_str(&format!(
                    "        v_result.message := '{} not authorized';\n",
                    action.name
                ));
                out.push_str("        RETURN v_result;\n    END IF;\n");
            }
            CompiledOp::Validate { condition, tag } => {
                out.push_str(&format!("    IF NOT ({}) THEN\n", condition.to_sql()));
                out.push_str(&format!("        v_result.status := 'failed:{}';\n", tag));
                out.push_str(&format!(
                    "        v_result.message := '{} rejected: {}';\n",
                    action.name, tag
                ));
                out.push_str("        RETURN v_result;\n    END IF;\n");
            }
            CompiledOp::Update {
                entity: target,
                schema,
                assignments,
            } => {
                if target != &entity.name || schema != &entity.schema {
                    return Err(EmissionError::new(
                        Backend::Sql,
                        &entity.name,
                        format!(
                            "update step cannot address a row of '{}.{}' from here",
                            schema, target
                        ),
                    )
                    .with_action(&action.name));
                }
                let sets: Vec<String> = assignments
                    .iter()
                    .map(|a| {
                        format!(
                            "{} = {}",
                            column_name(entity, &a.field),
                            render_value(entity, &a.value)
                        )
                    })
                    .collect();
                out.push_str(&format!(
                    "    UPDATE {}.{}\n    SET {}, updated_at = now()\n    WHERE {} = v_pk;\n",
                    entity.schema,
                    table,
                    sets.join(", "),
                    pk
                ));
                for a in assignments {
                    if !updated_fields.contains(&a.field.as_str()) {
                        updated_fields.push(&a.field);
                    }
                }
            }
            CompiledOp::Insert {
                entity: target,
                schema,
                assignments,
            } => {
                let target_table = table_name(target);
                // reference fields in the target carry their fk_ prefix
                let cols: Vec<String> = match ir.entity(schema, target) {
                    Some(target_entity) => assignments
                        .iter()
                        .map(|a| column_name(target_entity, &a.field))
                        .collect(),
                    None => assignments.iter().map(|a| a.field.clone()).collect(),
                };
                let values: Vec<String> = assignments
                    .iter()
                    .map(|a| render_value(entity, &a.value))
                    .collect();
                out.push_str(&format!(
                    "    INSERT INTO {}.{} ({})\n    VALUES ({});\n",
                    schema,
                    target_table,
                    cols.join(", "),
                    values.join(", ")
                ));
            }
            CompiledOp::Call { function } => {
                let qualified = if function.contains('.') {
                    function.clone()
                } else {
                    format!("{}.{}", entity.schema, function)
                };
                out.push_str(&format!("    PERFORM {}(v_pk);\n", qualified));
            }
            CompiledOp::Notify { recipient, message } => {
                out.push_str(&format!(
                    "    PERFORM pg_notify('{}', '{}');\n",
                    recipient,
                    message.replace('\'', "''")
                ));
            }
        }
    }

    out.push('\n');
    if !updated_fields.is_empty() {
        let quoted: Vec<String> = updated_fields.iter().map(|f| format!("'{}'", f)).collect();
        out.push_str(&format!(
            "    v_result.updated_fields := ARRAY[{}];\n",
            quoted.join(", ")
        ));
    }
    out.push_str("    v_result.status := 'success';\n");
    out.push_str(&format!(
        "    v_result.message := '{} completed';\n",
        action.name
    ));
    out.push_str(&format!(
        "    v_result.object_data := (SELECT to_jsonb(t) FROM {}.{} t WHERE {} = v_pk);\n",
        entity.schema, table, pk
    ));
    out.push_str("    RETURN v_result;\nEND;\n$$ LANGUAGE plpgsql;\n");

    Ok(out)
}

/// Assignment values are either literals or field references
fn render_value(entity: &Entity, value: &str) -> String {
    match Expr::parse(value) {
        Ok(Expr::Field(name)) if entity.field(&name).is_some() => format!("v_{}", name),
        Ok(expr) => expr.to_sql(),
        Err(_) => value.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compile::compile_entity;
    use crate::spec::Entity;
    use crate::validate::validate;

    fn crm() -> Ir {
        let entities = vec![
            Entity::from_yaml(
                r#"
entity: Company
schema: crm
fields:
  name: text!
"#,
            )
            .unwrap(),
            Entity::from_yaml(
                r#"
entity: Contact
schema: crm
description: "A CRM contact"
fields:
  email: text! unique
  status: enum(lead, customer) = lead
  score: integer
  company: ref(Company)
indexes:
  - fields: [email]
    unique: true
actions:
  - name: promote
    requires: "status = 'lead'"
    steps:
      - validate: "status = 'lead'"
        error: not_a_lead
      - update: "Contact SET status = 'customer'"
      - notify: "owner: contact promoted"
soft_delete: true
"#,
            )
            .unwrap(),
        ];
        validate(&entities).unwrap()
    }

    fn emit_contact(ir: &Ir) -> FileMap {
        let entity = ir.entity("crm", "Contact").unwrap();
        let actions = compile_entity(ir, entity).unwrap();
        emit_entity(ir, entity, &actions).unwrap()
    }

    #[test]
    fn ddl_has_trinity_and_audit_columns() {
        let ir = crm();
        let files = emit_contact(&ir);
        let ddl = &files["sql/crm/tb_contact.sql"];
        assert!(ddl.contains("CREATE TABLE crm.tb_contact ("));
        assert!(ddl.contains("pk_contact INTEGER GENERATED ALWAYS AS IDENTITY PRIMARY KEY"));
        assert!(ddl.contains("id UUID NOT NULL UNIQUE DEFAULT gen_random_uuid()"));
        assert!(ddl.contains("created_at TIMESTAMPTZ NOT NULL DEFAULT now()"));
        assert!(ddl.contains("deleted_at TIMESTAMPTZ"));
    }

    #[test]
    fn ddl_maps_field_types() {
        let ir = crm();
        let files = emit_contact(&ir);
        let ddl = &files["sql/crm/tb_contact.sql"];
        assert!(ddl.contains("email TEXT NOT NULL UNIQUE"));
        assert!(ddl.contains("status TEXT DEFAULT 'lead' CONSTRAINT chk_contact_status CHECK (status IN ('lead', 'customer'))"));
        assert!(ddl.contains("score INTEGER"));
        assert!(ddl.contains("fk_company INTEGER REFERENCES crm.tb_company(pk_company)"));
    }

    #[test]
    fn ddl_renders_declared_indexes() {
        let ir = crm();
        let files = emit_contact(&ir);
        let ddl = &files["sql/crm/tb_contact.sql"];
        assert!(ddl.contains("CREATE UNIQUE INDEX idx_contact_1 ON crm.tb_contact (email);"));
    }

    #[test]
    fn action_function_shape() {
        let ir = crm();
        let files = emit_contact(&ir);
        let f = &files["sql/crm/fn_contact_promote.sql"];
        assert!(f.contains("CREATE OR REPLACE FUNCTION crm.contact_promote(p_id UUID)"));
        assert!(f.contains("RETURNS app.mutation_result AS $$"));
        assert!(f.contains("IF NOT (v_status = 'lead') THEN"));
        assert!(f.contains("v_result.status := 'failed:not_a_lead';"));
        assert!(f.contains("SET status = 'customer', updated_at = now()"));
        assert!(f.contains("PERFORM pg_notify('owner', 'contact promoted');"));
        assert!(f.contains("v_result.updated_fields := ARRAY['status'];"));
        assert!(f.contains("$$ LANGUAGE plpgsql;"));
    }

    #[test]
    fn auth_check_comes_before_validates() {
        let ir = crm();
        let files = emit_contact(&ir);
        let f = &files["sql/crm/fn_contact_promote.sql"];
        let auth = f.find("failed:not_authorized").unwrap();
        let tag = f.find("failed:not_a_lead").unwrap();
        assert!(auth < tag);
    }

    #[test]
    fn insert_values_referencing_fields_read_from_the_row() {
        let entities = vec![
            Entity::from_yaml("entity: AuditLog\nschema: crm\nfields:\n  email: text\n").unwrap(),
            Entity::from_yaml(
                r#"
entity: Contact
schema: crm
fields:
  email: text!
actions:
  - name: archive
    steps:
      - insert: "AuditLog SET email = email"
"#,
            )
            .unwrap(),
        ];
        let ir = validate(&entities).unwrap();
        let entity = ir.entity("crm", "Contact").unwrap();
        let actions = compile_entity(&ir, entity).unwrap();
        let files = emit_entity(&ir, entity, &actions).unwrap();
        let f = &files["sql/crm/fn_contact_archive.sql"];
        assert!(f.contains("    v_email TEXT;"));
        assert!(f.contains("SELECT email INTO v_email FROM crm.tb_contact"));
        assert!(f.contains("INSERT INTO crm.tb_audit_log (email)\n    VALUES (v_email);"));
    }

    #[test]
    fn cross_entity_update_is_an_emission_error() {
        let entities = vec![
            Entity::from_yaml("entity: Other\nschema: crm\nfields:\n  flag: boolean\n").unwrap(),
            Entity::from_yaml(
                r#"
entity: Contact
schema: crm
fields:
  email: text!
actions:
  - name: tweak
    steps:
      - update: "Other SET flag = true"
"#,
            )
            .unwrap(),
        ];
        let ir = validate(&entities).unwrap();
        let entity = ir.entity("crm", "Contact").unwrap();
        let actions = compile_entity(&ir, entity).unwrap();
        let err = emit_entity(&ir, entity, &actions).unwrap_err();
        assert_eq!(err.backend, Backend::Sql);
        assert!(err.detail.contains("cannot address"));
    }

    #[test]
    fn prelude_declares_mutation_result() {
        let files = prelude();
        let types = &files["sql/app/types.sql"];
        assert!(types.contains("CREATE TYPE app.mutation_result AS ("));
        assert!(types.contains("status TEXT"));
    }
}
