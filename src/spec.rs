//! Specification types — the core data model
//!
//! One specification document describes exactly one `Entity`: its fields,
//! indexes, and named business-logic actions. Field types use a compact
//! shorthand; actions are ordered lists of steps.
//!
//! ## Example document
//!
//! ```yaml
//! entity: Contact
//! schema: crm
//! fields:
//!   email: text! unique
//!   status: enum(lead, customer) = lead
//!   company: ref(Company)
//! indexes:
//!   - fields: [email]
//!     unique: true
//! actions:
//!   - name: promote
//!     requires: "status = 'lead'"
//!     steps:
//!       - validate: "status = 'lead'"
//!         error: not_a_lead
//!       - update: "Contact SET status = 'customer'"
//! soft_delete: true
//! ```

use crate::error::{Error, Result};
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A parsed, not-yet-validated entity specification
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct Entity {
    /// Entity name (unique within its schema)
    pub name: String,

    /// Schema namespace
    pub schema: String,

    /// Human-readable description
    pub description: Option<String>,

    /// Fields in declaration order
    pub fields: Vec<Field>,

    /// Declared indexes
    pub indexes: Vec<Index>,

    /// Business-logic actions
    pub actions: Vec<Action>,

    /// Soft-delete/audit flag (adds `deleted_at` alongside the audit columns)
    pub soft_delete: bool,
}

/// A single field
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct Field {
    pub name: String,
    pub ty: FieldType,
    pub nullable: bool,
    pub unique: bool,
    /// Default-value expression, verbatim from the document
    pub default: Option<String>,
}

/// Closed semantic type enumeration
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub enum FieldType {
    Text,
    Integer,
    Decimal,
    Boolean,
    Timestamp,
    Date,
    Json,
    /// `enum(a, b, c)` — values in declaration order
    Enum(Vec<String>),
    /// `ref(Entity)` or `ref(schema.Entity)`
    Ref(RefTarget),
}

/// Target of a reference field
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct RefTarget {
    /// Explicit schema qualifier; `None` means the owning entity's schema
    pub schema: Option<String>,
    pub entity: String,
}

impl RefTarget {
    /// Resolve against the owning entity's schema
    pub fn schema_or<'a>(&'a self, owner_schema: &'a str) -> &'a str {
        self.schema.as_deref().unwrap_or(owner_schema)
    }
}

/// A declared index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Index {
    pub fields: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

/// A named business-logic action: ordered steps, executed in declaration
/// order inside one transaction
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct Action {
    pub name: String,
    /// Optional authorization predicate, checked before any step runs
    pub requires: Option<String>,
    pub steps: Vec<Step>,
}

/// One action step
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub enum Step {
    /// Check a condition; on failure the action short-circuits with the tag
    Validate {
        condition: String,
        /// User-supplied failure tag; a stable default is derived when absent
        error: Option<String>,
    },
    /// Mutate fields of an existing row of the target entity
    Update {
        entity: String,
        assignments: Vec<Assignment>,
    },
    /// Insert a new row of the target entity
    Insert {
        entity: String,
        assignments: Vec<Assignment>,
    },
    /// Invoke another action or external hook by name
    Call { function: String },
    /// Send a notification
    Notify { recipient: String, message: String },
}

/// A `field = value` pair inside an update/insert step
#[derive(Debug, Clone, PartialEq, Serialize, JsonSchema)]
pub struct Assignment {
    pub field: String,
    /// Value expression, verbatim (literal or field reference)
    pub value: String,
}

// ============================================================================
// Raw document shapes (serde targets; converted into the typed model)
// ============================================================================

#[derive(Deserialize)]
struct EntityDoc {
    entity: String,
    #[serde(default)]
    schema: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    fields: IndexMap<String, FieldDoc>,
    #[serde(default)]
    indexes: Vec<Index>,
    #[serde(default)]
    actions: Vec<ActionDoc>,
    #[serde(default)]
    soft_delete: bool,
}

/// Field shorthand string, or the expanded dict form
#[derive(Deserialize)]
#[serde(untagged)]
enum FieldDoc {
    Shorthand(String),
    Full {
        #[serde(rename = "type")]
        ty: String,
        #[serde(default)]
        nullable: Option<bool>,
        #[serde(default)]
        unique: Option<bool>,
        #[serde(default)]
        default: Option<String>,
    },
}

#[derive(Deserialize)]
struct ActionDoc {
    name: String,
    #[serde(default)]
    requires: Option<String>,
    #[serde(default)]
    steps: Vec<StepDoc>,
}

/// A step is a one-key mapping (`validate:` may carry a sibling `error:`)
#[derive(Deserialize)]
struct StepDoc {
    #[serde(default)]
    validate: Option<String>,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    update: Option<String>,
    #[serde(default)]
    insert: Option<String>,
    #[serde(default)]
    call: Option<String>,
    #[serde(default)]
    notify: Option<String>,
}

impl Entity {
    /// Parse one specification document from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let doc: EntityDoc =
            serde_norway::from_str(yaml).map_err(|e| Error::SpecParse(e.to_string()))?;
        Self::from_doc(doc)
    }

    /// Serialize back to the document format (used by the reverse path)
    pub fn to_yaml(&self) -> Result<String> {
        serde_norway::to_string(&self.to_doc()).map_err(|e| Error::SpecParse(e.to_string()))
    }

    /// Content hash for provenance headers and change detection
    pub fn hash(&self) -> String {
        use sha2::{Digest, Sha256};
        let content = self.to_yaml().unwrap_or_default();
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        format!("sha256:{}", hex::encode(&hasher.finalize()[..8]))
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up an action by name
    pub fn action(&self, name: &str) -> Option<&Action> {
        self.actions.iter().find(|a| a.name == name)
    }

    fn from_doc(doc: EntityDoc) -> Result<Self> {
        if doc.entity.is_empty() {
            return Err(Error::SpecParse("entity name must not be empty".into()));
        }

        let mut fields = Vec::with_capacity(doc.fields.len());
        for (name, spec) in doc.fields {
            fields.push(parse_field(&doc.entity, &name, spec)?);
        }

        let mut actions = Vec::with_capacity(doc.actions.len());
        for a in doc.actions {
            actions.push(parse_action(&doc.entity, a)?);
        }

        Ok(Entity {
            name: doc.entity,
            schema: doc.schema.unwrap_or_else(|| "public".into()),
            description: doc.description,
            fields,
            indexes: doc.indexes,
            actions,
            soft_delete: doc.soft_delete,
        })
    }

    fn to_doc(&self) -> serde_norway::Value {
        use serde_norway::{Mapping, Value};

        let mut root = Mapping::new();
        root.insert("entity".into(), Value::String(self.name.clone()));
        root.insert("schema".into(), Value::String(self.schema.clone()));
        if let Some(desc) = &self.description {
            root.insert("description".into(), Value::String(desc.clone()));
        }

        let mut fields = Mapping::new();
        for f in &self.fields {
            fields.insert(
                Value::String(f.name.clone()),
                Value::String(f.shorthand()),
            );
        }
        root.insert("fields".into(), Value::Mapping(fields));

        if !self.indexes.is_empty() {
            let idx: Vec<Value> = self
                .indexes
                .iter()
                .map(|i| serde_norway::to_value(i).unwrap_or(Value::Null))
                .collect();
            root.insert("indexes".into(), Value::Sequence(idx));
        }

        if !self.actions.is_empty() {
            let acts: Vec<Value> = self.actions.iter().map(action_to_doc).collect();
            root.insert("actions".into(), Value::Sequence(acts));
        }

        if self.soft_delete {
            root.insert("soft_delete".into(), Value::Bool(true));
        }

        Value::Mapping(root)
    }
}

impl Field {
    /// Render back to the shorthand form, e.g. `enum(lead, customer)! = lead`
    pub fn shorthand(&self) -> String {
        let mut s = self.ty.shorthand();
        if !self.nullable {
            s.push('!');
        }
        if self.unique {
            s.push_str(" unique");
        }
        if let Some(d) = &self.default {
            s.push_str(" = ");
            s.push_str(d);
        }
        s
    }
}

impl FieldType {
    fn shorthand(&self) -> String {
        match self {
            FieldType::Text => "text".into(),
            FieldType::Integer => "integer".into(),
            FieldType::Decimal => "decimal".into(),
            FieldType::Boolean => "boolean".into(),
            FieldType::Timestamp => "timestamp".into(),
            FieldType::Date => "date".into(),
            FieldType::Json => "json".into(),
            FieldType::Enum(values) => format!("enum({})", values.join(", ")),
            FieldType::Ref(target) => match &target.schema {
                Some(s) => format!("ref({}.{})", s, target.entity),
                None => format!("ref({})", target.entity),
            },
        }
    }
}

fn action_to_doc(action: &Action) -> serde_norway::Value {
    use serde_norway::{Mapping, Value};

    let mut m = Mapping::new();
    m.insert("name".into(), Value::String(action.name.clone()));
    if let Some(req) = &action.requires {
        m.insert("requires".into(), Value::String(req.clone()));
    }
    let steps: Vec<Value> = action
        .steps
        .iter()
        .map(|s| {
            let mut sm = Mapping::new();
            match s {
                Step::Validate { condition, error } => {
                    sm.insert("validate".into(), Value::String(condition.clone()));
                    if let Some(e) = error {
                        sm.insert("error".into(), Value::String(e.clone()));
                    }
                }
                Step::Update { entity, assignments } => {
                    sm.insert(
                        "update".into(),
                        Value::String(render_set(entity, assignments)),
                    );
                }
                Step::Insert { entity, assignments } => {
                    sm.insert(
                        "insert".into(),
                        Value::String(render_set(entity, assignments)),
                    );
                }
                Step::Call { function } => {
                    sm.insert("call".into(), Value::String(function.clone()));
                }
                Step::Notify { recipient, message } => {
                    sm.insert(
                        "notify".into(),
                        Value::String(format!("{}: {}", recipient, message)),
                    );
                }
            }
            Value::Mapping(sm)
        })
        .collect();
    m.insert("steps".into(), Value::Sequence(steps));
    Value::Mapping(m)
}

fn render_set(entity: &str, assignments: &[Assignment]) -> String {
    let pairs: Vec<String> = assignments
        .iter()
        .map(|a| format!("{} = {}", a.field, a.value))
        .collect();
    format!("{} SET {}", entity, pairs.join(", "))
}

// ============================================================================
// Shorthand parsing
// ============================================================================

fn parse_field(entity: &str, name: &str, spec: FieldDoc) -> Result<Field> {
    match spec {
        FieldDoc::Shorthand(s) => parse_field_shorthand(entity, name, &s),
        FieldDoc::Full {
            ty,
            nullable,
            unique,
            default,
        } => {
            let base = parse_field_shorthand(entity, name, &ty)?;
            Ok(Field {
                nullable: nullable.unwrap_or(base.nullable),
                unique: unique.unwrap_or(base.unique),
                default: default.or(base.default),
                ..base
            })
        }
    }
}

/// Parse `type[!][ unique][ = default]`
fn parse_field_shorthand(entity: &str, name: &str, spec: &str) -> Result<Field> {
    let mut rest = spec.trim();
    let mut default = None;

    if let Some((head, tail)) = rest.split_once(" = ") {
        rest = head.trim_end();
        default = Some(tail.trim().trim_matches(['\'', '"']).to_string());
    }

    let mut unique = false;
    if let Some(head) = rest.strip_suffix(" unique") {
        unique = true;
        rest = head.trim_end();
    }

    let mut nullable = true;
    if let Some(head) = rest.strip_suffix('!') {
        nullable = false;
        rest = head;
    }

    let ty = parse_field_type(rest).ok_or_else(|| {
        Error::SpecParse(format!(
            "{}.{}: unknown field type '{}'",
            entity, name, rest
        ))
    })?;

    if let FieldType::Enum(values) = &ty {
        if values.is_empty() {
            return Err(Error::SpecParse(format!(
                "{}.{}: enum must declare at least one value",
                entity, name
            )));
        }
    }

    Ok(Field {
        name: name.to_string(),
        ty,
        nullable,
        unique,
        default,
    })
}

fn parse_field_type(s: &str) -> Option<FieldType> {
    match s {
        "text" => return Some(FieldType::Text),
        "integer" => return Some(FieldType::Integer),
        "decimal" => return Some(FieldType::Decimal),
        "boolean" => return Some(FieldType::Boolean),
        "timestamp" => return Some(FieldType::Timestamp),
        "date" => return Some(FieldType::Date),
        "json" => return Some(FieldType::Json),
        _ => {}
    }

    if let Some(inner) = s.strip_prefix("enum(").and_then(|r| r.strip_suffix(')')) {
        let values: Vec<String> = inner
            .split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect();
        return Some(FieldType::Enum(values));
    }

    if let Some(inner) = s.strip_prefix("ref(").and_then(|r| r.strip_suffix(')')) {
        let inner = inner.trim();
        if inner.is_empty() {
            return None;
        }
        let target = match inner.split_once('.') {
            Some((schema, entity)) => RefTarget {
                schema: Some(schema.trim().to_string()),
                entity: entity.trim().to_string(),
            },
            None => RefTarget {
                schema: None,
                entity: inner.to_string(),
            },
        };
        return Some(FieldType::Ref(target));
    }

    None
}

fn parse_action(entity: &str, doc: ActionDoc) -> Result<Action> {
    if doc.name.is_empty() {
        return Err(Error::SpecParse(format!(
            "{}: action must have a non-empty name",
            entity
        )));
    }

    let mut steps = Vec::with_capacity(doc.steps.len());
    for (i, s) in doc.steps.into_iter().enumerate() {
        steps.push(parse_step(entity, &doc.name, i, s)?);
    }

    Ok(Action {
        name: doc.name,
        requires: doc.requires,
        steps,
    })
}

fn parse_step(entity: &str, action: &str, index: usize, doc: StepDoc) -> Result<Step> {
    let keys = [
        doc.validate.is_some(),
        doc.update.is_some(),
        doc.insert.is_some(),
        doc.call.is_some(),
        doc.notify.is_some(),
    ]
    .iter()
    .filter(|&&b| b)
    .count();

    if keys != 1 {
        return Err(Error::SpecParse(format!(
            "{}.{}: step {} must have exactly one of validate/update/insert/call/notify",
            entity,
            action,
            index + 1
        )));
    }

    if let Some(condition) = doc.validate {
        return Ok(Step::Validate {
            condition,
            error: doc.error,
        });
    }
    if let Some(spec) = doc.update {
        let (target, assignments) = parse_set_clause(entity, action, index, &spec)?;
        return Ok(Step::Update {
            entity: target,
            assignments,
        });
    }
    if let Some(spec) = doc.insert {
        let (target, assignments) = parse_set_clause(entity, action, index, &spec)?;
        return Ok(Step::Insert {
            entity: target,
            assignments,
        });
    }
    if let Some(function) = doc.call {
        return Ok(Step::Call { function });
    }
    let spec = doc.notify.unwrap_or_default();
    let (recipient, message) = spec
        .split_once(':')
        .map(|(r, m)| (r.trim().to_string(), m.trim().to_string()))
        .unwrap_or_else(|| ("owner".into(), spec.trim().to_string()));
    Ok(Step::Notify { recipient, message })
}

/// Parse `Entity SET field = value, field = value`
fn parse_set_clause(
    entity: &str,
    action: &str,
    index: usize,
    spec: &str,
) -> Result<(String, Vec<Assignment>)> {
    let (target, rest) = spec.split_once(" SET ").ok_or_else(|| {
        Error::SpecParse(format!(
            "{}.{}: step {} expects 'Entity SET field = value' form, got '{}'",
            entity,
            action,
            index + 1,
            spec
        ))
    })?;

    let mut assignments = Vec::new();
    for pair in rest.split(',') {
        let (field, value) = pair.split_once('=').ok_or_else(|| {
            Error::SpecParse(format!(
                "{}.{}: step {} has malformed assignment '{}'",
                entity,
                action,
                index + 1,
                pair.trim()
            ))
        })?;
        assignments.push(Assignment {
            field: field.trim().to_string(),
            value: value.trim().to_string(),
        });
    }

    Ok((target.trim().to_string(), assignments))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTACT: &str = r#"
entity: Contact
schema: crm
fields:
  email: text! unique
  status: enum(lead, customer) = lead
  score: integer
  company: ref(Company)
actions:
  - name: promote
    requires: "status = 'lead'"
    steps:
      - validate: "status = 'lead'"
        error: not_a_lead
      - update: "Contact SET status = 'customer'"
      - notify: "owner: contact promoted"
soft_delete: true
"#;

    #[test]
    fn parse_lightweight_document() {
        let entity = Entity::from_yaml(CONTACT).unwrap();
        assert_eq!(entity.name, "Contact");
        assert_eq!(entity.schema, "crm");
        assert_eq!(entity.fields.len(), 4);
        assert!(entity.soft_delete);

        let email = entity.field("email").unwrap();
        assert_eq!(email.ty, FieldType::Text);
        assert!(!email.nullable);
        assert!(email.unique);

        let status = entity.field("status").unwrap();
        assert_eq!(
            status.ty,
            FieldType::Enum(vec!["lead".into(), "customer".into()])
        );
        assert_eq!(status.default.as_deref(), Some("lead"));

        let company = entity.field("company").unwrap();
        assert!(matches!(
            &company.ty,
            FieldType::Ref(t) if t.entity == "Company" && t.schema.is_none()
        ));
    }

    #[test]
    fn parse_action_steps() {
        let entity = Entity::from_yaml(CONTACT).unwrap();
        let promote = entity.action("promote").unwrap();
        assert_eq!(promote.requires.as_deref(), Some("status = 'lead'"));
        assert_eq!(promote.steps.len(), 3);

        assert_eq!(
            promote.steps[0],
            Step::Validate {
                condition: "status = 'lead'".into(),
                error: Some("not_a_lead".into()),
            }
        );
        assert_eq!(
            promote.steps[1],
            Step::Update {
                entity: "Contact".into(),
                assignments: vec![Assignment {
                    field: "status".into(),
                    value: "'customer'".into(),
                }],
            }
        );
        assert_eq!(
            promote.steps[2],
            Step::Notify {
                recipient: "owner".into(),
                message: "contact promoted".into(),
            }
        );
    }

    #[test]
    fn parse_dict_field_form() {
        let yaml = r#"
entity: Invoice
fields:
  amount:
    type: decimal
    nullable: false
  note:
    type: text
    default: none
"#;
        let entity = Entity::from_yaml(yaml).unwrap();
        let amount = entity.field("amount").unwrap();
        assert_eq!(amount.ty, FieldType::Decimal);
        assert!(!amount.nullable);
        assert_eq!(entity.field("note").unwrap().default.as_deref(), Some("none"));
        assert_eq!(entity.schema, "public");
    }

    #[test]
    fn unknown_type_is_an_error() {
        let yaml = "entity: X\nfields:\n  a: varchar\n";
        let err = Entity::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("unknown field type"));
    }

    #[test]
    fn empty_enum_is_an_error() {
        let yaml = "entity: X\nfields:\n  a: enum()\n";
        assert!(Entity::from_yaml(yaml).is_err());
    }

    #[test]
    fn malformed_set_clause_is_an_error() {
        let yaml = r#"
entity: X
fields:
  a: text
actions:
  - name: bad
    steps:
      - update: "X WHERE a = 1"
"#;
        let err = Entity::from_yaml(yaml).unwrap_err();
        assert!(err.to_string().contains("Entity SET"));
    }

    #[test]
    fn yaml_round_trip_preserves_model() {
        let entity = Entity::from_yaml(CONTACT).unwrap();
        let rendered = entity.to_yaml().unwrap();
        let reparsed = Entity::from_yaml(&rendered).unwrap();
        assert_eq!(entity, reparsed);
    }

    #[test]
    fn hash_is_stable() {
        let a = Entity::from_yaml(CONTACT).unwrap();
        let b = Entity::from_yaml(CONTACT).unwrap();
        assert_eq!(a.hash(), b.hash());
        assert!(a.hash().starts_with("sha256:"));
    }

    #[test]
    fn cross_schema_reference() {
        let yaml = "entity: X\nfields:\n  org: ref(management.Organization)\n";
        let entity = Entity::from_yaml(yaml).unwrap();
        match &entity.field("org").unwrap().ty {
            FieldType::Ref(t) => {
                assert_eq!(t.schema.as_deref(), Some("management"));
                assert_eq!(t.entity, "Organization");
            }
            other => panic!("expected ref, got {:?}", other),
        }
    }
}
