//! Test specification model
//!
//! The synthesizer produces these, the dialect renderers consume them, and
//! the reverse extractors recover them from existing test files. Keeping
//! one shared model means coverage analysis can compare synthesized and
//! recovered tests structurally.

use crate::error::{Error, Result};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// All synthesized or recovered tests for one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TestSpec {
    pub entity: String,
    pub schema: String,
    pub scenarios: Vec<TestScenario>,
}

/// One test scenario; every assertion is independently evaluable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TestScenario {
    pub category: Category,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Target action for `Action`-category scenarios
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    #[serde(default)]
    pub setup: Vec<TestStep>,
    #[serde(default)]
    pub steps: Vec<TestStep>,
    pub assertions: Vec<Assertion>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Structure,
    Crud,
    Action,
    Integration,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Structure,
        Category::Crud,
        Category::Action,
        Category::Integration,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Category::Structure => "structure",
            Category::Crud => "crud",
            Category::Action => "action",
            Category::Integration => "integration",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A setup or exercise step, expressed as one executable statement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TestStep {
    #[serde(default)]
    pub description: String,
    pub operation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Assertion {
    pub kind: AssertionKind,
    /// What is being checked: a table, column, field, or status target
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AssertionKind {
    /// A table, column, or row exists
    Existence,
    /// A value equals the expected one
    Equality,
    /// The step raises / returns a failure status
    ErrorThrown,
    /// A value is not null
    NonNull,
    /// A column has the expected type
    TypeMatch,
}

impl TestSpec {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_norway::from_str(yaml).map_err(|e| Error::SpecParse(e.to_string()))
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_norway::to_string(self).map_err(|e| Error::SpecParse(e.to_string()))
    }

    /// Scenarios of one category, in declaration order
    pub fn scenarios_in(&self, category: Category) -> impl Iterator<Item = &TestScenario> {
        self.scenarios.iter().filter(move |s| s.category == category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TestSpec {
        TestSpec {
            entity: "Contact".into(),
            schema: "crm".into(),
            scenarios: vec![TestScenario {
                category: Category::Action,
                name: "promote_happy_path".into(),
                description: "promote succeeds on a satisfying row".into(),
                action: Some("promote".into()),
                setup: vec![TestStep {
                    description: "seed a lead".into(),
                    operation: "INSERT INTO crm.tb_contact (email) VALUES ('a@b.c')".into(),
                }],
                steps: vec![TestStep {
                    description: "run the action".into(),
                    operation: "SELECT crm.contact_promote(:id)".into(),
                }],
                assertions: vec![Assertion {
                    kind: AssertionKind::Equality,
                    target: "status".into(),
                    expected: Some("success".into()),
                    message: "promote returns success".into(),
                }],
            }],
        }
    }

    #[test]
    fn yaml_round_trip() {
        let spec = sample();
        let yaml = spec.to_yaml().unwrap();
        let back = TestSpec::from_yaml(&yaml).unwrap();
        assert_eq!(spec, back);
    }

    #[test]
    fn category_filter() {
        let spec = sample();
        assert_eq!(spec.scenarios_in(Category::Action).count(), 1);
        assert_eq!(spec.scenarios_in(Category::Crud).count(), 0);
    }

    #[test]
    fn categories_serialize_lowercase() {
        let yaml = serde_norway::to_string(&Category::Integration).unwrap();
        assert_eq!(yaml.trim(), "integration");
    }
}
