//! The change spec: a declarative contract for one code transformation.
//!
//! Specs arrive as JSON, are validated once, and are immutable afterwards.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::error::{Result, WardenError};
use crate::types::{Language, RiskLevel};

lazy_static! {
    static ref SPEC_ID_RE: Regex = Regex::new(r"^CS-[0-9]+$").unwrap();
}

/// AST-level operation carried by a patch.
///
/// Only `RenameSymbol` and `ReplaceApi` have behavior today; the rest are
/// accepted by the schema and rejected at apply time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AstOp {
    #[serde(rename = "renameSymbol")]
    RenameSymbol,
    #[serde(rename = "replaceAPI")]
    ReplaceApi,
    #[serde(rename = "moveModule")]
    MoveModule,
    #[serde(rename = "insertNode")]
    InsertNode,
    #[serde(rename = "deleteNode")]
    DeleteNode,
    #[serde(rename = "editString")]
    EditString,
    #[serde(rename = "editRegex")]
    EditRegex,
}

impl AstOp {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RenameSymbol => "renameSymbol",
            Self::ReplaceApi => "replaceAPI",
            Self::MoveModule => "moveModule",
            Self::InsertNode => "insertNode",
            Self::DeleteNode => "deleteNode",
            Self::EditString => "editString",
            Self::EditRegex => "editRegex",
        }
    }
}

/// Operation-specific payload of a patch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PatchDetails {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_property: Option<String>,

    /// Renames applied to object-literal argument keys, old name to new.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args_map: Option<HashMap<String, String>>,
}

/// One AST operation targeting one path or glob.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Patch {
    pub path: String,

    pub ast_op: AstOp,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,

    #[serde(default)]
    pub details: PatchDetails,
}

/// A post-condition to verify after all patches are applied.
///
/// `kind` is kept as free text: an unrecognized kind must surface as a
/// failed invariant result, not a deserialization error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InvariantSpec {
    pub name: String,

    #[serde(rename = "type")]
    pub kind: String,

    pub spec: String,
}

/// Test strategy for the verification stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStrategy {
    Augment,
    Generate,
    Hybrid,
}

/// How the change is to be tested, including the mutation-score gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestPlan {
    pub strategy: TestStrategy,

    #[serde(default)]
    pub targets: Vec<String>,

    pub mutation_threshold: f64,
}

/// Declarative description of a code transformation and its post-conditions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeSpec {
    pub id: String,

    pub intent: String,

    pub scope: Vec<String>,

    pub language: Language,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub assumptions: Vec<String>,

    pub patches: Vec<Patch>,

    pub invariants: Vec<InvariantSpec>,

    pub tests: TestPlan,

    #[serde(default)]
    pub risk: RiskLevel,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telemetry: Option<HashMap<String, Value>>,
}

impl ChangeSpec {
    /// Parse and validate a spec from JSON.
    pub fn from_json(value: &Value) -> Result<Self> {
        let spec: ChangeSpec = serde_json::from_value(value.clone())
            .map_err(|e| WardenError::InvalidChangeSpec(e.to_string()))?;
        spec.validate()?;
        Ok(spec)
    }

    /// Enforce the schema invariants that serde alone cannot express.
    pub fn validate(&self) -> Result<()> {
        if !SPEC_ID_RE.is_match(&self.id) {
            return Err(WardenError::InvalidChangeSpec(format!(
                "id {:?} does not match CS-<digits>",
                self.id
            )));
        }
        if self.scope.is_empty() {
            return Err(WardenError::InvalidChangeSpec("scope must not be empty".into()));
        }
        if !(0.0..=1.0).contains(&self.tests.mutation_threshold) {
            return Err(WardenError::InvalidChangeSpec(format!(
                "mutationThreshold {} outside [0, 1]",
                self.tests.mutation_threshold
            )));
        }
        for (idx, patch) in self.patches.iter().enumerate() {
            patch
                .validate()
                .map_err(|e| WardenError::InvalidChangeSpec(format!("patch {idx}: {e}")))?;
        }
        Ok(())
    }
}

impl Patch {
    /// Well-formedness for the patch's operation. Unsupported operations are
    /// schema-valid here; they fail later, at apply time.
    fn validate(&self) -> std::result::Result<(), String> {
        if self.path.trim().is_empty() {
            return Err("path must not be empty".into());
        }
        match self.ast_op {
            AstOp::RenameSymbol => {
                if self.selector.is_none() {
                    return Err("renameSymbol requires a selector".into());
                }
                if self.details.new_name.as_deref().map_or(true, str::is_empty) {
                    return Err("renameSymbol requires details.newName".into());
                }
            }
            AstOp::ReplaceApi => {
                if self.selector.is_none() {
                    return Err("replaceAPI requires a selector".into());
                }
                let has_property = self.details.new_property.is_some();
                let has_args = self
                    .details
                    .args_map
                    .as_ref()
                    .map_or(false, |m| !m.is_empty());
                if !has_property && !has_args {
                    return Err("replaceAPI requires details.newProperty or details.argsMap".into());
                }
            }
            _ => {}
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn minimal_spec() -> Value {
        json!({
            "id": "CS-1001",
            "intent": "Rename UserId to AccountId",
            "scope": ["src/**/*.ts"],
            "language": "typescript",
            "patches": [{
                "path": "src/model.ts",
                "astOp": "renameSymbol",
                "selector": "Identifier[name='UserId']",
                "details": { "newName": "AccountId" }
            }],
            "invariants": [
                { "name": "compiles", "type": "typecheck", "spec": "tsc --noEmit" }
            ],
            "tests": { "strategy": "augment", "targets": ["src"], "mutationThreshold": 0.6 }
        })
    }

    #[test]
    fn accepts_minimal_valid_spec() {
        let spec = ChangeSpec::from_json(&minimal_spec()).unwrap();
        assert_eq!(spec.id, "CS-1001");
        assert_eq!(spec.risk, RiskLevel::Medium);
        assert_eq!(spec.patches[0].ast_op, AstOp::RenameSymbol);
    }

    #[test]
    fn rejects_bad_id() {
        let mut value = minimal_spec();
        value["id"] = json!("SPEC-1");
        let err = ChangeSpec::from_json(&value).unwrap_err();
        assert_eq!(err.code(), "InvalidChangeSpec");
    }

    #[test]
    fn rejects_empty_scope() {
        let mut value = minimal_spec();
        value["scope"] = json!([]);
        assert!(ChangeSpec::from_json(&value).is_err());
    }

    #[test]
    fn rejects_out_of_range_threshold() {
        let mut value = minimal_spec();
        value["tests"]["mutationThreshold"] = json!(1.5);
        assert!(ChangeSpec::from_json(&value).is_err());
    }

    #[test]
    fn rejects_rename_without_new_name() {
        let mut value = minimal_spec();
        value["patches"][0]["details"] = json!({});
        assert!(ChangeSpec::from_json(&value).is_err());
    }

    #[test]
    fn unknown_invariant_kind_is_schema_valid() {
        let mut value = minimal_spec();
        value["invariants"][0]["type"] = json!("quantumCheck");
        assert!(ChangeSpec::from_json(&value).is_ok());
    }

    #[test]
    fn ast_op_wire_names_are_stable() {
        let op: AstOp = serde_json::from_value(json!("replaceAPI")).unwrap();
        assert_eq!(op, AstOp::ReplaceApi);
        assert_eq!(serde_json::to_value(AstOp::RenameSymbol).unwrap(), json!("renameSymbol"));
    }
}
