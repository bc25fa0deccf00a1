//! JSON variable metadata.
//!
//! Lets a registry be authored as a file instead of code. Derivations are
//! restricted to the built-in combinators, referenced by name.

use super::{CategoryLabel, CategoryLabels, DerivationHook, DerivationPhase, VarType, VariableRegistry, VariableSpec};
use crate::combinators::{self, DEFAULT_NA_VALUES, OnConflict};
use crate::error::{CasePrepError, Result, ResultExt};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level metadata document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryDef {
    pub variables: Vec<VariableDef>,
}

/// Declared type as written in metadata files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableTypeDef {
    Int,
    Float,
    Bool,
    Category,
    Text,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableDef {
    pub name: String,
    #[serde(rename = "type")]
    pub var_type: VariableTypeDef,
    #[serde(default)]
    pub mandatory: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<CategoryLabel>,
    #[serde(default)]
    pub ordered: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derive: Option<DerivationDef>,
}

/// A derivation through one of the built-in combinators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivationDef {
    pub phase: DerivationPhase,
    #[serde(flatten)]
    pub op: DerivationOp,
    /// Overrides the combinator's default sentinels (98, 99).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub na_values: Option<Vec<f64>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DerivationOp {
    Combine {
        vars: Vec<String>,
        #[serde(default)]
        on_conflict: Option<ConflictDef>,
    },
    CombineBool {
        vars: Vec<String>,
    },
    LogicalOr {
        vars: Vec<String>,
    },
    LogicalAnd {
        vars: Vec<String>,
    },
    MultiboolToEnum {
        vars: Vec<String>,
    },
}

/// Conflict policy of a `combine` derivation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConflictDef {
    Value(f64),
    Rule(ConflictRule),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictRule {
    First,
    Second,
}

impl DerivationDef {
    fn into_hook(self, variable: &str) -> Result<DerivationHook> {
        let na_values = self.na_values.unwrap_or_else(|| DEFAULT_NA_VALUES.to_vec());
        let hook = match self.op {
            DerivationOp::Combine { vars, on_conflict } => {
                let [a, b] = expect_pair(variable, vars)?;
                let on_conflict = match on_conflict {
                    None => OnConflict::default(),
                    Some(ConflictDef::Value(v)) => OnConflict::value(v),
                    Some(ConflictDef::Rule(ConflictRule::First)) => OnConflict::first(),
                    Some(ConflictDef::Rule(ConflictRule::Second)) => OnConflict::second(),
                };
                combinators::combine_variables(a, b, on_conflict, na_values)
            }
            DerivationOp::CombineBool { vars } => {
                let [a, b] = expect_pair(variable, vars)?;
                combinators::combine_variables_bool(a, b, na_values)
            }
            DerivationOp::LogicalOr { vars } => {
                expect_at_least(variable, &vars, 2)?;
                combinators::logical_or(vars)
            }
            DerivationOp::LogicalAnd { vars } => {
                expect_at_least(variable, &vars, 2)?;
                combinators::logical_and(vars)
            }
            DerivationOp::MultiboolToEnum { vars } => {
                expect_at_least(variable, &vars, 1)?;
                combinators::multibool_to_enum(vars, na_values)
            }
        };
        Ok(hook)
    }
}

fn expect_pair(variable: &str, vars: Vec<String>) -> Result<[String; 2]> {
    let count = vars.len();
    <[String; 2]>::try_from(vars).map_err(|_| {
        CasePrepError::InvalidRegistry(format!(
            "derivation of '{variable}' needs exactly 2 variables, got {count}"
        ))
    })
}

fn expect_at_least(variable: &str, vars: &[String], min: usize) -> Result<()> {
    if vars.len() < min {
        return Err(CasePrepError::InvalidRegistry(format!(
            "derivation of '{variable}' needs at least {min} variables, got {}",
            vars.len()
        )));
    }
    Ok(())
}

impl VariableDef {
    fn into_spec(self) -> Result<VariableSpec> {
        if !self.labels.is_empty() && self.var_type != VariableTypeDef::Category {
            return Err(CasePrepError::InvalidRegistry(format!(
                "labels given for non-category variable '{}'",
                self.name
            )));
        }

        let var_type = match self.var_type {
            VariableTypeDef::Int => VarType::Int,
            VariableTypeDef::Float => VarType::Float,
            VariableTypeDef::Bool => VarType::Bool,
            VariableTypeDef::Text => VarType::Text,
            VariableTypeDef::Category => {
                let pairs = self.labels.into_iter().map(|l| (l.value, l.label));
                VarType::Category(if self.ordered {
                    CategoryLabels::ordered(pairs)
                } else {
                    CategoryLabels::nominal(pairs)
                })
            }
        };

        let mut spec = VariableSpec::new(self.name, var_type);
        if self.mandatory {
            spec = spec.mandatory();
        }
        if let Some(derive) = self.derive {
            let phase = derive.phase;
            let hook = derive.into_hook(spec.name())?;
            spec = spec.derived(phase, hook);
        }
        Ok(spec)
    }
}

impl RegistryDef {
    pub fn into_registry(self) -> Result<VariableRegistry> {
        let specs = self
            .variables
            .into_iter()
            .map(VariableDef::into_spec)
            .collect::<Result<Vec<_>>>()?;
        VariableRegistry::new(specs)
    }
}

impl VariableRegistry {
    /// Parse a registry from a JSON metadata document.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let def: RegistryDef = serde_json::from_str(json)?;
        def.into_registry()
    }

    /// Read a registry from a JSON metadata file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| {
            CasePrepError::FileUnreadable {
                path: path.to_path_buf(),
                source,
            }
        })?;
        Self::from_json_str(&content)
            .context(format!("Loading variable metadata from {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::variables::LabelValue;

    const METADATA: &str = r#"{
        "variables": [
            { "name": "ID", "type": "int", "mandatory": true },
            { "name": "SEXO", "type": "category",
              "labels": [ { "value": 1, "label": "Hombre" }, { "value": 2, "label": "Mujer" } ] },
            { "name": "GRADO", "type": "category", "ordered": true,
              "labels": [ { "value": "L", "label": "Leve" }, { "value": "G", "label": "Grave" } ] },
            { "name": "FUMA_A", "type": "bool" },
            { "name": "FUMA_B", "type": "bool" },
            { "name": "FUMA", "type": "bool",
              "derive": { "phase": "pre", "op": "combine_bool", "vars": ["FUMA_A", "FUMA_B"] } },
            { "name": "RIESGO", "type": "float",
              "derive": { "phase": "post", "op": "logical_or", "vars": ["FUMA_A", "FUMA_B"] } }
        ]
    }"#;

    #[test]
    fn test_parse_registry() {
        let registry = VariableRegistry::from_json_str(METADATA).unwrap();
        assert_eq!(registry.len(), 7);
        assert_eq!(registry.raw_variable_names(), vec!["ID", "SEXO", "GRADO", "FUMA_A", "FUMA_B"]);
        assert!(registry.get("ID").unwrap().is_mandatory());

        match registry.get("SEXO").unwrap().var_type() {
            VarType::Category(labels) => {
                assert!(!labels.is_ordered());
                assert_eq!(labels.lookup_number(2.0), Some("Mujer"));
            }
            other => panic!("unexpected type {:?}", other),
        }
        match registry.get("GRADO").unwrap().var_type() {
            VarType::Category(labels) => {
                assert!(labels.is_ordered());
                assert_eq!(labels.iter().next().unwrap().value, LabelValue::Text("L".to_string()));
            }
            other => panic!("unexpected type {:?}", other),
        }
        assert!(registry.get("FUMA").unwrap().hook_for(DerivationPhase::Pre).is_some());
        assert!(registry.get("RIESGO").unwrap().hook_for(DerivationPhase::Post).is_some());
    }

    #[test]
    fn test_combine_requires_two_variables() {
        let json = r#"{ "variables": [
            { "name": "X", "type": "float",
              "derive": { "phase": "pre", "op": "combine", "vars": ["A"] } }
        ] }"#;
        let err = VariableRegistry::from_json_str(json).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_REGISTRY");
    }

    #[test]
    fn test_conflict_policies_parse() {
        let json = r#"{ "variables": [
            { "name": "X", "type": "float",
              "derive": { "phase": "pre", "op": "combine", "vars": ["A", "B"], "on_conflict": "first" } },
            { "name": "Y", "type": "float",
              "derive": { "phase": "pre", "op": "combine", "vars": ["A", "B"], "on_conflict": 0.0,
                          "na_values": [9.0] } }
        ] }"#;
        let registry = VariableRegistry::from_json_str(json).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_labels_on_non_category_rejected() {
        let json = r#"{ "variables": [
            { "name": "X", "type": "int", "labels": [ { "value": 1, "label": "uno" } ] }
        ] }"#;
        assert!(VariableRegistry::from_json_str(json).is_err());
    }

    #[test]
    fn test_from_missing_path() {
        let err = VariableRegistry::from_path("/definitely/not/here.json").unwrap_err();
        assert_eq!(err.error_code(), "FILE_UNREADABLE");
    }
}
