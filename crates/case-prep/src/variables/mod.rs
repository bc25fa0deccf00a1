//! Variable metadata.
//!
//! Every column of a case table is a declared variable. A [`VariableSpec`]
//! carries the semantic type of the variable, whether a missing value
//! disqualifies the whole case, and where the values come from: the source
//! file, or a derivation hook run before or after coercion.
//!
//! The [`VariableRegistry`] keeps the declaration order, which is also the
//! order in which derivation hooks run.

mod metadata;

pub use metadata::{DerivationDef, DerivationOp, RegistryDef, VariableDef, VariableTypeDef};

use crate::error::{CasePrepError, Result};
use crate::warnings::WarningSink;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A function computing one derived column from the table built so far.
///
/// Hooks may record data-quality warnings on the sink. The returned series
/// must have one value per row of the table; its name is replaced by the
/// name of the variable it is attached to.
pub type DerivationHook =
    Arc<dyn Fn(&DataFrame, &mut WarningSink) -> Result<Series> + Send + Sync>;

/// A raw value a category label is matched against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LabelValue {
    Number(f64),
    Text(String),
}

impl From<f64> for LabelValue {
    fn from(value: f64) -> Self {
        LabelValue::Number(value)
    }
}

impl From<i64> for LabelValue {
    fn from(value: i64) -> Self {
        LabelValue::Number(value as f64)
    }
}

impl From<&str> for LabelValue {
    fn from(value: &str) -> Self {
        LabelValue::Text(value.to_string())
    }
}

impl fmt::Display for LabelValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LabelValue::Number(n) => write!(f, "{:?}", n),
            LabelValue::Text(s) => f.write_str(s),
        }
    }
}

/// One entry of a category: a raw value and its canonical label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryLabel {
    pub value: LabelValue,
    pub label: String,
}

/// The declared labels of a category variable.
///
/// Ordered categories are ordinal: the position of a label is its rank.
/// Nominal categories keep declaration order only for display.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryLabels {
    labels: Vec<CategoryLabel>,
    ordered: bool,
}

impl CategoryLabels {
    /// Create ordinal labels; declaration order is rank order.
    pub fn ordered<I, V, L>(labels: I) -> Self
    where
        I: IntoIterator<Item = (V, L)>,
        V: Into<LabelValue>,
        L: Into<String>,
    {
        Self::build(labels, true)
    }

    /// Create nominal labels.
    pub fn nominal<I, V, L>(labels: I) -> Self
    where
        I: IntoIterator<Item = (V, L)>,
        V: Into<LabelValue>,
        L: Into<String>,
    {
        Self::build(labels, false)
    }

    fn build<I, V, L>(labels: I, ordered: bool) -> Self
    where
        I: IntoIterator<Item = (V, L)>,
        V: Into<LabelValue>,
        L: Into<String>,
    {
        Self {
            labels: labels
                .into_iter()
                .map(|(value, label)| CategoryLabel {
                    value: value.into(),
                    label: label.into(),
                })
                .collect(),
            ordered,
        }
    }

    pub fn is_ordered(&self) -> bool {
        self.ordered
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CategoryLabel> {
        self.labels.iter()
    }

    /// Canonical label for a numeric raw value.
    pub fn lookup_number(&self, raw: f64) -> Option<&str> {
        self.labels.iter().find_map(|entry| match entry.value {
            LabelValue::Number(n) if n == raw => Some(entry.label.as_str()),
            _ => None,
        })
    }

    /// Canonical label for a textual raw value.
    pub fn lookup_text(&self, raw: &str) -> Option<&str> {
        self.labels.iter().find_map(|entry| match &entry.value {
            LabelValue::Text(t) if t == raw => Some(entry.label.as_str()),
            _ => None,
        })
    }

    /// Distinct canonical labels in declaration order.
    pub fn categories(&self) -> Vec<&str> {
        let mut categories: Vec<&str> = Vec::with_capacity(self.labels.len());
        for entry in &self.labels {
            if !categories.contains(&entry.label.as_str()) {
                categories.push(entry.label.as_str());
            }
        }
        categories
    }

    /// Rank of a canonical label, only meaningful for ordered categories.
    pub fn rank(&self, label: &str) -> Option<usize> {
        if !self.ordered {
            return None;
        }
        self.categories().iter().position(|category| *category == label)
    }

    /// Column dtype of the coerced variable.
    ///
    /// Ordered labels give an `Enum` whose physical order is rank order;
    /// nominal labels give a `Categorical`.
    pub fn dtype(&self) -> Result<DataType> {
        if self.ordered {
            let frozen = FrozenCategories::new(self.categories())?;
            Ok(DataType::from_frozen_categories(frozen))
        } else {
            Ok(DataType::from_categories(Categories::global()))
        }
    }
}

/// Semantic type of a variable.
#[derive(Debug, Clone, PartialEq)]
pub enum VarType {
    /// Integer counts or codes; parsed like `Float`, then cast to `Int64`
    /// once mandatory checks pass.
    Int,
    /// Continuous measures; parsed as `Float64`, unparsable values become missing.
    Float,
    /// 0/1 flags; anything else becomes missing.
    Bool,
    /// Coded answers mapped through their labels.
    Category(CategoryLabels),
    /// Free text; left untouched.
    Text,
}

impl VarType {
    pub fn name(&self) -> &'static str {
        match self {
            VarType::Int => "int",
            VarType::Float => "float",
            VarType::Bool => "bool",
            VarType::Category(_) => "category",
            VarType::Text => "text",
        }
    }
}

/// When a derived variable is computed relative to coercion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DerivationPhase {
    /// Before coercion and mandatory checks; sees raw values.
    Pre,
    /// After coercion and mandatory checks; sees cleaned values.
    Post,
}

/// Where the values of a variable come from.
#[derive(Clone)]
pub enum VariableSource {
    /// Read from the source file.
    Raw,
    /// Computed by a hook.
    Derived {
        phase: DerivationPhase,
        hook: DerivationHook,
    },
}

impl fmt::Debug for VariableSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VariableSource::Raw => f.write_str("Raw"),
            VariableSource::Derived { phase, .. } => f
                .debug_struct("Derived")
                .field("phase", phase)
                .finish_non_exhaustive(),
        }
    }
}

/// Declaration of a single variable.
#[derive(Debug, Clone)]
pub struct VariableSpec {
    name: String,
    var_type: VarType,
    mandatory: bool,
    source: VariableSource,
}

impl VariableSpec {
    pub fn new(name: impl Into<String>, var_type: VarType) -> Self {
        Self {
            name: name.into(),
            var_type,
            mandatory: false,
            source: VariableSource::Raw,
        }
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::new(name, VarType::Int)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::new(name, VarType::Float)
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::new(name, VarType::Bool)
    }

    pub fn text(name: impl Into<String>) -> Self {
        Self::new(name, VarType::Text)
    }

    pub fn category(name: impl Into<String>, labels: CategoryLabels) -> Self {
        Self::new(name, VarType::Category(labels))
    }

    /// Mark the variable as mandatory: cases missing it are dropped.
    pub fn mandatory(mut self) -> Self {
        self.mandatory = true;
        self
    }

    /// Compute the variable with `hook` instead of reading it.
    pub fn derived(mut self, phase: DerivationPhase, hook: DerivationHook) -> Self {
        self.source = VariableSource::Derived { phase, hook };
        self
    }

    pub fn derived_pre(self, hook: DerivationHook) -> Self {
        self.derived(DerivationPhase::Pre, hook)
    }

    pub fn derived_post(self, hook: DerivationHook) -> Self {
        self.derived(DerivationPhase::Post, hook)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn var_type(&self) -> &VarType {
        &self.var_type
    }

    pub fn is_mandatory(&self) -> bool {
        self.mandatory
    }

    pub fn source(&self) -> &VariableSource {
        &self.source
    }

    /// Whether the variable is read from the source file.
    pub fn is_raw(&self) -> bool {
        matches!(self.source, VariableSource::Raw)
    }

    /// The hook for `phase`, if the variable is derived in that phase.
    pub fn hook_for(&self, phase: DerivationPhase) -> Option<&DerivationHook> {
        match &self.source {
            VariableSource::Derived { phase: p, hook } if *p == phase => Some(hook),
            _ => None,
        }
    }
}

/// Ordered collection of variable declarations.
#[derive(Debug, Clone, Default)]
pub struct VariableRegistry {
    variables: Vec<VariableSpec>,
    index: HashMap<String, usize>,
}

impl VariableRegistry {
    /// Build a registry, rejecting duplicate names.
    pub fn new<I>(variables: I) -> Result<Self>
    where
        I: IntoIterator<Item = VariableSpec>,
    {
        let mut registry = Self::default();
        for spec in variables {
            registry.push(spec)?;
        }
        Ok(registry)
    }

    /// Append a declaration at the end of the registry.
    pub fn push(&mut self, spec: VariableSpec) -> Result<()> {
        if spec.name.is_empty() {
            return Err(CasePrepError::InvalidRegistry(
                "variable names cannot be empty".to_string(),
            ));
        }
        if self.index.contains_key(&spec.name) {
            return Err(CasePrepError::InvalidRegistry(format!(
                "variable '{}' declared twice",
                spec.name
            )));
        }
        if let VarType::Category(labels) = &spec.var_type
            && labels.is_empty()
        {
            return Err(CasePrepError::InvalidRegistry(format!(
                "category variable '{}' has no labels",
                spec.name
            )));
        }
        self.index.insert(spec.name.clone(), self.variables.len());
        self.variables.push(spec);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&VariableSpec> {
        self.index.get(name).map(|&i| &self.variables[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &VariableSpec> {
        self.variables.iter()
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    /// Names of the variables read from the source file, in declaration order.
    pub fn raw_variable_names(&self) -> Vec<&str> {
        self.variables
            .iter()
            .filter(|spec| spec.is_raw())
            .map(|spec| spec.name())
            .collect()
    }

    /// Derived variables of one phase, in declaration order.
    pub fn derived_in(&self, phase: DerivationPhase) -> impl Iterator<Item = (&VariableSpec, &DerivationHook)> {
        self.variables
            .iter()
            .filter_map(move |spec| spec.hook_for(phase).map(|hook| (spec, hook)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_hook() -> DerivationHook {
        Arc::new(|df: &DataFrame, _: &mut WarningSink| {
            Ok(Series::new_null(PlSmallStr::EMPTY, df.height()))
        })
    }

    #[test]
    fn test_category_lookup() {
        let labels = CategoryLabels::nominal([(1.0, "Hombre"), (2.0, "Mujer")]);
        assert_eq!(labels.lookup_number(1.0), Some("Hombre"));
        assert_eq!(labels.lookup_number(3.0), None);
        assert_eq!(labels.lookup_text("1"), None);
        assert!(!labels.is_ordered());
        assert_eq!(labels.rank("Mujer"), None);
    }

    #[test]
    fn test_ordered_category_rank() {
        let labels = CategoryLabels::ordered([("L", "Leve"), ("M", "Moderado"), ("G", "Grave")]);
        assert!(labels.is_ordered());
        assert_eq!(labels.lookup_text("M"), Some("Moderado"));
        assert_eq!(labels.rank("Grave"), Some(2));
        assert_eq!(labels.rank("Otro"), None);
    }

    #[test]
    fn test_category_dtype_follows_ordering() {
        let ordered = CategoryLabels::ordered([
            (LabelValue::from("L"), "Leve"),
            (LabelValue::from(1.0), "Leve"),
            (LabelValue::from("G"), "Grave"),
        ]);
        assert_eq!(ordered.categories(), vec!["Leve", "Grave"]);
        assert_eq!(ordered.rank("Grave"), Some(1));
        assert!(matches!(ordered.dtype().unwrap(), DataType::Enum(..)));

        let nominal = CategoryLabels::nominal([(1.0, "Hombre"), (2.0, "Mujer")]);
        assert!(matches!(nominal.dtype().unwrap(), DataType::Categorical(..)));
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let result = VariableRegistry::new([VariableSpec::int("ID"), VariableSpec::float("ID")]);
        assert!(matches!(result, Err(CasePrepError::InvalidRegistry(_))));
    }

    #[test]
    fn test_registry_rejects_empty_category() {
        let result = VariableRegistry::new([VariableSpec::category(
            "SEXO",
            CategoryLabels::nominal(Vec::<(f64, &str)>::new()),
        )]);
        assert!(matches!(result, Err(CasePrepError::InvalidRegistry(_))));
    }

    #[test]
    fn test_raw_and_derived_partition() {
        let registry = VariableRegistry::new([
            VariableSpec::int("ID").mandatory(),
            VariableSpec::bool("A"),
            VariableSpec::bool("AB").derived_pre(noop_hook()),
            VariableSpec::bool("B"),
            VariableSpec::float("SCORE").derived_post(noop_hook()),
        ])
        .unwrap();

        assert_eq!(registry.raw_variable_names(), vec!["ID", "A", "B"]);

        let pre: Vec<&str> = registry
            .derived_in(DerivationPhase::Pre)
            .map(|(spec, _)| spec.name())
            .collect();
        let post: Vec<&str> = registry
            .derived_in(DerivationPhase::Post)
            .map(|(spec, _)| spec.name())
            .collect();
        assert_eq!(pre, vec!["AB"]);
        assert_eq!(post, vec!["SCORE"]);
        assert!(registry.get("ID").unwrap().is_mandatory());
        assert!(!registry.get("AB").unwrap().is_raw());
    }

    #[test]
    fn test_label_value_display() {
        assert_eq!(LabelValue::Number(1.0).to_string(), "1.0");
        assert_eq!(LabelValue::from("x").to_string(), "x");
    }
}
