//! Derivation hooks combining several variables into one.
//!
//! Each factory returns a [`DerivationHook`] that can be attached to a
//! [`VariableSpec`](crate::VariableSpec). Inputs are read as floats; a value
//! is missing when it is null, NaN, or one of the `na_values` sentinels
//! (the combinator-level codes for "does not know / does not answer").
//! Disagreements that cannot be resolved are recorded on the warning sink
//! against the row that produced them.

use crate::error::{CasePrepError, Result};
use crate::utils::{float_values, format_value};
use crate::variables::DerivationHook;
use crate::warnings::{CaseRow, WarningSink};
use polars::prelude::*;
use std::fmt;
use std::sync::Arc;

/// Sentinel codes treated as missing by the combinators.
pub const DEFAULT_NA_VALUES: [f64; 2] = [98.0, 99.0];

/// Resolves two conflicting values; `None` means unresolved.
pub type ConflictResolver = Arc<dyn Fn(f64, f64) -> Option<f64> + Send + Sync>;

/// What [`combine_variables`] yields when both inputs are present but differ.
#[derive(Clone)]
pub enum OnConflict {
    /// A fixed value; `None` leaves the conflict unresolved.
    Value(Option<f64>),
    /// A function of both values.
    Resolve(ConflictResolver),
}

impl Default for OnConflict {
    fn default() -> Self {
        OnConflict::Value(None)
    }
}

impl fmt::Debug for OnConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnConflict::Value(v) => f.debug_tuple("Value").field(v).finish(),
            OnConflict::Resolve(_) => f.write_str("Resolve(..)"),
        }
    }
}

impl OnConflict {
    /// Resolve every conflict to `value`. NaN counts as unresolved.
    pub fn value(value: f64) -> Self {
        OnConflict::Value(Some(value))
    }

    pub fn resolve<F>(resolver: F) -> Self
    where
        F: Fn(f64, f64) -> Option<f64> + Send + Sync + 'static,
    {
        OnConflict::Resolve(Arc::new(resolver))
    }

    /// Keep the value of the first variable.
    pub fn first() -> Self {
        Self::resolve(|first, _| Some(first))
    }

    /// Keep the value of the second variable.
    pub fn second() -> Self {
        Self::resolve(|_, second| Some(second))
    }

    /// The first value unless it is zero, then the second.
    pub fn truthy() -> Self {
        Self::resolve(|first, second| Some(if first != 0.0 { first } else { second }))
    }

    fn apply(&self, first: f64, second: f64) -> Option<f64> {
        let resolved = match self {
            OnConflict::Value(value) => *value,
            OnConflict::Resolve(resolver) => resolver(first, second),
        };
        resolved.filter(|v| !v.is_nan())
    }
}

fn is_na(value: Option<f64>, na_values: &[f64]) -> bool {
    match value {
        Some(v) => v.is_nan() || na_values.contains(&v),
        None => true,
    }
}

/// Merge two variables measuring the same thing.
///
/// Per row: both missing gives missing, one missing gives the other, equal
/// values give that value. Otherwise `on_conflict` decides, and a conflict
/// left missing is recorded as `Valores contradictorios: a=v1 vs. b=v2`.
pub fn combine_variables(
    first: impl Into<String>,
    second: impl Into<String>,
    on_conflict: OnConflict,
    na_values: impl Into<Vec<f64>>,
) -> DerivationHook {
    let first = first.into();
    let second = second.into();
    let na_values = na_values.into();

    Arc::new(move |df: &DataFrame, sink: &mut WarningSink| {
        let left = float_values(df, &first)?;
        let right = float_values(df, &second)?;

        let mut combined = Vec::with_capacity(df.height());
        for (i, (&v1, &v2)) in left.iter().zip(right.iter()).enumerate() {
            let value = match (is_na(v1, &na_values), is_na(v2, &na_values), v1, v2) {
                (true, true, _, _) => None,
                (false, true, v, _) | (true, false, _, v) => v,
                (false, false, Some(a), Some(b)) if a == b => Some(a),
                (false, false, Some(a), Some(b)) => {
                    let resolved = on_conflict.apply(a, b);
                    if resolved.is_none() {
                        sink.record(
                            CaseRow::new(df, i),
                            format!(
                                "Valores contradictorios: {}={:?} vs. {}={:?}",
                                first, a, second, b
                            ),
                        );
                    }
                    resolved
                }
                // Not-na implies present.
                _ => None,
            };
            combined.push(value);
        }

        Ok(Series::new(first.as_str().into(), combined))
    })
}

/// [`combine_variables`] for 0/1 flags: a conflict resolves to whichever
/// value is non-zero.
pub fn combine_variables_bool(
    first: impl Into<String>,
    second: impl Into<String>,
    na_values: impl Into<Vec<f64>>,
) -> DerivationHook {
    combine_variables(first, second, OnConflict::truthy(), na_values)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogicalOp {
    Or,
    And,
}

fn logical_op(vars: Vec<String>, op: LogicalOp) -> DerivationHook {
    Arc::new(move |df: &DataFrame, _: &mut WarningSink| {
        if vars.len() < 2 {
            return Err(CasePrepError::InvalidRegistry(format!(
                "logical {:?} needs at least 2 variables, got {}",
                op,
                vars.len()
            )));
        }

        let columns = vars
            .iter()
            .map(|name| float_values(df, name))
            .collect::<Result<Vec<_>>>()?;

        let height = df.height();
        let mut true_mask: Vec<bool> = columns[0].iter().map(|v| *v == Some(1.0)).collect();
        let mut false_mask: Vec<bool> = columns[0].iter().map(|v| *v == Some(0.0)).collect();

        for column in &columns {
            for i in 0..height {
                let is_true = column[i] == Some(1.0);
                let is_false = column[i] == Some(0.0);
                match op {
                    LogicalOp::Or => {
                        true_mask[i] |= is_true;
                        false_mask[i] &= is_false;
                    }
                    LogicalOp::And => {
                        true_mask[i] &= is_true;
                        false_mask[i] |= is_false;
                    }
                }
            }
        }

        let values: Vec<Option<f64>> = (0..height)
            .map(|i| {
                if false_mask[i] {
                    Some(0.0)
                } else if true_mask[i] {
                    Some(1.0)
                } else {
                    None
                }
            })
            .collect();

        Ok(Series::new(vars[0].as_str().into(), values))
    })
}

/// Three-valued OR over 0/1 flags: 1.0 if any is 1.0, 0.0 if all are 0.0,
/// otherwise missing.
pub fn logical_or<I, S>(vars: I) -> DerivationHook
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    logical_op(vars.into_iter().map(Into::into).collect(), LogicalOp::Or)
}

/// Three-valued AND over 0/1 flags: 0.0 if any is 0.0, 1.0 if all are 1.0,
/// otherwise missing.
pub fn logical_and<I, S>(vars: I) -> DerivationHook
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    logical_op(vars.into_iter().map(Into::into).collect(), LogicalOp::And)
}

/// Collapse a one-hot group of flags into the name of the flag that is set.
///
/// Rows where every flag is missing stay missing. Rows with no flag or
/// several flags set are recorded as contradictory and left missing.
pub fn multibool_to_enum<I, S>(vars: I, na_values: impl Into<Vec<f64>>) -> DerivationHook
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let vars: Vec<String> = vars.into_iter().map(Into::into).collect();
    let na_values = na_values.into();

    Arc::new(move |df: &DataFrame, sink: &mut WarningSink| {
        let columns = vars
            .iter()
            .map(|name| float_values(df, name))
            .collect::<Result<Vec<_>>>()?;

        let mut labels: Vec<Option<String>> = Vec::with_capacity(df.height());
        for i in 0..df.height() {
            if columns.iter().all(|column| is_na(column[i], &na_values)) {
                labels.push(None);
                continue;
            }

            let mut set = vars
                .iter()
                .zip(&columns)
                .filter(|(_, column)| column[i] == Some(1.0))
                .map(|(name, _)| name);

            match (set.next(), set.next()) {
                (Some(name), None) => labels.push(Some(name.clone())),
                _ => {
                    let values = vars
                        .iter()
                        .zip(&columns)
                        .map(|(name, column)| format!("{}={}", name, format_value(column[i])))
                        .collect::<Vec<_>>()
                        .join(", ");
                    sink.record(
                        CaseRow::new(df, i),
                        format!("Multi-bool a enum - valores contradictorios: {}", values),
                    );
                    labels.push(None);
                }
            }
        }

        let name = vars.first().map(String::as_str).unwrap_or("enum");
        Ok(Series::new(name.into(), labels))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const NAN: f64 = f64::NAN;

    fn run(hook: &DerivationHook, df: &DataFrame) -> (Vec<Option<f64>>, WarningSink) {
        let mut sink = WarningSink::default();
        let series = hook(df, &mut sink).unwrap();
        let values = crate::utils::series_float_values(&series).unwrap();
        (values, sink)
    }

    fn flags(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().map(|v| Some(*v).filter(|x| !x.is_nan())).collect()
    }

    fn pair_df(a: &[f64], b: &[f64]) -> DataFrame {
        df!("a" => flags(a), "b" => flags(b)).unwrap()
    }

    #[test]
    fn test_combine_equal_and_one_sided() {
        let df = pair_df(&[5.0, 5.0, NAN, 98.0], &[5.0, NAN, NAN, 3.0]);
        let hook = combine_variables("a", "b", OnConflict::default(), DEFAULT_NA_VALUES);
        let (values, sink) = run(&hook, &df);

        assert_eq!(values, vec![Some(5.0), Some(5.0), None, Some(3.0)]);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_combine_conflict_resolved_without_warning() {
        let df = pair_df(&[5.0], &[7.0]);
        let hook = combine_variables("a", "b", OnConflict::first(), DEFAULT_NA_VALUES);
        let (values, sink) = run(&hook, &df);

        assert_eq!(values, vec![Some(5.0)]);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_combine_conflict_unresolved_warns_once() {
        let df = pair_df(&[5.0, 1.0], &[7.0, 1.0]);
        let hook = combine_variables("a", "b", OnConflict::value(NAN), DEFAULT_NA_VALUES);
        let (values, sink) = run(&hook, &df);

        assert_eq!(values, vec![None, Some(1.0)]);
        assert_eq!(sink.len(), 1);
        assert_eq!(sink.warnings()[0].case_id, "1");
        assert_eq!(
            sink.warnings()[0].message,
            "Valores contradictorios: a=5.0 vs. b=7.0"
        );
    }

    #[test]
    fn test_combine_constant_conflict_value() {
        let df = pair_df(&[5.0], &[7.0]);
        let hook = combine_variables("a", "b", OnConflict::value(0.0), DEFAULT_NA_VALUES);
        let (values, sink) = run(&hook, &df);

        assert_eq!(values, vec![Some(0.0)]);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_combine_custom_na_values() {
        let df = pair_df(&[9.0, 98.0], &[2.0, 2.0]);
        let hook = combine_variables("a", "b", OnConflict::default(), vec![9.0]);
        let (values, sink) = run(&hook, &df);

        assert_eq!(values, vec![Some(2.0), None]);
        assert_eq!(sink.len(), 1);
    }

    #[test]
    fn test_combine_missing_column_fails() {
        let df = pair_df(&[1.0], &[1.0]);
        let hook = combine_variables("a", "zzz", OnConflict::default(), DEFAULT_NA_VALUES);
        let mut sink = WarningSink::default();
        let err = hook(&df, &mut sink).unwrap_err();
        assert!(matches!(err, CasePrepError::ColumnNotFound(name) if name == "zzz"));
    }

    #[test]
    fn test_combine_bool_prefers_truthy() {
        let df = pair_df(&[0.0, 1.0, 0.0, NAN], &[1.0, 0.0, 0.0, 99.0]);
        let hook = combine_variables_bool("a", "b", DEFAULT_NA_VALUES);
        let (values, sink) = run(&hook, &df);

        assert_eq!(values, vec![Some(1.0), Some(1.0), Some(0.0), None]);
        assert!(sink.is_empty());
    }

    #[test]
    fn test_logical_or_two_vars() {
        let df = pair_df(
            &[0.0, 0.0, 0.0, 1.0, 1.0, 1.0, NAN, NAN, NAN],
            &[0.0, 1.0, NAN, 0.0, 1.0, NAN, 0.0, 1.0, NAN],
        );
        let (values, _) = run(&logical_or(["a", "b"]), &df);
        assert_eq!(
            values,
            flags(&[0.0, 1.0, NAN, 1.0, 1.0, 1.0, NAN, 1.0, NAN])
        );
    }

    #[test]
    fn test_logical_and_two_vars() {
        let df = pair_df(
            &[0.0, 0.0, 0.0, 1.0, 1.0, 1.0, NAN, NAN, NAN],
            &[0.0, 1.0, NAN, 0.0, 1.0, NAN, 0.0, 1.0, NAN],
        );
        let (values, _) = run(&logical_and(["a", "b"]), &df);
        assert_eq!(
            values,
            flags(&[0.0, 0.0, 0.0, 0.0, 1.0, NAN, 0.0, NAN, NAN])
        );
    }

    fn triple_df() -> DataFrame {
        let b_block = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0, NAN, NAN, NAN];
        let c_block = [0.0, 1.0, NAN, 0.0, 1.0, NAN, 0.0, 1.0, NAN];

        let mut a = Vec::new();
        let mut b = Vec::new();
        let mut c = Vec::new();
        for first in [0.0, 1.0, NAN] {
            a.extend([first; 9]);
            b.extend(b_block);
            c.extend(c_block);
        }
        df!("a" => flags(&a), "b" => flags(&b), "c" => flags(&c)).unwrap()
    }

    #[test]
    fn test_logical_or_three_vars() {
        let (values, _) = run(&logical_or(["a", "b", "c"]), &triple_df());

        let mut expected = Vec::new();
        expected.extend([0.0, 1.0, NAN, 1.0, 1.0, 1.0, NAN, 1.0, NAN]);
        expected.extend([1.0; 9]);
        expected.extend([NAN, 1.0, NAN, 1.0, 1.0, 1.0, NAN, 1.0, NAN]);
        assert_eq!(values, flags(&expected));
    }

    #[test]
    fn test_logical_and_three_vars() {
        let (values, _) = run(&logical_and(["a", "b", "c"]), &triple_df());

        let mut expected = Vec::new();
        expected.extend([0.0; 9]);
        expected.extend([0.0, 0.0, 0.0, 0.0, 1.0, NAN, 0.0, NAN, NAN]);
        expected.extend([0.0, 0.0, 0.0, 0.0, NAN, NAN, 0.0, NAN, NAN]);
        assert_eq!(values, flags(&expected));
    }

    #[test]
    fn test_logical_requires_two_vars() {
        let df = pair_df(&[1.0], &[1.0]);
        let mut sink = WarningSink::default();
        assert!(logical_or(["a"])(&df, &mut sink).is_err());
    }

    #[test]
    fn test_multibool_to_enum() {
        let df = df!(
            "A" => flags(&[1.0, 1.0, NAN, 0.0, 99.0]),
            "B" => flags(&[0.0, 1.0, NAN, 0.0, 98.0]),
            "C" => flags(&[0.0, 0.0, NAN, 0.0, 1.0]),
        )
        .unwrap();
        let hook = multibool_to_enum(["A", "B", "C"], DEFAULT_NA_VALUES);
        let mut sink = WarningSink::default();
        let series = hook(&df, &mut sink).unwrap();

        let labels: Vec<Option<String>> = series
            .str()
            .unwrap()
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect();
        assert_eq!(
            labels,
            vec![Some("A".to_string()), None, None, None, Some("C".to_string())]
        );

        assert_eq!(sink.len(), 2);
        assert_eq!(
            sink.warnings()[0].message,
            "Multi-bool a enum - valores contradictorios: A=1.0, B=1.0, C=0.0"
        );
        assert_eq!(sink.warnings()[0].case_id, "2");
        assert_eq!(
            sink.warnings()[1].message,
            "Multi-bool a enum - valores contradictorios: A=0.0, B=0.0, C=0.0"
        );
    }

    #[test]
    fn test_multibool_reports_missing_as_nan() {
        let df = df!("A" => &[Some(1.0)], "B" => &[None::<f64>], "C" => &[Some(1.0)]).unwrap();
        let hook = multibool_to_enum(["A", "B", "C"], DEFAULT_NA_VALUES);
        let mut sink = WarningSink::default();
        hook(&df, &mut sink).unwrap();

        assert_eq!(
            sink.warnings()[0].message,
            "Multi-bool a enum - valores contradictorios: A=1.0, B=nan, C=1.0"
        );
    }
}
