//! Shared utilities for the case loading pipeline.
//!
//! A value is *missing* when it is null or, for float columns, NaN. Every
//! helper here follows that rule so that coercion, mandatory checks and the
//! combinators agree on what counts as missing.

use crate::error::{CasePrepError, Result};
use polars::prelude::*;

// =============================================================================
// Data Type Utilities
// =============================================================================

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64
            | DataType::Float32
            | DataType::Float64
    )
}

// =============================================================================
// Missing Value Utilities
// =============================================================================

/// Check whether a float value is missing (absent or NaN).
#[inline]
pub fn is_missing(value: Option<f64>) -> bool {
    value.is_none_or(f64::is_nan)
}

/// Values of a series as floats, with NaN normalized to `None`.
///
/// Non-numeric strings become `None`.
pub fn series_float_values(series: &Series) -> Result<Vec<Option<f64>>> {
    let floats = series.cast(&DataType::Float64)?;
    Ok(floats
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}

/// Values of column `name` as floats, with NaN normalized to `None`.
pub fn float_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| CasePrepError::ColumnNotFound(name.to_string()))?;
    series_float_values(column.as_materialized_series())
}

/// Per-row missing flags of a series.
pub fn missing_mask(series: &Series) -> Result<BooleanChunked> {
    let flags: Vec<bool> = if series.dtype().is_float() {
        series_float_values(series)?
            .into_iter()
            .map(|v| v.is_none())
            .collect()
    } else {
        series
            .is_null()
            .into_iter()
            .map(|v| v.unwrap_or(true))
            .collect()
    };
    Ok(bool_mask(&flags))
}

/// Number of missing values in a series.
pub fn count_missing(series: &Series) -> Result<usize> {
    Ok(missing_mask(series)?
        .into_iter()
        .filter(|flag| *flag == Some(true))
        .count())
}

/// Build a boolean mask from plain flags.
pub fn bool_mask(flags: &[bool]) -> BooleanChunked {
    BooleanChunked::from_slice("mask".into(), flags)
}

// =============================================================================
// Formatting Utilities
// =============================================================================

/// Render a float for warning messages; missing renders as `nan`.
pub fn format_value(value: Option<f64>) -> String {
    match value {
        Some(v) if !v.is_nan() => format!("{:?}", v),
        _ => "nan".to_string(),
    }
}

/// Render a cell as text, `None` when missing.
pub fn any_value_to_string(value: &AnyValue<'_>) -> Option<String> {
    match value {
        AnyValue::Null => None,
        AnyValue::String(s) => Some(s.to_string()),
        AnyValue::StringOwned(s) => Some(s.to_string()),
        AnyValue::Categorical(..)
        | AnyValue::CategoricalOwned(..)
        | AnyValue::Enum(..)
        | AnyValue::EnumOwned(..) => Some(value.str_value().into_owned()),
        AnyValue::Float64(f) if f.is_nan() => None,
        AnyValue::Float32(f) if f.is_nan() => None,
        AnyValue::Float64(f) => Some(format!("{:?}", f)),
        AnyValue::Float32(f) => Some(format!("{:?}", f)),
        other => Some(other.to_string()),
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_numeric_dtype() {
        assert!(is_numeric_dtype(&DataType::Int64));
        assert!(is_numeric_dtype(&DataType::Float64));
        assert!(!is_numeric_dtype(&DataType::String));
        assert!(!is_numeric_dtype(&DataType::Boolean));
    }

    #[test]
    fn test_float_values_normalizes_nan() {
        let df = df!("A" => &[Some(1.0), None, Some(f64::NAN)]).unwrap();
        assert_eq!(float_values(&df, "A").unwrap(), vec![Some(1.0), None, None]);
    }

    #[test]
    fn test_float_values_missing_column() {
        let df = df!("A" => &[1.0]).unwrap();
        let err = float_values(&df, "B").unwrap_err();
        assert!(matches!(err, CasePrepError::ColumnNotFound(name) if name == "B"));
    }

    #[test]
    fn test_float_values_from_integers() {
        let df = df!("A" => &[Some(1i64), None, Some(3)]).unwrap();
        assert_eq!(float_values(&df, "A").unwrap(), vec![Some(1.0), None, Some(3.0)]);
    }

    #[test]
    fn test_missing_mask() {
        let floats = Series::new("f".into(), &[Some(1.0), None, Some(f64::NAN)]);
        let mask: Vec<Option<bool>> = missing_mask(&floats).unwrap().into_iter().collect();
        assert_eq!(mask, vec![Some(false), Some(true), Some(true)]);

        let text = Series::new("t".into(), &[Some("a"), None]);
        assert_eq!(count_missing(&text).unwrap(), 1);
    }

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(Some(5.0)), "5.0");
        assert_eq!(format_value(Some(0.5)), "0.5");
        assert_eq!(format_value(None), "nan");
        assert_eq!(format_value(Some(f64::NAN)), "nan");
    }

    #[test]
    fn test_any_value_to_string() {
        assert_eq!(any_value_to_string(&AnyValue::Int64(7)), Some("7".to_string()));
        assert_eq!(any_value_to_string(&AnyValue::String("H1")), Some("H1".to_string()));
        assert_eq!(any_value_to_string(&AnyValue::Float64(2.0)), Some("2.0".to_string()));
        assert_eq!(any_value_to_string(&AnyValue::Null), None);
    }

    #[test]
    fn test_any_value_to_string_reads_categories() {
        let frozen = FrozenCategories::new(["Leve", "Grave"]).unwrap();
        let series = Series::new("GRADO".into(), &["Grave", "Leve"])
            .cast(&DataType::from_frozen_categories(frozen))
            .unwrap();

        let value = series.get(0).unwrap();
        assert_eq!(any_value_to_string(&value), Some("Grave".to_string()));
    }
}
