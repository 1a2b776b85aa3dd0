#![forbid(unsafe_code)]

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use rust_decimal::{Decimal, MathematicalOps};
use rust_decimal::prelude::ToPrimitive;
use sf_types::{CastError, DataType, Row, TypeKind, Value};
use thiserror::Error;

static NULL: Value = Value::Null;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ColumnError {
    #[error("column '{column}' row {row}: {source}")]
    Cast {
        column: String,
        row: usize,
        source: CastError,
    },
    #[error("column '{column}' row {row}: expected {expected} data but found {found}")]
    Validation {
        column: String,
        row: usize,
        expected: TypeKind,
        found: &'static str,
    },
    #[error("cannot compute {operation} on column '{column}': {reason}")]
    NullComputation {
        column: String,
        operation: &'static str,
        reason: String,
    },
    #[error("{operation} is not supported on {data_type} column '{column}'")]
    Unsupported {
        column: String,
        operation: &'static str,
        data_type: TypeKind,
    },
    #[error("decimal overflow while computing {operation} on column '{column}'")]
    Overflow {
        column: String,
        operation: &'static str,
    },
}

/// Immutable row storage shared by every column of a table.
///
/// Cloning shares the rows; columns read cells by position and never copy
/// them.
#[derive(Debug, Clone, Default)]
pub struct RowStore {
    rows: Arc<[Row]>,
}

impl RowStore {
    #[must_use]
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows: rows.into() }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Cell at (`row`, `position`). Positions past the end of a short row
    /// read as null.
    #[must_use]
    pub fn cell(&self, row: usize, position: usize) -> &Value {
        self.rows
            .get(row)
            .and_then(|cells| cells.get(position))
            .unwrap_or(&NULL)
    }

    #[must_use]
    pub fn shares_storage(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.rows, &other.rows)
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Materialized {
    values: Vec<Value>,
    lossy_casts: usize,
}

/// Named, typed, read-only view over one position of a [`RowStore`].
///
/// Typed data is materialized lazily: the first access casts every raw cell
/// through the column's [`DataType`] and memoizes the result (or the cast
/// failure) in a once-initialized cell. Later accesses return the same
/// cached slice.
#[derive(Debug, Clone)]
pub struct Column {
    name: String,
    data_type: DataType,
    position: usize,
    len: usize,
    rows: RowStore,
    cache: OnceLock<Result<Materialized, ColumnError>>,
}

impl Column {
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        data_type: DataType,
        rows: RowStore,
        position: usize,
    ) -> Self {
        Self {
            name: name.into(),
            data_type,
            position,
            len: rows.len(),
            rows,
            cache: OnceLock::new(),
        }
    }

    /// Column over values produced elsewhere. No cast runs; call
    /// [`Column::validate`] to check the values against `data_type`.
    #[must_use]
    pub fn with_data(name: impl Into<String>, data_type: DataType, values: Vec<Value>) -> Self {
        let cache = OnceLock::new();
        let len = values.len();
        let _ = cache.set(Ok(Materialized {
            values,
            lossy_casts: 0,
        }));
        Self {
            name: name.into(),
            data_type,
            position: 0,
            len,
            rows: RowStore::default(),
            cache,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    #[must_use]
    pub fn position(&self) -> usize {
        self.position
    }

    #[must_use]
    pub fn row_store(&self) -> &RowStore {
        &self.rows
    }

    #[must_use]
    pub fn is_materialized(&self) -> bool {
        self.cache.get().is_some()
    }

    // ── Materialization ────────────────────────────────────────────────

    /// Typed values of this column, casting on first access.
    pub fn materialize(&self) -> Result<&[Value], ColumnError> {
        self.materialized().map(|m| m.values.as_slice())
    }

    /// Number of values whose cast may have lost precision.
    pub fn lossy_casts(&self) -> Result<usize, ColumnError> {
        self.materialized().map(|m| m.lossy_casts)
    }

    fn materialized(&self) -> Result<&Materialized, ColumnError> {
        self.cache
            .get_or_init(|| self.cast_rows())
            .as_ref()
            .map_err(Clone::clone)
    }

    fn cast_rows(&self) -> Result<Materialized, ColumnError> {
        let mut caster = self.data_type.caster();
        let mut values = Vec::with_capacity(self.len);
        let mut lossy_casts = 0_usize;

        for row in 0..self.rows.len() {
            let cast = caster
                .cast(self.rows.cell(row, self.position))
                .map_err(|source| ColumnError::Cast {
                    column: self.name.clone(),
                    row,
                    source,
                })?;
            lossy_casts += usize::from(cast.lossy);
            values.push(cast.value);
        }

        tracing::debug!(
            column = %self.name,
            data_type = %self.data_type.kind(),
            rows = values.len(),
            "materialized column"
        );
        if lossy_casts > 0 {
            tracing::warn!(
                column = %self.name,
                lossy_casts,
                "float values cast to decimal may have lost precision"
            );
        }

        Ok(Materialized {
            values,
            lossy_casts,
        })
    }

    /// Fail on the first value whose representation is not canonical for the
    /// declared type.
    pub fn validate(&self) -> Result<(), ColumnError> {
        for (row, value) in self.materialize()?.iter().enumerate() {
            if !self.data_type.is_canonical(value) {
                return Err(ColumnError::Validation {
                    column: self.name.clone(),
                    row,
                    expected: self.data_type.kind(),
                    found: value.kind_name(),
                });
            }
        }
        Ok(())
    }

    // ── Sequence access ────────────────────────────────────────────────

    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn get(&self, idx: usize) -> Result<Option<&Value>, ColumnError> {
        Ok(self.materialize()?.get(idx))
    }

    pub fn iter(&self) -> Result<std::slice::Iter<'_, Value>, ColumnError> {
        Ok(self.materialize()?.iter())
    }

    /// Materialized values as one slice; same data as [`Column::materialize`].
    pub fn values(&self) -> Result<&[Value], ColumnError> {
        self.materialize()
    }

    pub fn contains(&self, value: &Value) -> Result<bool, ColumnError> {
        Ok(self.materialize()?.contains(value))
    }

    pub fn any(&self, predicate: impl Fn(&Value) -> bool) -> Result<bool, ColumnError> {
        Ok(self.materialize()?.iter().any(predicate))
    }

    pub fn all(&self, predicate: impl Fn(&Value) -> bool) -> Result<bool, ColumnError> {
        Ok(self.materialize()?.iter().all(predicate))
    }

    /// Occurrences of `value`, nulls included.
    pub fn count(&self, value: &Value) -> Result<usize, ColumnError> {
        Ok(self.materialize()?.iter().filter(|v| *v == value).count())
    }

    pub fn has_nulls(&self) -> Result<bool, ColumnError> {
        self.any(Value::is_null)
    }

    pub fn non_null_count(&self) -> Result<usize, ColumnError> {
        Ok(self.materialize()?.iter().filter(|v| !v.is_null()).count())
    }

    /// Distinct values with their occurrence counts, in first-seen order.
    pub fn value_counts(&self) -> Result<Vec<(Value, usize)>, ColumnError> {
        let values = self.materialize()?;
        let mut slots: HashMap<&Value, usize> = HashMap::new();
        let mut counts: Vec<(Value, usize)> = Vec::new();

        for value in values {
            if let Some(&slot) = slots.get(value) {
                counts[slot].1 += 1;
            } else {
                slots.insert(value, counts.len());
                counts.push((value.clone(), 1));
            }
        }

        Ok(counts)
    }

    // ── Numeric reductions ─────────────────────────────────────────────

    /// Fails with [`ColumnError::Unsupported`] unless the column is Int or
    /// Decimal typed.
    pub fn require_numeric(&self, operation: &'static str) -> Result<(), ColumnError> {
        if self.data_type.is_numeric() {
            Ok(())
        } else {
            Err(ColumnError::Unsupported {
                column: self.name.clone(),
                operation,
                data_type: self.data_type.kind(),
            })
        }
    }

    /// Sum of non-null values, typed like the column. Zero when there are none.
    pub fn sum(&self) -> Result<Value, ColumnError> {
        let values = self.numeric_values("sum")?;
        let total = self.checked_sum(&values, "sum")?;
        self.typed(total, "sum")
    }

    /// Smallest non-null value, or null when there are none.
    pub fn min(&self) -> Result<Value, ColumnError> {
        match self.numeric_values("min")?.into_iter().min() {
            Some(min) => self.typed(min, "min"),
            None => Ok(Value::Null),
        }
    }

    /// Largest non-null value, or null when there are none.
    pub fn max(&self) -> Result<Value, ColumnError> {
        match self.numeric_values("max")?.into_iter().max() {
            Some(max) => self.typed(max, "max"),
            None => Ok(Value::Null),
        }
    }

    /// Arithmetic mean of non-null values.
    pub fn mean(&self) -> Result<Value, ColumnError> {
        let values = self.numeric_values("mean")?;
        if values.is_empty() {
            return Err(
                self.null_computation("mean", "column has no non-null values".to_owned())
            );
        }
        self.checked_mean(&values, "mean").map(Value::Decimal)
    }

    pub fn median(&self) -> Result<Value, ColumnError> {
        let mut values = self.complete_values("median", 1)?;
        values.sort_unstable();
        self.median_of_sorted(&values, "median").map(Value::Decimal)
    }

    /// Most frequent value; ties go to the value seen first.
    pub fn mode(&self) -> Result<Value, ColumnError> {
        self.complete_values("mode", 1)?;
        let mut best: Option<(Value, usize)> = None;
        for (value, count) in self.value_counts()? {
            if best.as_ref().is_none_or(|(_, top)| count > *top) {
                best = Some((value, count));
            }
        }
        best.map(|(value, _)| value)
            .ok_or_else(|| self.null_computation("mode", "column is empty".to_owned()))
    }

    /// Sample variance: squared deviations from the mean over `n - 1`.
    pub fn variance(&self) -> Result<Value, ColumnError> {
        let values = self.complete_values("variance", 2)?;
        self.variance_of(&values, 1, "variance").map(Value::Decimal)
    }

    /// Population variance: squared deviations from the mean over `n`.
    pub fn population_variance(&self) -> Result<Value, ColumnError> {
        let values = self.complete_values("population variance", 1)?;
        self.variance_of(&values, 0, "population variance")
            .map(Value::Decimal)
    }

    pub fn stdev(&self) -> Result<Value, ColumnError> {
        let values = self.complete_values("stdev", 2)?;
        let variance = self.variance_of(&values, 1, "stdev")?;
        self.sqrt(variance, "stdev").map(Value::Decimal)
    }

    pub fn population_stdev(&self) -> Result<Value, ColumnError> {
        let values = self.complete_values("population stdev", 1)?;
        let variance = self.variance_of(&values, 0, "population stdev")?;
        self.sqrt(variance, "population stdev").map(Value::Decimal)
    }

    /// Mean absolute deviation from the median.
    pub fn mad(&self) -> Result<Value, ColumnError> {
        let mut values = self.complete_values("mad", 1)?;
        values.sort_unstable();
        let median = self.median_of_sorted(&values, "mad")?;
        let deviations = values
            .iter()
            .map(|v| v.checked_sub(median).map(|d| d.abs()))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| self.overflow("mad"))?;
        self.checked_mean(&deviations, "mad").map(Value::Decimal)
    }

    /// Non-null values as exact decimals.
    fn numeric_values(&self, operation: &'static str) -> Result<Vec<Decimal>, ColumnError> {
        self.require_numeric(operation)?;
        let mut out = Vec::with_capacity(self.len);
        for (row, value) in self.materialize()?.iter().enumerate() {
            if value.is_null() {
                continue;
            }
            let decimal = value.as_decimal().ok_or_else(|| ColumnError::Validation {
                column: self.name.clone(),
                row,
                expected: self.data_type.kind(),
                found: value.kind_name(),
            })?;
            out.push(decimal);
        }
        Ok(out)
    }

    /// All values as exact decimals; any null, or fewer than `min_len`
    /// values, is a [`ColumnError::NullComputation`].
    fn complete_values(
        &self,
        operation: &'static str,
        min_len: usize,
    ) -> Result<Vec<Decimal>, ColumnError> {
        self.require_numeric(operation)?;
        if self.has_nulls()? {
            return Err(
                self.null_computation(operation, "column contains null values".to_owned())
            );
        }
        let values = self.numeric_values(operation)?;
        if values.len() < min_len {
            return Err(self.null_computation(
                operation,
                format!("needs at least {min_len} values, found {}", values.len()),
            ));
        }
        Ok(values)
    }

    fn checked_sum(
        &self,
        values: &[Decimal],
        operation: &'static str,
    ) -> Result<Decimal, ColumnError> {
        values
            .iter()
            .try_fold(Decimal::ZERO, |acc, v| acc.checked_add(*v))
            .ok_or_else(|| self.overflow(operation))
    }

    fn checked_mean(
        &self,
        values: &[Decimal],
        operation: &'static str,
    ) -> Result<Decimal, ColumnError> {
        let total = self.checked_sum(values, operation)?;
        total
            .checked_div(Decimal::from(values.len()))
            .ok_or_else(|| self.overflow(operation))
    }

    fn median_of_sorted(
        &self,
        sorted: &[Decimal],
        operation: &'static str,
    ) -> Result<Decimal, ColumnError> {
        let mid = sorted.len() / 2;
        if !sorted.len().is_multiple_of(2) {
            return Ok(sorted[mid]);
        }
        let (lo, hi) = (sorted[mid - 1], sorted[mid]);
        // Same sign: the gap cannot overflow. Opposite signs: the sum cannot.
        let midpoint = if lo.is_sign_negative() == hi.is_sign_negative() {
            hi.checked_sub(lo)
                .and_then(|gap| gap.checked_div(Decimal::TWO))
                .and_then(|half| lo.checked_add(half))
        } else {
            lo.checked_add(hi).and_then(|pair| pair.checked_div(Decimal::TWO))
        };
        midpoint.ok_or_else(|| self.overflow(operation))
    }

    fn variance_of(
        &self,
        values: &[Decimal],
        ddof: usize,
        operation: &'static str,
    ) -> Result<Decimal, ColumnError> {
        let mean = self.checked_mean(values, operation)?;
        let squared = values
            .iter()
            .map(|v| v.checked_sub(mean).and_then(|d| d.checked_mul(d)))
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| self.overflow(operation))?;
        let total = self.checked_sum(&squared, operation)?;
        total
            .checked_div(Decimal::from(values.len() - ddof))
            .ok_or_else(|| self.overflow(operation))
    }

    fn sqrt(&self, value: Decimal, operation: &'static str) -> Result<Decimal, ColumnError> {
        value.sqrt().ok_or_else(|| self.overflow(operation))
    }

    /// Convert a reduction result back into the column's own value type.
    fn typed(&self, value: Decimal, operation: &'static str) -> Result<Value, ColumnError> {
        match self.data_type {
            DataType::Int(_) => value
                .to_i64()
                .map(Value::Int)
                .ok_or_else(|| self.overflow(operation)),
            _ => Ok(Value::Decimal(value)),
        }
    }

    fn null_computation(&self, operation: &'static str, reason: String) -> ColumnError {
        ColumnError::NullComputation {
            column: self.name.clone(),
            operation,
            reason,
        }
    }

    fn overflow(&self, operation: &'static str) -> ColumnError {
        ColumnError::Overflow {
            column: self.name.clone(),
            operation,
        }
    }
}
