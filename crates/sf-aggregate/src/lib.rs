#![forbid(unsafe_code)]

//! Validate-then-run aggregations over [`Table`] columns.
//!
//! An aggregation is declared with column names (and optionally a test
//! predicate), checked against a concrete table with
//! [`Aggregation::validate`], then executed with [`Aggregation::run`].
//! Columns are resolved by name on every call; nothing holds on to the table.

use std::fmt;
use std::sync::Arc;

use sf_columnar::{Column, ColumnError};
use sf_frame::{COUNT_COLUMN, ColumnCounts, FrameError, Table};
use sf_types::{DataType, Value};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
pub enum AggregationError {
    #[error("no values in column '{column}' pass the given test")]
    NoMatchingValue { column: String },
    #[error("column '{column}' was exhausted before a value was found")]
    Exhausted { column: String },
    #[error("summary column '{column}' cannot hold a table-producing aggregation")]
    TableOutput { column: String },
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error(transparent)]
    Column(#[from] ColumnError),
}

/// Test function applied to materialized values.
pub type Predicate = Arc<dyn Fn(&Value) -> bool + Send + Sync>;

pub fn predicate(test: impl Fn(&Value) -> bool + Send + Sync + 'static) -> Predicate {
    Arc::new(test)
}

/// Statically declared shape of an aggregation result.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputType {
    Value(DataType),
    Table(Vec<(String, DataType)>),
}

#[derive(Debug, Clone)]
pub enum Output {
    Value(Value),
    Table(Table),
}

impl Output {
    #[must_use]
    pub fn into_value(self) -> Option<Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Table(_) => None,
        }
    }

    #[must_use]
    pub fn into_table(self) -> Option<Table> {
        match self {
            Self::Table(table) => Some(table),
            Self::Value(_) => None,
        }
    }
}

pub trait Aggregation: fmt::Debug + Send + Sync {
    /// Result type, derived from the table schema without running anything.
    fn aggregate_data_type(&self, table: &Table) -> Result<OutputType, AggregationError>;

    /// Cheap precondition check against a concrete table.
    fn validate(&self, _table: &Table) -> Result<(), AggregationError> {
        Ok(())
    }

    /// Execute. Calling `run` repeatedly on the same table gives the same result.
    fn run(&self, table: &Table) -> Result<Output, AggregationError>;
}

/// Validate, then run.
pub fn aggregate(table: &Table, aggregation: &dyn Aggregation) -> Result<Output, AggregationError> {
    if let Err(err) = aggregation.validate(table) {
        tracing::debug!(?aggregation, error = %err, "aggregation rejected by validation");
        return Err(err);
    }
    aggregation.run(table)
}

/// One-row table holding the result of each named aggregation, each column
/// typed by the aggregation's declared output type.
pub fn summarize(
    table: &Table,
    aggregations: &[(&str, &dyn Aggregation)],
) -> Result<Table, AggregationError> {
    let mut names = Vec::with_capacity(aggregations.len());
    let mut types = Vec::with_capacity(aggregations.len());
    let mut row = Vec::with_capacity(aggregations.len());

    for &(name, aggregation) in aggregations {
        let table_output = || AggregationError::TableOutput {
            column: name.to_owned(),
        };
        let OutputType::Value(data_type) = aggregation.aggregate_data_type(table)? else {
            return Err(table_output());
        };
        let Output::Value(value) = aggregate(table, aggregation)? else {
            return Err(table_output());
        };
        names.push(name);
        types.push(data_type);
        row.push(value);
    }

    Ok(Table::new(vec![row], names, types)?)
}

fn debug_test(test: Option<&Predicate>) -> &'static str {
    if test.is_some() { "Some(<fn>)" } else { "None" }
}

// ── First ─────────────────────────────────────────────────────────────

/// First value in a column, or the first value passing a test.
///
/// Without a test the first value is returned even when it is null.
#[derive(Clone)]
pub struct First {
    column_name: String,
    test: Option<Predicate>,
}

impl First {
    pub fn new(column_name: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            test: None,
        }
    }

    #[must_use]
    pub fn with_test(mut self, test: Predicate) -> Self {
        self.test = Some(test);
        self
    }

    fn find(&self, column: &Column) -> Result<Option<Value>, ColumnError> {
        let mut values = column.iter()?;
        Ok(match &self.test {
            None => values.next().cloned(),
            Some(test) => values.find(|v| test(v)).cloned(),
        })
    }
}

impl fmt::Debug for First {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("First")
            .field("column_name", &self.column_name)
            .field("test", &debug_test(self.test.as_ref()))
            .finish()
    }
}

impl Aggregation for First {
    fn aggregate_data_type(&self, table: &Table) -> Result<OutputType, AggregationError> {
        let column = table.get_column(&self.column_name)?;
        Ok(OutputType::Value(column.data_type().clone()))
    }

    fn validate(&self, table: &Table) -> Result<(), AggregationError> {
        if self.test.is_none() {
            return Ok(());
        }
        let column = table.get_column(&self.column_name)?;
        match self.find(column)? {
            Some(_) => Ok(()),
            None => Err(AggregationError::NoMatchingValue {
                column: self.column_name.clone(),
            }),
        }
    }

    fn run(&self, table: &Table) -> Result<Output, AggregationError> {
        let column = table.get_column(&self.column_name)?;
        self.find(column)?
            .map(Output::Value)
            .ok_or_else(|| AggregationError::Exhausted {
                column: self.column_name.clone(),
            })
    }
}

// ── Any / All ─────────────────────────────────────────────────────────

fn passes(test: Option<&Predicate>, value: &Value) -> bool {
    match test {
        Some(test) => test(value),
        None => *value == Value::Bool(true),
    }
}

/// Without a test, only Boolean columns can be checked for truth.
fn require_test_or_boolean(
    column: &Column,
    test: Option<&Predicate>,
    operation: &'static str,
) -> Result<(), ColumnError> {
    if test.is_some() || matches!(column.data_type(), DataType::Boolean(_)) {
        return Ok(());
    }
    Err(ColumnError::Unsupported {
        column: column.name().to_owned(),
        operation,
        data_type: column.data_type().kind(),
    })
}

/// Whether any value passes the test (or is `true`, for Boolean columns).
#[derive(Clone)]
pub struct Any {
    column_name: String,
    test: Option<Predicate>,
}

impl Any {
    pub fn new(column_name: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            test: None,
        }
    }

    #[must_use]
    pub fn with_test(mut self, test: Predicate) -> Self {
        self.test = Some(test);
        self
    }
}

impl fmt::Debug for Any {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Any")
            .field("column_name", &self.column_name)
            .field("test", &debug_test(self.test.as_ref()))
            .finish()
    }
}

impl Aggregation for Any {
    fn aggregate_data_type(&self, _table: &Table) -> Result<OutputType, AggregationError> {
        Ok(OutputType::Value(DataType::boolean()))
    }

    fn validate(&self, table: &Table) -> Result<(), AggregationError> {
        let column = table.get_column(&self.column_name)?;
        Ok(require_test_or_boolean(column, self.test.as_ref(), "any")?)
    }

    fn run(&self, table: &Table) -> Result<Output, AggregationError> {
        let column = table.get_column(&self.column_name)?;
        let found = column.any(|v| passes(self.test.as_ref(), v))?;
        Ok(Output::Value(Value::Bool(found)))
    }
}

/// Whether every value passes the test (or is `true`, for Boolean columns).
#[derive(Clone)]
pub struct All {
    column_name: String,
    test: Option<Predicate>,
}

impl All {
    pub fn new(column_name: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
            test: None,
        }
    }

    #[must_use]
    pub fn with_test(mut self, test: Predicate) -> Self {
        self.test = Some(test);
        self
    }
}

impl fmt::Debug for All {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("All")
            .field("column_name", &self.column_name)
            .field("test", &debug_test(self.test.as_ref()))
            .finish()
    }
}

impl Aggregation for All {
    fn aggregate_data_type(&self, _table: &Table) -> Result<OutputType, AggregationError> {
        Ok(OutputType::Value(DataType::boolean()))
    }

    fn validate(&self, table: &Table) -> Result<(), AggregationError> {
        let column = table.get_column(&self.column_name)?;
        Ok(require_test_or_boolean(column, self.test.as_ref(), "all")?)
    }

    fn run(&self, table: &Table) -> Result<Output, AggregationError> {
        let column = table.get_column(&self.column_name)?;
        let every = column.all(|v| passes(self.test.as_ref(), v))?;
        Ok(Output::Value(Value::Bool(every)))
    }
}

// ── Counting ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum CountMode {
    Rows,
    NonNull(String),
    Occurrences(String, Value),
}

/// Row count, non-null count of a column, or occurrences of one value.
#[derive(Debug, Clone, PartialEq)]
pub struct Count {
    mode: CountMode,
}

impl Count {
    #[must_use]
    pub fn rows() -> Self {
        Self {
            mode: CountMode::Rows,
        }
    }

    pub fn non_null(column_name: impl Into<String>) -> Self {
        Self {
            mode: CountMode::NonNull(column_name.into()),
        }
    }

    /// Occurrences of `value` (which may be null) in the column.
    pub fn value(column_name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            mode: CountMode::Occurrences(column_name.into(), value.into()),
        }
    }
}

impl Aggregation for Count {
    fn aggregate_data_type(&self, _table: &Table) -> Result<OutputType, AggregationError> {
        Ok(OutputType::Value(DataType::int()))
    }

    fn validate(&self, table: &Table) -> Result<(), AggregationError> {
        match &self.mode {
            CountMode::Rows => Ok(()),
            CountMode::NonNull(name) | CountMode::Occurrences(name, _) => {
                table.get_column(name)?;
                Ok(())
            }
        }
    }

    fn run(&self, table: &Table) -> Result<Output, AggregationError> {
        let count = match &self.mode {
            CountMode::Rows => table.row_count(),
            CountMode::NonNull(name) => table.get_column(name)?.non_null_count()?,
            CountMode::Occurrences(name, value) => table.get_column(name)?.count(value)?,
        };
        Ok(Output::Value(Value::Int(
            i64::try_from(count).unwrap_or(i64::MAX),
        )))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HasNulls {
    column_name: String,
}

impl HasNulls {
    pub fn new(column_name: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
        }
    }
}

impl Aggregation for HasNulls {
    fn aggregate_data_type(&self, _table: &Table) -> Result<OutputType, AggregationError> {
        Ok(OutputType::Value(DataType::boolean()))
    }

    fn run(&self, table: &Table) -> Result<Output, AggregationError> {
        let column = table.get_column(&self.column_name)?;
        Ok(Output::Value(Value::Bool(column.has_nulls()?)))
    }
}

/// Length in characters of the longest value in a Text column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaxLength {
    column_name: String,
}

impl MaxLength {
    pub fn new(column_name: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
        }
    }
}

impl Aggregation for MaxLength {
    fn aggregate_data_type(&self, _table: &Table) -> Result<OutputType, AggregationError> {
        Ok(OutputType::Value(DataType::int()))
    }

    fn validate(&self, table: &Table) -> Result<(), AggregationError> {
        let column = table.get_column(&self.column_name)?;
        if matches!(column.data_type(), DataType::Text(_)) {
            return Ok(());
        }
        Err(ColumnError::Unsupported {
            column: self.column_name.clone(),
            operation: "max length",
            data_type: column.data_type().kind(),
        }
        .into())
    }

    fn run(&self, table: &Table) -> Result<Output, AggregationError> {
        let column = table.get_column(&self.column_name)?;
        let longest = column
            .iter()?
            .filter_map(|v| match v {
                Value::Text(s) => Some(s.chars().count()),
                _ => None,
            })
            .max()
            .unwrap_or(0);
        Ok(Output::Value(Value::Int(
            i64::try_from(longest).unwrap_or(i64::MAX),
        )))
    }
}

// ── Numeric reductions ────────────────────────────────────────────────

/// Numeric statistic selector for [`Reduce`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Sum,
    Min,
    Max,
    Mean,
    Median,
    Mode,
    Variance,
    PopulationVariance,
    StDev,
    PopulationStDev,
    Mad,
}

impl Reducer {
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Sum => "sum",
            Self::Min => "min",
            Self::Max => "max",
            Self::Mean => "mean",
            Self::Median => "median",
            Self::Mode => "mode",
            Self::Variance => "variance",
            Self::PopulationVariance => "population variance",
            Self::StDev => "stdev",
            Self::PopulationStDev => "population stdev",
            Self::Mad => "mad",
        }
    }

    /// Sum, min, max and mode return values of the column's own type; every
    /// other statistic is Decimal.
    #[must_use]
    pub fn keeps_column_type(self) -> bool {
        matches!(self, Self::Sum | Self::Min | Self::Max | Self::Mode)
    }

    fn apply(self, column: &Column) -> Result<Value, ColumnError> {
        match self {
            Self::Sum => column.sum(),
            Self::Min => column.min(),
            Self::Max => column.max(),
            Self::Mean => column.mean(),
            Self::Median => column.median(),
            Self::Mode => column.mode(),
            Self::Variance => column.variance(),
            Self::PopulationVariance => column.population_variance(),
            Self::StDev => column.stdev(),
            Self::PopulationStDev => column.population_stdev(),
            Self::Mad => column.mad(),
        }
    }
}

/// A numeric statistic over one Int or Decimal column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reduce {
    column_name: String,
    reducer: Reducer,
}

impl Reduce {
    pub fn new(column_name: impl Into<String>, reducer: Reducer) -> Self {
        Self {
            column_name: column_name.into(),
            reducer,
        }
    }

    pub fn sum(column_name: impl Into<String>) -> Self {
        Self::new(column_name, Reducer::Sum)
    }

    pub fn min(column_name: impl Into<String>) -> Self {
        Self::new(column_name, Reducer::Min)
    }

    pub fn max(column_name: impl Into<String>) -> Self {
        Self::new(column_name, Reducer::Max)
    }

    pub fn mean(column_name: impl Into<String>) -> Self {
        Self::new(column_name, Reducer::Mean)
    }

    pub fn median(column_name: impl Into<String>) -> Self {
        Self::new(column_name, Reducer::Median)
    }

    pub fn mode(column_name: impl Into<String>) -> Self {
        Self::new(column_name, Reducer::Mode)
    }

    pub fn variance(column_name: impl Into<String>) -> Self {
        Self::new(column_name, Reducer::Variance)
    }

    pub fn stdev(column_name: impl Into<String>) -> Self {
        Self::new(column_name, Reducer::StDev)
    }

    pub fn mad(column_name: impl Into<String>) -> Self {
        Self::new(column_name, Reducer::Mad)
    }

    #[must_use]
    pub fn reducer(&self) -> Reducer {
        self.reducer
    }
}

impl Aggregation for Reduce {
    fn aggregate_data_type(&self, table: &Table) -> Result<OutputType, AggregationError> {
        let column = table.get_column(&self.column_name)?;
        Ok(OutputType::Value(if self.reducer.keeps_column_type() {
            column.data_type().clone()
        } else {
            DataType::decimal()
        }))
    }

    fn validate(&self, table: &Table) -> Result<(), AggregationError> {
        let column = table.get_column(&self.column_name)?;
        Ok(column.require_numeric(self.reducer.name())?)
    }

    fn run(&self, table: &Table) -> Result<Output, AggregationError> {
        let column = table.get_column(&self.column_name)?;
        Ok(Output::Value(self.reducer.apply(column)?))
    }
}

// ── Table-producing and custom ────────────────────────────────────────

/// Value counts of a column as a `(value, count)` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Counts {
    column_name: String,
}

impl Counts {
    pub fn new(column_name: impl Into<String>) -> Self {
        Self {
            column_name: column_name.into(),
        }
    }
}

impl Aggregation for Counts {
    fn aggregate_data_type(&self, table: &Table) -> Result<OutputType, AggregationError> {
        let column = table.get_column(&self.column_name)?;
        Ok(OutputType::Table(vec![
            (self.column_name.clone(), column.data_type().clone()),
            (COUNT_COLUMN.to_owned(), DataType::int()),
        ]))
    }

    fn run(&self, table: &Table) -> Result<Output, AggregationError> {
        let column = table.get_column(&self.column_name)?;
        Ok(Output::Table(column.counts()?))
    }
}

pub type SummaryFn = Arc<dyn Fn(&Column) -> Result<Value, ColumnError> + Send + Sync>;

/// Arbitrary per-column computation with an up-front result type.
#[derive(Clone)]
pub struct Summary {
    column_name: String,
    data_type: DataType,
    func: SummaryFn,
}

impl Summary {
    pub fn new(
        column_name: impl Into<String>,
        data_type: DataType,
        func: impl Fn(&Column) -> Result<Value, ColumnError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            column_name: column_name.into(),
            data_type,
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Summary")
            .field("column_name", &self.column_name)
            .field("data_type", &self.data_type)
            .finish_non_exhaustive()
    }
}

impl Aggregation for Summary {
    fn aggregate_data_type(&self, _table: &Table) -> Result<OutputType, AggregationError> {
        Ok(OutputType::Value(self.data_type.clone()))
    }

    fn validate(&self, table: &Table) -> Result<(), AggregationError> {
        table.get_column(&self.column_name)?;
        Ok(())
    }

    fn run(&self, table: &Table) -> Result<Output, AggregationError> {
        let column = table.get_column(&self.column_name)?;
        Ok(Output::Value((self.func)(column)?))
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use sf_columnar::ColumnError;
    use sf_frame::{FrameError, Table};
    use sf_types::{DataType, Value};

    use super::{
        Aggregation, AggregationError, All, Any, Count, Counts, First, HasNulls, MaxLength,
        Output, OutputType, Reduce, Reducer, Summary, aggregate, predicate, summarize,
    };

    fn dec(num: i64, scale: u32) -> Value {
        Value::Decimal(Decimal::new(num, scale))
    }

    fn table() -> Table {
        Table::new(
            vec![
                vec![Value::Int(1), dec(219, 2), Value::from("a"), Value::from("yes")],
                vec![Value::Int(2), dec(342, 2), Value::from("bb"), Value::from("no")],
                vec![Value::Null, dec(41, 1), Value::from("ccc"), Value::from("")],
                vec![Value::Int(2), dec(342, 2), Value::Null, Value::from("t")],
            ],
            ["number", "price", "label", "flag"],
            vec![
                DataType::int(),
                DataType::decimal(),
                DataType::text(),
                DataType::boolean(),
            ],
        )
        .expect("table")
    }

    fn value(output: Output) -> Value {
        output.into_value().expect("scalar output")
    }

    // ── First ──────────────────────────────────────────────────────────

    #[test]
    fn first_with_test_returns_first_match() {
        let table = table();
        let first = First::new("number").with_test(predicate(|d| *d == Value::Int(2)));
        assert_eq!(
            first.aggregate_data_type(&table).expect("type"),
            OutputType::Value(DataType::int())
        );
        first.validate(&table).expect("a 2 exists");
        assert_eq!(value(first.run(&table).expect("run")), Value::Int(2));
        assert_eq!(value(first.run(&table).expect("rerun")), Value::Int(2));
    }

    #[test]
    fn first_without_test_may_return_null() {
        let table = Table::new(
            vec![vec![Value::Null], vec![Value::Int(3)]],
            ["n"],
            vec![DataType::int()],
        )
        .expect("table");
        let out = aggregate(&table, &First::new("n")).expect("first");
        assert_eq!(value(out), Value::Null);
    }

    #[test]
    fn first_validate_reports_no_matching_value() {
        let table = Table::new(
            vec![vec![Value::Int(1)], vec![Value::Int(3)]],
            ["n"],
            vec![DataType::int()],
        )
        .expect("table");
        let first = First::new("n").with_test(predicate(|d| *d == Value::Int(2)));
        assert_eq!(
            first.validate(&table).expect_err("no 2"),
            AggregationError::NoMatchingValue {
                column: "n".to_owned()
            }
        );
        assert_eq!(
            first.run(&table).expect_err("exhausted"),
            AggregationError::Exhausted {
                column: "n".to_owned()
            }
        );
        assert!(matches!(
            aggregate(&table, &first),
            Err(AggregationError::NoMatchingValue { .. })
        ));
    }

    #[test]
    fn unknown_column_surfaces_frame_error() {
        let err = aggregate(&table(), &First::new("missing")).expect_err("missing");
        assert_eq!(
            err,
            AggregationError::Frame(FrameError::ColumnDoesNotExist("missing".to_owned()))
        );
    }

    // ── Any / All ──────────────────────────────────────────────────────

    #[test]
    fn any_and_all_with_tests() {
        let table = table();
        let any = Any::new("number").with_test(predicate(|d| *d == Value::Int(2)));
        assert_eq!(value(aggregate(&table, &any).expect("any")), Value::Bool(true));
        let none = Any::new("number").with_test(predicate(|d| *d == Value::Int(5)));
        assert_eq!(value(aggregate(&table, &none).expect("any")), Value::Bool(false));

        let all = All::new("number").with_test(predicate(|d| *d != Value::Int(5)));
        assert_eq!(value(aggregate(&table, &all).expect("all")), Value::Bool(true));
        let not_all = All::new("number").with_test(predicate(|d| *d == Value::Int(2)));
        assert_eq!(
            value(aggregate(&table, &not_all).expect("all")),
            Value::Bool(false)
        );
    }

    #[test]
    fn any_and_all_default_to_truth_on_boolean_columns() {
        let table = table();
        assert_eq!(
            value(aggregate(&table, &Any::new("flag")).expect("any")),
            Value::Bool(true)
        );
        assert_eq!(
            value(aggregate(&table, &All::new("flag")).expect("all")),
            Value::Bool(false)
        );
        assert!(matches!(
            aggregate(&table, &Any::new("label")),
            Err(AggregationError::Column(ColumnError::Unsupported { .. }))
        ));
    }

    // ── Counting ───────────────────────────────────────────────────────

    #[test]
    fn count_modes() {
        let table = table();
        assert_eq!(value(aggregate(&table, &Count::rows()).expect("rows")), Value::Int(4));
        assert_eq!(
            value(aggregate(&table, &Count::non_null("number")).expect("non null")),
            Value::Int(3)
        );
        assert_eq!(
            value(aggregate(&table, &Count::value("number", 2_i64)).expect("twos")),
            Value::Int(2)
        );
        assert_eq!(
            value(aggregate(&table, &Count::value("number", Value::Null)).expect("nulls")),
            Value::Int(1)
        );
    }

    #[test]
    fn has_nulls_and_max_length() {
        let table = table();
        assert_eq!(
            value(aggregate(&table, &HasNulls::new("number")).expect("nulls")),
            Value::Bool(true)
        );
        assert_eq!(
            value(aggregate(&table, &HasNulls::new("price")).expect("nulls")),
            Value::Bool(false)
        );
        assert_eq!(
            value(aggregate(&table, &MaxLength::new("label")).expect("length")),
            Value::Int(3)
        );
        assert!(matches!(
            aggregate(&table, &MaxLength::new("price")),
            Err(AggregationError::Column(ColumnError::Unsupported { .. }))
        ));
    }

    // ── Reduce ─────────────────────────────────────────────────────────

    #[test]
    fn reduce_declares_result_types() {
        let table = table();
        assert_eq!(
            Reduce::sum("number").aggregate_data_type(&table).expect("type"),
            OutputType::Value(DataType::int())
        );
        assert_eq!(
            Reduce::mode("number").aggregate_data_type(&table).expect("type"),
            OutputType::Value(DataType::int())
        );
        assert_eq!(
            Reduce::variance("number").aggregate_data_type(&table).expect("type"),
            OutputType::Value(DataType::decimal())
        );

        let variance = Reduce::variance("price").reducer();
        assert_eq!(variance, Reducer::Variance);
        assert_eq!(variance.name(), "variance");
        assert!(!variance.keeps_column_type());
        assert!(Reduce::mode("number").reducer().keeps_column_type());
    }

    #[test]
    fn reduce_runs_column_statistics() {
        let table = table();
        assert_eq!(value(aggregate(&table, &Reduce::sum("number")).expect("sum")), Value::Int(5));
        assert_eq!(value(aggregate(&table, &Reduce::max("price")).expect("max")), dec(41, 1));
        assert_eq!(
            value(aggregate(&table, &Reduce::median("price")).expect("median")),
            dec(342, 2)
        );
        assert_eq!(
            value(aggregate(&table, &Reduce::variance("price")).expect("variance")),
            dec(633_225, 6)
        );
        assert_eq!(
            value(
                aggregate(&table, &Reduce::new("price", Reducer::PopulationVariance))
                    .expect("population variance")
            ),
            dec(47_491_875, 8)
        );
    }

    #[test]
    fn reduce_surfaces_null_computation_and_unsupported() {
        let table = table();
        assert!(matches!(
            aggregate(&table, &Reduce::median("number")),
            Err(AggregationError::Column(ColumnError::NullComputation { .. }))
        ));
        let err = Reduce::sum("label").validate(&table).expect_err("text");
        assert!(matches!(
            err,
            AggregationError::Column(ColumnError::Unsupported {
                operation: "sum",
                ..
            })
        ));
    }

    // ── Table-producing and custom ─────────────────────────────────────

    #[test]
    fn counts_produces_a_table() {
        let table = table();
        let counts = Counts::new("number");
        assert_eq!(
            counts.aggregate_data_type(&table).expect("type"),
            OutputType::Table(vec![
                ("number".to_owned(), DataType::int()),
                ("count".to_owned(), DataType::int()),
            ])
        );
        let out = aggregate(&table, &counts)
            .expect("counts")
            .into_table()
            .expect("table output");
        assert_eq!(
            out.rows(),
            &[
                vec![Value::Int(1), Value::Int(1)],
                vec![Value::Int(2), Value::Int(2)],
                vec![Value::Null, Value::Int(1)],
            ]
        );
    }

    #[test]
    fn summary_applies_custom_function() {
        let table = table();
        let labelled = Summary::new("label", DataType::int(), |column| {
            Ok(Value::Int(i64::try_from(column.non_null_count()?).unwrap_or(i64::MAX)))
        });
        assert_eq!(
            value(aggregate(&table, &labelled).expect("summary")),
            Value::Int(3)
        );
    }

    #[test]
    fn summarize_builds_typed_one_row_table() {
        let table = table();
        let aggregations: [(&str, &dyn Aggregation); 4] = [
            ("rows", &Count::rows()),
            ("total", &Reduce::sum("number")),
            ("median_price", &Reduce::median("price")),
            ("any_flag", &Any::new("flag")),
        ];
        let summary = summarize(&table, &aggregations).expect("summary");
        assert_eq!(summary.column_names(), vec!["rows", "total", "median_price", "any_flag"]);
        assert_eq!(
            summary.column_types(),
            vec![
                &DataType::int(),
                &DataType::int(),
                &DataType::decimal(),
                &DataType::boolean(),
            ]
        );
        assert_eq!(
            summary.rows()[0],
            vec![Value::Int(4), Value::Int(5), dec(342, 2), Value::Bool(true)]
        );
    }

    #[test]
    fn summarize_rejects_table_output() {
        let counts: &dyn Aggregation = &Counts::new("number");
        let err = summarize(&table(), &[("counts", counts)]).expect_err("table");
        assert_eq!(
            err,
            AggregationError::TableOutput {
                column: "counts".to_owned()
            }
        );
    }
}
