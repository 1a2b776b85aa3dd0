#![forbid(unsafe_code)]

use std::collections::BTreeMap;

use sf_columnar::{Column, ColumnError, RowStore};
use sf_types::{DataType, Row, Value};
use thiserror::Error;

/// Name of the occurrence column produced by [`ColumnCounts::counts`].
pub const COUNT_COLUMN: &str = "count";

#[derive(Debug, Error, Clone, PartialEq)]
pub enum FrameError {
    #[error("{names} column names were given for {types} column types")]
    SchemaMismatch { names: usize, types: usize },
    #[error("duplicate column name '{0}'")]
    DuplicateColumn(String),
    #[error("column '{0}' does not exist")]
    ColumnDoesNotExist(String),
    #[error(transparent)]
    Column(#[from] ColumnError),
}

/// Immutable table: shared row storage plus one typed [`Column`] view per
/// declared position.
#[derive(Debug, Clone)]
pub struct Table {
    rows: RowStore,
    columns: Vec<Column>,
    by_name: BTreeMap<String, usize>,
}

impl Table {
    /// Build a table and validate every column against its declared type.
    pub fn new<S: Into<String>>(
        rows: Vec<Row>,
        column_names: impl IntoIterator<Item = S>,
        column_types: Vec<DataType>,
    ) -> Result<Self, FrameError> {
        let column_names: Vec<String> = column_names.into_iter().map(Into::into).collect();
        if column_names.len() != column_types.len() {
            return Err(FrameError::SchemaMismatch {
                names: column_names.len(),
                types: column_types.len(),
            });
        }

        let rows = RowStore::new(rows);
        let mut by_name = BTreeMap::new();
        let mut columns = Vec::with_capacity(column_names.len());
        for (position, (name, data_type)) in column_names.into_iter().zip(column_types).enumerate()
        {
            if by_name.insert(name.clone(), position).is_some() {
                return Err(FrameError::DuplicateColumn(name));
            }
            let column = Column::new(name, data_type, rows.clone(), position);
            column.validate()?;
            columns.push(column);
        }

        tracing::debug!(
            rows = rows.len(),
            columns = columns.len(),
            "constructed table"
        );

        Ok(Self {
            rows,
            columns,
            by_name,
        })
    }

    pub fn get_column(&self, name: &str) -> Result<&Column, FrameError> {
        self.by_name
            .get(name)
            .map(|&position| &self.columns[position])
            .ok_or_else(|| FrameError::ColumnDoesNotExist(name.to_owned()))
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(Column::name).collect()
    }

    #[must_use]
    pub fn column_types(&self) -> Vec<&DataType> {
        self.columns.iter().map(Column::data_type).collect()
    }

    #[must_use]
    pub fn rows(&self) -> &[Row] {
        self.rows.rows()
    }

    #[must_use]
    pub fn row_store(&self) -> &RowStore {
        &self.rows
    }

    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }
}

/// Value counts as a derived table.
pub trait ColumnCounts {
    /// Two-column table of `(value, count)` in first-seen order. The value
    /// column keeps the source name and type; the count column is Int.
    fn counts(&self) -> Result<Table, FrameError>;
}

impl ColumnCounts for Column {
    fn counts(&self) -> Result<Table, FrameError> {
        let rows = self
            .value_counts()?
            .into_iter()
            .map(|(value, count)| {
                vec![value, Value::Int(i64::try_from(count).unwrap_or(i64::MAX))]
            })
            .collect();
        Table::new(
            rows,
            [self.name(), COUNT_COLUMN],
            vec![self.data_type().clone(), DataType::int()],
        )
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal::Decimal;
    use sf_columnar::ColumnError;
    use sf_types::{DataType, Value};

    use super::{ColumnCounts, FrameError, Table};

    fn table() -> Table {
        Table::new(
            vec![
                vec![Value::Int(1), Value::Int(2), Value::from("a")],
                vec![Value::Int(2), Value::Int(3), Value::from("b")],
                vec![Value::Null, Value::Int(4), Value::from("c")],
            ],
            ["one", "two", "three"],
            vec![DataType::int(), DataType::int(), DataType::text()],
        )
        .expect("table")
    }

    #[test]
    fn columns_are_looked_up_by_name() {
        let table = table();
        assert_eq!(table.column_count(), 3);
        assert_eq!(table.row_count(), 3);
        assert_eq!(table.column_names(), vec!["one", "two", "three"]);

        let one = table.get_column("one").expect("one");
        assert_eq!(
            one.materialize().expect("materialize"),
            &[Value::Int(1), Value::Int(2), Value::Null]
        );
        assert!(std::ptr::eq(one, table.get_column("one").expect("one")));
        assert!(!std::ptr::eq(one, table.get_column("two").expect("two")));
    }

    #[test]
    fn missing_column_is_an_error() {
        let err = table().get_column("four").expect_err("no such column");
        assert_eq!(err, FrameError::ColumnDoesNotExist("four".to_owned()));
    }

    #[test]
    fn columns_iterate_in_declared_order() {
        let table = table();
        let data: Vec<Vec<Value>> = table
            .columns()
            .iter()
            .map(|c| c.materialize().expect("materialize").to_vec())
            .collect();
        assert_eq!(data[1], vec![Value::Int(2), Value::Int(3), Value::Int(4)]);
        assert_eq!(
            data[2],
            vec![Value::from("a"), Value::from("b"), Value::from("c")]
        );
    }

    #[test]
    fn every_column_views_the_same_rows() {
        let table = table();
        let first = table.columns()[0].row_store();
        assert!(table.columns().iter().all(|c| c.row_store().shares_storage(first)));
        assert!(table.row_store().shares_storage(first));
    }

    #[test]
    fn construction_validates_columns() {
        let err = Table::new(
            vec![vec![Value::from("yes")], vec![Value::from("perhaps")]],
            ["flag"],
            vec![DataType::boolean()],
        )
        .expect_err("perhaps is not boolean");
        assert!(matches!(
            err,
            FrameError::Column(ColumnError::Cast { row: 1, .. })
        ));
    }

    #[test]
    fn schema_must_line_up() {
        let err = Table::new(vec![], ["a", "b"], vec![DataType::int()]).expect_err("mismatch");
        assert_eq!(err, FrameError::SchemaMismatch { names: 2, types: 1 });

        let err = Table::new(vec![], ["a", "a"], vec![DataType::int(), DataType::text()])
            .expect_err("duplicate");
        assert_eq!(err, FrameError::DuplicateColumn("a".to_owned()));
    }

    #[test]
    fn counts_builds_first_seen_table() {
        let table = Table::new(
            vec![
                vec![Value::Int(1), Value::Int(2), Value::from("a")],
                vec![Value::Int(2), Value::Int(3), Value::from("b")],
                vec![Value::Null, Value::Int(4), Value::from("c")],
                vec![Value::Int(1), Value::Int(2), Value::from("a")],
                vec![Value::Int(1), Value::Int(2), Value::from("a")],
            ],
            ["one", "two", "three"],
            vec![DataType::int(), DataType::int(), DataType::text()],
        )
        .expect("table");

        let counts = table.get_column("one").expect("one").counts().expect("counts");
        assert_eq!(counts.column_count(), 2);
        assert_eq!(counts.row_count(), 3);
        assert_eq!(counts.rows()[0], vec![Value::Int(1), Value::Int(3)]);
        assert_eq!(counts.rows()[1], vec![Value::Int(2), Value::Int(1)]);
        assert_eq!(counts.rows()[2], vec![Value::Null, Value::Int(1)]);
        assert_eq!(
            counts.get_column("one").expect("one").materialize().expect("values"),
            &[Value::Int(1), Value::Int(2), Value::Null]
        );
        assert_eq!(
            counts.get_column("count").expect("count").materialize().expect("values"),
            &[Value::Int(3), Value::Int(1), Value::Int(1)]
        );
        assert_eq!(
            counts.column_types(),
            vec![&DataType::int(), &DataType::int()]
        );
    }

    #[test]
    fn counts_keeps_decimal_source_type() {
        let table = Table::new(
            vec![
                vec![Value::Decimal(Decimal::new(15, 1))],
                vec![Value::from("1.50")],
            ],
            ["price"],
            vec![DataType::decimal()],
        )
        .expect("table");
        let counts = table.get_column("price").expect("price").counts().expect("counts");
        assert_eq!(counts.row_count(), 1);
        assert_eq!(counts.column_types()[0], &DataType::decimal());
        assert_eq!(counts.rows()[0][1], Value::Int(2));
    }
}
