#![forbid(unsafe_code)]

//! Fixture-driven conformance harness.
//!
//! A fixture is a JSON document describing a typed table (column names,
//! serde-configured [`DataType`]s and raw rows) plus a list of checks. Each
//! check names a column, an aggregation, and either the expected value or a
//! fragment of the expected error message.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sf_aggregate::{
    Aggregation, AggregationError, All, Any, Count, Counts, First, HasNulls, MaxLength, Output,
    Reduce, Reducer, aggregate, predicate,
};
use sf_frame::{FrameError, Table};
use sf_types::{DataType, Row, Value};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub fixture_root: PathBuf,
}

impl HarnessConfig {
    #[must_use]
    pub fn default_paths() -> Self {
        Self {
            fixture_root: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures"),
        }
    }
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self::default_paths()
    }
}

#[derive(Debug, Error)]
pub enum HarnessError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("fixture format error: {0}")]
    FixtureFormat(String),
}

// ── Fixture model ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureColumn {
    pub name: String,
    pub data_type: DataType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixtureOperation {
    Sum,
    Min,
    Max,
    Mean,
    Median,
    Mode,
    Variance,
    PopulationVariance,
    Stdev,
    PopulationStdev,
    Mad,
    RowCount,
    NonNullCount,
    CountValue,
    HasNulls,
    MaxLength,
    First,
    Any,
    All,
    Counts,
}

impl FixtureOperation {
    /// Aggregation for this operation over `column`. `argument` is the value
    /// counted by `count_value`, and the value searched for by `first`, `any`
    /// and `all`.
    pub fn aggregation(
        self,
        column: &str,
        argument: Option<&Value>,
    ) -> Result<Box<dyn Aggregation>, HarnessError> {
        let reduce =
            |reducer: Reducer| -> Box<dyn Aggregation> { Box::new(Reduce::new(column, reducer)) };
        let equals = |target: &Value| {
            let target = target.clone();
            predicate(move |v| *v == target)
        };
        Ok(match self {
            Self::Sum => reduce(Reducer::Sum),
            Self::Min => reduce(Reducer::Min),
            Self::Max => reduce(Reducer::Max),
            Self::Mean => reduce(Reducer::Mean),
            Self::Median => reduce(Reducer::Median),
            Self::Mode => reduce(Reducer::Mode),
            Self::Variance => reduce(Reducer::Variance),
            Self::PopulationVariance => reduce(Reducer::PopulationVariance),
            Self::Stdev => reduce(Reducer::StDev),
            Self::PopulationStdev => reduce(Reducer::PopulationStDev),
            Self::Mad => reduce(Reducer::Mad),
            Self::RowCount => Box::new(Count::rows()),
            Self::NonNullCount => Box::new(Count::non_null(column)),
            Self::CountValue => {
                let value = argument.ok_or_else(|| {
                    HarnessError::FixtureFormat("count_value needs an argument".to_owned())
                })?;
                Box::new(Count::value(column, value.clone()))
            }
            Self::HasNulls => Box::new(HasNulls::new(column)),
            Self::MaxLength => Box::new(MaxLength::new(column)),
            Self::First => match argument {
                Some(target) => Box::new(First::new(column).with_test(equals(target))),
                None => Box::new(First::new(column)),
            },
            Self::Any => match argument {
                Some(target) => Box::new(Any::new(column).with_test(equals(target))),
                None => Box::new(Any::new(column)),
            },
            Self::All => match argument {
                Some(target) => Box::new(All::new(column).with_test(equals(target))),
                None => Box::new(All::new(column)),
            },
            Self::Counts => Box::new(Counts::new(column)),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixtureCheck {
    pub column: String,
    pub operation: FixtureOperation,
    #[serde(default)]
    pub argument: Option<Value>,
    #[serde(default)]
    pub expected: Option<Value>,
    #[serde(default)]
    pub expected_rows: Option<Vec<Row>>,
    #[serde(default)]
    pub expected_error_contains: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableFixture {
    pub case_id: String,
    pub columns: Vec<FixtureColumn>,
    pub rows: Vec<Row>,
    #[serde(default)]
    pub checks: Vec<FixtureCheck>,
}

impl TableFixture {
    pub fn build_table(&self) -> Result<Table, FrameError> {
        Table::new(
            self.rows.clone(),
            self.columns.iter().map(|c| c.name.as_str()),
            self.columns.iter().map(|c| c.data_type.clone()).collect(),
        )
    }

    fn validate_checks(&self) -> Result<(), HarnessError> {
        for (idx, check) in self.checks.iter().enumerate() {
            let expectations = usize::from(check.expected.is_some())
                + usize::from(check.expected_rows.is_some())
                + usize::from(check.expected_error_contains.is_some());
            if expectations != 1 {
                return Err(HarnessError::FixtureFormat(format!(
                    "{}: check {idx} must set exactly one of expected, expected_rows, \
                     expected_error_contains",
                    self.case_id
                )));
            }
        }
        Ok(())
    }
}

// ── Results ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Pass,
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub case_id: String,
    pub column: String,
    pub operation: FixtureOperation,
    pub status: CaseStatus,
    pub mismatch: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HarnessReport {
    pub suite: &'static str,
    pub fixture_count: usize,
    pub case_count: usize,
    pub failures: Vec<CaseResult>,
}

impl HarnessReport {
    #[must_use]
    pub fn is_green(&self) -> bool {
        self.failures.is_empty()
    }
}

// ── Running ───────────────────────────────────────────────────────────

pub fn parse_fixture(body: &str) -> Result<TableFixture, HarnessError> {
    let fixture: TableFixture = serde_json::from_str(body)?;
    fixture.validate_checks()?;
    Ok(fixture)
}

pub fn load_fixture(path: &Path) -> Result<TableFixture, HarnessError> {
    let body = fs::read_to_string(path)?;
    parse_fixture(&body)
}

/// Every `*.json` fixture under the configured root, ordered by case id.
pub fn load_fixtures(config: &HarnessConfig) -> Result<Vec<TableFixture>, HarnessError> {
    let mut fixtures = list_fixture_files(&config.fixture_root)?
        .iter()
        .map(|path| load_fixture(path))
        .collect::<Result<Vec<_>, _>>()?;
    fixtures.sort_by(|a, b| a.case_id.cmp(&b.case_id));
    Ok(fixtures)
}

fn list_fixture_files(root: &Path) -> Result<Vec<PathBuf>, HarnessError> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];

    while let Some(current) = stack.pop() {
        for entry in fs::read_dir(current)? {
            let path = entry?.path();
            if path.is_dir() {
                stack.push(path);
            } else if path.extension().is_some_and(|ext| ext == "json") {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Build the fixture table and evaluate every check against it.
pub fn run_fixture(fixture: &TableFixture) -> Result<Vec<CaseResult>, HarnessError> {
    let table = fixture.build_table()?;
    fixture
        .checks
        .iter()
        .map(|check| {
            let aggregation = check
                .operation
                .aggregation(&check.column, check.argument.as_ref())?;
            let outcome = aggregate(&table, aggregation.as_ref());
            let mismatch = compare(check, outcome);
            Ok(CaseResult {
                case_id: fixture.case_id.clone(),
                column: check.column.clone(),
                operation: check.operation,
                status: if mismatch.is_none() {
                    CaseStatus::Pass
                } else {
                    CaseStatus::Fail
                },
                mismatch,
            })
        })
        .collect()
}

pub fn run_suite(config: &HarnessConfig) -> Result<HarnessReport, HarnessError> {
    let fixtures = load_fixtures(config)?;
    let mut case_count = 0;
    let mut failures = Vec::new();
    for fixture in &fixtures {
        let results = run_fixture(fixture)?;
        case_count += results.len();
        failures.extend(results.into_iter().filter(|r| r.status == CaseStatus::Fail));
    }
    Ok(HarnessReport {
        suite: "fixtures",
        fixture_count: fixtures.len(),
        case_count,
        failures,
    })
}

fn compare(check: &FixtureCheck, outcome: Result<Output, AggregationError>) -> Option<String> {
    match (outcome, check) {
        (
            Err(err),
            FixtureCheck {
                expected_error_contains: Some(fragment),
                ..
            },
        ) => {
            let message = err.to_string();
            (!message.contains(fragment.as_str()))
                .then(|| format!("error '{message}' does not mention '{fragment}'"))
        }
        (Err(err), _) => Some(format!("unexpected error: {err}")),
        (
            Ok(_),
            FixtureCheck {
                expected_error_contains: Some(fragment),
                ..
            },
        ) => Some(format!("expected an error mentioning '{fragment}'")),
        (Ok(Output::Value(actual)), FixtureCheck {
            expected: Some(expected),
            ..
        }) => (actual != *expected).then(|| format!("expected {expected}, got {actual}")),
        (Ok(Output::Table(actual)), FixtureCheck {
            expected_rows: Some(expected),
            ..
        }) => (actual.rows() != expected.as_slice())
            .then(|| format!("expected rows {expected:?}, got {:?}", actual.rows())),
        (Ok(Output::Value(actual)), _) => Some(format!("expected a table, got value {actual}")),
        (Ok(Output::Table(_)), _) => Some("expected a value, got a table".to_owned()),
    }
}
