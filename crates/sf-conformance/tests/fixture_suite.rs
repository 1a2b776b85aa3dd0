#![forbid(unsafe_code)]

use std::path::PathBuf;

use sf_conformance::{CaseStatus, HarnessConfig, load_fixtures, run_fixture, run_suite};

#[test]
fn bundled_fixtures_are_green() {
    let report = run_suite(&HarnessConfig::default_paths()).expect("suite runs");
    assert_eq!(report.suite, "fixtures");
    assert_eq!(report.fixture_count, 3);
    assert_eq!(report.case_count, 38);
    assert!(report.is_green(), "failures: {:#?}", report.failures);
}

#[test]
fn fixtures_load_in_case_id_order() {
    let fixtures = load_fixtures(&HarnessConfig::default()).expect("fixtures load");
    let ids: Vec<&str> = fixtures.iter().map(|f| f.case_id.as_str()).collect();
    assert_eq!(ids, vec!["boolean_columns", "decimal_columns", "int_columns"]);
}

#[test]
fn every_check_reports_its_own_case() {
    let fixtures = load_fixtures(&HarnessConfig::default()).expect("fixtures load");
    for fixture in &fixtures {
        let results = run_fixture(fixture).expect("table builds");
        assert_eq!(results.len(), fixture.checks.len());
        for (result, check) in results.iter().zip(&fixture.checks) {
            assert_eq!(result.case_id, fixture.case_id);
            assert_eq!(result.column, check.column);
            assert_eq!(result.operation, check.operation);
            assert_eq!(result.status, CaseStatus::Pass, "{result:?}");
        }
    }
}

#[test]
fn missing_fixture_root_yields_empty_suite() {
    let config = HarnessConfig {
        fixture_root: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("no-such-fixtures"),
    };
    let report = run_suite(&config).expect("suite runs");
    assert_eq!(report.fixture_count, 0);
    assert_eq!(report.case_count, 0);
    assert!(report.is_green());
}
