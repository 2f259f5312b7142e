//! End-to-end import: CSV → rows → duplicate check → atomic commit → report.
//!
//! Both entry points always hand back a complete report. Anything that goes
//! wrong, from an unreadable stream to a rejected commit, becomes report
//! errors rather than an `Err`.

use std::collections::HashSet;
use std::io::Read;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use staffload_shared::{
    AppConfig, Employee, ImportReport, ImportRow, ValidationReport, ValidationRules, sort_by_name,
};
use staffload_storage::RecordStore;

use crate::parser::parse_rows;

/// Summary error when nothing survives validation.
pub const NO_VALID_ROWS: &str = "No valid rows found to import";

/// Options shared by [`import_employees`] and [`validate_employees`].
#[derive(Debug, Clone)]
pub struct ImportOptions {
    /// Row validation rules, including the reference date.
    pub rules: ValidationRules,
    /// Maximum number of preview rows in a [`ValidationReport`].
    pub preview_rows: usize,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            rules: ValidationRules::default(),
            preview_rows: 10,
        }
    }
}

impl From<&AppConfig> for ImportOptions {
    fn from(config: &AppConfig) -> Self {
        Self {
            rules: ValidationRules::from(config),
            preview_rows: config.import.preview_rows,
        }
    }
}

/// Progress callback for reporting import status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called after each distinct payroll number is checked against the store.
    fn row_checked(&self, current: usize, total: usize);
    /// Called when the import completes.
    fn done(&self, report: &ImportReport);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn row_checked(&self, _current: usize, _total: usize) {}
    fn done(&self, _report: &ImportReport) {}
}

// ---------------------------------------------------------------------------
// Shared steps
// ---------------------------------------------------------------------------

/// Rows after parsing and the store duplicate check.
struct Screened {
    total_rows: usize,
    valid: Vec<ImportRow>,
    invalid_count: usize,
    errors: Vec<String>,
    /// Set when the store could not answer an existence check.
    store_error: Option<String>,
}

/// Parse, partition, and drop rows whose payroll number is already stored.
async fn screen<S: RecordStore>(
    store: &S,
    input: impl Read,
    rules: &ValidationRules,
    progress: &dyn ProgressReporter,
) -> Screened {
    progress.phase("Parsing CSV");
    let rows = match parse_rows(input, rules) {
        Ok(rows) => rows,
        Err(e) => {
            warn!(error = %e, "input could not be read");
            return Screened {
                total_rows: 0,
                valid: Vec::new(),
                invalid_count: 0,
                errors: vec![format!("Error reading CSV file: {e}")],
                store_error: None,
            };
        }
    };

    let total_rows = rows.len();
    let (valid, invalid): (Vec<ImportRow>, Vec<ImportRow>) =
        rows.into_iter().partition(ImportRow::is_valid);

    let mut errors: Vec<String> = invalid
        .iter()
        .flat_map(|row| {
            row.errors()
                .iter()
                .map(move |msg| format!("Row {}: {msg}", row.row_number))
        })
        .collect();
    let mut invalid_count = invalid.len();

    if valid.is_empty() {
        errors.push(NO_VALID_ROWS.to_string());
        return Screened {
            total_rows,
            valid,
            invalid_count,
            errors,
            store_error: None,
        };
    }

    progress.phase("Checking for existing records");
    let existing = match existing_payroll_numbers(store, &valid, progress).await {
        Ok(existing) => existing,
        Err(e) => {
            warn!(error = %e, "existence check failed");
            return Screened {
                total_rows,
                valid,
                invalid_count,
                errors,
                store_error: Some(e.to_string()),
            };
        }
    };

    let mut kept = Vec::with_capacity(valid.len());
    for row in valid {
        let key = row.payroll_number.as_deref().unwrap_or_default();
        if existing.contains(key) {
            debug!(row = row.row_number, payroll_number = key, "already in store");
            errors.push(format!(
                "Row {}: Payroll number '{key}' already exists in database",
                row.row_number
            ));
            invalid_count += 1;
        } else {
            kept.push(row);
        }
    }

    Screened {
        total_rows,
        valid: kept,
        invalid_count,
        errors,
        store_error: None,
    }
}

/// One existence query per distinct payroll number among `rows`.
async fn existing_payroll_numbers<S: RecordStore>(
    store: &S,
    rows: &[ImportRow],
    progress: &dyn ProgressReporter,
) -> staffload_shared::Result<HashSet<String>> {
    let mut seen = HashSet::new();
    let distinct: Vec<&str> = rows
        .iter()
        .filter_map(|r| r.payroll_number.as_deref())
        .filter(|key| seen.insert(*key))
        .collect();

    let mut existing = HashSet::new();
    for (i, key) in distinct.iter().enumerate() {
        if store.exists(key).await? {
            existing.insert((*key).to_string());
        }
        progress.row_checked(i + 1, distinct.len());
    }
    Ok(existing)
}

/// Map a validated row onto the persisted shape.
fn to_employee(row: &ImportRow, created_at: chrono::DateTime<Utc>) -> Option<Employee> {
    Some(Employee {
        payroll_number: row.payroll_number.clone()?,
        forenames: row.forenames.clone()?,
        surname: row.surname.clone()?,
        date_of_birth: row.date_of_birth?,
        telephone: row.telephone.clone(),
        mobile: row.mobile.clone(),
        address_line1: row.address_line1.clone()?,
        address_line2: row.address_line2.clone(),
        postcode: row.postcode.clone()?,
        email: row.email.clone()?,
        start_date: row.start_date?,
        created_at,
    })
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Import every valid row of `input` into `store` as a single atomic batch.
#[instrument(skip_all)]
pub async fn import_employees<S: RecordStore>(
    store: &S,
    input: impl Read,
    options: &ImportOptions,
    progress: &dyn ProgressReporter,
) -> ImportReport {
    let start = Instant::now();
    let screened = screen(store, input, &options.rules, progress).await;

    let mut report = ImportReport {
        total_rows: screened.total_rows,
        success_count: 0,
        failure_count: screened.invalid_count,
        errors: screened.errors,
        imported_records: Vec::new(),
    };

    if let Some(message) = screened.store_error {
        report.errors.push(format!("Database error: {message}"));
        report.failure_count += screened.valid.len();
        progress.done(&report);
        return report;
    }

    let created_at = Utc::now();
    let employees: Vec<Employee> = screened
        .valid
        .iter()
        .filter_map(|row| to_employee(row, created_at))
        .collect();

    if !employees.is_empty() {
        progress.phase("Saving records");
        match store.add_many(&employees).await {
            Ok(mut records) => {
                report.success_count = records.len();
                sort_by_name(&mut records);
                report.imported_records = records;
            }
            Err(e) => {
                warn!(error = %e, rows = employees.len(), "batch commit rejected");
                report.errors.push(format!("Database error: {e}"));
                report.failure_count += employees.len();
            }
        }
    }

    progress.done(&report);

    info!(
        total = report.total_rows,
        imported = report.success_count,
        failed = report.failure_count,
        elapsed_ms = start.elapsed().as_millis(),
        "import complete"
    );

    report
}

/// Run every import step except the commit.
#[instrument(skip_all)]
pub async fn validate_employees<S: RecordStore>(
    store: &S,
    input: impl Read,
    options: &ImportOptions,
) -> ValidationReport {
    let mut screened = screen(store, input, &options.rules, &SilentProgress).await;

    if let Some(message) = screened.store_error.take() {
        screened.errors.push(format!("Database error: {message}"));
        screened.invalid_count += screened.valid.len();
        screened.valid.clear();
    }

    let report = ValidationReport {
        is_valid: !screened.valid.is_empty() && screened.errors.is_empty(),
        valid_row_count: screened.valid.len(),
        invalid_row_count: screened.invalid_count,
        validation_errors: screened.errors,
        preview_rows: screened
            .valid
            .into_iter()
            .take(options.preview_rows)
            .collect(),
    };

    info!(
        valid = report.valid_row_count,
        invalid = report.invalid_row_count,
        is_valid = report.is_valid,
        "validation complete"
    );

    report
}
