//! Core domain types for Staffload personnel imports.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ImportRow
// ---------------------------------------------------------------------------

/// One CSV data line after field extraction and validation.
///
/// Row numbers are 1-based; the header is row 0. A row is valid exactly when
/// its error list is empty, which [`ImportRow::add_error`] maintains.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportRow {
    pub row_number: usize,
    pub payroll_number: Option<String>,
    pub forenames: Option<String>,
    pub surname: Option<String>,
    pub telephone: Option<String>,
    pub mobile: Option<String>,
    pub address_line1: Option<String>,
    pub address_line2: Option<String>,
    pub postcode: Option<String>,
    pub email: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub date_of_birth_raw: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub start_date_raw: Option<String>,
    is_valid: bool,
    errors: Vec<String>,
}

impl ImportRow {
    /// Create an empty, valid row for the given row number.
    pub fn new(row_number: usize) -> Self {
        Self {
            row_number,
            is_valid: true,
            ..Self::default()
        }
    }

    /// Create a row that carries only its number and a single parse failure.
    pub fn unparseable(row_number: usize, reason: impl std::fmt::Display) -> Self {
        let mut row = Self::new(row_number);
        row.add_error(format!("Failed to parse row: {reason}"));
        row
    }

    /// Build a row from a persisted employee, e.g. to re-validate an edit.
    pub fn from_employee(row_number: usize, employee: &Employee) -> Self {
        Self {
            row_number,
            payroll_number: Some(employee.payroll_number.clone()),
            forenames: Some(employee.forenames.clone()),
            surname: Some(employee.surname.clone()),
            telephone: employee.telephone.clone(),
            mobile: employee.mobile.clone(),
            address_line1: Some(employee.address_line1.clone()),
            address_line2: employee.address_line2.clone(),
            postcode: Some(employee.postcode.clone()),
            email: Some(employee.email.clone()),
            date_of_birth: Some(employee.date_of_birth),
            date_of_birth_raw: Some(employee.date_of_birth.format("%d/%m/%Y").to_string()),
            start_date: Some(employee.start_date),
            start_date_raw: Some(employee.start_date.format("%d/%m/%Y").to_string()),
            is_valid: true,
            errors: Vec::new(),
        }
    }

    /// Append a validation message and mark the row invalid.
    pub fn add_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
        self.is_valid = false;
    }

    /// Whether the row passed every check.
    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// Validation messages in the order they were raised.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }
}

// ---------------------------------------------------------------------------
// Employee / EmployeeRecord
// ---------------------------------------------------------------------------

/// Maximum field lengths enforced on import and edit.
pub mod limits {
    pub const PAYROLL_NUMBER: usize = 50;
    pub const FORENAMES: usize = 100;
    pub const SURNAME: usize = 100;
    pub const TELEPHONE: usize = 20;
    pub const MOBILE: usize = 20;
    pub const ADDRESS_LINE1: usize = 200;
    pub const ADDRESS_LINE2: usize = 100;
    pub const POSTCODE: usize = 20;
    pub const EMAIL: usize = 100;
}

/// Employee fields as persisted, without the store-assigned identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    /// Globally unique payroll number.
    pub payroll_number: String,
    pub forenames: String,
    pub surname: String,
    pub date_of_birth: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telephone: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mobile: Option<String>,
    pub address_line1: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address_line2: Option<String>,
    pub postcode: String,
    /// Home email address.
    pub email: String,
    pub start_date: NaiveDate,
    /// Set once when the record is committed.
    pub created_at: DateTime<Utc>,
}

/// A persisted employee with its numeric identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmployeeRecord {
    pub id: i64,
    #[serde(flatten)]
    pub employee: Employee,
}

/// Sort records by surname, then forenames, then id.
pub fn sort_by_name(records: &mut [EmployeeRecord]) {
    records.sort_by(|a, b| {
        a.employee
            .surname
            .cmp(&b.employee.surname)
            .then_with(|| a.employee.forenames.cmp(&b.employee.forenames))
            .then_with(|| a.id.cmp(&b.id))
    });
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Outcome of a committing import.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ImportReport {
    pub total_rows: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// Human-readable errors, row-prefixed where they originate from a row.
    pub errors: Vec<String>,
    /// Committed records sorted by surname then forenames.
    pub imported_records: Vec<EmployeeRecord>,
}

impl ImportReport {
    /// True when something was imported and nothing went wrong.
    pub fn is_success(&self) -> bool {
        self.success_count > 0 && self.errors.is_empty()
    }
}

/// Outcome of a dry-run validation.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub is_valid: bool,
    pub valid_row_count: usize,
    pub invalid_row_count: usize,
    pub validation_errors: Vec<String>,
    /// The first valid rows, in parse order.
    pub preview_rows: Vec<ImportRow>,
}
