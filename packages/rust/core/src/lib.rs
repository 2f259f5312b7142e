//! Core domain logic for Staffload.
//!
//! This crate turns CSV exports of personnel records into validated
//! [`ImportRow`](staffload_shared::ImportRow)s and drives them into a
//! [`RecordStore`](staffload_storage::RecordStore) as one atomic batch
//! (`import_employees`), or reports what an import would do without
//! committing (`validate_employees`).

pub mod dates;
pub mod import;
pub mod parser;
pub mod validation;

pub use import::{
    ImportOptions, NO_VALID_ROWS, ProgressReporter, SilentProgress, import_employees,
    validate_employees,
};
pub use parser::{Column, detect_delimiter, parse_rows};
pub use validation::{validate_fields, validate_row};
