//! Shared types, error model, and configuration for Staffload.
//!
//! This crate is the foundation depended on by all other Staffload crates.
//! It provides:
//! - [`StaffloadError`], the unified error type
//! - Domain types ([`ImportRow`], [`Employee`], [`EmployeeRecord`], reports)
//! - Configuration ([`AppConfig`], [`ValidationRules`], config loading)

pub mod config;
pub mod error;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, DatabaseConfig, ImportConfig, ValidationConfig, ValidationRules, config_dir,
    config_file_path, init_config, load_config, load_config_from, resolve_db_path,
};
pub use error::{Result, StaffloadError};
pub use types::{
    Employee, EmployeeRecord, ImportReport, ImportRow, ValidationReport, limits, sort_by_name,
};
