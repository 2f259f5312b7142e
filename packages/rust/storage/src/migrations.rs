//! SQL migration definitions for the Staffload database.
//!
//! Migrations are applied in order on database open. Each migration has a
//! version number and a batch of SQL statements.

/// A database migration with a version and SQL statements.
pub(crate) struct Migration {
    pub version: u32,
    pub description: &'static str,
    pub sql: &'static str,
}

/// All migrations, in ascending version order.
pub(crate) fn all_migrations() -> Vec<Migration> {
    vec![Migration {
        version: 1,
        description: "Initial schema: employees with unique payroll number",
        sql: r#"
-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_migrations (
    version   INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- Personnel records
CREATE TABLE IF NOT EXISTS employees (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    payroll_number TEXT NOT NULL UNIQUE,
    forenames      TEXT NOT NULL,
    surname        TEXT NOT NULL,
    date_of_birth  TEXT NOT NULL,
    telephone      TEXT,
    mobile         TEXT,
    address_line1  TEXT NOT NULL,
    address_line2  TEXT,
    postcode       TEXT NOT NULL,
    email          TEXT NOT NULL,
    start_date     TEXT NOT NULL,
    created_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_employees_name ON employees(surname, forenames);

INSERT INTO schema_migrations (version) VALUES (1);
"#,
    }]
}
