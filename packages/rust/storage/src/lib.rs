//! Personnel record storage.
//!
//! [`RecordStore`] is the capability the import pipeline depends on. Two
//! implementations ship with the crate:
//! - [`Storage`] wraps a local libSQL database file (the CLI's store)
//! - [`MemoryStore`] keeps records in memory with identical semantics
//!
//! Payroll numbers are unique across all records. `add_many` is atomic: a
//! batch with any in-batch or persisted collision is rejected as a whole with
//! [`StaffloadError::DuplicateKey`].

mod memory;
mod migrations;

use std::path::Path;

use chrono::{DateTime, NaiveDate, Utc};
use libsql::{Connection, Database, params};
use staffload_shared::{Employee, EmployeeRecord, Result, StaffloadError};

pub use memory::MemoryStore;

/// Storage format for calendar dates.
const DATE_FORMAT: &str = "%Y-%m-%d";

/// Columns selected for every record query, in [`row_to_record`] order.
const RECORD_COLUMNS: &str = "id, payroll_number, forenames, surname, date_of_birth, telephone, \
     mobile, address_line1, address_line2, postcode, email, start_date, created_at";

// ---------------------------------------------------------------------------
// RecordStore
// ---------------------------------------------------------------------------

/// Persistence operations over employee records.
#[allow(async_fn_in_trait)]
pub trait RecordStore {
    /// Whether a record with this payroll number is persisted.
    async fn exists(&self, payroll_number: &str) -> Result<bool>;

    /// Insert a single record. Fails with `DuplicateKey` on collision.
    async fn add_one(&self, employee: &Employee) -> Result<EmployeeRecord>;

    /// Insert a batch atomically: either every record is committed or none is.
    async fn add_many(&self, employees: &[Employee]) -> Result<Vec<EmployeeRecord>>;

    /// Overwrite a record's fields (not its creation time). Returns `false`
    /// if no record has that id.
    async fn update(&self, record: &EmployeeRecord) -> Result<bool>;

    /// Remove a record. Returns `false` if no record has that id.
    async fn delete(&self, id: i64) -> Result<bool>;

    async fn get_by_id(&self, id: i64) -> Result<Option<EmployeeRecord>>;

    /// All records sorted by surname, then forenames.
    async fn get_all(&self) -> Result<Vec<EmployeeRecord>>;

    /// Records whose payroll number, forenames, or surname contain `term`,
    /// ignoring case. Same order as [`RecordStore::get_all`].
    async fn search(&self, term: &str) -> Result<Vec<EmployeeRecord>>;
}

/// Whether `employee` matches a search term: payroll number, forenames, or
/// surname contains it after Unicode lowercasing. An empty term matches all.
pub(crate) fn matches_term(employee: &Employee, term: &str) -> bool {
    let needle = term.trim().to_lowercase();
    [&employee.payroll_number, &employee.forenames, &employee.surname]
        .iter()
        .any(|field| field.to_lowercase().contains(&needle))
}

/// Payroll numbers that occur more than once in a batch, in first-seen order.
pub(crate) fn duplicate_keys(employees: &[Employee]) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut duplicates: Vec<String> = Vec::new();
    for employee in employees {
        let key = employee.payroll_number.as_str();
        if !seen.insert(key) && !duplicates.iter().any(|d| d == key) {
            duplicates.push(key.to_string());
        }
    }
    duplicates
}

// ---------------------------------------------------------------------------
// Storage (libSQL)
// ---------------------------------------------------------------------------

/// Primary storage handle wrapping a libSQL database.
pub struct Storage {
    #[allow(dead_code)]
    db: Database,
    conn: Connection,
    readonly: bool,
}

impl Storage {
    /// Open or create a database at `path` in read-write mode.
    pub async fn open(path: &Path) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StaffloadError::io(parent, e))?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(StaffloadError::storage)?;

        let conn = db.connect().map_err(StaffloadError::storage)?;

        let storage = Self {
            db,
            conn,
            readonly: false,
        };
        storage.run_migrations().await?;
        Ok(storage)
    }

    /// Open an existing database at `path` in read-only mode.
    pub async fn open_readonly(path: &Path) -> Result<Self> {
        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(StaffloadError::storage)?;

        let conn = db.connect().map_err(StaffloadError::storage)?;

        Ok(Self {
            db,
            conn,
            readonly: true,
        })
    }

    /// Run pending schema migrations.
    async fn run_migrations(&self) -> Result<()> {
        let current_version = self.get_schema_version().await;

        for migration in migrations::all_migrations() {
            if migration.version > current_version {
                tracing::info!(
                    version = migration.version,
                    description = migration.description,
                    "applying migration"
                );
                self.conn
                    .execute_batch(migration.sql)
                    .await
                    .map_err(|e| {
                        StaffloadError::Storage(format!(
                            "migration v{} failed: {e}",
                            migration.version
                        ))
                    })?;
            }
        }
        Ok(())
    }

    /// Get the current schema version, or 0 if no migrations have been applied.
    async fn get_schema_version(&self) -> u32 {
        let result = self
            .conn
            .query("SELECT MAX(version) FROM schema_migrations", params![])
            .await;

        match result {
            Ok(mut rows) => {
                if let Ok(Some(row)) = rows.next().await {
                    row.get::<u32>(0).unwrap_or(0)
                } else {
                    0
                }
            }
            Err(_) => 0, // Table doesn't exist yet
        }
    }

    /// Ensure we're in read-write mode before writing.
    fn check_writable(&self) -> Result<()> {
        if self.readonly {
            return Err(StaffloadError::Storage(
                "database is opened in read-only mode".into(),
            ));
        }
        Ok(())
    }

    /// Run a record query and collect the results.
    async fn query_records(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<EmployeeRecord>> {
        let mut rows = self
            .conn
            .query(sql, params)
            .await
            .map_err(StaffloadError::storage)?;

        let mut results = Vec::new();
        while let Some(row) = rows.next().await.map_err(StaffloadError::storage)? {
            results.push(row_to_record(&row)?);
        }
        Ok(results)
    }
}

impl RecordStore for Storage {
    async fn exists(&self, payroll_number: &str) -> Result<bool> {
        payroll_number_taken(&self.conn, payroll_number, None).await
    }

    async fn add_one(&self, employee: &Employee) -> Result<EmployeeRecord> {
        self.check_writable()?;
        if payroll_number_taken(&self.conn, &employee.payroll_number, None).await? {
            return Err(StaffloadError::duplicate(&employee.payroll_number));
        }

        let id = insert_employee(&self.conn, employee).await?;
        tracing::debug!(id, payroll_number = %employee.payroll_number, "employee added");
        Ok(EmployeeRecord {
            id,
            employee: employee.clone(),
        })
    }

    async fn add_many(&self, employees: &[Employee]) -> Result<Vec<EmployeeRecord>> {
        self.check_writable()?;
        if employees.is_empty() {
            return Ok(Vec::new());
        }

        let mut offending = duplicate_keys(employees);

        let tx = self
            .conn
            .transaction()
            .await
            .map_err(StaffloadError::storage)?;

        for employee in employees {
            let key = &employee.payroll_number;
            if offending.contains(key) {
                continue;
            }
            match payroll_number_taken(&tx, key, None).await {
                Ok(true) => offending.push(key.clone()),
                Ok(false) => {}
                Err(e) => {
                    let _ = tx.rollback().await;
                    return Err(e);
                }
            }
        }

        if !offending.is_empty() {
            tx.rollback().await.map_err(StaffloadError::storage)?;
            tracing::warn!(keys = ?offending, "batch rejected: duplicate payroll numbers");
            return Err(StaffloadError::DuplicateKey { keys: offending });
        }

        let mut records = Vec::with_capacity(employees.len());
        for employee in employees {
            match insert_employee(&tx, employee).await {
                Ok(id) => records.push(EmployeeRecord {
                    id,
                    employee: employee.clone(),
                }),
                Err(e) => {
                    let _ = tx.rollback().await;
                    return Err(e);
                }
            }
        }

        tx.commit().await.map_err(StaffloadError::storage)?;
        tracing::info!(count = records.len(), "batch committed");
        Ok(records)
    }

    async fn update(&self, record: &EmployeeRecord) -> Result<bool> {
        self.check_writable()?;
        let e = &record.employee;
        if payroll_number_taken(&self.conn, &e.payroll_number, Some(record.id)).await? {
            return Err(StaffloadError::duplicate(&e.payroll_number));
        }

        let changed = self
            .conn
            .execute(
                "UPDATE employees SET
                   payroll_number = ?1, forenames = ?2, surname = ?3, date_of_birth = ?4,
                   telephone = ?5, mobile = ?6, address_line1 = ?7, address_line2 = ?8,
                   postcode = ?9, email = ?10, start_date = ?11
                 WHERE id = ?12",
                params![
                    e.payroll_number.as_str(),
                    e.forenames.as_str(),
                    e.surname.as_str(),
                    e.date_of_birth.format(DATE_FORMAT).to_string(),
                    e.telephone.as_deref(),
                    e.mobile.as_deref(),
                    e.address_line1.as_str(),
                    e.address_line2.as_deref(),
                    e.postcode.as_str(),
                    e.email.as_str(),
                    e.start_date.format(DATE_FORMAT).to_string(),
                    record.id,
                ],
            )
            .await
            .map_err(|err| map_write_error(err, &e.payroll_number))?;
        Ok(changed > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        self.check_writable()?;
        let removed = self
            .conn
            .execute("DELETE FROM employees WHERE id = ?1", params![id])
            .await
            .map_err(StaffloadError::storage)?;
        Ok(removed > 0)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<EmployeeRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM employees WHERE id = ?1");
        let mut found = self.query_records(&sql, params![id]).await?;
        Ok(found.pop())
    }

    async fn get_all(&self) -> Result<Vec<EmployeeRecord>> {
        let sql = format!("SELECT {RECORD_COLUMNS} FROM employees ORDER BY surname, forenames, id");
        self.query_records(&sql, params![]).await
    }

    async fn search(&self, term: &str) -> Result<Vec<EmployeeRecord>> {
        // SQLite's LIKE folds ASCII only, so case folding happens here.
        let mut records = self.get_all().await?;
        records.retain(|r| matches_term(&r.employee, term));
        Ok(records)
    }
}

// ---------------------------------------------------------------------------
// SQL helpers
// ---------------------------------------------------------------------------

/// Whether `payroll_number` belongs to a record other than `except_id`.
async fn payroll_number_taken(
    conn: &Connection,
    payroll_number: &str,
    except_id: Option<i64>,
) -> Result<bool> {
    let mut rows = conn
        .query(
            "SELECT 1 FROM employees WHERE payroll_number = ?1 AND id <> ?2 LIMIT 1",
            params![payroll_number, except_id.unwrap_or(-1)],
        )
        .await
        .map_err(StaffloadError::storage)?;

    Ok(rows.next().await.map_err(StaffloadError::storage)?.is_some())
}

/// Insert one employee and return its generated id.
async fn insert_employee(conn: &Connection, e: &Employee) -> Result<i64> {
    conn.execute(
        "INSERT INTO employees (payroll_number, forenames, surname, date_of_birth, telephone,
           mobile, address_line1, address_line2, postcode, email, start_date, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            e.payroll_number.as_str(),
            e.forenames.as_str(),
            e.surname.as_str(),
            e.date_of_birth.format(DATE_FORMAT).to_string(),
            e.telephone.as_deref(),
            e.mobile.as_deref(),
            e.address_line1.as_str(),
            e.address_line2.as_deref(),
            e.postcode.as_str(),
            e.email.as_str(),
            e.start_date.format(DATE_FORMAT).to_string(),
            e.created_at.to_rfc3339(),
        ],
    )
    .await
    .map_err(|err| map_write_error(err, &e.payroll_number))?;

    Ok(conn.last_insert_rowid())
}

/// A unique-constraint violation is a duplicate key; anything else is storage.
fn map_write_error(err: libsql::Error, payroll_number: &str) -> StaffloadError {
    if err.to_string().contains("UNIQUE constraint failed") {
        StaffloadError::duplicate(payroll_number)
    } else {
        StaffloadError::storage(err)
    }
}

/// Convert a database row to an [`EmployeeRecord`].
fn row_to_record(row: &libsql::Row) -> Result<EmployeeRecord> {
    let text = |idx: i32| -> Result<String> {
        row.get::<String>(idx).map_err(StaffloadError::storage)
    };
    let date = |idx: i32| -> Result<NaiveDate> {
        let s = text(idx)?;
        NaiveDate::parse_from_str(&s, DATE_FORMAT)
            .map_err(|e| StaffloadError::Storage(format!("invalid date '{s}': {e}")))
    };

    Ok(EmployeeRecord {
        id: row.get::<i64>(0).map_err(StaffloadError::storage)?,
        employee: Employee {
            payroll_number: text(1)?,
            forenames: text(2)?,
            surname: text(3)?,
            date_of_birth: date(4)?,
            telephone: row.get::<String>(5).ok(),
            mobile: row.get::<String>(6).ok(),
            address_line1: text(7)?,
            address_line2: row.get::<String>(8).ok(),
            postcode: text(9)?,
            email: text(10)?,
            start_date: date(11)?,
            created_at: {
                let s = text(12)?;
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .map_err(|e| StaffloadError::Storage(format!("invalid timestamp: {e}")))?
            },
        },
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use uuid::Uuid;

    /// Build an employee with sensible defaults for the given key and name.
    pub(crate) fn make_employee(payroll_number: &str, surname: &str, forenames: &str) -> Employee {
        Employee {
            payroll_number: payroll_number.into(),
            forenames: forenames.into(),
            surname: surname.into(),
            date_of_birth: NaiveDate::from_ymd_opt(1955, 1, 26).unwrap(),
            telephone: Some("01234 567890".into()),
            mobile: None,
            address_line1: "1 Mill Lane".into(),
            address_line2: None,
            postcode: "LS1 4AB".into(),
            email: format!("{}@example.com", payroll_number.to_lowercase()),
            start_date: NaiveDate::from_ymd_opt(2013, 4, 18).unwrap(),
            created_at: Utc::now(),
        }
    }

    /// Create a temp file storage for testing.
    async fn test_storage() -> Storage {
        let tmp = std::env::temp_dir().join(format!("staffload_test_{}.db", Uuid::now_v7()));
        Storage::open(&tmp).await.expect("open test db")
    }

    #[test]
    fn duplicate_keys_in_first_seen_order() {
        let batch = vec![
            make_employee("B2", "Brown", "Bob"),
            make_employee("A1", "Adams", "Ann"),
            make_employee("A1", "Adams", "Amy"),
            make_employee("B2", "Brown", "Ben"),
            make_employee("B2", "Brown", "Bea"),
        ];
        assert_eq!(duplicate_keys(&batch), vec!["A1", "B2"]);
    }

    #[test]
    fn term_matching_folds_unicode_case() {
        let employee = make_employee("E1", "Öztürk", "Élodie");
        assert!(matches_term(&employee, "élodie"));
        assert!(matches_term(&employee, "ÖZTÜRK"));
        assert!(matches_term(&employee, " e1 "));
        assert!(matches_term(&employee, ""));
        assert!(!matches_term(&employee, "elodie"));
    }

    #[tokio::test]
    async fn open_and_migrate() {
        let storage = test_storage().await;
        let version = storage.get_schema_version().await;
        assert_eq!(version, 1);
    }

    #[tokio::test]
    async fn idempotent_migration() {
        let tmp = std::env::temp_dir().join(format!("staffload_test_{}.db", Uuid::now_v7()));
        let _s1 = Storage::open(&tmp).await.expect("first open");
        drop(_s1);
        let s2 = Storage::open(&tmp).await.expect("second open");
        assert_eq!(s2.get_schema_version().await, 1);
    }

    #[tokio::test]
    async fn add_one_round_trips() {
        let storage = test_storage().await;
        let employee = make_employee("COOP08", "Cooper", "Ann");

        let record = storage.add_one(&employee).await.expect("add one");
        assert!(storage.exists("COOP08").await.unwrap());
        assert!(!storage.exists("coop08").await.unwrap());

        let found = storage
            .get_by_id(record.id)
            .await
            .expect("get by id")
            .expect("record present");
        assert_eq!(found, record);
        assert_eq!(found.employee.date_of_birth, employee.date_of_birth);
        assert_eq!(found.employee.telephone.as_deref(), Some("01234 567890"));
        assert!(found.employee.mobile.is_none());

        let err = storage.add_one(&employee).await.unwrap_err();
        assert!(matches!(err, StaffloadError::DuplicateKey { .. }));
    }

    #[tokio::test]
    async fn add_many_commits_whole_batch() {
        let storage = test_storage().await;
        let batch = vec![
            make_employee("A1", "Smith", "John"),
            make_employee("A2", "Adams", "Zoe"),
        ];

        let records = storage.add_many(&batch).await.expect("add many");
        assert_eq!(records.len(), 2);

        let all = storage.get_all().await.unwrap();
        let surnames: Vec<&str> = all.iter().map(|r| r.employee.surname.as_str()).collect();
        assert_eq!(surnames, vec!["Adams", "Smith"]);
    }

    #[tokio::test]
    async fn add_many_rejects_in_batch_duplicates() {
        let storage = test_storage().await;
        let batch = vec![
            make_employee("A1", "Smith", "John"),
            make_employee("A2", "Adams", "Zoe"),
            make_employee("A1", "Jones", "Amy"),
        ];

        let err = storage.add_many(&batch).await.unwrap_err();
        match err {
            StaffloadError::DuplicateKey { keys } => assert_eq!(keys, vec!["A1"]),
            other => panic!("unexpected error: {other}"),
        }
        assert!(storage.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn add_many_rejects_persisted_collision() {
        let storage = test_storage().await;
        storage
            .add_one(&make_employee("A2", "Adams", "Zoe"))
            .await
            .unwrap();

        let batch = vec![
            make_employee("A1", "Smith", "John"),
            make_employee("A2", "Adams", "Zack"),
        ];
        let err = storage.add_many(&batch).await.unwrap_err();
        assert!(err.to_string().contains("A2"));

        // Nothing from the rejected batch was committed.
        assert!(!storage.exists("A1").await.unwrap());
        assert_eq!(storage.get_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_and_delete() {
        let storage = test_storage().await;
        let mut record = storage
            .add_one(&make_employee("A1", "Smith", "John"))
            .await
            .unwrap();
        let other = storage
            .add_one(&make_employee("A2", "Adams", "Zoe"))
            .await
            .unwrap();

        record.employee.surname = "Smyth".into();
        record.employee.mobile = Some("07700 900123".into());
        assert!(storage.update(&record).await.expect("update"));

        let found = storage.get_by_id(record.id).await.unwrap().unwrap();
        assert_eq!(found.employee.surname, "Smyth");
        assert_eq!(found.employee.mobile.as_deref(), Some("07700 900123"));

        // Taking another record's payroll number is rejected.
        record.employee.payroll_number = "A2".into();
        assert!(matches!(
            storage.update(&record).await,
            Err(StaffloadError::DuplicateKey { .. })
        ));

        let missing = EmployeeRecord {
            id: 9999,
            employee: make_employee("Z9", "Nobody", "No"),
        };
        assert!(!storage.update(&missing).await.unwrap());

        assert!(storage.delete(other.id).await.unwrap());
        assert!(!storage.delete(other.id).await.unwrap());
        assert!(storage.get_by_id(other.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn search_is_case_insensitive_and_literal() {
        let storage = test_storage().await;
        for (key, surname, forenames) in [
            ("COOP08", "Cooper", "Ann"),
            ("SMIT01", "Smith", "Coralie"),
            ("JONE_1", "Jones", "Bob"),
        ] {
            storage
                .add_one(&make_employee(key, surname, forenames))
                .await
                .unwrap();
        }

        let hits = storage.search("co").await.expect("search");
        let keys: Vec<&str> = hits
            .iter()
            .map(|r| r.employee.payroll_number.as_str())
            .collect();
        assert_eq!(keys, vec!["COOP08", "SMIT01"]);

        let hits = storage.search("_").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].employee.payroll_number, "JONE_1");

        assert!(storage.search("%").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn search_folds_accented_names() {
        let storage = test_storage().await;
        storage
            .add_one(&make_employee("E1", "Öztürk", "Élodie"))
            .await
            .unwrap();

        let hits = storage.search("élodie").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(storage.search("öztürk").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn readonly_rejects_writes() {
        let tmp = std::env::temp_dir().join(format!("staffload_test_{}.db", Uuid::now_v7()));
        let rw = Storage::open(&tmp).await.unwrap();
        rw.add_one(&make_employee("A1", "Smith", "John"))
            .await
            .unwrap();
        drop(rw);

        let ro = Storage::open_readonly(&tmp).await.unwrap();
        assert_eq!(ro.get_all().await.unwrap().len(), 1);

        let result = ro.add_one(&make_employee("A2", "Adams", "Zoe")).await;
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("read-only"));
    }
}
