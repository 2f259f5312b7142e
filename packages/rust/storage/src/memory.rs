//! In-memory [`RecordStore`] with the same uniqueness and atomicity rules as
//! the libSQL store.

use std::sync::{Mutex, MutexGuard};

use staffload_shared::{Employee, EmployeeRecord, Result, StaffloadError, sort_by_name};

use crate::{RecordStore, duplicate_keys, matches_term};

#[derive(Debug, Default)]
struct State {
    last_id: i64,
    records: Vec<EmployeeRecord>,
}

impl State {
    fn taken(&self, payroll_number: &str, except_id: Option<i64>) -> bool {
        self.records
            .iter()
            .any(|r| r.employee.payroll_number == payroll_number && Some(r.id) != except_id)
    }

    fn insert(&mut self, employee: &Employee) -> EmployeeRecord {
        self.last_id += 1;
        let record = EmployeeRecord {
            id: self.last_id,
            employee: employee.clone(),
        };
        self.records.push(record.clone());
        record
    }
}

/// Mutex-guarded record store living entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, State>> {
        self.state
            .lock()
            .map_err(|_| StaffloadError::Storage("memory store lock poisoned".into()))
    }
}

impl RecordStore for MemoryStore {
    async fn exists(&self, payroll_number: &str) -> Result<bool> {
        Ok(self.lock()?.taken(payroll_number, None))
    }

    async fn add_one(&self, employee: &Employee) -> Result<EmployeeRecord> {
        let mut state = self.lock()?;
        if state.taken(&employee.payroll_number, None) {
            return Err(StaffloadError::duplicate(&employee.payroll_number));
        }
        Ok(state.insert(employee))
    }

    async fn add_many(&self, employees: &[Employee]) -> Result<Vec<EmployeeRecord>> {
        // Holding the lock for the whole batch makes the commit atomic.
        let mut state = self.lock()?;

        let mut offending = duplicate_keys(employees);
        for employee in employees {
            let key = &employee.payroll_number;
            if !offending.contains(key) && state.taken(key, None) {
                offending.push(key.clone());
            }
        }
        if !offending.is_empty() {
            return Err(StaffloadError::DuplicateKey { keys: offending });
        }

        Ok(employees.iter().map(|e| state.insert(e)).collect())
    }

    async fn update(&self, record: &EmployeeRecord) -> Result<bool> {
        let mut state = self.lock()?;
        if state.taken(&record.employee.payroll_number, Some(record.id)) {
            return Err(StaffloadError::duplicate(&record.employee.payroll_number));
        }

        match state.records.iter_mut().find(|r| r.id == record.id) {
            Some(existing) => {
                let created_at = existing.employee.created_at;
                existing.employee = record.employee.clone();
                existing.employee.created_at = created_at;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let mut state = self.lock()?;
        let before = state.records.len();
        state.records.retain(|r| r.id != id);
        Ok(state.records.len() < before)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<EmployeeRecord>> {
        Ok(self.lock()?.records.iter().find(|r| r.id == id).cloned())
    }

    async fn get_all(&self) -> Result<Vec<EmployeeRecord>> {
        let mut records = self.lock()?.records.clone();
        sort_by_name(&mut records);
        Ok(records)
    }

    async fn search(&self, term: &str) -> Result<Vec<EmployeeRecord>> {
        let mut records: Vec<EmployeeRecord> = self
            .lock()?
            .records
            .iter()
            .filter(|r| matches_term(&r.employee, term))
            .cloned()
            .collect();
        sort_by_name(&mut records);
        Ok(records)
    }
}
