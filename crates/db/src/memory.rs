//! In-process [`Backend`] for tests and local development.
//!
//! Table creation and deletion complete only after the status has been polled a configurable number
//! of times, mimicking the asynchronous behavior of the real store. Rows are kept in a [`DashMap`]
//! so that increments on a single row are serialized by its shard lock.

use crate::{
    attr::{Key, Row, Value},
    backend::{Backend, KeySchema, TableStatus},
    error::{Error, Result},
};
use dashmap::DashMap;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

#[derive(Clone, Copy, Debug)]
enum Phase {
    Creating { polls: u32 },
    Active,
    Deleting { polls: u32 },
}

struct Table {
    schema: KeySchema,
    phase: Mutex<Phase>,
    ttl: Mutex<Option<String>>,
    rows: DashMap<(String, u32), Row>,
}

impl Table {
    fn is_active(&self) -> bool {
        matches!(*self.phase.lock().unwrap_or_else(|err| err.into_inner()), Phase::Active)
    }

    fn key_of(&self, row: &Row) -> Result<(String, u32)> {
        let survey = row.get(self.schema.partition).and_then(Value::as_text).ok_or(Error::BadInput)?;
        let question = row.get(self.schema.range).and_then(Value::as_number).ok_or(Error::BadInput)?;
        let question = u32::try_from(question).map_err(|_| Error::BadInput)?;
        Ok((survey.into(), question))
    }

    fn is_expired(&self, row: &Row, now: i64) -> bool {
        let ttl = self.ttl.lock().unwrap_or_else(|err| err.into_inner());
        ttl.as_deref().and_then(|attr| row.get(attr)).and_then(Value::as_number).is_some_and(|at| at <= now)
    }
}

#[derive(Default)]
pub struct MemoryBackend {
    tables: DashMap<String, Arc<Table>>,
    /// Number of status polls before a creation or deletion completes.
    settle_after: u32,
    creates: AtomicUsize,
}

impl MemoryBackend {
    /// Tables become active (or vanish) as soon as they are created (or deleted).
    pub fn new() -> Self {
        Self::default()
    }

    /// Tables stay in a transitional state for `polls` status queries.
    pub fn with_settle_after(polls: u32) -> Self {
        Self { settle_after: polls, ..Self::default() }
    }

    /// Number of `create_table` calls received so far, including rejected ones.
    pub fn create_calls(&self) -> usize {
        self.creates.load(Ordering::Relaxed)
    }

    fn active_table(&self, name: &str) -> Result<Arc<Table>> {
        let table = self.tables.get(name).map(|entry| Arc::clone(entry.value())).ok_or(Error::NotFound)?;
        if table.is_active() {
            Ok(table)
        } else {
            Err(Error::NotFound)
        }
    }
}

impl Backend for MemoryBackend {
    async fn describe_table(&self, name: &str) -> Result<Option<TableStatus>> {
        let Some(table) = self.tables.get(name).map(|entry| Arc::clone(entry.value())) else {
            return Ok(None);
        };

        let mut phase = table.phase.lock().unwrap_or_else(|err| err.into_inner());
        let current = *phase;
        let status = match current {
            Phase::Active => TableStatus::Active,
            Phase::Creating { polls: 0 } => {
                *phase = Phase::Active;
                TableStatus::Active
            }
            Phase::Creating { polls } => {
                *phase = Phase::Creating { polls: polls - 1 };
                TableStatus::Creating
            }
            Phase::Deleting { polls: 0 } => {
                drop(phase);
                self.tables.remove(name);
                return Ok(None);
            }
            Phase::Deleting { polls } => {
                *phase = Phase::Deleting { polls: polls - 1 };
                TableStatus::Deleting
            }
        };

        Ok(Some(status))
    }

    async fn create_table(&self, name: &str, schema: KeySchema) -> Result<bool> {
        self.creates.fetch_add(1, Ordering::Relaxed);

        use dashmap::mapref::entry::Entry;
        let Entry::Vacant(entry) = self.tables.entry(name.into()) else {
            return Ok(false);
        };

        entry.insert(Arc::new(Table {
            schema,
            phase: Mutex::new(Phase::Creating { polls: self.settle_after }),
            ttl: Mutex::new(None),
            rows: DashMap::new(),
        }));
        Ok(true)
    }

    async fn delete_table(&self, name: &str) -> Result<bool> {
        let Some(table) = self.tables.get(name).map(|entry| Arc::clone(entry.value())) else {
            return Ok(false);
        };

        let mut phase = table.phase.lock().unwrap_or_else(|err| err.into_inner());
        if let Phase::Deleting { .. } = *phase {
            return Ok(false);
        }

        *phase = Phase::Deleting { polls: self.settle_after };
        table.rows.clear();
        Ok(true)
    }

    async fn describe_ttl(&self, name: &str) -> Result<Option<String>> {
        let table = self.tables.get(name).map(|entry| Arc::clone(entry.value())).ok_or(Error::NotFound)?;
        let ttl = table.ttl.lock().unwrap_or_else(|err| err.into_inner());
        Ok(ttl.clone())
    }

    async fn enable_ttl(&self, name: &str, attribute: &str) -> Result<()> {
        let table = self.active_table(name)?;
        let mut ttl = table.ttl.lock().unwrap_or_else(|err| err.into_inner());

        // Only one expiry attribute may be active at a time.
        if ttl.as_deref().is_some_and(|current| current != attribute) {
            return Err(Error::BadInput);
        }

        *ttl = Some(attribute.into());
        Ok(())
    }

    async fn batch_put(&self, name: &str, rows: Vec<Row>) -> Result<()> {
        let table = self.active_table(name)?;
        let keyed = rows.into_iter().map(|row| Ok((table.key_of(&row)?, row))).collect::<Result<Vec<_>>>()?;
        for (key, row) in keyed {
            table.rows.insert(key, row);
        }
        Ok(())
    }

    async fn query(&self, name: &str, partition: &str) -> Result<Vec<Row>> {
        let table = self.active_table(name)?;
        let now = chrono::Utc::now().timestamp();
        let rows = table
            .rows
            .iter()
            .filter(|entry| entry.key().0 == partition && !table.is_expired(entry.value(), now))
            .map(|entry| entry.value().clone())
            .collect();
        Ok(rows)
    }

    async fn increment(&self, name: &str, key: Key<'_>, attribute: &str, delta: i64) -> Result<()> {
        let table = self.active_table(name)?;
        let mut row = table.rows.get_mut(&(key.survey.to_owned(), key.question)).ok_or(Error::NotFound)?;
        let Value::Number(count) = row.get_mut(attribute).ok_or(Error::NotFound)? else {
            return Err(Error::BadInput);
        };

        *count = count.checked_add(delta).ok_or(Error::BadInput)?;
        Ok(())
    }
}
