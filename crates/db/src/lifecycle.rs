//! Creation, readiness, and teardown of the survey table.
//!
//! Both creation and deletion complete asynchronously in the store, so every transition is
//! followed by a bounded polling loop. Running out of attempts is not an error: the loop reports
//! `false` and leaves the decision to the caller.

use crate::{
    attr,
    backend::{Backend, KeySchema, TableStatus},
    config::Settings,
    error::Result,
};
use core::sync::atomic::{AtomicBool, Ordering};
use tokio::time;

pub const SCHEMA: KeySchema = KeySchema { partition: attr::SURVEY_ID, range: attr::QUESTION_ID };

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TableState {
    Absent,
    Creating,
    Active,
    Deleting,
    Failed,
}

impl From<Option<TableStatus>> for TableState {
    fn from(status: Option<TableStatus>) -> Self {
        match status {
            None => Self::Absent,
            Some(TableStatus::Creating) => Self::Creating,
            Some(TableStatus::Active | TableStatus::Updating) => Self::Active,
            Some(TableStatus::Deleting) => Self::Deleting,
            Some(TableStatus::Unusable) => Self::Failed,
        }
    }
}

impl TableState {
    const fn is_transitional(self) -> bool {
        matches!(self, Self::Creating | Self::Deleting)
    }
}

pub struct Lifecycle<'a, B> {
    backend: &'a B,
    settings: &'a Settings,
    /// Set once row expiry is known to be enabled on the current incarnation of the table.
    expiry: &'a AtomicBool,
}

impl<'a, B: Backend> Lifecycle<'a, B> {
    pub const fn new(backend: &'a B, settings: &'a Settings, expiry: &'a AtomicBool) -> Self {
        Self { backend, settings, expiry }
    }

    /// Queries the current state of the table. A missing table is [`TableState::Absent`]; any
    /// other failure is propagated.
    pub async fn state(&self) -> Result<TableState> {
        let status = self.backend.describe_table(&self.settings.table).await?;
        Ok(status.into())
    }

    /// Polls until the table reaches `target`. Gives up early if the table settles in some other
    /// state, and late once the attempts run out.
    async fn wait_for(&self, target: TableState) -> Result<bool> {
        let attempts = self.settings.poll_attempts.max(1);
        for attempt in 1..=attempts {
            let state = self.state().await?;
            if state == target {
                return Ok(true);
            }

            if !state.is_transitional() {
                log::warn!("table {} settled as {state:?} while waiting for {target:?}", self.settings.table);
                return Ok(false);
            }

            log::debug!("table {} is {state:?} (attempt {attempt} of {attempts})", self.settings.table);
            if attempt < attempts {
                time::sleep(self.settings.poll_interval).await;
            }
        }

        log::warn!("table {} did not become {target:?} after {attempts} attempts", self.settings.table);
        Ok(false)
    }

    async fn create(&self) -> Result<()> {
        self.expiry.store(false, Ordering::Release);
        if self.backend.create_table(&self.settings.table, SCHEMA).await? {
            log::info!("creating table {}", self.settings.table);
        } else {
            log::info!("table {} is already being created elsewhere", self.settings.table);
        }
        Ok(())
    }

    async fn ensure_ttl(&self) -> Result<()> {
        if self.expiry.load(Ordering::Acquire) {
            return Ok(());
        }

        let current = self.backend.describe_ttl(&self.settings.table).await?;
        if current.as_deref() != Some(attr::TTL) {
            self.backend.enable_ttl(&self.settings.table, attr::TTL).await?;
            log::info!("enabled expiry on attribute {} of table {}", attr::TTL, self.settings.table);
        }

        self.expiry.store(true, Ordering::Release);
        Ok(())
    }

    /// Makes sure the table exists, is active, and expires rows. Returns `false` if the table did
    /// not become active in time. An already active table with confirmed expiry costs exactly one
    /// status check.
    pub async fn ensure_ready(&self) -> Result<bool> {
        match self.state().await? {
            TableState::Active => {
                // The table may have settled after an earlier caller gave up on it.
                self.ensure_ttl().await?;
                return Ok(true);
            }
            TableState::Creating => (),
            TableState::Absent => self.create().await?,
            TableState::Deleting => {
                if !self.wait_for(TableState::Absent).await? {
                    return Ok(false);
                }
                self.create().await?;
            }
            TableState::Failed => {
                log::error!("table {} is unusable", self.settings.table);
                return Ok(false);
            }
        }

        if !self.wait_for(TableState::Active).await? {
            return Ok(false);
        }

        self.ensure_ttl().await?;
        log::info!("table {} is ready", self.settings.table);
        Ok(true)
    }

    /// Drops the table along with every survey in it. Returns `false` if the table has not
    /// disappeared by the end of the polling budget.
    pub async fn teardown(&self) -> Result<bool> {
        // A recreated table starts out without expiry.
        self.expiry.store(false, Ordering::Release);
        if self.backend.delete_table(&self.settings.table).await? {
            log::info!("deleting table {}", self.settings.table);
        } else {
            log::info!("table {} is already gone or going", self.settings.table);
        }

        self.wait_for(TableState::Absent).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        attr::{Key, Row},
        error::Error,
        memory::MemoryBackend,
    };
    use core::time::Duration;
    use tokio::time::Instant;

    fn settings() -> Settings {
        Settings { table: "Surveys".into(), ..Default::default() }
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn ensure_ready_is_idempotent() {
        let backend = MemoryBackend::with_settle_after(3);
        let settings = settings();
        let expiry = AtomicBool::new(false);
        let lifecycle = Lifecycle::new(&backend, &settings, &expiry);

        assert_eq!(lifecycle.state().await, Ok(TableState::Absent));
        assert_eq!(lifecycle.ensure_ready().await, Ok(true));
        assert_eq!(lifecycle.ensure_ready().await, Ok(true));
        assert_eq!(backend.create_calls(), 1);
        assert_eq!(lifecycle.state().await, Ok(TableState::Active));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn enables_expiry_once_active() {
        let backend = MemoryBackend::with_settle_after(2);
        let settings = settings();
        let expiry = AtomicBool::new(false);
        let lifecycle = Lifecycle::new(&backend, &settings, &expiry);

        let start = Instant::now();
        assert_eq!(lifecycle.ensure_ready().await, Ok(true));
        assert_eq!(start.elapsed(), settings.poll_interval * 2);
        assert_eq!(backend.describe_ttl("Surveys").await, Ok(Some(attr::TTL.into())));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn gives_up_on_stuck_creation() {
        let backend = MemoryBackend::with_settle_after(u32::MAX);
        let settings = Settings { poll_attempts: 4, poll_interval: Duration::from_secs(5), ..settings() };
        let expiry = AtomicBool::new(false);
        let lifecycle = Lifecycle::new(&backend, &settings, &expiry);

        let start = Instant::now();
        assert_eq!(lifecycle.ensure_ready().await, Ok(false));
        assert_eq!(start.elapsed(), Duration::from_secs(15));
        assert_eq!(lifecycle.state().await, Ok(TableState::Creating));

        // A second caller joins the ongoing creation instead of issuing another one.
        assert_eq!(lifecycle.ensure_ready().await, Ok(false));
        assert_eq!(backend.create_calls(), 1);
        assert_eq!(backend.describe_ttl("Surveys").await, Ok(None));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn teardown_waits_for_absence() {
        let backend = MemoryBackend::with_settle_after(2);
        let settings = settings();
        let expiry = AtomicBool::new(false);
        let lifecycle = Lifecycle::new(&backend, &settings, &expiry);

        assert_eq!(lifecycle.teardown().await, Ok(true));
        assert_eq!(lifecycle.ensure_ready().await, Ok(true));
        assert_eq!(lifecycle.teardown().await, Ok(true));
        assert_eq!(lifecycle.state().await, Ok(TableState::Absent));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn recreates_after_pending_deletion() {
        let backend = MemoryBackend::with_settle_after(1);
        let settings = settings();
        let expiry = AtomicBool::new(false);
        let lifecycle = Lifecycle::new(&backend, &settings, &expiry);

        assert_eq!(lifecycle.ensure_ready().await, Ok(true));
        assert_eq!(backend.delete_table("Surveys").await, Ok(true));
        assert_eq!(lifecycle.state().await, Ok(TableState::Deleting));

        assert_eq!(lifecycle.ensure_ready().await, Ok(true));
        assert_eq!(backend.create_calls(), 2);
        assert_eq!(lifecycle.state().await, Ok(TableState::Active));
        assert_eq!(backend.describe_ttl("Surveys").await, Ok(Some(attr::TTL.into())));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn enables_expiry_after_late_activation() {
        let backend = MemoryBackend::with_settle_after(5);
        let settings = Settings { poll_attempts: 3, ..settings() };
        let expiry = AtomicBool::new(false);
        let lifecycle = Lifecycle::new(&backend, &settings, &expiry);

        assert_eq!(lifecycle.ensure_ready().await, Ok(false));
        while lifecycle.state().await != Ok(TableState::Active) {}
        assert_eq!(backend.describe_ttl("Surveys").await, Ok(None));

        assert_eq!(lifecycle.ensure_ready().await, Ok(true));
        assert_eq!(backend.describe_ttl("Surveys").await, Ok(Some(attr::TTL.into())));
        assert!(expiry.load(Ordering::Acquire));
        assert_eq!(backend.create_calls(), 1);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn teardown_forgets_confirmed_expiry() {
        let backend = MemoryBackend::with_settle_after(1);
        let settings = settings();
        let expiry = AtomicBool::new(false);
        let lifecycle = Lifecycle::new(&backend, &settings, &expiry);

        assert_eq!(lifecycle.ensure_ready().await, Ok(true));
        assert!(expiry.load(Ordering::Acquire));
        assert_eq!(lifecycle.teardown().await, Ok(true));
        assert!(!expiry.load(Ordering::Acquire));

        assert_eq!(lifecycle.ensure_ready().await, Ok(true));
        assert_eq!(backend.describe_ttl("Surveys").await, Ok(Some(attr::TTL.into())));
    }

    /// Store whose every call fails as if the network were down.
    struct Unreachable;

    impl Backend for Unreachable {
        async fn describe_table(&self, _: &str) -> Result<Option<TableStatus>> {
            Err(Error::Unavailable)
        }

        async fn create_table(&self, _: &str, _: KeySchema) -> Result<bool> {
            Err(Error::Unavailable)
        }

        async fn delete_table(&self, _: &str) -> Result<bool> {
            Err(Error::Unavailable)
        }

        async fn describe_ttl(&self, _: &str) -> Result<Option<String>> {
            Err(Error::Unavailable)
        }

        async fn enable_ttl(&self, _: &str, _: &str) -> Result<()> {
            Err(Error::Unavailable)
        }

        async fn batch_put(&self, _: &str, _: Vec<Row>) -> Result<()> {
            Err(Error::Unavailable)
        }

        async fn query(&self, _: &str, _: &str) -> Result<Vec<Row>> {
            Err(Error::Unavailable)
        }

        async fn increment(&self, _: &str, _: Key<'_>, _: &str, _: i64) -> Result<()> {
            Err(Error::Unavailable)
        }
    }

    #[tokio::test(flavor = "current_thread")]
    async fn surfaces_status_failures() {
        let settings = settings();
        let expiry = AtomicBool::new(false);
        let lifecycle = Lifecycle::new(&Unreachable, &settings, &expiry);
        assert_eq!(lifecycle.ensure_ready().await, Err(Error::Unavailable));
        assert_eq!(lifecycle.teardown().await, Err(Error::Unavailable));
    }
}
