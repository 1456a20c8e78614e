pub mod attr;
pub mod backend;
pub mod codec;
pub mod config;
pub mod dynamo;
pub mod error;
pub mod lifecycle;
pub mod memory;
pub mod seed;

use attr::{AnswerAttr, Key};
use core::sync::atomic::AtomicBool;
use lifecycle::Lifecycle;
use uuid::Uuid;

pub use backend::Backend;
pub use config::Settings;
pub use dynamo::DynamoBackend;
pub use memory::MemoryBackend;
pub use model::{Answer, Question, Survey};

/// Largest number of rows that the store accepts in a single batch write.
pub const MAX_BATCH_ROWS: usize = 25;

/// Survey store on top of a shared [`Backend`] handle.
pub struct Database<B> {
    backend: B,
    settings: Settings,
    /// Whether row expiry has been confirmed on the table, shared by every lifecycle call.
    expiry: AtomicBool,
}

impl<B> Database<B> {
    pub const fn new(backend: B, settings: Settings) -> Self {
        Self { backend, settings, expiry: AtomicBool::new(false) }
    }

    pub const fn backend(&self) -> &B {
        &self.backend
    }

    pub const fn settings(&self) -> &Settings {
        &self.settings
    }
}

impl<B: Backend> Database<B> {
    pub const fn lifecycle(&self) -> Lifecycle<'_, B> {
        Lifecycle::new(&self.backend, &self.settings, &self.expiry)
    }

    /// See [`Lifecycle::ensure_ready`].
    pub async fn ensure_ready(&self) -> error::Result<bool> {
        self.lifecycle().ensure_ready().await
    }

    /// Stores a new survey and returns its freshly generated ID. Any ID, index, or vote count in
    /// the input is ignored.
    pub async fn create_survey(&self, survey: &Survey) -> error::Result<String> {
        // One row per question, and all rows must go out in one batch.
        if !(1..=MAX_BATCH_ROWS).contains(&survey.questions.len()) {
            return Err(error::Error::BadInput);
        }

        if !self.ensure_ready().await? {
            return Err(error::Error::NotReady);
        }

        let id = Uuid::new_v4().to_string();
        let rows = codec::encode(&id, survey);
        self.backend.batch_put(&self.settings.table, rows).await?;
        log::info!("created survey {id} with {} questions", survey.questions.len());
        Ok(id)
    }

    /// Fetches a survey with live vote counts. An unknown ID (or a missing table) yields a survey
    /// without questions rather than an error.
    pub async fn get_survey(&self, id: &str) -> error::Result<Survey> {
        if id.is_empty() {
            return Err(error::Error::BadInput);
        }

        let rows = match self.backend.query(&self.settings.table, id).await {
            Ok(rows) => rows,
            Err(error::Error::NotFound) => Vec::new(),
            Err(err) => return Err(err),
        };

        codec::decode(id, &rows)
    }

    /// Atomically adds one vote to an answer. Fails with [`error::Error::NotFound`] if the question
    /// or the answer does not exist.
    pub async fn vote(&self, survey: &str, question: u32, answer: u32) -> error::Result<()> {
        if survey.is_empty() {
            return Err(error::Error::BadInput);
        }

        let key = Key { survey, question };
        let attribute = AnswerAttr::vote(answer).to_string();
        self.backend.increment(&self.settings.table, key, &attribute, 1).await
    }

    /// Writes the built-in demo survey with a fresh expiry and returns its ID. The table must
    /// already be ready.
    pub async fn rebuild_seed_data(&self) -> error::Result<String> {
        let expiry = chrono::Duration::from_std(self.settings.seed_expiry).map_err(|_| error::Error::Fatal)?;
        let expires = (chrono::Utc::now() + expiry).timestamp();
        let (id, rows) = seed::fixture(expires)?;
        self.backend.batch_put(&self.settings.table, rows).await?;
        log::info!("reseeded survey {id}");
        Ok(id)
    }

    /// See [`Lifecycle::teardown`].
    pub async fn teardown(&self) -> error::Result<bool> {
        self.lifecycle().teardown().await
    }
}

#[cfg(test)]
mod tests {
    use super::{attr, error::Error, Backend, Database, MemoryBackend, Settings, Survey};
    use std::sync::Arc;

    fn database() -> Database<MemoryBackend> {
        Database::new(MemoryBackend::with_settle_after(1), Settings::default())
    }

    fn lunch_poll() -> Survey {
        Survey::new("Lunch poll", [("Pizza or Tacos?".to_string(), vec!["Pizza".to_string(), "Tacos".to_string()])])
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn lunch_poll_scenario() {
        let db = database();
        let id = db.create_survey(&lunch_poll()).await.unwrap();
        assert!(!id.is_empty());

        let survey = db.get_survey(&id).await.unwrap();
        assert_eq!(survey.id, id);
        assert_eq!(survey.name, "Lunch poll");
        assert_eq!(survey.questions.len(), 1);
        let question = &survey.questions[0];
        assert_eq!(question.text, "Pizza or Tacos?");
        assert_eq!(question.index, 0);
        let answers: Vec<_> = question.answers.iter().map(|a| (a.label.as_str(), a.index, a.votes)).collect();
        assert_eq!(answers, [("Pizza", 0, 0), ("Tacos", 1, 0)]);

        db.vote(&id, 0, 1).await.unwrap();
        let survey = db.get_survey(&id).await.unwrap();
        let votes: Vec<_> = survey.questions[0].answers.iter().map(|a| a.votes).collect();
        assert_eq!(votes, [0, 1]);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn ignores_client_ids_and_counts() {
        let db = database();
        let mut survey = lunch_poll();
        survey.id = "chosen-by-client".into();
        survey.questions[0].answers[0].votes = 99;

        let first = db.create_survey(&survey).await.unwrap();
        let second = db.create_survey(&survey).await.unwrap();
        assert_ne!(first, "chosen-by-client");
        assert_ne!(first, second);
        assert_eq!(db.get_survey(&first).await.unwrap().questions[0].answers[0].votes, 0);
        assert_eq!(db.backend().create_calls(), 1);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn unknown_survey_has_no_questions() {
        let db = database();

        // Table does not even exist yet.
        let survey = db.get_survey("nope").await.unwrap();
        assert!(survey.questions.is_empty());

        db.create_survey(&lunch_poll()).await.unwrap();
        let survey = db.get_survey("nope").await.unwrap();
        assert_eq!(survey.id, "nope");
        assert!(survey.questions.is_empty());
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn votes_do_not_leak_between_answers() {
        let db = database();
        let survey = Survey::new(
            "Two questions",
            [
                ("First?".to_string(), vec!["a".to_string(), "b".to_string(), "c".to_string()]),
                ("Second?".to_string(), vec!["x".to_string(), "y".to_string()]),
            ],
        );
        let id = db.create_survey(&survey).await.unwrap();

        for _ in 0..3 {
            db.vote(&id, 0, 2).await.unwrap();
        }
        db.vote(&id, 1, 0).await.unwrap();

        let survey = db.get_survey(&id).await.unwrap();
        let first: Vec<_> = survey.questions[0].answers.iter().map(|a| a.votes).collect();
        let second: Vec<_> = survey.questions[1].answers.iter().map(|a| a.votes).collect();
        assert_eq!(first, [0, 0, 3]);
        assert_eq!(second, [1, 0]);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn rejects_votes_for_missing_answers() {
        let db = database();
        let id = db.create_survey(&lunch_poll()).await.unwrap();

        assert_eq!(db.vote(&id, 0, 2).await, Err(Error::NotFound));
        assert_eq!(db.vote(&id, 1, 0).await, Err(Error::NotFound));
        assert_eq!(db.vote("unknown", 0, 0).await, Err(Error::NotFound));
        assert_eq!(db.vote("", 0, 0).await, Err(Error::BadInput));

        // The rejected votes must not have created anything.
        let survey = db.get_survey(&id).await.unwrap();
        assert_eq!(survey.questions.len(), 1);
        assert_eq!(survey.questions[0].answers.len(), 2);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn validates_before_touching_the_store() {
        let db = database();
        let empty = Survey { name: "Empty".into(), ..Default::default() };
        assert_eq!(db.create_survey(&empty).await, Err(Error::BadInput));

        let questions = (0..26).map(|i| (format!("Q{i}"), vec!["yes".to_string()]));
        let huge = Survey::new("Huge", questions);
        assert_eq!(db.create_survey(&huge).await, Err(Error::BadInput));

        assert_eq!(db.get_survey("").await, Err(Error::BadInput));
        assert_eq!(db.backend().create_calls(), 0);
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn fails_creation_when_table_is_stuck() {
        let db = Database::new(MemoryBackend::with_settle_after(u32::MAX), Settings::default());
        assert_eq!(db.create_survey(&lunch_poll()).await, Err(Error::NotReady));
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn rebuilds_seed_data_with_expiry() {
        let db = database();
        assert!(db.ensure_ready().await.unwrap());
        let id = db.rebuild_seed_data().await.unwrap();

        let survey = db.get_survey(&id).await.unwrap();
        assert_eq!(survey.name, "Team offsite");
        assert_eq!(survey.questions.len(), 4);

        let rows = db.backend().query(&db.settings().table, &id).await.unwrap();
        let now = chrono::Utc::now().timestamp();
        for row in rows {
            let expires = row[attr::TTL].as_number().unwrap();
            assert!(expires > now + 59 * 60 && expires <= now + 60 * 60);
        }
    }

    #[tokio::test(flavor = "current_thread", start_paused = true)]
    async fn teardown_drops_every_survey() {
        let db = database();
        let id = db.create_survey(&lunch_poll()).await.unwrap();
        assert_eq!(db.teardown().await, Ok(true));
        assert!(db.get_survey(&id).await.unwrap().questions.is_empty());
        assert_eq!(db.vote(&id, 0, 0).await, Err(Error::NotFound));

        // The next creation brings the table back.
        let id = db.create_survey(&lunch_poll()).await.unwrap();
        assert_eq!(db.get_survey(&id).await.unwrap().questions.len(), 1);
        assert_eq!(db.backend().create_calls(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_votes_are_not_lost() {
        const VOTERS: usize = 200;
        let db = Arc::new(Database::new(MemoryBackend::new(), Settings::default()));
        let id: Arc<str> = db.create_survey(&lunch_poll()).await.unwrap().into();

        let handles: Vec<_> = (0..VOTERS)
            .map(|_| {
                let db = Arc::clone(&db);
                let id = Arc::clone(&id);
                tokio::spawn(async move { db.vote(&id, 0, 0).await })
            })
            .collect();
        for result in futures_util::future::join_all(handles).await {
            result.unwrap().unwrap();
        }

        let survey = db.get_survey(&id).await.unwrap();
        assert_eq!(survey.questions[0].answers[0].votes, VOTERS as u64);
        assert_eq!(survey.questions[0].answers[1].votes, 0);
    }
}
