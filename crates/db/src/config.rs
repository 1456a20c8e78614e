use core::time::Duration;

/// Knobs of the survey table and its lifecycle.
#[derive(Clone, Debug)]
pub struct Settings {
    /// Name of the backing table.
    pub table: Box<str>,
    /// Delay between two consecutive status checks while the table transitions.
    pub poll_interval: Duration,
    /// Maximum number of status checks before a transition is presumed stuck.
    pub poll_attempts: u32,
    /// Lifetime of the rows written by the seed fixture.
    pub seed_expiry: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            table: "SurveyPoll".into(),
            poll_interval: Duration::from_secs(5),
            poll_attempts: 10,
            seed_expiry: Duration::from_secs(60 * 60),
        }
    }
}
