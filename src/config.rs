use anyhow::Context;
use core::{str::FromStr, time::Duration};
use db::Settings;
use std::env;

/// Which storage service backs the survey table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StoreKind {
    Dynamo,
    /// Process-local store for development. Everything is lost on exit.
    Memory,
}

impl FromStr for StoreKind {
    type Err = anyhow::Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "dynamodb" => Ok(Self::Dynamo),
            "memory" => Ok(Self::Memory),
            other => anyhow::bail!("unknown store {other:?}"),
        }
    }
}

#[derive(Debug)]
pub struct Config {
    pub port: u16,
    pub store: StoreKind,
    /// Overrides the DynamoDB endpoint, e.g. for DynamoDB Local.
    pub endpoint: Option<String>,
    pub settings: Settings,
}

fn try_load<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Into<anyhow::Error>,
{
    let Some(value) = lookup(key) else {
        log::debug!("{key} not set, using default");
        return Ok(default);
    };
    let parsed: anyhow::Result<T> = value.parse().map_err(Into::into);
    parsed.with_context(|| format!("invalid value for {key}"))
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Settings::default();
        let interval = try_load(&lookup, "POLL_INTERVAL_SECS", defaults.poll_interval.as_secs())?;
        let minutes: u64 = try_load(&lookup, "SEED_EXPIRY_MINUTES", defaults.seed_expiry.as_secs() / 60)?;
        let expiry = minutes.checked_mul(60).context("SEED_EXPIRY_MINUTES is too large")?;
        let settings = Settings {
            table: lookup("TABLE_NAME").map_or(defaults.table, String::into_boxed_str),
            poll_interval: Duration::from_secs(interval),
            poll_attempts: try_load(&lookup, "POLL_ATTEMPTS", defaults.poll_attempts)?,
            seed_expiry: Duration::from_secs(expiry),
        };

        Ok(Self {
            port: try_load(&lookup, "PORT", 3000)?,
            store: try_load(&lookup, "STORE", StoreKind::Dynamo)?,
            endpoint: lookup("DYNAMODB_ENDPOINT"),
            settings,
        })
    }
}
