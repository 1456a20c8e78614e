//! Built-in demo survey, stored pre-encoded in the store's own JSON notation.

use crate::{
    attr::{self, Key, Row, Value},
    error::{Error, Result},
};
use serde::Deserialize;
use std::collections::HashMap;

const FIXTURE: &str = include_str!("seed.json");

/// A typed attribute as written in the fixture, e.g. `{ "N": "0" }`.
#[derive(Deserialize)]
enum Typed {
    S(String),
    N(String),
}

impl Typed {
    fn into_value(self) -> Result<Value> {
        Ok(match self {
            Self::S(text) => Value::Text(text),
            Self::N(num) => Value::Number(num.parse().map_err(|_| Error::Malformed)?),
        })
    }
}

/// Loads the fixture rows, each stamped to expire at `expires` (Unix seconds). Also returns the
/// first survey ID found in the fixture.
pub fn fixture(expires: i64) -> Result<(String, Vec<Row>)> {
    let items: Vec<HashMap<String, Typed>> = serde_json::from_str(FIXTURE).map_err(|err| {
        log::error!("seed fixture is not valid: {err}");
        Error::Fatal
    })?;

    let rows = items
        .into_iter()
        .map(|item| {
            let mut row = item
                .into_iter()
                .map(|(name, typed)| Ok((name, typed.into_value()?)))
                .collect::<Result<Row>>()?;
            row.insert(attr::TTL.into(), Value::Number(expires));
            Ok(row)
        })
        .collect::<Result<Vec<_>>>()?;

    let id = rows.first().and_then(Key::of).ok_or(Error::Malformed)?.survey.to_owned();
    Ok((id, rows))
}
