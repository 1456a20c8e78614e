//! Attribute names and values of the survey table.
//!
//! Every survey question lives in its own row keyed by `(SurveyId, QuestionId)`. Since the store
//! has no notion of nested lists, each answer is flattened into a pair of dynamically named
//! attributes: `answer_<n>_label` and `answer_<n>_vote`. [`AnswerAttr`] is the only place that
//! knows how to write and read these names.

use core::fmt::{self, Display};
use std::collections::HashMap;

/// Partition key. Holds the survey ID as text.
pub const SURVEY_ID: &str = "SurveyId";
/// Range key. Holds the question index as a number.
pub const QUESTION_ID: &str = "QuestionId";
/// Survey name, duplicated on every row of the survey.
pub const SURVEY_NAME: &str = "SurveyName";
pub const QUESTION: &str = "Question";
/// Expiry timestamp (Unix seconds) enforced by the store.
pub const TTL: &str = "ttl";

const ANSWER_PREFIX: &str = "answer_";
const LABEL_SUFFIX: &str = "label";
const VOTE_SUFFIX: &str = "vote";

/// The subset of store attribute types that the survey table uses.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Value {
    Text(String),
    Number(i64),
}

impl Value {
    pub fn as_text(&self) -> Option<&str> {
        if let Self::Text(text) = self {
            Some(text)
        } else {
            None
        }
    }

    pub const fn as_number(&self) -> Option<i64> {
        if let Self::Number(num) = *self {
            Some(num)
        } else {
            None
        }
    }
}

impl From<&str> for Value {
    fn from(text: &str) -> Self {
        Self::Text(text.into())
    }
}

impl From<String> for Value {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<i64> for Value {
    fn from(num: i64) -> Self {
        Self::Number(num)
    }
}

/// A single item of the table: attribute name to value.
pub type Row = HashMap<String, Value>;

/// Primary key of a row.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Key<'a> {
    pub survey: &'a str,
    pub question: u32,
}

impl<'a> Key<'a> {
    /// Extracts the primary key attributes of a row.
    pub fn of(row: &'a Row) -> Option<Self> {
        let survey = row.get(SURVEY_ID)?.as_text()?;
        let question = row.get(QUESTION_ID)?.as_number()?;
        let question = u32::try_from(question).ok()?;
        Some(Self { survey, question })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AnswerField {
    Label,
    Vote,
}

/// Name of one of the two attributes that make up an answer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AnswerAttr {
    pub index: u32,
    pub field: AnswerField,
}

impl AnswerAttr {
    pub const fn label(index: u32) -> Self {
        Self { index, field: AnswerField::Label }
    }

    pub const fn vote(index: u32) -> Self {
        Self { index, field: AnswerField::Vote }
    }

    /// Parses an attribute name of the form `answer_<n>_<field>`. Returns `None` for anything
    /// else, including names with the answer prefix but an unknown field suffix.
    pub fn parse(name: &str) -> Option<Self> {
        let rest = name.strip_prefix(ANSWER_PREFIX)?;
        let (index, field) = rest.split_once('_')?;
        if index.is_empty() || !index.bytes().all(|byte| byte.is_ascii_digit()) {
            return None;
        }

        let index = index.parse().ok()?;
        let field = match field {
            LABEL_SUFFIX => AnswerField::Label,
            VOTE_SUFFIX => AnswerField::Vote,
            _ => return None,
        };

        Some(Self { index, field })
    }
}

impl Display for AnswerAttr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let suffix = match self.field {
            AnswerField::Label => LABEL_SUFFIX,
            AnswerField::Vote => VOTE_SUFFIX,
        };
        write!(f, "{ANSWER_PREFIX}{}_{suffix}", self.index)
    }
}
