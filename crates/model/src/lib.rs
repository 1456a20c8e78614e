#![no_std]
extern crate alloc;

use alloc::{string::String, vec::Vec};
use serde::{Deserialize, Serialize};

/// A named, ordered collection of questions.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Survey {
    /// Display name shared by every question in the survey.
    #[serde(rename = "Name")]
    pub name: String,
    /// Opaque identifier assigned by the server at creation time. Whatever a
    /// client sends here is discarded.
    #[serde(rename = "SurveyId", default)]
    pub id: String,
    #[serde(rename = "QuestionsAndAnswers", default)]
    pub questions: Vec<Question>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Question {
    #[serde(rename = "Question")]
    pub text: String,
    /// Zero-based position of the question within its survey.
    #[serde(rename = "QuestionId", default)]
    pub index: u32,
    /// Possible answers, always sorted by [`Answer::index`].
    #[serde(rename = "Answers", default)]
    pub answers: Vec<Answer>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct Answer {
    #[serde(rename = "Answer")]
    pub label: String,
    /// Zero-based position of the answer within its question.
    #[serde(rename = "AnswerId", default)]
    pub index: u32,
    /// Number of votes cast for this answer. Only ever incremented.
    #[serde(rename = "Vote", default)]
    pub votes: u64,
}

impl Survey {
    /// Builds a fresh survey from a name and `(question, answers)` pairs. Indices
    /// follow sequence order and every counter starts at zero.
    pub fn new<Q, A>(name: impl Into<String>, questions: Q) -> Self
    where
        Q: IntoIterator<Item = (String, A)>,
        A: IntoIterator<Item = String>,
    {
        let questions = questions
            .into_iter()
            .zip(0..)
            .map(|((text, answers), index)| Question {
                text,
                index,
                answers: answers.into_iter().zip(0..).map(|(label, index)| Answer { label, index, votes: 0 }).collect(),
            })
            .collect();
        Self { name: name.into(), id: String::new(), questions }
    }
}
