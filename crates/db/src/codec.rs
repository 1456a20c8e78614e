//! Conversion between [`Survey`] and the rows of the survey table.

use crate::{
    attr::{self, AnswerAttr, AnswerField, Row, Value},
    error::{Error, Result},
};
use model::{Answer, Question, Survey};
use std::collections::BTreeMap;

/// Flattens a survey into one row per question, keyed by `id`. Indices are assigned from sequence
/// position and all vote counters start at zero regardless of the input.
pub fn encode(id: &str, survey: &Survey) -> Vec<Row> {
    survey
        .questions
        .iter()
        .zip(0..)
        .map(|(question, index): (_, i64)| {
            let mut row = Row::with_capacity(4 + 2 * question.answers.len());
            row.insert(attr::SURVEY_ID.into(), id.into());
            row.insert(attr::QUESTION_ID.into(), Value::Number(index));
            row.insert(attr::SURVEY_NAME.into(), survey.name.as_str().into());
            row.insert(attr::QUESTION.into(), question.text.as_str().into());
            for (answer, index) in question.answers.iter().zip(0..) {
                row.insert(AnswerAttr::label(index).to_string(), answer.label.as_str().into());
                row.insert(AnswerAttr::vote(index).to_string(), Value::Number(0));
            }
            row
        })
        .collect()
}

fn decode_question(row: &Row) -> Result<(String, Question)> {
    let index = row.get(attr::QUESTION_ID).and_then(Value::as_number).ok_or(Error::Malformed)?;
    let index = u32::try_from(index).map_err(|_| Error::Malformed)?;
    let text = row.get(attr::QUESTION).and_then(Value::as_text).ok_or(Error::Malformed)?;
    let name = row.get(attr::SURVEY_NAME).and_then(Value::as_text).ok_or(Error::Malformed)?;

    // Attributes arrive in arbitrary order, so collect by index first.
    let mut answers = BTreeMap::<u32, Answer>::new();
    for (key, value) in row {
        let Some(parsed) = AnswerAttr::parse(key) else {
            continue;
        };

        let answer = answers.entry(parsed.index).or_insert_with(|| Answer { index: parsed.index, ..Default::default() });
        match parsed.field {
            AnswerField::Label => {
                answer.label = value.as_text().ok_or(Error::Malformed)?.into();
            }
            AnswerField::Vote => {
                let votes = value.as_number().ok_or(Error::Malformed)?;
                answer.votes = u64::try_from(votes).map_err(|_| Error::Malformed)?;
            }
        }
    }

    let question = Question { text: text.into(), index, answers: answers.into_values().collect() };
    Ok((name.into(), question))
}

/// Rebuilds the survey `id` from its rows. Questions are sorted by their range key and answers by
/// their embedded index, independent of the order in which the store returned them. No rows at all
/// yields a survey with an empty name and no questions.
pub fn decode(id: &str, rows: &[Row]) -> Result<Survey> {
    let mut survey = Survey { id: id.into(), ..Default::default() };
    for row in rows {
        let (name, question) = decode_question(row)?;
        survey.name = name;
        survey.questions.push(question);
    }

    survey.questions.sort_by_key(|question| question.index);
    Ok(survey)
}
