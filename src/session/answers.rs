use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use crate::schemas::exam::{AnswerEntry, WireId};
use crate::session::model::{ExamDefinition, OptionId, QuestionId, QuestionType};
use crate::session::variants::QuestionVariantRegistry;

/// Stored answer for one question. One variant per payload shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnswerPayload {
    Option(OptionId),
    Options(BTreeSet<OptionId>),
    Text(String),
    Scale(i64),
    Date(String),
    Time(String),
    File(String),
}

impl AnswerPayload {
    pub fn is_empty(&self) -> bool {
        match self {
            AnswerPayload::Option(_) | AnswerPayload::Scale(_) => false,
            AnswerPayload::Options(selected) => selected.is_empty(),
            AnswerPayload::Text(text) => text.trim().is_empty(),
            AnswerPayload::Date(value) | AnswerPayload::Time(value) | AnswerPayload::File(value) => {
                value.is_empty()
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnswerRecord {
    pub question_id: QuestionId,
    pub payload: AnswerPayload,
}

impl AnswerRecord {
    fn to_entry(&self) -> AnswerEntry {
        let mut entry = AnswerEntry { question_id: self.question_id.clone(), ..AnswerEntry::default() };
        match &self.payload {
            AnswerPayload::Option(option) => entry.selected_option = Some(option.clone()),
            AnswerPayload::Options(selected) => {
                entry.selected_options = Some(selected.iter().cloned().collect())
            }
            AnswerPayload::Text(text) => entry.text_answer = Some(text.clone()),
            AnswerPayload::Scale(value) => entry.numeric_answer = Some(*value),
            AnswerPayload::Date(value) => entry.date_answer = Some(value.clone()),
            AnswerPayload::Time(value) => entry.time_answer = Some(value.clone()),
            AnswerPayload::File(handle) => entry.file_answer = Some(handle.clone()),
        }
        entry
    }
}

/// Partial answer coming from the input layer. Only the supplied fields are merged.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnswerPatch {
    #[serde(default)]
    pub selected_option: Option<OptionId>,
    #[serde(default)]
    pub selected_options: Option<Vec<OptionId>>,
    #[serde(default)]
    pub toggle_option: Option<OptionId>,
    #[serde(default, alias = "text_answer")]
    pub text: Option<String>,
    #[serde(default, alias = "numeric_answer")]
    pub numeric: Option<i64>,
    #[serde(default, alias = "date_answer")]
    pub date: Option<String>,
    #[serde(default, alias = "time_answer")]
    pub time: Option<String>,
    #[serde(default, alias = "file_answer")]
    pub file: Option<String>,
}

impl AnswerPatch {
    pub fn select(option: impl Into<WireId>) -> Self {
        Self { selected_option: Some(option.into()), ..Self::default() }
    }

    pub fn toggle(option: impl Into<WireId>) -> Self {
        Self { toggle_option: Some(option.into()), ..Self::default() }
    }

    pub fn options<I, T>(options: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<WireId>,
    {
        Self {
            selected_options: Some(options.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn text(text: impl Into<String>) -> Self {
        Self { text: Some(text.into()), ..Self::default() }
    }

    pub fn numeric(value: i64) -> Self {
        Self { numeric: Some(value), ..Self::default() }
    }

    pub fn date(value: impl Into<String>) -> Self {
        Self { date: Some(value.into()), ..Self::default() }
    }

    pub fn time(value: impl Into<String>) -> Self {
        Self { time: Some(value.into()), ..Self::default() }
    }

    pub fn file(handle: impl Into<String>) -> Self {
        Self { file: Some(handle.into()), ..Self::default() }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnswerError {
    #[error("question {0} is not part of this exam")]
    UnknownQuestion(QuestionId),
    #[error("no answer rule registered for {0} questions")]
    UnsupportedType(QuestionType),
    #[error("question {question} expects {expected}")]
    WrongShape { question: QuestionId, expected: &'static str },
    #[error("option {option} does not belong to question {question}")]
    UnknownOption { question: QuestionId, option: OptionId },
    #[error("value {value} for question {question} is outside {min}..={max}")]
    ScaleOutOfRange { question: QuestionId, value: i64, min: i64, max: i64 },
    #[error("'{value}' is not a valid date for question {question}")]
    InvalidDate { question: QuestionId, value: String },
    #[error("'{value}' is not a valid time for question {question}")]
    InvalidTime { question: QuestionId, value: String },
}

/// In-progress answers of one attempt, keyed by question id.
#[derive(Debug, Clone)]
pub struct AnswerStore {
    definition: Arc<ExamDefinition>,
    registry: Arc<QuestionVariantRegistry>,
    records: HashMap<QuestionId, AnswerRecord>,
}

impl AnswerStore {
    pub fn new(definition: Arc<ExamDefinition>, registry: Arc<QuestionVariantRegistry>) -> Self {
        Self { definition, registry, records: HashMap::new() }
    }

    /// Merges `patch` into the record of `question_id`. On error the store is unchanged.
    pub fn update_answer(
        &mut self,
        question_id: &QuestionId,
        patch: &AnswerPatch,
    ) -> Result<(), AnswerError> {
        let question = self
            .definition
            .question(question_id)
            .ok_or_else(|| AnswerError::UnknownQuestion(question_id.clone()))?;

        let current = self.records.get(question_id).map(|record| &record.payload);
        let Some(payload) = self.registry.merge(question, current, patch)? else {
            return Ok(());
        };

        self.records
            .insert(question_id.clone(), AnswerRecord { question_id: question_id.clone(), payload });
        Ok(())
    }

    pub fn clear(&mut self, question_id: &QuestionId) -> bool {
        self.records.remove(question_id).is_some()
    }

    pub fn get(&self, question_id: &QuestionId) -> Option<&AnswerRecord> {
        self.records.get(question_id)
    }

    pub fn is_answered(&self, question_id: &QuestionId) -> bool {
        self.records.get(question_id).is_some_and(|record| !record.payload.is_empty())
    }

    pub fn answered_count(&self) -> usize {
        self.records.values().filter(|record| !record.payload.is_empty()).count()
    }

    /// Selected ids of a multi-choice question; empty when unanswered.
    pub fn selected_options(&self, question_id: &QuestionId) -> BTreeSet<OptionId> {
        match self.records.get(question_id).map(|record| &record.payload) {
            Some(AnswerPayload::Options(selected)) => selected.clone(),
            Some(AnswerPayload::Option(option)) => BTreeSet::from([option.clone()]),
            _ => BTreeSet::new(),
        }
    }

    /// Submission payload in exam order. Unanswered questions are omitted.
    pub fn entries(&self) -> Vec<AnswerEntry> {
        self.definition
            .questions
            .iter()
            .filter_map(|question| self.records.get(&question.id))
            .filter(|record| !record.payload.is_empty())
            .map(AnswerRecord::to_entry)
            .collect()
    }
}
