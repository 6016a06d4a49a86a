//! Per-type answer rules. Each question type is registered once with the
//! payload shape it accepts and the merge function that folds a patch into
//! the stored payload.

use std::collections::{BTreeSet, HashMap};

use time::macros::format_description;
use time::{Date, Time};

use crate::session::answers::{AnswerError, AnswerPatch, AnswerPayload};
use crate::session::model::{ChoiceOption, OptionId, QuestionModel, QuestionType};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    SingleOption,
    OptionSet,
    Text,
    Scale,
    Date,
    Time,
    File,
}

impl PayloadKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PayloadKind::SingleOption => "selected_option",
            PayloadKind::OptionSet => "selected_options",
            PayloadKind::Text => "text_answer",
            PayloadKind::Scale => "numeric_answer",
            PayloadKind::Date => "date_answer",
            PayloadKind::Time => "time_answer",
            PayloadKind::File => "file_answer",
        }
    }
}

/// Folds `patch` into the current payload. `Ok(None)` means the patch carried nothing.
pub type MergeFn = fn(
    &QuestionModel,
    Option<&AnswerPayload>,
    &AnswerPatch,
) -> Result<Option<AnswerPayload>, AnswerError>;

#[derive(Clone, Copy)]
pub struct VariantSpec {
    pub question_type: QuestionType,
    pub payload: PayloadKind,
    merge: MergeFn,
}

impl std::fmt::Debug for VariantSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariantSpec")
            .field("question_type", &self.question_type)
            .field("payload", &self.payload)
            .finish_non_exhaustive()
    }
}

impl VariantSpec {
    pub fn new(question_type: QuestionType, payload: PayloadKind, merge: MergeFn) -> Self {
        Self { question_type, payload, merge }
    }
}

#[derive(Debug, Clone)]
pub struct QuestionVariantRegistry {
    specs: HashMap<QuestionType, VariantSpec>,
}

impl Default for QuestionVariantRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

impl QuestionVariantRegistry {
    pub fn empty() -> Self {
        Self { specs: HashMap::new() }
    }

    pub fn standard() -> Self {
        let mut registry = Self::empty();
        registry.register(VariantSpec::new(
            QuestionType::SingleChoice,
            PayloadKind::SingleOption,
            merge_single_option,
        ));
        registry.register(VariantSpec::new(
            QuestionType::MultiChoice,
            PayloadKind::OptionSet,
            merge_option_set,
        ));
        registry.register(VariantSpec::new(
            QuestionType::Boolean,
            PayloadKind::SingleOption,
            merge_single_option,
        ));
        registry.register(VariantSpec::new(
            QuestionType::Dropdown,
            PayloadKind::SingleOption,
            merge_single_option,
        ));
        registry.register(VariantSpec::new(QuestionType::ShortText, PayloadKind::Text, merge_text));
        registry.register(VariantSpec::new(QuestionType::LongText, PayloadKind::Text, merge_text));
        registry.register(VariantSpec::new(QuestionType::Scale, PayloadKind::Scale, merge_scale));
        registry.register(VariantSpec::new(QuestionType::Date, PayloadKind::Date, merge_date));
        registry.register(VariantSpec::new(QuestionType::Time, PayloadKind::Time, merge_time));
        registry.register(VariantSpec::new(QuestionType::File, PayloadKind::File, merge_file));
        registry
    }

    /// Registers or replaces the rule for one question type.
    pub fn register(&mut self, spec: VariantSpec) {
        self.specs.insert(spec.question_type, spec);
    }

    pub fn spec(&self, question_type: QuestionType) -> Option<&VariantSpec> {
        self.specs.get(&question_type)
    }

    pub(crate) fn merge(
        &self,
        question: &QuestionModel,
        current: Option<&AnswerPayload>,
        patch: &AnswerPatch,
    ) -> Result<Option<AnswerPayload>, AnswerError> {
        let spec = self
            .spec(question.question_type)
            .ok_or(AnswerError::UnsupportedType(question.question_type))?;
        ensure_shape(question, spec.payload, patch)?;
        (spec.merge)(question, current, patch)
    }
}

/// Fixed option pair used when a boolean question arrives without options.
pub(crate) fn boolean_options() -> Vec<ChoiceOption> {
    vec![
        ChoiceOption { id: "true".into(), text: "True".to_string() },
        ChoiceOption { id: "false".into(), text: "False".to_string() },
    ]
}

fn ensure_shape(
    question: &QuestionModel,
    kind: PayloadKind,
    patch: &AnswerPatch,
) -> Result<(), AnswerError> {
    let allowed = |field: PayloadKind| -> bool { field == kind };
    let mismatched = (patch.selected_option.is_some() && !allowed(PayloadKind::SingleOption))
        || ((patch.selected_options.is_some() || patch.toggle_option.is_some())
            && !allowed(PayloadKind::OptionSet))
        || (patch.text.is_some() && !allowed(PayloadKind::Text))
        || (patch.numeric.is_some() && !allowed(PayloadKind::Scale))
        || (patch.date.is_some() && !allowed(PayloadKind::Date))
        || (patch.time.is_some() && !allowed(PayloadKind::Time))
        || (patch.file.is_some() && !allowed(PayloadKind::File));

    if mismatched {
        return Err(AnswerError::WrongShape {
            question: question.id.clone(),
            expected: kind.as_str(),
        });
    }
    Ok(())
}

fn ensure_option(question: &QuestionModel, option: &OptionId) -> Result<(), AnswerError> {
    if question.has_option(option) {
        Ok(())
    } else {
        Err(AnswerError::UnknownOption { question: question.id.clone(), option: option.clone() })
    }
}

fn merge_single_option(
    question: &QuestionModel,
    _current: Option<&AnswerPayload>,
    patch: &AnswerPatch,
) -> Result<Option<AnswerPayload>, AnswerError> {
    let Some(option) = &patch.selected_option else {
        return Ok(None);
    };
    ensure_option(question, option)?;
    Ok(Some(AnswerPayload::Option(option.clone())))
}

fn merge_option_set(
    question: &QuestionModel,
    current: Option<&AnswerPayload>,
    patch: &AnswerPatch,
) -> Result<Option<AnswerPayload>, AnswerError> {
    if patch.selected_options.is_none() && patch.toggle_option.is_none() {
        return Ok(None);
    }

    let mut selected = match (&patch.selected_options, current) {
        (Some(options), _) => {
            for option in options {
                ensure_option(question, option)?;
            }
            options.iter().cloned().collect::<BTreeSet<_>>()
        }
        (None, Some(AnswerPayload::Options(existing))) => existing.clone(),
        (None, _) => BTreeSet::new(),
    };

    if let Some(option) = &patch.toggle_option {
        ensure_option(question, option)?;
        if !selected.remove(option) {
            selected.insert(option.clone());
        }
    }

    Ok(Some(AnswerPayload::Options(selected)))
}

fn merge_text(
    _question: &QuestionModel,
    _current: Option<&AnswerPayload>,
    patch: &AnswerPatch,
) -> Result<Option<AnswerPayload>, AnswerError> {
    Ok(patch.text.clone().map(AnswerPayload::Text))
}

fn merge_scale(
    question: &QuestionModel,
    _current: Option<&AnswerPayload>,
    patch: &AnswerPatch,
) -> Result<Option<AnswerPayload>, AnswerError> {
    let Some(value) = patch.numeric else {
        return Ok(None);
    };
    let bounds = question
        .scale
        .as_ref()
        .ok_or(AnswerError::UnsupportedType(question.question_type))?;
    if !bounds.contains(value) {
        return Err(AnswerError::ScaleOutOfRange {
            question: question.id.clone(),
            value,
            min: bounds.min,
            max: bounds.max,
        });
    }
    Ok(Some(AnswerPayload::Scale(value)))
}

fn merge_date(
    question: &QuestionModel,
    _current: Option<&AnswerPayload>,
    patch: &AnswerPatch,
) -> Result<Option<AnswerPayload>, AnswerError> {
    let Some(raw) = &patch.date else {
        return Ok(None);
    };
    let value = raw.trim();
    Date::parse(value, &format_description!("[year]-[month]-[day]")).map_err(|_| {
        AnswerError::InvalidDate { question: question.id.clone(), value: raw.clone() }
    })?;
    Ok(Some(AnswerPayload::Date(value.to_string())))
}

fn merge_time(
    question: &QuestionModel,
    _current: Option<&AnswerPayload>,
    patch: &AnswerPatch,
) -> Result<Option<AnswerPayload>, AnswerError> {
    let Some(raw) = &patch.time else {
        return Ok(None);
    };
    let value = raw.trim();
    let parsed = Time::parse(value, &format_description!("[hour]:[minute]:[second]"))
        .or_else(|_| Time::parse(value, &format_description!("[hour]:[minute]")));
    parsed.map_err(|_| AnswerError::InvalidTime {
        question: question.id.clone(),
        value: raw.clone(),
    })?;
    Ok(Some(AnswerPayload::Time(value.to_string())))
}

fn merge_file(
    _question: &QuestionModel,
    _current: Option<&AnswerPayload>,
    patch: &AnswerPatch,
) -> Result<Option<AnswerPayload>, AnswerError> {
    Ok(patch.file.clone().map(AnswerPayload::File))
}
