use std::collections::HashSet;
use std::fmt;

use thiserror::Error;
use validator::Validate;

use crate::schemas::exam::{ExamDefinitionResponse, OptionResponse, QuestionResponse, WireId};
use crate::session::variants::boolean_options;

pub type ExamId = WireId;
pub type QuestionId = WireId;
pub type OptionId = WireId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum QuestionType {
    SingleChoice,
    MultiChoice,
    ShortText,
    LongText,
    Boolean,
    Scale,
    Dropdown,
    File,
    Date,
    Time,
}

impl QuestionType {
    pub const ALL: [QuestionType; 10] = [
        QuestionType::SingleChoice,
        QuestionType::MultiChoice,
        QuestionType::ShortText,
        QuestionType::LongText,
        QuestionType::Boolean,
        QuestionType::Scale,
        QuestionType::Dropdown,
        QuestionType::File,
        QuestionType::Date,
        QuestionType::Time,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            QuestionType::SingleChoice => "single_choice",
            QuestionType::MultiChoice => "multiple_choice",
            QuestionType::ShortText => "short_text",
            QuestionType::LongText => "long_text",
            QuestionType::Boolean => "boolean",
            QuestionType::Scale => "scale",
            QuestionType::Dropdown => "dropdown",
            QuestionType::File => "file",
            QuestionType::Date => "date",
            QuestionType::Time => "time",
        }
    }

    /// Accepts the backend tag in snake, kebab or short form.
    pub fn parse(tag: &str) -> Option<Self> {
        let normalized = tag.trim().to_ascii_lowercase().replace('-', "_");
        let parsed = match normalized.as_str() {
            "single_choice" | "single" | "radio" => QuestionType::SingleChoice,
            "multiple_choice" | "multi_choice" | "multi" | "checkbox" => QuestionType::MultiChoice,
            "short_text" | "short_answer" | "short" | "text" => QuestionType::ShortText,
            "long_text" | "long_answer" | "long" | "paragraph" => QuestionType::LongText,
            "boolean" | "true_false" => QuestionType::Boolean,
            "scale" | "linear_scale" | "rating" => QuestionType::Scale,
            "dropdown" | "select" => QuestionType::Dropdown,
            "file" | "file_upload" => QuestionType::File,
            "date" => QuestionType::Date,
            "time" => QuestionType::Time,
            _ => return None,
        };
        Some(parsed)
    }

    pub fn is_choice(self) -> bool {
        matches!(
            self,
            QuestionType::SingleChoice
                | QuestionType::MultiChoice
                | QuestionType::Boolean
                | QuestionType::Dropdown
        )
    }
}

impl fmt::Display for QuestionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceOption {
    pub id: OptionId,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScaleBounds {
    pub min: i64,
    pub max: i64,
    pub min_label: Option<String>,
    pub max_label: Option<String>,
}

impl ScaleBounds {
    pub fn contains(&self, value: i64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuestionModel {
    pub id: QuestionId,
    pub prompt: String,
    pub question_type: QuestionType,
    pub marks: f64,
    pub required: bool,
    pub options: Vec<ChoiceOption>,
    pub scale: Option<ScaleBounds>,
}

impl QuestionModel {
    pub fn has_option(&self, option_id: &OptionId) -> bool {
        self.options.iter().any(|option| &option.id == option_id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExamDefinition {
    pub id: ExamId,
    pub title: String,
    pub duration_minutes: u32,
    pub total_marks: f64,
    pub questions: Vec<QuestionModel>,
}

impl ExamDefinition {
    pub fn question(&self, id: &QuestionId) -> Option<&QuestionModel> {
        self.questions.iter().find(|question| &question.id == id)
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum DefinitionError {
    #[error("exam definition failed validation: {0}")]
    Invalid(String),
    #[error("question {question} has unknown type '{tag}'")]
    UnknownQuestionType { question: QuestionId, tag: String },
    #[error("question {0} appears more than once")]
    DuplicateQuestion(QuestionId),
    #[error("choice question {0} has no options")]
    MissingOptions(QuestionId),
    #[error("question {question} repeats option {option}")]
    DuplicateOption { question: QuestionId, option: OptionId },
    #[error("scale question {question} has invalid bounds {min}..{max}")]
    InvalidScale { question: QuestionId, min: i64, max: i64 },
}

impl TryFrom<ExamDefinitionResponse> for ExamDefinition {
    type Error = DefinitionError;

    fn try_from(response: ExamDefinitionResponse) -> Result<Self, Self::Error> {
        response.validate().map_err(|err| DefinitionError::Invalid(err.to_string()))?;

        let mut seen = HashSet::new();
        let mut questions = Vec::with_capacity(response.questions.len());
        for question in response.questions {
            if !seen.insert(question.id.clone()) {
                return Err(DefinitionError::DuplicateQuestion(question.id));
            }
            questions.push(QuestionModel::try_from(question)?);
        }

        Ok(Self {
            id: response.id,
            title: response.examname,
            duration_minutes: response.duration_minutes,
            total_marks: response.total_marks,
            questions,
        })
    }
}

impl TryFrom<QuestionResponse> for QuestionModel {
    type Error = DefinitionError;

    fn try_from(question: QuestionResponse) -> Result<Self, Self::Error> {
        let question_type = QuestionType::parse(&question.question_type).ok_or_else(|| {
            DefinitionError::UnknownQuestionType {
                question: question.id.clone(),
                tag: question.question_type.clone(),
            }
        })?;

        let mut options: Vec<ChoiceOption> = question
            .options
            .unwrap_or_default()
            .into_iter()
            .map(|OptionResponse { id, text }| ChoiceOption { id, text })
            .collect();

        if question_type.is_choice() {
            if options.is_empty() && question_type == QuestionType::Boolean {
                options = boolean_options();
            }
            if options.is_empty() {
                return Err(DefinitionError::MissingOptions(question.id));
            }
            let mut option_ids = HashSet::new();
            for option in &options {
                if !option_ids.insert(&option.id) {
                    return Err(DefinitionError::DuplicateOption {
                        question: question.id.clone(),
                        option: option.id.clone(),
                    });
                }
            }
        } else {
            options.clear();
        }

        let scale = if question_type == QuestionType::Scale {
            let min = question.scale_min.unwrap_or(1);
            let max = question.scale_max.unwrap_or(5);
            if max <= min {
                return Err(DefinitionError::InvalidScale { question: question.id, min, max });
            }
            Some(ScaleBounds {
                min,
                max,
                min_label: question.scale_min_label,
                max_label: question.scale_max_label,
            })
        } else {
            None
        };

        Ok(Self {
            id: question.id,
            prompt: question.question_text,
            question_type,
            marks: question.marks,
            required: question.is_required,
            options,
            scale,
        })
    }
}
