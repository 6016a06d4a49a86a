use std::fmt;

use serde::de::Error as _;
use serde::{Deserialize, Serialize};
use time::{
    format_description::well_known::Rfc3339, macros::format_description, OffsetDateTime,
    PrimitiveDateTime,
};
use validator::Validate;

/// Identifier as the backend sent it. Integer ids go back out as integers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Int(i64),
    Text(String),
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireId::Int(value) => write!(f, "{value}"),
            WireId::Text(value) => f.write_str(value),
        }
    }
}

impl From<i64> for WireId {
    fn from(value: i64) -> Self {
        WireId::Int(value)
    }
}

impl From<i32> for WireId {
    fn from(value: i32) -> Self {
        WireId::Int(i64::from(value))
    }
}

impl From<&str> for WireId {
    fn from(value: &str) -> Self {
        WireId::Text(value.to_string())
    }
}

impl From<String> for WireId {
    fn from(value: String) -> Self {
        WireId::Text(value)
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ExamDefinitionResponse {
    pub id: WireId,
    #[serde(alias = "title")]
    pub examname: String,
    #[validate(range(min = 1, message = "duration_minutes must be positive"))]
    pub duration_minutes: u32,
    #[serde(default)]
    #[validate(range(min = 0.0, message = "total_marks must be non-negative"))]
    pub total_marks: f64,
    #[serde(default)]
    #[validate(nested)]
    pub questions: Vec<QuestionResponse>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QuestionResponse {
    pub id: WireId,
    #[serde(default)]
    pub question_text: String,
    pub question_type: String,
    #[serde(default)]
    #[validate(range(min = 0.0, message = "marks must be non-negative"))]
    pub marks: f64,
    #[serde(default)]
    pub is_required: bool,
    #[serde(default)]
    pub options: Option<Vec<OptionResponse>>,
    #[serde(default)]
    pub scale_min: Option<i64>,
    #[serde(default)]
    pub scale_max: Option<i64>,
    #[serde(default)]
    pub scale_min_label: Option<String>,
    #[serde(default)]
    pub scale_max_label: Option<String>,
}

/// Choice as shown to the student. Any correctness flag in the payload is dropped.
#[derive(Debug, Clone, Deserialize)]
pub struct OptionResponse {
    pub id: WireId,
    #[serde(alias = "option_text")]
    pub text: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StartAttemptResponse {
    #[serde(alias = "id")]
    pub submission_id: WireId,
    #[serde(default, deserialize_with = "deserialize_option_offset_datetime_flexible")]
    pub expires_at: Option<OffsetDateTime>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitAnswersRequest<'a> {
    pub submission_id: &'a WireId,
    pub answers: &'a [AnswerEntry],
}

/// One answered question in the submit payload. Exactly one payload field is set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnswerEntry {
    pub question_id: WireId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_option: Option<WireId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_options: Option<Vec<WireId>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeric_answer: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_answer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_answer: Option<String>,
}

impl Default for WireId {
    fn default() -> Self {
        WireId::Text(String::new())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct SubmitAcknowledgement {
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub submission_id: Option<WireId>,
}

pub(crate) fn parse_offset_datetime_flexible(raw: &str) -> Option<OffsetDateTime> {
    if let Ok(value) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Some(value);
    }

    // Naive timestamps are treated as UTC.
    if raw.len() == 19 && raw.as_bytes().get(10) == Some(&b'T') {
        let candidate = format!("{raw}Z");
        if let Ok(value) = OffsetDateTime::parse(&candidate, &Rfc3339) {
            return Some(value);
        }
    }

    if let Ok(value) =
        PrimitiveDateTime::parse(raw, &format_description!("[year]-[month]-[day]T[hour]:[minute]"))
    {
        return Some(value.assume_utc());
    }
    if let Ok(value) = PrimitiveDateTime::parse(
        raw,
        &format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    ) {
        return Some(value.assume_utc());
    }

    None
}

fn deserialize_option_offset_datetime_flexible<'de, D>(
    deserializer: D,
) -> Result<Option<OffsetDateTime>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        Some(value) => parse_offset_datetime_flexible(&value)
            .ok_or_else(|| D::Error::custom(format!("invalid datetime: {value}")))
            .map(Some),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use time::macros::datetime;

    #[test]
    fn definition_accepts_integer_and_string_ids() {
        let payload = json!({
            "id": 12,
            "examname": "Midterm",
            "duration_minutes": 60,
            "total_marks": 10,
            "questions": [
                {
                    "id": "q-1",
                    "question_text": "Pick one",
                    "question_type": "single_choice",
                    "marks": 2,
                    "is_required": true,
                    "options": [
                        {"id": 1, "text": "A", "is_correct": true},
                        {"id": 2, "option_text": "B"}
                    ]
                }
            ]
        });

        let definition: ExamDefinitionResponse =
            serde_json::from_value(payload).expect("definition");
        assert_eq!(definition.id, WireId::Int(12));
        let options = definition.questions[0].options.as_ref().expect("options");
        assert_eq!(options[1].text, "B");
        assert_eq!(definition.questions[0].id, WireId::from("q-1"));
        assert!(definition.validate().is_ok());
    }

    #[test]
    fn definition_with_zero_duration_fails_validation() {
        let payload = json!({
            "id": 1,
            "examname": "Broken",
            "duration_minutes": 0,
            "questions": []
        });
        let definition: ExamDefinitionResponse =
            serde_json::from_value(payload).expect("definition");
        assert!(definition.validate().is_err());
    }

    #[test]
    fn answer_entry_omits_empty_fields_and_keeps_id_shape() {
        let entry = AnswerEntry {
            question_id: WireId::Int(3),
            selected_option: Some(WireId::Int(9)),
            ..AnswerEntry::default()
        };
        let value = serde_json::to_value(&entry).expect("serialize");
        assert_eq!(value, json!({"question_id": 3, "selected_option": 9}));
    }

    #[test]
    fn start_response_parses_naive_expiry_as_utc() {
        let response: StartAttemptResponse = serde_json::from_value(json!({
            "submission_id": 55,
            "expires_at": "2025-01-02T11:00:00"
        }))
        .expect("start response");
        assert_eq!(response.submission_id, WireId::Int(55));
        assert_eq!(response.expires_at, Some(datetime!(2025-01-02 11:00:00 UTC)));
    }

    #[test]
    fn start_response_without_expiry() {
        let response: StartAttemptResponse =
            serde_json::from_value(json!({"submission_id": "abc"})).expect("start response");
        assert!(response.expires_at.is_none());
    }
}
