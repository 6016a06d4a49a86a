use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde_json::Value;

use crate::schemas::exam::WireId;
use crate::session::answers::AnswerPatch;
use crate::session::model::{ExamId, QuestionId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CliArgs {
    pub(crate) exam: ExamId,
    pub(crate) answers: Option<PathBuf>,
    pub(crate) await_expiry: bool,
}

impl CliArgs {
    pub(crate) fn parse<I>(args: I) -> Result<Self>
    where
        I: IntoIterator<Item = String>,
    {
        let mut exam = None;
        let mut answers = None;
        let mut await_expiry = false;

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--exam" => {
                    let value = args.next().ok_or_else(|| anyhow!("--exam missing value"))?;
                    exam = Some(parse_exam_id(&value));
                }
                "--answers" => {
                    let value = args.next().ok_or_else(|| anyhow!("--answers missing value"))?;
                    answers = Some(PathBuf::from(value));
                }
                "--await-expiry" => await_expiry = true,
                _ => return Err(anyhow!("Unknown argument: {arg}")),
            }
        }

        let exam = exam.ok_or_else(|| anyhow!("--exam is required"))?;
        Ok(Self { exam, answers, await_expiry })
    }
}

fn parse_exam_id(raw: &str) -> ExamId {
    match raw.trim().parse::<i64>() {
        Ok(value) => WireId::Int(value),
        Err(_) => WireId::from(raw.trim()),
    }
}

/// Reads a JSON array of `{ "question_id": .., <patch fields> }` objects.
pub(crate) fn load_script(path: &Path) -> Result<Vec<(QuestionId, AnswerPatch)>> {
    let payload = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    parse_script(&payload).with_context(|| format!("Invalid answer script in {}", path.display()))
}

fn parse_script(payload: &str) -> Result<Vec<(QuestionId, AnswerPatch)>> {
    let items: Vec<Value> = serde_json::from_str(payload)?;
    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let Value::Object(mut fields) = item else {
                return Err(anyhow!("entry {index} is not an object"));
            };
            let question_id = fields
                .remove("question_id")
                .ok_or_else(|| anyhow!("entry {index} has no question_id"))?;
            let question_id: QuestionId = serde_json::from_value(question_id)
                .with_context(|| format!("entry {index} has an invalid question_id"))?;
            let patch: AnswerPatch = serde_json::from_value(Value::Object(fields))
                .with_context(|| format!("entry {index} has an invalid answer"))?;
            Ok((question_id, patch))
        })
        .collect()
}
