use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use serde_json::{json, Value};
use time::OffsetDateTime;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::core::config::Settings;
use crate::schemas::exam::{AnswerEntry, ExamDefinitionResponse, SubmitAcknowledgement, WireId};
use crate::services::gateway::{
    GatewayError, HttpSubmissionGateway, StartedAttempt, SubmissionGateway,
};
use crate::services::retry::RetryPolicy;
use crate::session::model::{ExamDefinition, ExamId};

pub(crate) const TEST_API_TOKEN: &str = "test-token";

pub(crate) struct GatewayContext {
    pub(crate) gateway: HttpSubmissionGateway,
    _guard: OwnedMutexGuard<()>,
}

pub(crate) async fn env_lock() -> OwnedMutexGuard<()> {
    static LOCK: OnceLock<Arc<Mutex<()>>> = OnceLock::new();
    let lock = LOCK.get_or_init(|| Arc::new(Mutex::new(()))).clone();
    lock.lock_owned().await
}

pub(crate) fn set_test_env() {
    std::env::set_var("PICRETE_ENV", "test");
    std::env::set_var("PICRETE_STRICT_CONFIG", "0");
    std::env::set_var("PICRETE_API_TOKEN", TEST_API_TOKEN);
    std::env::set_var("PICRETE_API_PREFIX", "/api/v1");
    std::env::set_var("PICRETE_API_TIMEOUT_SECONDS", "5");
    std::env::remove_var("PICRETE_RETRY_MAX_ATTEMPTS");
    std::env::remove_var("PICRETE_RETRY_BASE_DELAY_MS");
    std::env::remove_var("PICRETE_RETRY_MAX_DELAY_MS");
    std::env::remove_var("PICRETE_TIMER_TICK_MS");
    std::env::remove_var("PICRETE_TIMER_WARNING_SECONDS");
    std::env::set_var("PROMETHEUS_ENABLED", "0");
}

/// Serves `router` on an ephemeral local port and returns its origin.
pub(crate) async fn spawn_backend(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind mock backend");
    let addr = listener.local_addr().expect("mock backend addr");
    tokio::spawn(async move {
        if let Err(err) = axum::serve(listener, router).await {
            tracing::error!(error = %err, "mock backend stopped");
        }
    });
    format!("http://{addr}")
}

pub(crate) async fn setup_gateway_context(router: Router) -> GatewayContext {
    let guard = env_lock().await;
    set_test_env();

    let base_url = spawn_backend(router).await;
    std::env::set_var("PICRETE_API_BASE_URL", &base_url);
    let settings = Settings::load().expect("settings");
    std::env::remove_var("PICRETE_API_BASE_URL");

    let gateway = HttpSubmissionGateway::from_settings(&settings)
        .expect("gateway")
        .with_retry(RetryPolicy::new(3, Duration::from_millis(10), Duration::from_millis(40)));

    GatewayContext { gateway, _guard: guard }
}

pub(crate) fn three_question_json(id: i64) -> Value {
    json!({
        "id": id,
        "examname": "Chemistry midterm",
        "duration_minutes": 60,
        "total_marks": 6,
        "questions": [
            {"id": 1, "question_text": "Which gas is inert?", "question_type": "single_choice",
             "marks": 2, "is_required": true,
             "options": [{"id": 10, "text": "Oxygen"}, {"id": 11, "text": "Argon"}]},
            {"id": 2, "question_text": "Who proposed the molar constant?",
             "question_type": "short_text", "marks": 2},
            {"id": 3, "question_text": "How confident are you?", "question_type": "scale",
             "marks": 2, "scale_min": 1, "scale_max": 5,
             "scale_min_label": "guessing", "scale_max_label": "certain"}
        ]
    })
}

pub(crate) fn three_question_definition() -> ExamDefinition {
    definition_from(three_question_json(42))
}

/// One question of every type, ids 1 to 10 in type order.
pub(crate) fn all_types_definition() -> ExamDefinition {
    definition_from(json!({
        "id": 7,
        "title": "Every variant",
        "duration_minutes": 30,
        "total_marks": 10,
        "questions": [
            {"id": 1, "question_type": "single_choice", "is_required": true,
             "options": [{"id": 10, "text": "a"}, {"id": 11, "text": "b"}, {"id": 12, "text": "c"}]},
            {"id": 2, "question_type": "multiple_choice",
             "options": [{"id": 20, "text": "a"}, {"id": 21, "text": "b"}, {"id": 22, "text": "c"}]},
            {"id": 3, "question_type": "short_text"},
            {"id": 4, "question_type": "long_text"},
            {"id": 5, "question_type": "boolean"},
            {"id": 6, "question_type": "scale", "scale_min": 1, "scale_max": 5},
            {"id": 7, "question_type": "dropdown",
             "options": [{"id": 70, "text": "x"}, {"id": 71, "text": "y"}]},
            {"id": 8, "question_type": "file"},
            {"id": 9, "question_type": "date"},
            {"id": 10, "question_type": "time"}
        ]
    }))
}

fn definition_from(payload: Value) -> ExamDefinition {
    let response: ExamDefinitionResponse = serde_json::from_value(payload).expect("definition json");
    ExamDefinition::try_from(response).expect("valid definition")
}

/// In-memory backend. Start and submit succeed unless a failure is queued.
pub(crate) struct FakeGateway {
    definition: ExamDefinition,
    expires_at: StdMutex<Option<OffsetDateTime>>,
    start_failures: StdMutex<VecDeque<GatewayError>>,
    submit_failures: StdMutex<VecDeque<GatewayError>>,
    submissions: StdMutex<Vec<Vec<AnswerEntry>>>,
    fetch_calls: AtomicUsize,
    submit_calls: AtomicUsize,
    submit_hangs: AtomicBool,
}

impl FakeGateway {
    pub(crate) fn new(definition: ExamDefinition) -> Self {
        Self {
            definition,
            expires_at: StdMutex::new(None),
            start_failures: StdMutex::new(VecDeque::new()),
            submit_failures: StdMutex::new(VecDeque::new()),
            submissions: StdMutex::new(Vec::new()),
            fetch_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            submit_hangs: AtomicBool::new(false),
        }
    }

    pub(crate) fn set_expires_at(&self, expires_at: OffsetDateTime) {
        *self.expires_at.lock().expect("lock") = Some(expires_at);
    }

    pub(crate) fn fail_next_start(&self, err: GatewayError) {
        self.start_failures.lock().expect("lock").push_back(err);
    }

    pub(crate) fn fail_next_submit(&self, err: GatewayError) {
        self.submit_failures.lock().expect("lock").push_back(err);
    }

    /// Submit calls never return from now on.
    pub(crate) fn hang_submits(&self) {
        self.submit_hangs.store(true, Ordering::SeqCst);
    }

    /// Payloads of every submit call, failed ones included.
    pub(crate) fn submissions(&self) -> Vec<Vec<AnswerEntry>> {
        self.submissions.lock().expect("lock").clone()
    }

    pub(crate) fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub(crate) fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SubmissionGateway for FakeGateway {
    async fn fetch_definition(&self, _exam_id: &ExamId) -> Result<ExamDefinition, GatewayError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.definition.clone())
    }

    async fn start_attempt(&self, _exam_id: &ExamId) -> Result<StartedAttempt, GatewayError> {
        let failure = self.start_failures.lock().expect("lock").pop_front();
        if let Some(err) = failure {
            return Err(err);
        }
        Ok(StartedAttempt {
            submission_id: WireId::Int(900),
            expires_at: *self.expires_at.lock().expect("lock"),
        })
    }

    async fn submit_answers(
        &self,
        _exam_id: &ExamId,
        submission_id: &WireId,
        answers: &[AnswerEntry],
    ) -> Result<SubmitAcknowledgement, GatewayError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        self.submissions.lock().expect("lock").push(answers.to_vec());
        if self.submit_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let failure = self.submit_failures.lock().expect("lock").pop_front();
        if let Some(err) = failure {
            return Err(err);
        }
        Ok(SubmitAcknowledgement {
            detail: Some("Submitted".to_string()),
            submission_id: Some(submission_id.clone()),
        })
    }
}
