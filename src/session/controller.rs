//! Attempt state machine. The controller is the only component that starts
//! an attempt or calls submit; every transition goes through `&mut self`, so
//! a second trigger always observes the state left by the first.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use time::OffsetDateTime;
use tokio::sync::mpsc;

use crate::core::config::Settings;
use crate::core::time::{compute_deadline, format_offset, now_utc, remaining_until};
use crate::schemas::exam::{SubmitAcknowledgement, WireId};
use crate::services::gateway::{GatewayError, SubmissionGateway};
use crate::session::answers::{AnswerError, AnswerPatch, AnswerStore};
use crate::session::model::{ExamDefinition, ExamId, QuestionId, QuestionModel};
use crate::session::navigation::{NavigationIndex, Progress};
use crate::session::timer::{CountdownTimer, TimerConfig, TimerEvent};
use crate::session::variants::QuestionVariantRegistry;

const SESSION_TRANSITIONS: &str = "exam_session_transitions_total";
const SESSION_SUBMISSIONS: &str = "exam_session_submissions_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    NotStarted,
    InProgress,
    Submitting,
    Completed,
    Failed,
}

impl SessionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::NotStarted => "not_started",
            SessionPhase::InProgress => "in_progress",
            SessionPhase::Submitting => "submitting",
            SessionPhase::Completed => "completed",
            SessionPhase::Failed => "failed",
        }
    }

    /// No further work happens without outside input. `Failed` still accepts
    /// a manual submit retry.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Completed | SessionPhase::Failed)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmitTrigger {
    Manual,
    Expiry,
}

impl SubmitTrigger {
    pub fn as_str(self) -> &'static str {
        match self {
            SubmitTrigger::Manual => "manual",
            SubmitTrigger::Expiry => "expiry",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    Completed(SubmitAcknowledgement),
    /// The state did not accept this trigger. No backend call was made.
    Ignored { phase: SessionPhase },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    LowTime(Duration),
    Submitted(SubmitOutcome),
    /// Event from a timer that is no longer armed.
    Stale,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("cannot {action} while the session is {phase}")]
    IllegalTransition { action: &'static str, phase: SessionPhase },
    #[error("session is {0} and does not accept answers")]
    NotAcceptingAnswers(SessionPhase),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Answer(#[from] AnswerError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveAttempt {
    pub submission_id: WireId,
    pub started_at: OffsetDateTime,
    pub deadline: OffsetDateTime,
}

/// Pre-submit confirmation view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SubmitSummary {
    pub answered: usize,
    pub total: usize,
    pub unanswered_required: Vec<QuestionId>,
}

#[derive(Debug, Clone, Default)]
pub struct SessionSettings {
    pub timer: TimerConfig,
}

impl SessionSettings {
    pub fn from_settings(settings: &Settings) -> Self {
        Self { timer: TimerConfig::from_settings(settings.timer()) }
    }
}

#[derive(Debug)]
enum SessionState {
    NotStarted,
    InProgress { attempt: ActiveAttempt, timer: CountdownTimer, answers: AnswerStore },
    Submitting { attempt: ActiveAttempt, answered: usize },
    Completed { attempt: ActiveAttempt, acknowledgement: SubmitAcknowledgement, answered: usize },
    Failed { attempt: ActiveAttempt, answers: AnswerStore, error: GatewayError },
}

impl SessionState {
    fn phase(&self) -> SessionPhase {
        match self {
            SessionState::NotStarted => SessionPhase::NotStarted,
            SessionState::InProgress { .. } => SessionPhase::InProgress,
            SessionState::Submitting { .. } => SessionPhase::Submitting,
            SessionState::Completed { .. } => SessionPhase::Completed,
            SessionState::Failed { .. } => SessionPhase::Failed,
        }
    }
}

pub struct ExamSessionController {
    gateway: Arc<dyn SubmissionGateway>,
    definition: Arc<ExamDefinition>,
    registry: Arc<QuestionVariantRegistry>,
    settings: SessionSettings,
    navigation: NavigationIndex,
    state: SessionState,
    events_tx: mpsc::UnboundedSender<TimerEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<TimerEvent>>,
}

impl fmt::Debug for ExamSessionController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExamSessionController")
            .field("exam_id", &self.definition.id)
            .field("state", &self.state)
            .field("navigation", &self.navigation)
            .finish_non_exhaustive()
    }
}

impl ExamSessionController {
    /// Fetches the definition and builds a controller that has not started yet.
    pub async fn load(
        gateway: Arc<dyn SubmissionGateway>,
        exam_id: &ExamId,
        settings: SessionSettings,
    ) -> Result<Self, SessionError> {
        let definition = gateway.fetch_definition(exam_id).await?;
        tracing::info!(
            exam_id = %definition.id,
            title = %definition.title,
            questions = definition.questions.len(),
            duration_minutes = definition.duration_minutes,
            "exam definition loaded"
        );
        Ok(Self::new(gateway, definition, settings))
    }

    pub fn new(
        gateway: Arc<dyn SubmissionGateway>,
        definition: ExamDefinition,
        settings: SessionSettings,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let navigation = NavigationIndex::new(definition.questions.len());
        Self {
            gateway,
            definition: Arc::new(definition),
            registry: Arc::new(QuestionVariantRegistry::standard()),
            settings,
            navigation,
            state: SessionState::NotStarted,
            events_tx,
            events_rx: Some(events_rx),
        }
    }

    /// Receiver for the countdown's events. Can be taken once.
    pub fn take_timer_events(&mut self) -> Option<mpsc::UnboundedReceiver<TimerEvent>> {
        self.events_rx.take()
    }

    pub fn definition(&self) -> &ExamDefinition {
        &self.definition
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.phase()
    }

    pub fn attempt(&self) -> Option<&ActiveAttempt> {
        match &self.state {
            SessionState::NotStarted => None,
            SessionState::InProgress { attempt, .. }
            | SessionState::Submitting { attempt, .. }
            | SessionState::Completed { attempt, .. }
            | SessionState::Failed { attempt, .. } => Some(attempt),
        }
    }

    pub fn acknowledgement(&self) -> Option<&SubmitAcknowledgement> {
        match &self.state {
            SessionState::Completed { acknowledgement, .. } => Some(acknowledgement),
            _ => None,
        }
    }

    pub fn last_error(&self) -> Option<&GatewayError> {
        match &self.state {
            SessionState::Failed { error, .. } => Some(error),
            _ => None,
        }
    }

    /// Remaining time of the running countdown.
    pub fn remaining(&self) -> Option<Duration> {
        match &self.state {
            SessionState::InProgress { timer, .. } => Some(timer.remaining()),
            _ => None,
        }
    }

    pub fn answers(&self) -> Option<&AnswerStore> {
        match &self.state {
            SessionState::InProgress { answers, .. } | SessionState::Failed { answers, .. } => {
                Some(answers)
            }
            _ => None,
        }
    }

    pub async fn start(&mut self) -> Result<(), SessionError> {
        let phase = self.phase();
        if phase != SessionPhase::NotStarted {
            return Err(SessionError::IllegalTransition { action: "start", phase });
        }

        let started = match self.gateway.start_attempt(&self.definition.id).await {
            Ok(started) => started,
            Err(err) => {
                tracing::warn!(
                    exam_id = %self.definition.id,
                    kind = err.kind(),
                    error = %err,
                    "attempt start rejected"
                );
                return Err(err.into());
            }
        };

        let started_at = now_utc();
        let deadline =
            compute_deadline(started_at, self.definition.duration_minutes, started.expires_at);
        let timer = CountdownTimer::start(
            remaining_until(deadline, now_utc()),
            self.settings.timer,
            self.events_tx.clone(),
        );

        tracing::info!(
            exam_id = %self.definition.id,
            submission_id = %started.submission_id,
            deadline = %format_offset(deadline),
            timer = %timer.id(),
            "attempt started"
        );

        let attempt =
            ActiveAttempt { submission_id: started.submission_id, started_at, deadline };
        let answers = AnswerStore::new(self.definition.clone(), self.registry.clone());
        self.navigation = NavigationIndex::new(self.definition.questions.len());
        self.transition(phase, SessionState::InProgress { attempt, timer, answers });
        Ok(())
    }

    /// Accepts the trigger only from `InProgress`, or from `Failed` for a
    /// manual retry. Anything else is reported as ignored.
    pub async fn submit(&mut self, trigger: SubmitTrigger) -> Result<SubmitOutcome, SessionError> {
        let phase = self.phase();
        let accepted = match phase {
            SessionPhase::InProgress => true,
            SessionPhase::Failed => trigger == SubmitTrigger::Manual,
            _ => false,
        };
        if !accepted {
            tracing::debug!(
                exam_id = %self.definition.id,
                trigger = trigger.as_str(),
                phase = phase.as_str(),
                "submit trigger ignored"
            );
            metrics::counter!(
                SESSION_SUBMISSIONS,
                "trigger" => trigger.as_str(),
                "status" => "ignored"
            )
            .increment(1);
            return Ok(SubmitOutcome::Ignored { phase });
        }

        let (attempt, answers) = match std::mem::replace(&mut self.state, SessionState::NotStarted) {
            SessionState::InProgress { attempt, timer, answers } => {
                timer.cancel();
                (attempt, answers)
            }
            SessionState::Failed { attempt, answers, .. } => (attempt, answers),
            other => {
                self.state = other;
                return Ok(SubmitOutcome::Ignored { phase });
            }
        };

        let entries = answers.entries();
        let answered = entries.len();
        self.transition(
            phase,
            SessionState::Submitting { attempt: attempt.clone(), answered },
        );

        tracing::info!(
            exam_id = %self.definition.id,
            submission_id = %attempt.submission_id,
            trigger = trigger.as_str(),
            answered,
            "submitting answers"
        );

        match self.gateway.submit_answers(&self.definition.id, &attempt.submission_id, &entries).await
        {
            Ok(acknowledgement) => {
                metrics::counter!(
                    SESSION_SUBMISSIONS,
                    "trigger" => trigger.as_str(),
                    "status" => "completed"
                )
                .increment(1);
                self.transition(
                    SessionPhase::Submitting,
                    SessionState::Completed {
                        attempt,
                        acknowledgement: acknowledgement.clone(),
                        answered,
                    },
                );
                Ok(SubmitOutcome::Completed(acknowledgement))
            }
            Err(err) => {
                metrics::counter!(
                    SESSION_SUBMISSIONS,
                    "trigger" => trigger.as_str(),
                    "status" => "failed"
                )
                .increment(1);
                tracing::error!(
                    exam_id = %self.definition.id,
                    submission_id = %attempt.submission_id,
                    kind = err.kind(),
                    error = %err,
                    "submission failed; answers kept for a manual retry"
                );
                self.transition(
                    SessionPhase::Submitting,
                    SessionState::Failed { attempt, answers, error: err.clone() },
                );
                Err(err.into())
            }
        }
    }

    pub async fn handle_event(&mut self, event: TimerEvent) -> Result<EventOutcome, SessionError> {
        let armed = match &self.state {
            SessionState::InProgress { timer, .. } => Some(timer.id()),
            _ => None,
        };
        if armed != Some(event.timer()) {
            tracing::debug!(timer = %event.timer(), phase = self.phase().as_str(), "stale timer event");
            return Ok(EventOutcome::Stale);
        }

        match event {
            TimerEvent::LowTime { remaining, .. } => {
                tracing::info!(
                    exam_id = %self.definition.id,
                    remaining_secs = remaining.as_secs(),
                    "attempt is running out of time"
                );
                Ok(EventOutcome::LowTime(remaining))
            }
            TimerEvent::Expired { .. } => {
                let outcome = self.submit(SubmitTrigger::Expiry).await?;
                Ok(EventOutcome::Submitted(outcome))
            }
        }
    }

    pub fn update_answer(
        &mut self,
        question_id: &QuestionId,
        patch: &AnswerPatch,
    ) -> Result<(), SessionError> {
        let answers = self.answers_mut()?;
        answers.update_answer(question_id, patch)?;
        Ok(())
    }

    /// Returns whether the question had an answer.
    pub fn clear_answer(&mut self, question_id: &QuestionId) -> Result<bool, SessionError> {
        let answers = self.answers_mut()?;
        Ok(answers.clear(question_id))
    }

    pub fn current_question(&self) -> Option<&QuestionModel> {
        self.navigation.current_question(&self.definition)
    }

    pub fn current_index(&self) -> usize {
        self.navigation.current()
    }

    pub fn next(&mut self) -> Result<usize, SessionError> {
        self.answers_mut()?;
        Ok(self.navigation.next())
    }

    pub fn previous(&mut self) -> Result<usize, SessionError> {
        self.answers_mut()?;
        Ok(self.navigation.previous())
    }

    pub fn go_to(&mut self, index: usize) -> Result<usize, SessionError> {
        self.answers_mut()?;
        Ok(self.navigation.go_to(index))
    }

    pub fn progress(&self) -> Progress {
        match &self.state {
            SessionState::InProgress { answers, .. } | SessionState::Failed { answers, .. } => {
                self.navigation.progress(answers)
            }
            SessionState::Submitting { answered, .. } | SessionState::Completed { answered, .. } => {
                Progress { answered: *answered, total: self.navigation.total() }
            }
            SessionState::NotStarted => Progress { answered: 0, total: self.navigation.total() },
        }
    }

    pub fn summary(&self) -> Result<SubmitSummary, SessionError> {
        let answers = self.answers().ok_or(SessionError::NotAcceptingAnswers(self.phase()))?;
        let unanswered_required = self
            .definition
            .questions
            .iter()
            .filter(|question| question.required && !answers.is_answered(&question.id))
            .map(|question| question.id.clone())
            .collect();
        Ok(SubmitSummary {
            answered: answers.answered_count(),
            total: self.definition.questions.len(),
            unanswered_required,
        })
    }

    /// Cancels the countdown and drops everything scoped to the attempt.
    pub fn teardown(self) -> SessionPhase {
        let phase = self.phase();
        if let SessionState::InProgress { timer, .. } = &self.state {
            timer.cancel();
        }
        tracing::info!(exam_id = %self.definition.id, phase = phase.as_str(), "session torn down");
        phase
    }

    fn answers_mut(&mut self) -> Result<&mut AnswerStore, SessionError> {
        match &mut self.state {
            SessionState::InProgress { answers, .. } | SessionState::Failed { answers, .. } => {
                Ok(answers)
            }
            other => Err(SessionError::NotAcceptingAnswers(other.phase())),
        }
    }

    fn transition(&mut self, from: SessionPhase, next: SessionState) {
        let to = next.phase();
        self.state = next;
        metrics::counter!(SESSION_TRANSITIONS, "from" => from.as_str(), "to" => to.as_str())
            .increment(1);
        tracing::info!(
            exam_id = %self.definition.id,
            from = from.as_str(),
            to = to.as_str(),
            "session transition"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{self, FakeGateway};

    fn controller(gateway: &Arc<FakeGateway>) -> ExamSessionController {
        ExamSessionController::new(
            gateway.clone(),
            test_support::three_question_definition(),
            SessionSettings::default(),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn manual_submit_walks_the_full_lifecycle() {
        let gateway = Arc::new(FakeGateway::new(test_support::three_question_definition()));
        let mut session = controller(&gateway);
        assert_eq!(session.phase(), SessionPhase::NotStarted);

        session.start().await.expect("start");
        assert_eq!(session.phase(), SessionPhase::InProgress);
        let remaining = session.remaining().expect("countdown");
        assert!(remaining <= Duration::from_secs(3600) && remaining > Duration::from_secs(3590));

        session.update_answer(&WireId::Int(1), &AnswerPatch::select(11)).expect("choice");
        session.update_answer(&WireId::Int(2), &AnswerPatch::text("Avogadro")).expect("text");
        session.update_answer(&WireId::Int(3), &AnswerPatch::numeric(4)).expect("scale");
        assert_eq!(session.progress(), Progress { answered: 3, total: 3 });

        let outcome = session.submit(SubmitTrigger::Manual).await.expect("submit");
        assert!(matches!(outcome, SubmitOutcome::Completed(_)));
        assert_eq!(session.phase(), SessionPhase::Completed);
        assert_eq!(session.progress(), Progress { answered: 3, total: 3 });
        assert!(session.remaining().is_none());
        let ack = session.acknowledgement().expect("acknowledgement");
        assert_eq!(ack.submission_id, Some(WireId::Int(900)));

        let submissions = gateway.submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].len(), 3);
        assert_eq!(gateway.submit_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expiry_submits_empty_answers_automatically() {
        let gateway = Arc::new(FakeGateway::new(test_support::three_question_definition()));
        let mut session = controller(&gateway);
        let mut events = session.take_timer_events().expect("events");
        session.start().await.expect("start");

        let started = tokio::time::Instant::now();
        loop {
            let event = events.recv().await.expect("timer event");
            if let EventOutcome::Submitted(outcome) =
                session.handle_event(event).await.expect("event")
            {
                assert!(matches!(outcome, SubmitOutcome::Completed(_)));
                break;
            }
        }

        assert!(started.elapsed() >= Duration::from_secs(3590));
        assert_eq!(session.phase(), SessionPhase::Completed);
        assert_eq!(gateway.submissions(), vec![Vec::new()]);
    }

    #[tokio::test(start_paused = true)]
    async fn second_trigger_never_submits_twice() {
        let gateway = Arc::new(FakeGateway::new(test_support::three_question_definition()));
        let mut session = controller(&gateway);
        session.start().await.expect("start");
        let timer = match &session.state {
            SessionState::InProgress { timer, .. } => timer.id(),
            _ => unreachable!("session just started"),
        };

        session.submit(SubmitTrigger::Manual).await.expect("first submit");
        let again = session.submit(SubmitTrigger::Manual).await.expect("second submit");
        assert_eq!(again, SubmitOutcome::Ignored { phase: SessionPhase::Completed });

        let late = session.handle_event(TimerEvent::Expired { timer }).await.expect("late expiry");
        assert_eq!(late, EventOutcome::Stale);
        let direct = session.submit(SubmitTrigger::Expiry).await.expect("expiry trigger");
        assert_eq!(direct, SubmitOutcome::Ignored { phase: SessionPhase::Completed });

        assert_eq!(gateway.submit_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn start_rejected_by_time_window_stays_not_started() {
        let gateway = Arc::new(FakeGateway::new(test_support::three_question_definition()));
        gateway.fail_next_start(GatewayError::TimeWindow("Exam has already ended".to_string()));
        let mut session = controller(&gateway);

        let err = session.start().await.unwrap_err();
        assert_eq!(err.to_string(), "Exam has already ended");
        assert_eq!(session.phase(), SessionPhase::NotStarted);
        assert!(session.remaining().is_none());
        assert!(session.attempt().is_none());

        session.start().await.expect("retry start inside the window");
        assert_eq!(session.phase(), SessionPhase::InProgress);
    }

    #[tokio::test(start_paused = true)]
    async fn start_twice_is_illegal() {
        let gateway = Arc::new(FakeGateway::new(test_support::three_question_definition()));
        let mut session = controller(&gateway);
        session.start().await.expect("start");
        let err = session.start().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::IllegalTransition { action: "start", phase: SessionPhase::InProgress }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_submit_keeps_answers_and_allows_manual_retry() {
        let gateway = Arc::new(FakeGateway::new(test_support::three_question_definition()));
        gateway.fail_next_submit(GatewayError::Transient("502 Bad Gateway".to_string()));
        let mut session = controller(&gateway);
        session.start().await.expect("start");
        session.update_answer(&WireId::Int(2), &AnswerPatch::text("draft")).expect("text");

        let err = session.submit(SubmitTrigger::Manual).await.unwrap_err();
        assert!(matches!(err, SessionError::Gateway(GatewayError::Transient(_))));
        assert_eq!(session.phase(), SessionPhase::Failed);
        assert!(session.phase().is_terminal());
        assert!(session.last_error().is_some());
        assert!(session.answers().expect("answers kept").is_answered(&WireId::Int(2)));

        let ignored = session.submit(SubmitTrigger::Expiry).await.expect("expiry in failed");
        assert_eq!(ignored, SubmitOutcome::Ignored { phase: SessionPhase::Failed });

        session.update_answer(&WireId::Int(2), &AnswerPatch::text("final")).expect("edit");
        let outcome = session.submit(SubmitTrigger::Manual).await.expect("retry");
        assert!(matches!(outcome, SubmitOutcome::Completed(_)));
        assert!(session.phase().is_terminal());
        assert_eq!(gateway.submit_calls(), 2);
        let last = gateway.submissions().pop().expect("second submission");
        assert_eq!(last[0].text_answer.as_deref(), Some("final"));
    }

    #[tokio::test(start_paused = true)]
    async fn answers_rejected_outside_active_states() {
        let gateway = Arc::new(FakeGateway::new(test_support::three_question_definition()));
        let mut session = controller(&gateway);

        let err = session.update_answer(&WireId::Int(2), &AnswerPatch::text("early")).unwrap_err();
        assert!(matches!(err, SessionError::NotAcceptingAnswers(SessionPhase::NotStarted)));
        assert!(session.next().is_err());

        session.start().await.expect("start");
        session.submit(SubmitTrigger::Manual).await.expect("submit");
        let err = session.clear_answer(&WireId::Int(2)).unwrap_err();
        assert!(matches!(err, SessionError::NotAcceptingAnswers(SessionPhase::Completed)));
        assert!(session.summary().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_answer_surfaces_validation_error() {
        let gateway = Arc::new(FakeGateway::new(test_support::three_question_definition()));
        let mut session = controller(&gateway);
        session.start().await.expect("start");

        let err = session.update_answer(&WireId::Int(3), &AnswerPatch::numeric(6)).unwrap_err();
        assert!(matches!(err, SessionError::Answer(AnswerError::ScaleOutOfRange { .. })));
        assert_eq!(session.progress().answered, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn summary_lists_required_questions_still_open() {
        let gateway = Arc::new(FakeGateway::new(test_support::three_question_definition()));
        let mut session = controller(&gateway);
        session.start().await.expect("start");
        session.update_answer(&WireId::Int(2), &AnswerPatch::text("done")).expect("text");

        let summary = session.summary().expect("summary");
        assert_eq!(summary.answered, 1);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.unanswered_required, vec![WireId::Int(1)]);

        assert_eq!(session.next().expect("next"), 1);
        assert_eq!(session.go_to(7).expect("out of range"), 1);
        assert_eq!(session.current_index(), 1);
        assert_eq!(session.previous().expect("previous"), 0);
        assert_eq!(session.current_question().map(|q| q.id.clone()), Some(WireId::Int(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn server_expiry_shortens_the_countdown() {
        let gateway = Arc::new(FakeGateway::new(test_support::three_question_definition()));
        gateway.set_expires_at(now_utc() + time::Duration::minutes(5));
        let mut session = controller(&gateway);
        session.start().await.expect("start");

        let remaining = session.remaining().expect("countdown");
        assert!(remaining <= Duration::from_secs(300));
        let attempt = session.attempt().expect("attempt");
        assert!(attempt.deadline < attempt.started_at + time::Duration::minutes(60));
    }

    #[tokio::test(start_paused = true)]
    async fn low_time_warning_reaches_the_controller() {
        let gateway = Arc::new(FakeGateway::new(test_support::three_question_definition()));
        gateway.set_expires_at(now_utc() + time::Duration::seconds(30));
        let mut session = controller(&gateway);
        let mut events = session.take_timer_events().expect("events");
        session.start().await.expect("start");

        let first = events.recv().await.expect("warning");
        let outcome = session.handle_event(first).await.expect("event");
        assert!(matches!(outcome, EventOutcome::LowTime(_)));
        assert_eq!(session.phase(), SessionPhase::InProgress);
    }

    #[tokio::test(start_paused = true)]
    async fn teardown_cancels_the_countdown() {
        let gateway = Arc::new(FakeGateway::new(test_support::three_question_definition()));
        let mut session = controller(&gateway);
        let mut events = session.take_timer_events().expect("events");
        session.start().await.expect("start");

        assert_eq!(session.teardown(), SessionPhase::InProgress);
        tokio::time::sleep(Duration::from_secs(7200)).await;
        assert!(events.try_recv().is_err());
        assert_eq!(gateway.submit_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn load_fetches_definition_through_gateway() {
        let gateway = Arc::new(FakeGateway::new(test_support::three_question_definition()));
        let session =
            ExamSessionController::load(gateway.clone(), &WireId::Int(42), SessionSettings::default())
                .await
                .expect("load");
        assert_eq!(session.definition().questions.len(), 3);
        assert_eq!(session.phase(), SessionPhase::NotStarted);
        assert_eq!(gateway.fetch_calls(), 1);
    }
}
