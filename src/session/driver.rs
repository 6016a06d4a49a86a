use std::future::Future;

use tokio::sync::{mpsc, watch};

use crate::session::answers::AnswerPatch;
use crate::session::controller::{
    EventOutcome, ExamSessionController, SessionError, SessionPhase, SubmitTrigger,
};
use crate::session::model::QuestionId;
use crate::session::timer::TimerEvent;

#[derive(Debug, Clone)]
pub enum SessionCommand {
    Answer { question_id: QuestionId, patch: AnswerPatch },
    Clear(QuestionId),
    Next,
    Previous,
    GoTo(usize),
    Submit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Completed,
    CommandsClosed,
    Shutdown,
}

enum Work {
    Event(TimerEvent),
    Command(SessionCommand),
}

/// Single thread of control for one attempt: user commands and timer events
/// are applied to the controller one at a time.
#[derive(Debug)]
pub struct SessionDriver {
    controller: ExamSessionController,
    events: mpsc::UnboundedReceiver<TimerEvent>,
    commands: mpsc::Receiver<SessionCommand>,
    phase_tx: watch::Sender<SessionPhase>,
}

impl SessionDriver {
    /// Returns `None` when the controller's timer events were already taken.
    pub fn new(
        mut controller: ExamSessionController,
        commands: mpsc::Receiver<SessionCommand>,
    ) -> Option<Self> {
        let events = controller.take_timer_events()?;
        let (phase_tx, _) = watch::channel(controller.phase());
        Some(Self { controller, events, commands, phase_tx })
    }

    /// Phase after every applied command or event.
    pub fn subscribe(&self) -> watch::Receiver<SessionPhase> {
        self.phase_tx.subscribe()
    }

    pub async fn run<S>(mut self, shutdown: S) -> (StopReason, SessionPhase)
    where
        S: Future,
    {
        tokio::pin!(shutdown);

        let reason = loop {
            let work = tokio::select! {
                biased;
                _ = &mut shutdown => break StopReason::Shutdown,
                Some(event) = self.events.recv() => Work::Event(event),
                command = self.commands.recv() => match command {
                    Some(command) => Work::Command(command),
                    None => break StopReason::CommandsClosed,
                },
            };

            // A backend call in flight is dropped when shutdown wins.
            let interrupted = tokio::select! {
                biased;
                _ = &mut shutdown => true,
                _ = self.apply(work) => false,
            };
            if interrupted {
                break StopReason::Shutdown;
            }

            let phase = self.controller.phase();
            self.phase_tx.send_replace(phase);
            if phase == SessionPhase::Completed {
                break StopReason::Completed;
            }
        };

        tracing::info!(?reason, "session driver stopping");
        let phase = self.controller.teardown();
        self.phase_tx.send_replace(phase);
        (reason, phase)
    }

    async fn apply(&mut self, work: Work) {
        match work {
            Work::Event(event) => self.apply_event(event).await,
            Work::Command(command) => self.apply_command(command).await,
        }
    }

    async fn apply_event(&mut self, event: TimerEvent) {
        match self.controller.handle_event(event).await {
            Ok(EventOutcome::LowTime(remaining)) => {
                tracing::warn!(
                    remaining = %crate::core::time::format_remaining(remaining),
                    "less time left than the warning threshold"
                );
            }
            Ok(EventOutcome::Submitted(outcome)) => {
                tracing::info!(?outcome, "countdown expiry handled");
            }
            Ok(EventOutcome::Stale) => {}
            Err(err) => report("timer expiry", &err),
        }
    }

    async fn apply_command(&mut self, command: SessionCommand) {
        let result = match command {
            SessionCommand::Answer { question_id, patch } => {
                self.controller.update_answer(&question_id, &patch)
            }
            SessionCommand::Clear(question_id) => {
                self.controller.clear_answer(&question_id).map(|_| ())
            }
            SessionCommand::Next => self.controller.next().map(|_| ()),
            SessionCommand::Previous => self.controller.previous().map(|_| ()),
            SessionCommand::GoTo(index) => self.controller.go_to(index).map(|_| ()),
            SessionCommand::Submit => {
                self.controller.submit(SubmitTrigger::Manual).await.map(|outcome| {
                    tracing::info!(?outcome, "manual submit handled");
                })
            }
        };

        if let Err(err) = result {
            report("command", &err);
        }
    }
}

fn report(source: &'static str, err: &SessionError) {
    match err {
        SessionError::Answer(_) | SessionError::NotAcceptingAnswers(_) => {
            tracing::warn!(source, error = %err, "rejected")
        }
        _ => tracing::error!(source, error = %err, "session operation failed"),
    }
}
