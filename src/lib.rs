pub(crate) mod cli;
pub mod core;
pub mod schemas;
pub mod services;
pub mod session;

#[cfg(test)]
mod test_support;

use std::sync::Arc;

use anyhow::anyhow;
use tokio::sync::mpsc;

use crate::cli::CliArgs;
use crate::core::{config::Settings, telemetry};
use crate::services::gateway::{HttpSubmissionGateway, SubmissionGateway};
use crate::session::controller::{ExamSessionController, SessionPhase, SessionSettings};
use crate::session::driver::{SessionCommand, SessionDriver};

const COMMAND_BUFFER: usize = 64;

/// Runs one attempt from the command line: load, start, apply the scripted
/// answers, then submit (or wait for the countdown) and tear down.
pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let args = CliArgs::parse(std::env::args().skip(1))?;
    let settings = Settings::load()?;
    telemetry::init_tracing(&settings)?;
    core::metrics::init(&settings)?;

    let script = match &args.answers {
        Some(path) => cli::load_script(path)?,
        None => Vec::new(),
    };

    let gateway: Arc<dyn SubmissionGateway> =
        Arc::new(HttpSubmissionGateway::from_settings(&settings)?);
    let mut controller = ExamSessionController::load(
        gateway,
        &args.exam,
        SessionSettings::from_settings(&settings),
    )
    .await?;
    controller.start().await?;

    tracing::info!(
        exam_id = %args.exam,
        scripted_answers = script.len(),
        await_expiry = args.await_expiry,
        environment = %settings.runtime().environment.as_str(),
        "exam session running"
    );

    let (commands, rx) = mpsc::channel(COMMAND_BUFFER);
    let driver = SessionDriver::new(controller, rx)
        .ok_or_else(|| anyhow!("countdown events were already claimed"))?;
    let mut phases = driver.subscribe();
    let handle = tokio::spawn(driver.run(core::shutdown::shutdown_signal()));

    for (question_id, patch) in script {
        if commands.send(SessionCommand::Answer { question_id, patch }).await.is_err() {
            break;
        }
    }
    if !args.await_expiry {
        let _ = commands.send(SessionCommand::Submit).await;
    }

    // Ends on Completed, Failed, or when the driver stops on shutdown.
    let _ = phases
        .wait_for(|phase| phase.is_terminal())
        .await;
    drop(commands);

    let (reason, phase) = handle.await?;

    if let Some(rendered) = core::metrics::render() {
        println!("{rendered}");
    }

    match phase {
        SessionPhase::Completed => {
            tracing::info!(exam_id = %args.exam, "attempt submitted");
            Ok(())
        }
        phase => Err(anyhow!("attempt ended {phase} ({reason:?})")),
    }
}
