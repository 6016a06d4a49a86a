#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = picrete_exam_session::run().await {
        eprintln!("picrete-exam-session fatal: {e:#}");
        std::process::exit(1);
    }
    Ok(())
}
