use super::engine;
use anyhow::Result;
use sentinel_core::{ConfigLoader, SessionMode};
use tracing::info;

/// Starts a session for `user` and monitors it until interrupted.
pub async fn execute(config_path: &str, user: &str, mode: &str) -> Result<()> {
    let mode: SessionMode = mode.parse().map_err(anyhow::Error::msg)?;
    let config = ConfigLoader::load_from(config_path)?;
    let supervisor = engine::build_supervisor(&config).await?;

    let report = supervisor.start_session(user, mode).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    info!(
        session_id = %report.session_id,
        positions_opened = report.positions_opened,
        "monitoring, ctrl-c to detach"
    );

    engine::shutdown_signal().await;
    supervisor.shutdown_all().await;
    info!("session stays ACTIVE in the store; `sentinel run` resumes it");
    Ok(())
}
