use super::engine;
use anyhow::Result;
use sentinel_core::ConfigLoader;

/// Stops `user`'s ACTIVE session. With no engine process holding a
/// monitor, the supervisor closes the session's rows directly at their
/// last persisted marks.
pub async fn execute(config_path: &str, user: &str, reason: &str) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)?;
    let supervisor = engine::build_supervisor(&config).await?;

    let report = supervisor.stop_session(user, reason).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
