use super::engine;
use anyhow::Result;
use sentinel_core::ConfigLoader;

/// Prints `user`'s session status as JSON: the stored session with its
/// positions, or `{"state": "inactive"}` when nothing is ACTIVE.
pub async fn execute(config_path: &str, user: &str) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)?;
    let supervisor = engine::build_supervisor(&config).await?;

    let status = supervisor.get_status(user).await;
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
