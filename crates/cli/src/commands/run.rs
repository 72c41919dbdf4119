use super::engine;
use anyhow::Result;
use sentinel_core::ConfigLoader;
use tracing::info;

/// Boots the engine, recovers whatever the store says is still ACTIVE,
/// and monitors until interrupted. Detaching leaves the sessions ACTIVE
/// so the next run picks them up again.
pub async fn execute(config_path: &str) -> Result<()> {
    let config = ConfigLoader::load_from(config_path)?;
    let supervisor = engine::build_supervisor(&config).await?;

    let recovered = supervisor.recover_on_startup().await?;
    for session in &recovered {
        info!(
            session_id = %session.session_id,
            user_id = %session.user_id,
            positions = session.active_positions,
            "monitoring recovered session"
        );
    }
    info!(
        sessions = recovered.len(),
        "engine running, ctrl-c to detach"
    );

    engine::shutdown_signal().await;
    supervisor.shutdown_all().await;
    info!("sessions stay ACTIVE in the store; the next run resumes them");
    Ok(())
}
