use console::style;
use std::path::Path;
use uuid::Uuid;

use reflex_config::ReflexConfig;
use reflex_core::{RecordedTrajectory, ReflexError};

use super::accelerator;

pub(super) async fn cmd_learn(config: &ReflexConfig, file: &Path, session: Option<Uuid>) -> reflex_core::Result<()> {
    let raw = std::fs::read_to_string(file)?;
    let trajectory: RecordedTrajectory = serde_json::from_str(&raw)
        .map_err(|e| ReflexError::Config(format!("{} is not a recorded trajectory: {e}", file.display())))?;

    let learned = accelerator(config)?
        .learn(&trajectory, session.unwrap_or_else(Uuid::new_v4))
        .await?;
    println!("Saved trajectory {}", style(&learned.trajectory_id).dim());

    match (&learned.skill, &learned.synthesis) {
        (Some(skill), _) => {
            println!(
                "{} learned {} v{} for {}",
                style("ok").green(),
                style(skill.signature()).cyan(),
                skill.version,
                skill.domain
            );
        }
        (None, Some(result)) => {
            if let Some(err) = result.rejection() {
                println!("{} {err}", style("rejected").red());
            }
        }
        (None, None) => println!("Trajectory failed; nothing to learn."),
    }
    Ok(())
}
