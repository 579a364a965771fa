use console::style;

use reflex_config::ReflexConfig;

use super::accelerator;

pub(super) async fn cmd_route(config: &ReflexConfig, task: &str, url: &str, json: bool) -> reflex_core::Result<()> {
    let decision = accelerator(config)?.route(task, url).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&decision)?);
        return Ok(());
    }

    match (&decision.skill, &decision.params) {
        (Some(skill), Some(params)) => {
            println!(
                "{} {} (score {:.2})",
                style("FAST").green().bold(),
                style(skill.signature()).cyan(),
                decision.confidence
            );
            for (name, value) in params {
                println!("  {name} = {value}");
            }
        }
        _ => {
            println!(
                "{} {} (score {:.2})",
                style("NORMAL").yellow().bold(),
                decision.reason,
                decision.confidence
            );
        }
    }
    if let Some(m) = decision.trajectory_match.as_ref().filter(|m| m.trajectory.is_some()) {
        let label = if m.matched { "matched" } else { "closest" };
        println!("  {label} trajectory: {:.2}", m.confidence);
    }
    Ok(())
}
