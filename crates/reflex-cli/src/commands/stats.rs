use console::style;

use reflex_config::ReflexConfig;
use reflex_core::ReflexError;

use super::open_store;

pub(super) fn cmd_stats(config: &ReflexConfig, json: bool) -> reflex_core::Result<()> {
    let store = open_store(config)?;
    let stats = store.get_stats()?;
    let skills = store.get_skill_stats()?;

    if json {
        let doc = serde_json::json!({ "store": stats, "skills": skills });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("{}", style("Knowledge store").bold());
    println!("  Database:      {}", config.store.db_path.display());
    println!(
        "  Trajectories:  {} ({} successful)",
        stats.trajectories, stats.successful_trajectories
    );
    println!("  Domains:       {}", stats.domains);
    println!();
    println!("{}", style("Skills").bold());
    println!(
        "  Total:         {} ({} active, {} pruned, {} superseded)",
        skills.total, skills.active, skills.pruned, skills.superseded
    );
    println!("  Reliable:      {}", skills.reliable);
    println!("  Avg confidence {:.2}", skills.average_confidence);
    match skills.success_rate() {
        Some(rate) => println!(
            "  Replays:       {} ok / {} failed ({:.0}%)",
            skills.total_successes,
            skills.total_failures,
            rate * 100.0
        ),
        None => println!("  Replays:       none yet"),
    }
    if !skills.by_domain.is_empty() {
        println!();
        for (domain, count) in &skills.by_domain {
            println!("  {domain:<32} {count}");
        }
    }
    Ok(())
}

pub(super) fn cmd_trajectories(config: &ReflexConfig, limit: usize, json: bool) -> reflex_core::Result<()> {
    let store = open_store(config)?;
    let trajectories = store.recent_trajectories(limit)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&trajectories)?);
        return Ok(());
    }
    if trajectories.is_empty() {
        println!("No trajectories recorded.");
        return Ok(());
    }

    for t in &trajectories {
        let mark = if t.success { style("ok").green() } else { style("failed").red() };
        println!(
            "  {}  {:<6}  {:<28}  {}  {}",
            t.created_at.format("%Y-%m-%d %H:%M:%S"),
            mark,
            t.domain.as_deref().unwrap_or("-"),
            t.task,
            style(format!("({} actions)", t.actions.len())).dim()
        );
    }
    Ok(())
}

pub(super) fn cmd_trajectory(config: &ReflexConfig, id: &str, json: bool) -> reflex_core::Result<()> {
    let store = open_store(config)?;
    let t = store
        .get_trajectory(id)?
        .ok_or_else(|| ReflexError::TrajectoryNotFound(id.to_string()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&t)?);
        return Ok(());
    }

    let mark = if t.success { style("ok").green() } else { style("failed").red() };
    println!("{} {}", style(&t.task).bold(), mark);
    println!("  Id:       {}", style(&t.id).dim());
    println!("  Session:  {}", t.session_id);
    println!("  URL:      {}", t.url);
    println!("  Recorded: {}", t.created_at.format("%Y-%m-%d %H:%M:%S"));
    if let Some(result) = &t.result {
        println!("  Result:   {result}");
    }
    println!();
    for (i, a) in t.actions.iter().enumerate() {
        let target = a.selector.as_deref().unwrap_or(a.url.as_str());
        match &a.value {
            Some(value) => println!("  {:>3}. {:<10} {target} = {value:?}", i + 1, a.action_type.to_string()),
            None => println!("  {:>3}. {:<10} {target}", i + 1, a.action_type.to_string()),
        }
    }
    Ok(())
}
