use console::style;

use reflex_config::ReflexConfig;
use reflex_core::ReflexError;

use super::{confidence_label, open_store};

pub(super) fn cmd_skills(config: &ReflexConfig, domain: Option<&str>, all: bool, json: bool) -> reflex_core::Result<()> {
    let store = open_store(config)?;
    let skills = store.list_skills(domain, all)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&skills)?);
        return Ok(());
    }
    if skills.is_empty() {
        println!("No skills learned yet.");
        println!("  Feed one with: reflex learn <trajectory.json>");
        return Ok(());
    }

    println!("{}\n", style(format!("Skills ({}):", skills.len())).bold());
    let mut current_domain = "";
    for s in &skills {
        if s.domain != current_domain {
            current_domain = &s.domain;
            println!("  {}", style(current_domain).underlined());
        }
        println!(
            "    {} v{}  confidence {}  ({} ok / {} failed)",
            style(s.signature()).cyan(),
            s.version,
            confidence_label(&store, s.confidence),
            s.success_count,
            s.failure_count,
        );
        println!("      {}", s.description);
        println!("      {}", style(&s.id).dim());
    }
    Ok(())
}

pub(super) fn cmd_skill(config: &ReflexConfig, id: &str, json: bool) -> reflex_core::Result<()> {
    let store = open_store(config)?;
    let skill = store
        .get_skill_by_id(id)?
        .ok_or_else(|| ReflexError::SkillNotFound(id.to_string()))?;
    let revisions = store.skill_revisions(&skill.domain, &skill.name)?;
    let outcomes = store.skill_outcomes(id, 10)?;

    if json {
        let doc = serde_json::json!({
            "skill": skill,
            "revisions": revisions.iter().map(|r| serde_json::json!({"id": r.id, "version": r.version})).collect::<Vec<_>>(),
            "outcomes": outcomes,
        });
        println!("{}", serde_json::to_string_pretty(&doc)?);
        return Ok(());
    }

    println!("{} v{}", style(skill.signature()).bold(), skill.version);
    println!("  {}", skill.description);
    println!("  Domain:     {}", skill.domain);
    println!("  Confidence: {}", confidence_label(&store, skill.confidence));
    println!("  Replays:    {} ok / {} failed", skill.success_count, skill.failure_count);
    if let Some(ref source) = skill.source_trajectory_id {
        println!("  Learned from trajectory {source}");
    }
    if let Some(ref newer) = skill.superseded_by {
        println!("  {} superseded by {newer}", style("!").yellow());
    }
    if revisions.len() > 1 {
        let versions: Vec<String> = revisions.iter().map(|r| format!("v{}", r.version)).collect();
        println!("  Revisions:  {}", versions.join(", "));
    }

    println!("\n  {}", style("Script:").bold());
    let code = serde_json::from_str::<serde_json::Value>(&skill.code)
        .and_then(|v| serde_json::to_string_pretty(&v))
        .unwrap_or_else(|_| skill.code.clone());
    for line in code.lines() {
        println!("    {line}");
    }

    if !outcomes.is_empty() {
        println!("\n  {}", style("Recent replays:").bold());
        for o in &outcomes {
            let mark = if o.success { style("ok").green() } else { style("failed").red() };
            println!(
                "    {}  {:<6}  {:.2} -> {:.2}",
                o.created_at.format("%Y-%m-%d %H:%M:%S"),
                mark,
                o.confidence_before,
                o.confidence_after
            );
        }
    }
    Ok(())
}

pub(super) fn cmd_outcome(config: &ReflexConfig, skill_id: &str, success: bool) -> reflex_core::Result<()> {
    let store = open_store(config)?;
    let update = store.update_skill_confidence(skill_id, success)?;
    println!(
        "{} {}: confidence {:.2} -> {}",
        if success { style("ok").green() } else { style("failed").red() },
        update.skill.name,
        update.before,
        confidence_label(&store, update.skill.confidence)
    );
    if update.newly_pruned {
        println!(
            "  {} pruned: the router will no longer offer this skill",
            style("!").yellow()
        );
    }
    Ok(())
}
