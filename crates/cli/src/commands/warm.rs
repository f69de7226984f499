//! `pathwise warm`: pre-populate the cache.

use super::runtime;
use pathwise_agent::WarmKind;

pub async fn run(kind: WarmKind, offline: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = runtime::load_config()?;
    let orchestrator = runtime::build_orchestrator(&config, offline)?;

    println!("Warming cache ({kind})...");
    let report = orchestrator.warm(kind).await;
    for item in &report.items {
        let mark = if item.ok { "ok  " } else { "skip" };
        println!("  [{mark}] {}: {}", item.item, item.detail);
    }

    let stats = orchestrator.cache().stats().await;
    println!();
    println!("  Warmed:   {}/{}", report.warmed_count, report.items.len());
    println!("  Writes:   {}", stats.writes);
    println!("  Keys:     {}", stats.tracked_keys);
    for (query, count) in orchestrator.cache().popular(5).await {
        println!("  Popular:  {query} ({count})");
    }
    Ok(())
}
