//! `pathwise list`: every program of one tier.

use super::runtime;
use pathwise_agent::ListingKind;

pub async fn run(kind: ListingKind, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = runtime::load_config()?;
    let orchestrator = runtime::build_orchestrator(&config, true)?;
    let listing = orchestrator.list_programs(kind).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&listing)?);
        return Ok(());
    }

    match kind {
        ListingKind::College => {
            for program in &listing.aggregated.college_programs {
                let campuses: Vec<&str> = program.campuses.iter().map(String::as_str).collect();
                println!("  {:<8} {} ({})", program.code, program.family_name, campuses.join(", "));
            }
        }
        ListingKind::School => {
            for program in &listing.aggregated.school_programs {
                let institutions: Vec<&str> = program.institutions.iter().map(String::as_str).collect();
                println!("  {} ({})", program.name, institutions.join(", "));
            }
        }
    }
    println!();
    println!("  {} {kind} programs", listing.aggregated.program_count());
    Ok(())
}
