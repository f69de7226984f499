//! `pathwise ask`: single-question or interactive mode.

use super::runtime;
use pathwise_agent::{OrchestrationResult, Orchestrator};
use pathwise_core::message::Message;
use pathwise_core::profile::UserProfile;
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};

pub struct AskOptions {
    pub message: Option<String>,
    pub profile: Option<PathBuf>,
    pub offline: bool,
    pub json: bool,
}

pub async fn run(options: AskOptions) -> Result<(), Box<dyn std::error::Error>> {
    let config = runtime::load_config()?;
    let profile = runtime::load_profile(options.profile.as_deref())?;
    let orchestrator = runtime::build_orchestrator(&config, options.offline)?;

    if let Some(message) = options.message {
        eprint!("  Searching...");
        let result = orchestrator.orchestrate_with_timeout(&message, &profile, &[]).await;
        eprint!("\r              \r");
        print_result(&result, options.json)?;
        return Ok(());
    }

    interactive(&orchestrator, &profile, options.json, config.orchestrator.history_window).await
}

async fn interactive(
    orchestrator: &Orchestrator,
    profile: &UserProfile,
    json: bool,
    history_window: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    println!();
    println!("  Pathwise: programs, pathways and careers");
    println!("  Tier:      {}", profile.tier());
    println!("  Ask a question and press Enter. Type 'exit' to quit.");
    println!();

    let mut history: Vec<Message> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    prompt()?;
    while let Some(line) = lines.next_line().await? {
        let query = line.trim();
        if query.is_empty() {
            prompt()?;
            continue;
        }
        if matches!(query, "exit" | "quit") {
            break;
        }

        eprint!("  ...");
        let result = orchestrator.orchestrate_with_timeout(query, profile, &history).await;
        eprint!("\r     \r");
        print_result(&result, json)?;
        println!();

        history.push(Message::user(query));
        history.push(Message::assistant(&result.response_text));
        // Keep enough turns for context extraction and no more
        let keep = history_window.max(2) * 2;
        if history.len() > keep {
            history.drain(..history.len() - keep);
        }

        prompt()?;
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}

fn prompt() -> std::io::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()
}

fn print_result(result: &OrchestrationResult, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        println!("{}", serde_json::to_string_pretty(result)?);
        return Ok(());
    }

    println!("{}", result.response_text);
    tracing::debug!(
        attempts = result.attempts,
        score = result.quality_score,
        cached = result.cached,
        tools = ?result.tools_used,
        "Answer details"
    );
    for error in &result.errors {
        tracing::warn!("{error}");
    }
    Ok(())
}
