//! Aura command implementations

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use aura_config::{self, Config, OracleKind};
use aura_foreman::{
    register_default_apprentices, CapabilityRegistry, Foreman, ForemanPolicy, LlmOracle, Oracle,
    SessionReport, SessionStatus, StepRecord,
};
use aura_provider::{OllamaProvider, OpenRouterProvider};
use aura_session::SessionArchive;

const RULE: &str = "━━━━━━━━━━━━━━━━━━━━━━━━━━━";

/// Flags of `aura run`
pub struct RunOptions {
    pub goal: String,
    pub max_steps: Option<usize>,
    pub retries: Option<u32>,
    pub archive: bool,
    pub json: bool,
}

fn build_registry(config: &Config) -> Result<Arc<CapabilityRegistry>> {
    let mut registry = CapabilityRegistry::new();
    register_default_apprentices(&mut registry, config)
        .context("Failed to register apprentices")?;
    Ok(Arc::new(registry))
}

fn build_oracle(config: &Config, registry: &CapabilityRegistry) -> Result<Arc<dyn Oracle>> {
    let oracle: Arc<dyn Oracle> = match config.oracle.provider {
        OracleKind::OpenRouter => {
            let api_key = config
                .api_key()
                .context("No API key configured. Set one in ~/.aura/config.json or AURA_API_KEY")?;
            let provider =
                OpenRouterProvider::new(api_key, config.api_base(), Some(config.model()));
            Arc::new(
                LlmOracle::new(provider, registry)
                    .with_model(config.model())
                    .with_max_tokens(config.oracle.max_tokens)
                    .with_temperature(config.oracle.temperature)
                    .with_native_tools(registry, true),
            )
        }
        OracleKind::Ollama => {
            let provider = OllamaProvider::new(config.api_base(), Some(config.model()));
            Arc::new(
                LlmOracle::new(provider, registry)
                    .with_model(config.model())
                    .with_max_tokens(config.oracle.max_tokens)
                    .with_temperature(config.oracle.temperature),
            )
        }
    };
    Ok(oracle)
}

/// Run one goal; `Ok(false)` means the session aborted
pub async fn run_command(options: RunOptions) -> Result<bool> {
    let config = Config::load().await?;

    let mut policy = ForemanPolicy::from(&config.foreman);
    if let Some(max_steps) = options.max_steps {
        policy = policy.with_max_steps(max_steps);
    }
    if let Some(retries) = options.retries {
        policy = policy.with_max_reasoning_retries(retries);
    }

    tokio::fs::create_dir_all(config.workspace_path())
        .await
        .context("Failed to create workspace")?;

    let registry = build_registry(&config)?;
    let oracle = build_oracle(&config, &registry)?;
    let foreman = Foreman::new(oracle, registry, policy);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("◆ INTERRUPT RECEIVED, STANDING DOWN");
            on_signal.cancel();
        }
    });

    let report = foreman.run_with_cancel(&options.goal, cancel).await;

    if options.archive {
        let archive = SessionArchive::open_default();
        match archive.save(&report).await {
            Ok(path) => info!("◆ Session archived to {}", path.display()),
            Err(e) => warn!("◆ Could not archive session {}: {}", report.id, e),
        }
    }

    if options.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(report.is_finished())
}

fn step_line(step: &StepRecord) -> String {
    let verdict = match step.outcome.error() {
        None => "ok".to_string(),
        Some(e) => format!("failed: {}", e.label()),
    };
    format!(
        "  {:>2}. {:<16} {:>6}ms  {}",
        step.index, step.action.capability, step.duration_ms, verdict
    )
}

fn print_report(report: &SessionReport) {
    match &report.status {
        SessionStatus::Finished { answer } => println!("\n◆ {}\n", answer),
        SessionStatus::Aborted { reason } => println!("\n{}\n", reason),
    }

    println!("◆ Session {}", report.id);
    println!("{}", RULE);
    if report.steps.is_empty() {
        println!("  (no steps)");
    }
    for step in &report.steps {
        println!("{}", step_line(step));
    }
    println!(
        "{} step(s), {} failed, {:.1}s",
        report.steps.len(),
        report.failed_steps(),
        report.duration().num_milliseconds() as f64 / 1000.0
    );
}

/// Initialize config and workspace
pub async fn init_command() -> Result<()> {
    println!("◆ Initializing Aura...");
    println!("{}", RULE);

    let config = aura_config::init().await?;
    tokio::fs::create_dir_all(aura_config::sessions_dir()).await?;

    println!("Config:    {}", aura_config::config_path().display());
    println!("Workspace: {}", config.workspace_path().display());

    println!("\n◆ Aura initialized");
    println!("\nNext steps:");
    println!("  1. Add your API key to ~/.aura/config.json (or set AURA_API_KEY)");
    println!("     Get one at: https://openrouter.ai/keys");
    println!("  2. Give it a goal: aura run \"summarize README.md\"");

    Ok(())
}

fn presence(ok: bool) -> &'static str {
    if ok {
        "[OK]"
    } else {
        "[Missing]"
    }
}

/// Show system status
pub async fn status_command() -> Result<()> {
    let config_path = aura_config::config_path();
    let config = Config::load().await?;
    let workspace = config.workspace_path();
    let sessions = aura_config::sessions_dir();

    println!("◆ Aura System Status");
    println!("{}", RULE);

    println!(
        "Config:    {} {}",
        config_path.display(),
        presence(config_path.exists())
    );
    println!(
        "Workspace: {} {}",
        workspace.display(),
        presence(workspace.exists())
    );
    println!(
        "Sessions:  {} {}",
        sessions.display(),
        presence(sessions.exists())
    );
    println!("Provider:  {}", config.oracle.provider);
    println!("Model:     {}", config.model());
    println!(
        "API Key:   {}",
        match (config.oracle.provider, config.api_key().is_some()) {
            (OracleKind::Ollama, _) => "[Not needed]",
            (_, true) => "[Set]",
            (_, false) => "[Missing]",
        }
    );
    println!(
        "Search:    {}",
        if config.brave_api_key().is_some() {
            "Brave"
        } else {
            "DuckDuckGo"
        }
    );

    let policy = &config.foreman;
    println!("\nPolicy:");
    println!("  Retries:            {}", policy.max_reasoning_retries);
    println!("  Max steps:          {}", policy.max_steps);
    println!("  Oracle timeout:     {}s", policy.oracle_timeout_secs);
    println!("  Apprentice timeout: {}s", policy.capability_timeout_secs);
    println!(
        "  History window:     {}",
        policy
            .history_window
            .map(|n| format!("last {} step(s)", n))
            .unwrap_or_else(|| "full".to_string())
    );

    println!(
        "\n◆ {}",
        if config.oracle_ready() {
            "Ready"
        } else {
            "Not ready: no API key"
        }
    );

    Ok(())
}

/// List the registered apprentices
pub async fn apprentices_command() -> Result<()> {
    let config = Config::load().await?;
    let registry = build_registry(&config)?;

    println!("◆ Apprentices ({})", registry.len());
    println!("{}", RULE);

    for descriptor in registry.list() {
        println!("{}", descriptor.signature());
        println!("    {}", descriptor.description);
        for param in &descriptor.params {
            println!(
                "    - {}{}: {}",
                param.name,
                if param.required { "" } else { " (optional)" },
                param.description
            );
        }
    }

    Ok(())
}

/// List archived sessions, newest first
pub async fn history_list_command(limit: usize) -> Result<()> {
    let archive = SessionArchive::open_default();
    let entries = archive.list().await?;

    if entries.is_empty() {
        println!("No archived sessions");
        return Ok(());
    }

    println!("◆ Sessions");
    println!("{}", RULE);
    for entry in entries.iter().take(limit) {
        println!(
            "  {} [{}] {} step(s)  {}",
            entry.id,
            if entry.finished { "done" } else { "aborted" },
            entry.steps,
            entry.goal
        );
    }
    if entries.len() > limit {
        println!("  ... {} more", entries.len() - limit);
    }

    Ok(())
}

/// Show one archived session
pub async fn history_show_command(id: String) -> Result<()> {
    let archive = SessionArchive::open_default();
    let report = archive
        .load(&id)
        .await
        .with_context(|| format!("Session {} not found", id))?;

    println!("◆ Goal: {}", report.goal);
    println!(
        "  Started {}",
        report.started_at.format("%Y-%m-%d %H:%M:%S")
    );
    print_report(&report);

    for step in &report.steps {
        println!("\n## Step {} ({})", step.index, step.action.capability);
        println!("{}", step.observation);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aura_foreman::{Action, Outcome, StepError};
    use chrono::Local;
    use serde_json::json;

    fn record(index: usize, outcome: Outcome) -> StepRecord {
        StepRecord {
            index,
            action: Action::from_json("file_reader", json!({"filename": "a.txt"})),
            resolved: None,
            observation: outcome.observation(100),
            outcome,
            started_at: Local::now(),
            duration_ms: 12,
        }
    }

    #[test]
    fn test_step_line_marks_failures() {
        let ok = step_line(&record(1, Outcome::success(json!("hi"))));
        assert!(ok.contains("file_reader"));
        assert!(ok.ends_with("ok"));

        let failed = step_line(&record(
            2,
            Outcome::failure(StepError::UnknownCapability {
                name: "nope".to_string(),
            }),
        ));
        assert!(failed.contains("failed: "));
    }

    #[test]
    fn test_presence() {
        assert_eq!(presence(true), "[OK]");
        assert_eq!(presence(false), "[Missing]");
    }
}
