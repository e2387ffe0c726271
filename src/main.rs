use std::sync::Arc;

use agentq::bot::Bot;
use agentq::channels::{ChannelManager, CliChannel, TelegramChannel};
use agentq::config::{Config, TelegramConfig};
use agentq::executor::{CommandExecutor, Executor};
use agentq::registry::Registry;
use agentq::workspace::Workspace;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = Config::from_env()?;

    eprintln!("🤖 agentq v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Workspace: {}", config.workspace_dir.display());
    eprintln!("   Executor: {}", config.executor_cmd.join(" "));
    eprintln!("   Exec timeout: {}s", config.exec_timeout.as_secs());
    match config.worker_idle_timeout {
        Some(idle) => eprintln!("   Worker idle exit: {}s", idle.as_secs()),
        None => eprintln!("   Worker idle exit: never"),
    }

    let workspace = Arc::new(Workspace::new(config.workspace_dir.clone()));
    workspace.ensure_root().await?;

    let executor: Arc<dyn Executor> = Arc::new(CommandExecutor::new(config.executor_cmd.clone()));

    // ── Startup initialization ──────────────────────────────────────
    run_startup_init(&workspace, executor.as_ref(), &config).await;

    // ── Channels ────────────────────────────────────────────────────
    let mut channels = ChannelManager::new();
    let mut active_channels = vec!["cli"];

    // Always add CLI
    channels.add(Box::new(CliChannel::new()));

    // Conditionally add Telegram if bot token is set
    if let Some(telegram_config) = TelegramConfig::from_env() {
        let allowed = &telegram_config.allowed_users;
        eprintln!(
            "   Telegram: enabled (allowed: {})",
            if allowed.iter().any(|u| u == "*") {
                "everyone".to_string()
            } else {
                allowed.join(", ")
            }
        );
        channels.add(Box::new(TelegramChannel::new(telegram_config)));
        active_channels.push("telegram");
    }

    eprintln!("   Channels: {}", active_channels.join(", "));
    eprintln!("   Type a message and press Enter. /quit to exit.\n");

    // ── Registry + bot ──────────────────────────────────────────────
    let (report_tx, report_rx) = tokio::sync::mpsc::unbounded_channel();
    let registry = Registry::new(Arc::clone(&workspace), executor, &config, report_tx);

    let bot = Bot::new(config, registry, workspace, channels);
    bot.run(report_rx).await?;

    Ok(())
}

/// Run the one-shot initialization prompt against the workspace root if
/// an INIT.md file is present there. Failures are logged, never fatal.
async fn run_startup_init(workspace: &Workspace, executor: &dyn Executor, config: &Config) {
    let init_file = workspace.root().join("INIT.md");
    if !tokio::fs::try_exists(&init_file).await.unwrap_or(false) {
        tracing::info!(
            "No initialization file found at {}. Skipping initialization.",
            init_file.display()
        );
        return;
    }

    tracing::info!("Initializing with {}...", init_file.display());
    let prompt = format!("Initialize according to @{}", init_file.display());
    match executor
        .execute(workspace.root(), &prompt, config.exec_timeout)
        .await
    {
        Ok(output) if output.success() => {
            tracing::info!("Initialization successful.");
            if !output.stdout.is_empty() {
                tracing::info!("Initialization output: {}", output.stdout.trim_end());
            }
        }
        Ok(output) => {
            tracing::error!("Initialization failed with exit code {}", output.exit_code);
            if !output.stderr.is_empty() {
                tracing::error!("Initialization error: {}", output.stderr.trim_end());
            }
        }
        Err(e) => {
            tracing::error!("Error during initialization: {e}");
        }
    }
}
