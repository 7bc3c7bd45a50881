//! Memvox CLI and webhook server entry point.
//!
//! Binary name: `memvox`
//!
//! Parses CLI arguments, loads environment configuration, then either
//! starts the webhook server, prints a configuration check, or emits
//! shell completions.

mod http;
mod state;

use clap::{Parser, Subcommand};
use clap_complete::generate;
use secrecy::SecretString;

use memvox_infra::config::MemvoxConfig;
use state::AppState;

#[derive(Parser)]
#[command(name = "memvox", version, about = "Cross-call memory middleware for voice agents")]
struct Cli {
    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Machine-readable output where applicable
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the webhook server
    Serve {
        #[arg(long, default_value = "0.0.0.0")]
        host: String,
        #[arg(long, default_value_t = 8000, env = "MEMVOX_PORT")]
        port: u16,
        /// Export spans via OpenTelemetry (stdout exporter)
        #[arg(long)]
        otel: bool,
    },

    /// Print the resolved configuration and collaborator endpoints
    Check,

    /// Generate shell completions
    Completions {
        #[arg(value_enum)]
        shell: clap_complete::Shell,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Shell completions don't need tracing or config
    if let Commands::Completions { shell } = &cli.command {
        let mut cmd = <Cli as clap::CommandFactory>::command();
        generate(*shell, &mut cmd, "memvox", &mut std::io::stdout());
        return Ok(());
    }

    let filter = match cli.verbose {
        0 if cli.quiet => "error",
        0 => "info",
        1 => "info,memvox=debug",
        _ => "trace",
    };
    let otel = matches!(cli.command, Commands::Serve { otel: true, .. });
    memvox_observe::tracing_setup::init_tracing(filter, otel)
        .map_err(|e| anyhow::anyhow!("failed to initialize tracing: {e}"))?;

    match cli.command {
        Commands::Serve { host, port, .. } => {
            let config = MemvoxConfig::from_env()?;
            let state = AppState::init(config)?;
            let shutdown_state = state.clone();

            let addr = format!("{host}:{port}");
            let listener = tokio::net::TcpListener::bind(&addr).await?;

            println!(
                "  {} Memvox listening on {}",
                console::style("⚡").bold(),
                console::style(format!("http://{addr}")).cyan()
            );
            println!("  {}", console::style("Press Ctrl+C to stop").dim());

            let router = http::router::build_router(state);

            axum::serve(listener, router)
                .with_graceful_shutdown(shutdown_signal())
                .await?;

            shutdown_state.orchestrator.shutdown();
            memvox_observe::tracing_setup::shutdown_tracing();
            println!("\n  Server stopped.");
        }

        Commands::Check => {
            let config = MemvoxConfig::from_env()?;
            print_check(&config, cli.json)?;
        }

        Commands::Completions { .. } => unreachable!("handled above"),
    }

    Ok(())
}

/// Print the resolved configuration, masking secrets.
fn print_check(config: &MemvoxConfig, json: bool) -> anyhow::Result<()> {
    let key_state = |key: &Option<SecretString>| if key.is_some() { "set" } else { "unset" };

    if json {
        let summary = serde_json::json!({
            "memory_api_url": config.memory_api_url,
            "memory_api_key": key_state(&config.memory_api_key),
            "platform_api_url": config.platform_api_url,
            "platform_api_key": key_state(&config.platform_api_key),
            "llm_model": config.llm_model,
            "llm_api_key": key_state(&config.llm_api_key),
            "memory": config.memory,
        });
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let check_mark = |ok: bool| {
        if ok {
            format!("{}", console::style("✓").green())
        } else {
            format!("{}", console::style("✗").red())
        }
    };

    println!();
    println!("  {} Memvox configuration", console::style("🔍").bold());
    println!();
    println!("  memory service   {}", config.memory_api_url);
    println!("  voice platform   {}", config.platform_api_url);
    println!("  llm model        {}", config.llm_model);
    println!(
        "  {} webhook secret configured",
        check_mark(!config.webhook_secret.is_empty())
    );
    println!(
        "  {} llm api key {}",
        check_mark(config.llm_api_key.is_some()),
        key_state(&config.llm_api_key)
    );
    println!();
    println!(
        "  similarity ≥ {:.2}   relevance ≥ {:.2}   high importance ≥ {}",
        config.memory.similarity_threshold,
        config.memory.relevance_threshold,
        config.memory.high_importance_threshold
    );
    println!();
    Ok(())
}

/// Wait for Ctrl+C or SIGTERM for graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
