use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use colored::*;
use fetch_sync::{
    logging, FetchRequest, FetchResponse, FetchSync, HttpFetcher, InitConfig, MemoryHost, SyncCall,
    WsHost,
};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "fetch-sync")]
#[command(
    about = "Durable background requests: register a request with a background context and collect its result",
    version
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Also write logs to a daily rolling file in this directory
    #[arg(long, value_name = "DIR", global = true)]
    log_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a request through an in-process background context
    Demo {
        url: String,

        /// Register as a named sync
        #[arg(short, long)]
        name: Option<String>,
    },

    /// Run a request through a background daemon reachable over WebSocket
    Run {
        url: String,

        #[arg(short, long)]
        name: Option<String>,

        /// Configuration file (.toml or .json)
        #[arg(short, long, default_value = "fetch-sync.toml")]
        config: PathBuf,
    },

    /// Validate a configuration file
    CheckConfig {
        #[arg(default_value = "fetch-sync.toml")]
        path: PathBuf,
    },
}

fn sync_call(url: String, name: Option<String>) -> SyncCall {
    let request = FetchRequest::get(url);
    match name {
        Some(name) => SyncCall::named(name, request),
        None => SyncCall::anonymous(request),
    }
}

fn print_response(response: &FetchResponse) {
    let status = format!("{} {}", response.status, response.status_text);
    let status = if response.ok() {
        status.green()
    } else {
        status.red()
    };
    println!("{} {}", status.bold(), response.url.bright_blue());
    println!("{}", "─".repeat(80).bright_black());
    println!("{}", response.body);
}

async fn run(client: &FetchSync, call: SyncCall) -> Result<()> {
    let name = call.name.clone();
    let response = client.call(call).await?;
    print_response(&response);

    if let Some(name) = name {
        let names = client.list().await?;
        println!(
            "\n{} Named syncs: {}",
            "↔".bright_blue(),
            names.join(", ").bright_yellow()
        );
        if let Some(sync) = client.get(&name).await? {
            println!("  {} {} ({:?})", "✓".green(), name.bright_white(), sync.status());
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let _log_guard = logging::init(cli.verbose, cli.log_dir.as_deref())?;

    match cli.command {
        Commands::Demo { url, name } => {
            println!("{}", "🚀 Starting in-process background context...".cyan().bold());
            let (host, worker) = MemoryHost::new();
            tokio::spawn(worker.serve(Arc::new(HttpFetcher::new())));

            let client = FetchSync::new(Arc::new(host));
            client.initialize(InitConfig::new("memory://demo"))?.await?;
            run(&client, sync_call(url, name)).await?;
        }

        Commands::Run { url, name, config } => {
            let config = InitConfig::from_file(&config)
                .with_context(|| format!("loading {}", config.display()))?
                .apply_env()?;
            println!(
                "{}",
                format!("🌐 Connecting to {}...", config.worker_url).cyan().bold()
            );

            let client = FetchSync::new(Arc::new(WsHost::new()));
            client.initialize(config)?.await?;
            run(&client, sync_call(url, name)).await?;
        }

        Commands::CheckConfig { path } => {
            let config = InitConfig::from_file(&path)?.apply_env()?;
            config.validate()?;
            println!("{} {} is valid", "✓".green(), path.display());
            println!("  worker_url: {}", config.worker_url.bright_white());
            println!("  handshake timeout: {}ms", config.handshake_timeout_ms);
            if let Some(scope) = &config.worker_options.scope {
                println!("  scope: {}", scope);
            }
        }
    }

    Ok(())
}
