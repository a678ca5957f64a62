//! Signal Relay CLI
//!
//! Record, queue and deliver telemetry signals from the command line.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use signal_relay::{
    config::Config,
    providers::SessionTracker,
    transparency::TransparencyLog,
    FlushOutcome, Payload, PersistentSignalCache, SignalCache, SignalClient, SignalRequest,
    PRIVACY_DECLARATION, VERSION,
};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "signal-relay")]
#[command(author = "Synheart")]
#[command(version = VERSION)]
#[command(about = "Privacy-first telemetry signal relay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a configuration file
    Init {
        /// Application identifier (UUID)
        #[arg(long)]
        app_id: String,

        /// Ingest base URL
        #[arg(long)]
        base_url: Option<String>,

        /// Namespace route segment
        #[arg(long)]
        namespace: Option<String>,

        /// Salt for user identifier hashing
        #[arg(long)]
        salt: Option<String>,

        /// Mark all signals as test signals
        #[arg(long)]
        test_mode: Option<bool>,

        /// Directory for persisted state
        #[arg(long)]
        data_path: Option<PathBuf>,
    },

    /// Queue a signal for the next flush
    Enqueue {
        #[command(flatten)]
        signal: SignalArgs,
    },

    /// Send a signal immediately, bypassing the queue
    Send {
        #[command(flatten)]
        signal: SignalArgs,
    },

    /// Deliver everything queued now
    Flush,

    /// Run the dispatch loop until Ctrl+C
    Run,

    /// Show queue, session and delivery status
    Status,

    /// Delete the anonymous user identifier
    ResetIdentity,

    /// Display privacy declaration
    Privacy,

    /// Show configuration
    Config,
}

#[derive(clap::Args)]
struct SignalArgs {
    /// Signal type, e.g. `App.launched`
    signal_type: String,

    /// Parameter as key=value (repeatable)
    #[arg(short = 'p', long = "param", value_parser = parse_key_val)]
    params: Vec<(String, String)>,

    /// Explicit user identifier (hashed before sending)
    #[arg(long)]
    user: Option<String>,

    /// Numeric value attached to the signal
    #[arg(long)]
    float_value: Option<f64>,
}

impl SignalArgs {
    fn into_request(self) -> SignalRequest {
        let mut request = SignalRequest::new(self.signal_type)
            .parameters(self.params.into_iter().collect::<Payload>());
        if let Some(user) = self.user {
            request = request.user(user);
        }
        if let Some(value) = self.float_value {
            request = request.float_value(value);
        }
        request
    }
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{s}'")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("signal_relay=info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init {
            app_id,
            base_url,
            namespace,
            salt,
            test_mode,
            data_path,
        } => cmd_init(app_id, base_url, namespace, salt, test_mode, data_path),
        Commands::Enqueue { signal } => cmd_enqueue(signal),
        Commands::Send { signal } => cmd_send(signal).await,
        Commands::Flush => cmd_flush().await,
        Commands::Run => cmd_run().await,
        Commands::Status => cmd_status(),
        Commands::ResetIdentity => cmd_reset_identity(),
        Commands::Privacy => {
            println!("{PRIVACY_DECLARATION}");
            Ok(())
        }
        Commands::Config => cmd_config(),
    }
}

fn load_client() -> anyhow::Result<SignalClient> {
    let config = Config::load().context("could not load configuration")?;
    if let Err(e) = config.ensure_directories() {
        eprintln!("Warning: Could not create directories: {e}");
    }
    SignalClient::builder(config)
        .build()
        .context("run 'signal-relay init --app-id <UUID>' first")
}

fn save_stats(client: &SignalClient) {
    if let Err(e) = client.save_stats() {
        eprintln!("Warning: Could not save delivery statistics: {e}");
    }
}

fn cmd_init(
    app_id: String,
    base_url: Option<String>,
    namespace: Option<String>,
    salt: Option<String>,
    test_mode: Option<bool>,
    data_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    let mut config = Config::load().unwrap_or_default();
    config.app_id = Some(app_id);
    if let Some(base_url) = base_url {
        config.base_url = base_url;
    }
    if namespace.is_some() {
        config.namespace = namespace;
    }
    if let Some(salt) = salt {
        config.salt = salt;
    }
    if let Some(test_mode) = test_mode {
        config.test_mode = test_mode;
    }
    if let Some(data_path) = data_path {
        config.data_path = data_path;
    }

    config.validate()?;
    config.save()?;
    config.ensure_directories()?;

    println!("Configuration written to {:?}", Config::config_path());
    Ok(())
}

fn cmd_enqueue(args: SignalArgs) -> anyhow::Result<()> {
    let client = load_client()?;
    if !client.config().persist_cache {
        bail!("persist_cache is disabled; queued signals would be lost on exit");
    }

    client.record(args.into_request());
    save_stats(&client);

    println!("Queued. {} signal(s) waiting.", client.queued());
    Ok(())
}

async fn cmd_send(args: SignalArgs) -> anyhow::Result<()> {
    let client = load_client()?;
    let result = client.send(args.into_request()).await;
    save_stats(&client);
    result?;

    println!("Sent to {}", client.service_url());
    Ok(())
}

async fn cmd_flush() -> anyhow::Result<()> {
    let client = load_client()?;
    let outcome = client.flush().await;
    save_stats(&client);
    print_outcome(outcome);
    Ok(())
}

fn print_outcome(outcome: FlushOutcome) {
    match outcome {
        FlushOutcome::Idle => println!("Nothing to send."),
        FlushOutcome::Sent(n) => println!("Sent {n} signal(s)."),
        FlushOutcome::Requeued(n) => println!("Delivery failed, {n} signal(s) re-queued."),
    }
}

async fn cmd_run() -> anyhow::Result<()> {
    let client = load_client()?;

    println!("Signal Relay v{VERSION}");
    println!("  Endpoint: {}", client.service_url());
    println!(
        "  Flush interval: {}s",
        client.config().flush_interval.as_secs()
    );
    println!("  Queued: {}", client.queued());
    println!();
    println!("Press Ctrl+C to stop");

    client.start().await;
    client.foreground();

    tokio::signal::ctrl_c()
        .await
        .context("could not listen for Ctrl+C")?;

    info!("Shutting down");
    client.background();
    client.stop().await;
    print_outcome(client.flush().await);
    save_stats(&client);

    println!();
    println!("{}", client.transparency().summary());
    Ok(())
}

fn cmd_status() -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("Signal Relay Status");
    println!("===================");
    println!();

    match config.validate() {
        Ok(app_id) => println!("App ID: {}", app_id.hyphenated().to_string().to_uppercase()),
        Err(e) => println!("Not initialized: {e}"),
    }
    println!("Data path: {:?}", config.data_path);
    println!();

    let cache = PersistentSignalCache::open(config.cache_path());
    println!("Queued signals: {}", cache.count());

    let sessions = SessionTracker::new(config.sessions_path(), false).state();
    println!("Recorded sessions: {}", sessions.sessions.len());
    println!("Distinct days used: {}", sessions.distinct_days.len());
    if let Some(first) = sessions.first_session_date {
        println!("First session: {first}");
    }
    println!();

    if config.transparency_path().exists() {
        let log = TransparencyLog::with_persistence(config.transparency_path());
        println!("{}", log.summary());
    } else {
        println!("No delivery statistics recorded yet.");
    }
    Ok(())
}

fn cmd_reset_identity() -> anyhow::Result<()> {
    let client = load_client()?;
    client.reset_identity();
    println!("Anonymous identifier deleted. A new one will be created on the next signal.");
    Ok(())
}

fn cmd_config() -> anyhow::Result<()> {
    let config = Config::load().unwrap_or_default();

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {:?}", Config::config_path());
    println!();
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}
