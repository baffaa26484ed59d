use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "tm")]
#[command(about = "Trade manager CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> local ...)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Run orders from a JSON file against the in-memory paper broker
    Simulate {
        /// Layered config paths in merge order (defaults apply when omitted)
        #[arg(long = "config")]
        config_paths: Vec<String>,

        /// JSON array of order messages, each tagged with "kind"
        #[arg(long)]
        orders: String,

        /// Stop after this many seconds even if orders are still active
        #[arg(long, default_value_t = 30)]
        max_secs: u64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env.local if present (dev convenience); silent if missing.
    let _ = dotenvy::from_filename(".env.local");

    let cli = Cli::parse();
    match cli.cmd {
        Commands::ConfigHash { paths } => {
            init_tracing("info");
            let loaded = commands::load_config(&paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }
        Commands::Simulate {
            config_paths,
            orders,
            max_secs,
        } => {
            let loaded = commands::load_config(&config_paths)?;
            let settings = loaded.settings()?;
            init_tracing(&settings.log.filter);
            commands::simulate::run(&loaded, &settings, &orders, max_secs).await?;
        }
    }
    Ok(())
}

/// `RUST_LOG` wins; otherwise the configured filter.
fn init_tracing(fallback: &str) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .init();
}
