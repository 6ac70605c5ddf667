//! dhlink CLI
//!
//! Key agreement (Diffie-Hellman or RSA transport) followed by an S-DES
//! encrypted message stream over TCP.

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;

use dhlink_cli::settings::{self, Overrides};
use dhlink_cli::{client, demo, server};
use dhlink_core::config::{AgreementKind, ChainingMode};
use dhlink_core::tracing_init::{default_filter, init_tracing};

#[derive(Parser, Debug)]
#[command(name = "dhlink")]
#[command(version, about = "Toy key agreement and encrypted messaging", long_about = None)]
struct Cli {
    /// Prime list, one per line
    #[arg(long, global = true)]
    prime_file: Option<PathBuf>,

    /// Log level for dhlink crates (overridden by `RUST_LOG`)
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Emit JSON log lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Accept one client and print the messages it sends
    Serve(Endpoint),
    /// Connect to a server and send stdin line by line (`/quit` to finish)
    Connect(ConnectArgs),
    /// Run both roles in-process
    Demo(DemoArgs),
}

#[derive(Args, Debug)]
struct Endpoint {
    #[arg(long)]
    host: Option<String>,

    #[arg(short, long)]
    port: Option<u16>,
}

#[derive(Args, Debug)]
struct ConnectArgs {
    #[command(flatten)]
    endpoint: Endpoint,

    /// Key agreement: `diffie_hellman` or `rsa`
    #[arg(short, long)]
    agreement: Option<AgreementKind>,

    /// Block chaining: `cbc` or `ecb`
    #[arg(short, long)]
    mode: Option<ChainingMode>,

    /// Skip the Diffie-Hellman secret echo
    #[arg(long)]
    no_verify: bool,
}

#[derive(Args, Debug)]
struct DemoArgs {
    /// Use p=23, g=5 with no network round trip
    #[arg(long)]
    fixed: bool,

    /// Block chaining: `cbc` or `ecb`
    #[arg(short, long)]
    mode: Option<ChainingMode>,
}

impl Cli {
    fn overrides(&self) -> Overrides {
        let mut overrides = Overrides {
            prime_file: self.prime_file.clone(),
            log_level: self.log_level.clone(),
            log_json: self.log_json,
            ..Overrides::default()
        };
        match &self.command {
            Command::Serve(endpoint) => {
                overrides.host.clone_from(&endpoint.host);
                overrides.port = endpoint.port;
            }
            Command::Connect(args) => {
                overrides.host.clone_from(&args.endpoint.host);
                overrides.port = args.endpoint.port;
                overrides.agreement = args.agreement;
                overrides.mode = args.mode;
                overrides.no_verify = args.no_verify;
            }
            Command::Demo(args) => overrides.mode = args.mode,
        }
        overrides
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let project_dir = std::env::current_dir().ok();
    let mut config = dhlink_core::config::load_config(project_dir.as_deref())
        .context("Failed to load configuration")?;
    cli.overrides().apply(&mut config);
    config.validate()?;

    init_tracing(&default_filter(&config.logging.level), config.logging.json)?;
    info!(version = env!("CARGO_PKG_VERSION"), "Starting dhlink");

    let pool = settings::load_pool(&config.handshake)?;

    match cli.command {
        Command::Serve(_) => {
            server::run(&config, &pool).await?;
        }
        Command::Connect(_) => {
            client::run(&config, &pool).await?;
        }
        Command::Demo(args) => {
            demo::run(&pool, args.fixed, settings::cipher_mode(config.cipher.mode)).await?;
        }
    }
    Ok(())
}
