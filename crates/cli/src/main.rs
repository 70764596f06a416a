mod cmd;
mod output;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use fleetsync_lib::config::{AgentConfig, ServerConfig};

/// Content-addressed deployment manifests for device fleets
#[derive(Parser)]
#[command(name = "fleetsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
  /// Enable debug logging
  #[arg(short, long, global = true)]
  verbose: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Run the manifest server
  Serve {
    /// Address to listen on
    #[arg(long, env = "FLEETSYNC_BIND", default_value = "127.0.0.1:8080")]
    bind: SocketAddr,

    /// Persist manifests and blobs under this directory
    #[arg(long, env = "FLEETSYNC_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Register a device at startup (repeatable)
    #[arg(long = "device")]
    devices: Vec<String>,
  },

  /// Run the device agent
  Agent {
    /// Manifest server base URL
    #[arg(long, env = "FLEETSYNC_BASE_URL", default_value = "http://localhost:8080")]
    base_url: String,

    /// Device identity
    #[arg(long, env = "FLEETSYNC_DEVICE_ID")]
    device_id: String,

    /// Time between polls
    #[arg(long, default_value = "30s", value_parser = humantime::parse_duration)]
    poll_interval: Duration,

    /// Per-request timeout
    #[arg(long, default_value = "15s", value_parser = humantime::parse_duration)]
    timeout: Duration,

    /// Persist the agent cache in this file
    #[arg(long, env = "FLEETSYNC_STATE")]
    state: Option<PathBuf>,

    /// Poll once, print the actions and exit
    #[arg(long)]
    once: bool,
  },

  /// Print the content digest of files
  Digest {
    #[arg(required = true)]
    files: Vec<PathBuf>,
  },

  /// Pack or inspect deployment bundles
  Bundle {
    #[command(subcommand)]
    command: BundleCommands,
  },
}

#[derive(Subcommand)]
enum BundleCommands {
  /// Pack descriptor files into a bundle archive
  Pack {
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Archive to write
    #[arg(short, long)]
    output: PathBuf,
  },

  /// List the members of an archive that match the expected digests
  List {
    archive: PathBuf,

    /// Digest a member must have to be kept (repeatable)
    #[arg(long = "expect")]
    expected: Vec<String>,
  },
}

fn main() -> Result<()> {
  let cli = Cli::parse();

  let default_level = if cli.verbose { "debug" } else { "info" };
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
    .with_writer(std::io::stderr)
    .init();

  match cli.command {
    Commands::Serve {
      bind,
      data_dir,
      devices,
    } => cmd::cmd_serve(ServerConfig {
      bind_address: bind,
      data_dir,
      devices,
    }),
    Commands::Agent {
      base_url,
      device_id,
      poll_interval,
      timeout,
      state,
      once,
    } => cmd::cmd_agent(
      AgentConfig {
        base_url,
        device_id,
        poll_interval,
        request_timeout: timeout,
        state_path: state,
      },
      once,
    ),
    Commands::Digest { files } => cmd::cmd_digest(&files),
    Commands::Bundle { command } => match command {
      BundleCommands::Pack { files, output } => cmd::cmd_bundle_pack(&files, &output),
      BundleCommands::List { archive, expected } => cmd::cmd_bundle_list(&archive, &expected),
    },
  }
}
