use clap::{Parser, Subcommand, ValueEnum};
use konnekt_call_cli::{
    envelope_schema, inspect, run_simulation, CliError, LogConfig, Result, SimulationConfig,
};
use konnekt_call_core::Operation;
use konnekt_call_p2p::{IceServer, OfferPolicy, RegistryConfig};
use std::fs::File;
use std::io::{self, BufReader};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "konnekt-call")]
#[command(
    version,
    about = "Konnekt Call CLI - simulated WebRTC calls and signaling inspection"
)]
struct Cli {
    /// Default log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info", env = "KONNEKT_LOG_LEVEL")]
    log_level: tracing::Level,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    /// Include thread ids in log lines
    #[arg(long, global = true)]
    show_thread_ids: bool,

    /// Hide log targets
    #[arg(long, global = true)]
    hide_targets: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a call between simulated peers on an in-process signaling hub
    Simulate {
        /// Number of participants; peer-0 places the call
        #[arg(short = 'p', long, default_value_t = 2)]
        peers: usize,

        /// Host candidates each peer connection gathers
        #[arg(short = 'c', long, default_value_t = 2)]
        candidates: usize,

        /// Make every peer connection reject this operation
        #[arg(long, value_enum)]
        fail: Option<FailOperation>,

        /// What to do with a second offer from the same party
        #[arg(long, value_enum, default_value_t = Policy::SingleSessionPerPeer)]
        offer_policy: Policy,

        /// STUN server URLs handed to every peer connection
        #[arg(long = "stun", env = "KONNEKT_STUN_SERVERS", value_delimiter = ',')]
        stun_servers: Vec<String>,

        /// TURN server URL (format: turn:host:port)
        #[arg(long)]
        turn_server: Option<String>,

        /// TURN username (required if turn-server is set)
        #[arg(long)]
        turn_username: Option<String>,

        /// TURN credential (required if turn-server is set)
        #[arg(long)]
        turn_credential: Option<String>,

        /// Milliseconds to wait for the call to settle
        #[arg(long, default_value_t = 2000)]
        timeout_ms: u64,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Decode captured signaling messages, one JSON document per line
    Inspect {
        /// Input file, or - for stdin
        #[arg(default_value = "-")]
        input: PathBuf,
    },

    /// Print the JSON Schema of the signaling envelope
    Schema,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FailOperation {
    CreateOffer,
    CreateAnswer,
    SetLocalDescription,
    SetRemoteDescription,
    AddIceCandidate,
    AddTrack,
}

impl From<FailOperation> for Operation {
    fn from(operation: FailOperation) -> Self {
        match operation {
            FailOperation::CreateOffer => Operation::CreateOffer,
            FailOperation::CreateAnswer => Operation::CreateAnswer,
            FailOperation::SetLocalDescription => Operation::SetLocalDescription,
            FailOperation::SetRemoteDescription => Operation::SetRemoteDescription,
            FailOperation::AddIceCandidate => Operation::AddIceCandidate,
            FailOperation::AddTrack => Operation::AddTrack,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Policy {
    SingleSessionPerPeer,
    SessionPerOffer,
}

impl From<Policy> for OfferPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::SingleSessionPerPeer => OfferPolicy::SingleSessionPerPeer,
            Policy::SessionPerOffer => OfferPolicy::SessionPerOffer,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    LogConfig::default()
        .with_level(cli.log_level)
        .with_json(cli.json_logs)
        .with_thread_ids(cli.show_thread_ids)
        .with_targets(!cli.hide_targets)
        .init()?;

    match cli.command {
        Commands::Simulate {
            peers,
            candidates,
            fail,
            offer_policy,
            stun_servers,
            turn_server,
            turn_username,
            turn_credential,
            timeout_ms,
            json,
        } => {
            let ice_servers =
                build_ice_servers(stun_servers, turn_server, turn_username, turn_credential)?;
            let config = SimulationConfig {
                peers,
                candidates,
                fail: fail.map(Operation::from),
                registry: RegistryConfig::default()
                    .with_ice_servers(ice_servers)
                    .with_offer_policy(offer_policy.into()),
                timeout: Duration::from_millis(timeout_ms),
                ..Default::default()
            };

            let report = run_simulation(config).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", report);
            }
        }
        Commands::Inspect { input } => {
            let inspections = if input.as_os_str() == "-" {
                inspect(io::stdin().lock())?
            } else {
                if !input.exists() {
                    return Err(CliError::input_not_found(input));
                }
                inspect(BufReader::new(File::open(&input)?))?
            };

            for inspection in &inspections {
                println!("{}", inspection);
            }
            let malformed = inspections.iter().filter(|i| i.is_malformed()).count();
            tracing::info!(lines = inspections.len(), malformed, "Inspection done");
        }
        Commands::Schema => {
            println!("{}", envelope_schema()?);
        }
    }

    Ok(())
}

fn build_ice_servers(
    stun_servers: Vec<String>,
    turn_server: Option<String>,
    turn_username: Option<String>,
    turn_credential: Option<String>,
) -> Result<Vec<IceServer>> {
    let mut servers: Vec<IceServer> = stun_servers.into_iter().map(IceServer::stun).collect();

    if let Some(turn_url) = turn_server {
        match (turn_username, turn_credential) {
            (Some(username), Some(credential)) => {
                tracing::info!("Using TURN server: {}", turn_url);
                servers.push(IceServer::turn(turn_url, username, credential));
            }
            _ => {
                return Err(CliError::InvalidConfig(
                    "TURN server requires both username and credential".to_string(),
                ));
            }
        }
    }

    if servers.is_empty() {
        servers.push(IceServer::default());
    }
    Ok(servers)
}
