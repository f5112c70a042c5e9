//! `warren`: the driver binary (§4.C11). Wires configuration, the HTTP
//! oracle, and the engine's exploration loop together, and maps the
//! engine's error kinds onto process exit codes (§7).

mod config;

use clap::Parser;
use tracing_subscriber::EnvFilter;
use warren_engine::{EngineError, ExplorationLoop};
use warren_oracle::HttpOracle;

use config::Cli;

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    init_tracing();
    let cli = Cli::parse();

    let exit_code = tokio::select! {
        result = run(&cli) => {
            match result {
                Ok(()) => 0,
                Err(err) => {
                    tracing::error!(error = %err, "run failed");
                    exit_code_for(&err)
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("received ctrl-c, aborting run");
            130
        }
    };

    std::process::exit(exit_code);
}

async fn run(cli: &Cli) -> Result<(), EngineError> {
    let oracle = HttpOracle::new(cli.oracle_base_url.clone(), cli.team_credentials());
    let mut loop_ = ExplorationLoop::new(oracle, cli.engine_config(), cli.room_count);
    let map = loop_.run(&cli.problem_name).await?;
    tracing::info!(
        rooms = map.rooms.len(),
        connections = map.connections.len(),
        dry_run = cli.dry_run,
        "exploration complete"
    );
    Ok(())
}

/// §7's exit-code table: 0 success, 1 Inconsistency, 2 Decode,
/// 3 Budget, 4 Transport/ServerReject (oracle-side failures).
fn exit_code_for(err: &EngineError) -> i32 {
    match err {
        EngineError::Inconsistency(_) => 1,
        EngineError::Decode(_) => 2,
        EngineError::BudgetExhausted { .. } => 3,
        EngineError::Oracle(_) => 4,
        EngineError::Unreachable(_) | EngineError::DeadEnd { .. } => 1,
    }
}
