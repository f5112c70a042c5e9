//! CLI configuration (§4.C10/§4.C11): command-line flags with
//! environment-variable fallbacks, loaded through `dotenvy` the way
//! the teacher's binaries read `CLIENT_ID`/`CLIENT_SECRET` straight
//! from the process environment.

use clap::Parser;
use warren_engine::EngineConfig;
use warren_oracle::TeamCredentials;

#[derive(Parser, Debug)]
#[command(name = "warren", about = "Active-learning graph reconstruction agent")]
pub struct Cli {
    /// Name of the problem to select on the judge.
    #[arg(long, env = "PROBLEM_NAME")]
    pub problem_name: String,

    /// Number of rooms in the target library (fixed per problem).
    #[arg(long, env = "ROOM_COUNT")]
    pub room_count: usize,

    /// Base URL of the oracle's HTTP API.
    #[arg(long, env = "ORACLE_BASE_URL", default_value = "https://icfpc2025-backend.poisson.chat")]
    pub oracle_base_url: String,

    #[arg(long, env = "CLIENT_ID")]
    pub client_id: Option<String>,

    #[arg(long, env = "CLIENT_SECRET")]
    pub client_secret: Option<String>,

    /// Hard cap on exploration-loop iterations.
    #[arg(long, env = "MAX_ITERATIONS", default_value_t = 500)]
    pub max_iterations: usize,

    /// `k` in the structural distinguishing test. Defaults to N/2 when
    /// unset.
    #[arg(long, env = "DISTINGUISHING_DEPTH")]
    pub distinguishing_depth: Option<usize>,

    /// `T`: fancy cover-walk plans per iteration.
    #[arg(long, env = "FANCY_TAKE", default_value_t = 4)]
    pub fancy_take: usize,

    /// `K`: ping candidates probed per iteration.
    #[arg(long, env = "PING_BATCH_SIZE", default_value_t = 10)]
    pub ping_batch_size: usize,

    /// Build and print the map without ever calling `/guess`.
    #[arg(long, env = "DRY_RUN", default_value_t = false)]
    pub dry_run: bool,

    /// Seed for the loop's internal RNG. Fixed by default so a
    /// `--dry-run` trace is reproducible between runs.
    #[arg(long, env = "SEED", default_value_t = 0)]
    pub seed: u64,
}

impl Cli {
    pub fn team_credentials(&self) -> TeamCredentials {
        TeamCredentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
        }
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            max_iterations: self.max_iterations,
            distinguishing_depth: self.distinguishing_depth.unwrap_or(self.room_count / 2),
            fancy_take: self.fancy_take,
            ping_batch_size: self.ping_batch_size,
            dry_run: self.dry_run,
            seed: self.seed,
        }
    }
}
