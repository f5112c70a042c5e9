//! Abstract oracle interface (§4.C9) and the pure tunables the
//! exploration loop runs with (§4.C10, engine-side half — the env/CLI
//! loading lives in the `cli` crate).
//!
//! Grounded on the teacher's `garasubo-solver/src/api.rs`: a thin
//! `async_trait` seam between the solving core and whatever transport
//! actually talks to the judge, so the core can be driven by a
//! deterministic in-memory double in tests.

use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("transport error: {0}")]
    Transport(String),
    #[error("server rejected the request: {0}")]
    ServerReject(String),
}

/// Reported shape of a freshly selected problem.
#[derive(Debug, Clone)]
pub struct SelectResult {
    pub problem_name: String,
}

/// One plan's reply: the label sequence observed at every visited
/// position, including position 0 (the starting room, before any
/// move).
#[derive(Debug, Clone)]
pub struct ExploreResult {
    pub results: Vec<Vec<u8>>,
    pub query_count: u32,
}

#[derive(Debug, Clone)]
pub struct GuessResult {
    pub correct: bool,
}

/// The three judge-facing capabilities the engine needs, independent
/// of transport (§4.C9).
#[async_trait]
pub trait Oracle: Send + Sync {
    async fn select(&self, problem_name: &str) -> Result<SelectResult, OracleError>;
    async fn explore(&self, plans: &[String]) -> Result<ExploreResult, OracleError>;
    async fn guess(&self, map: &crate::guess::MapDescription) -> Result<GuessResult, OracleError>;
}

/// Pure tunables for one exploration run (§4.C10's engine-side fields;
/// the transport/credentials fields live in the CLI's `RunConfig`).
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Hard cap on exploration-loop iterations before giving up
    /// (`EngineError::BudgetExhausted`).
    pub max_iterations: usize,
    /// `k` in `isDifferent`'s recursion bound.
    pub distinguishing_depth: usize,
    /// `T`: how many fancy (multi-room-targeting) plans to submit per
    /// iteration once the cheap query sources run dry.
    pub fancy_take: usize,
    /// `K`: how many ping candidates to probe per iteration.
    pub ping_batch_size: usize,
    /// Build the final map but never call `guess` (§4.C10's `dry_run`).
    pub dry_run: bool,
    /// Seed for the loop's `SmallRng` (random-walk extension, fill
    /// padding, fancy-door choice). Fixed rather than entropy-drawn so
    /// a run — including a `--dry-run` trace — is reproducible (§4.C1).
    pub seed: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_iterations: 500,
            distinguishing_depth: 4,
            fancy_take: 4,
            ping_batch_size: 10,
            dry_run: false,
            seed: 0,
        }
    }
}
