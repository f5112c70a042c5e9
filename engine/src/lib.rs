//! Pure solving core for the active-learning graph-reconstruction
//! agent: the tentative graph, the compactor, the ping planner, the
//! exploration loop, and the guess builder. No transport, no CLI —
//! see the `oracle` and `cli` crates for those.

pub mod error;
pub mod exploration;
pub mod graph;
pub mod guess;
pub mod oracle;
pub mod ping;
pub mod state;
pub mod token;
pub mod walk;

pub use error::{EngineError, Inconsistency};
pub use exploration::ExplorationLoop;
pub use graph::{DoorSlot, ExplorationGraph, RoomHandle};
pub use guess::{build_guess, Connection, Endpoint, MapDescription};
pub use oracle::{EngineConfig, ExploreResult, GuessResult, Oracle, OracleError, SelectResult};
pub use state::KnownState;
pub use token::Token;
