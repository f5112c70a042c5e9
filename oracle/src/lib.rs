//! Transport adapters for the `warren_engine::oracle::Oracle` trait.
//! The production adapter lives here (`HttpOracle`); a pure in-memory
//! one used only by the engine's own integration tests lives under
//! `engine/tests/common`, since it needs no network stack at all.

mod http;

pub use http::{HttpOracle, TeamCredentials};
