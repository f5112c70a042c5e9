use crate::oracle::OracleError;
use crate::token::DecodeError;

/// Internal-consistency failures: either a defect in this engine or a
/// violation of the oracle's advertised semantics. Always fatal — the
/// run aborts with whatever diagnostic the caller attaches.
#[derive(Debug, thiserror::Error)]
pub enum Inconsistency {
    #[error("door {door} of room {room:?} already opens to {existing:?}, cannot also open to {attempted:?}")]
    InconsistentOpen {
        room: crate::graph::RoomHandle,
        door: u8,
        existing: crate::graph::RoomHandle,
        attempted: crate::graph::RoomHandle,
    },
    #[error("door {door} of room {room:?} is already paired, cannot pair again")]
    PairConflict {
        room: crate::graph::RoomHandle,
        door: u8,
    },
    #[error("merge of {a:?} and {b:?} would leave an empty potential set")]
    MergeContradiction {
        a: crate::graph::RoomHandle,
        b: crate::graph::RoomHandle,
    },
    #[error("room {room:?} has no reciprocal door for door {door} at {destination:?}")]
    GuessInfeasible {
        room: crate::graph::RoomHandle,
        door: u8,
        destination: crate::graph::RoomHandle,
    },
}

/// Every error surface the engine can produce, including the oracle's
/// own transport/server-reject failures — the exploration loop holds
/// the only `Oracle` handle, so it's the one place those can surface.
/// The CLI driver is what finally maps each variant to an exit code
/// (§7/§4.C11).
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no opened-door path from root to {0:?}")]
    Unreachable(crate::graph::RoomHandle),

    #[error("door {door} of room {room:?} has no destination yet")]
    DeadEnd {
        room: crate::graph::RoomHandle,
        door: u8,
    },

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Inconsistency(#[from] Inconsistency),

    #[error(transparent)]
    Oracle(#[from] OracleError),

    #[error("hard iteration limit ({limit}) reached without a complete map")]
    BudgetExhausted { limit: usize },
}
