//! GuessBuilder (§4.C8): turns a complete `KnownState` into the wire
//! `MapDescription` submitted to `/guess`.
//!
//! Grounded on `solver/src/graph.rs`'s `to_api_map()` in the teacher,
//! which walks a solved room graph and emits one `Connection` per
//! door pair, deduplicating the two directions of a single bond.

use std::collections::HashSet;

use crate::error::{EngineError, Inconsistency};
use crate::graph::RoomHandle;
use crate::state::KnownState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Endpoint {
    pub room: u32,
    pub door: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Connection {
    pub from: Endpoint,
    pub to: Endpoint,
}

#[derive(Debug, Clone)]
pub struct MapDescription {
    pub rooms: Vec<u8>,
    pub start_index: u32,
    pub connections: Vec<Connection>,
}

/// Close the door of `room` not yet pair-bonded, against the unbonded
/// doors of its destination that point back at `room` (§4.C8).
///
/// Exploration records a bond the moment a walk proves one (the
/// round-trip evidence in `exploration::apply_observation`), so by the
/// time guess-building runs, most doors are already paired and this
/// only ever sees the residual few that exploration's walks never
/// happened to bounce off. When more than one candidate remains —
/// parallel edges or a self-loop cluster between `room` and `dest` with
/// no further structure to tell them apart — any of them is a valid
/// bond: permuting among behaviorally-identical doors yields an
/// isomorphic map, so the choice just needs to be deterministic.
/// Picked ascending by door id, preferring `d` itself when `room` and
/// `dest` are the same room (the natural reading of a reflexive
/// self-loop). Only a destination with *no* unbonded door back to
/// `room` at all is a genuine bug signal.
fn close_unique_pair(state: &mut KnownState, room: RoomHandle, d: u8) -> Result<(), Inconsistency> {
    let dest = state
        .graph
        .door(room, d)
        .destination
        .expect("guess building only runs once every door is opened");
    let room = state.graph.resolve(room);

    let mut candidates: Vec<u8> = Vec::new();
    for d2 in 0u8..6 {
        let slot = state.graph.door(dest, d2);
        if slot.destination == Some(room) && slot.pair.is_none() {
            candidates.push(d2);
        }
    }

    let chosen = if room == dest && candidates.contains(&d) {
        d
    } else {
        match candidates.first().copied() {
            Some(d2) => d2,
            None => {
                return Err(Inconsistency::GuessInfeasible {
                    room,
                    door: d,
                    destination: dest,
                })
            }
        }
    };

    state.graph.pair(room, d, dest, chosen)
}

/// Close every still-unbonded door pair, then emit the `MapDescription`
/// (§4.C8). Returns `EngineError::Inconsistency(GuessInfeasible)` if a
/// door's reciprocal can't be determined uniquely — the exploration
/// loop should not have reached completion in that case, but building
/// the guess is where the contradiction would surface.
pub fn build_guess(state: &mut KnownState) -> Result<MapDescription, EngineError> {
    let live_rooms = state.graph.live_handles();
    for &room in &live_rooms {
        for d in 0u8..6 {
            if state.graph.door(room, d).pair.is_none() {
                close_unique_pair(state, room, d)?;
            }
        }
    }

    // Canonical index assignment: ascending by bound identity (§4.C8).
    let mut rooms = vec![0u8; state.n];
    for (id, handle) in state.bound_rooms() {
        rooms[id as usize] = state.graph.label(handle);
    }

    let start_id = state
        .graph
        .bound_identity(state.root())
        .expect("root must be bound once exploration completes");

    let mut connections = Vec::new();
    let mut emitted: HashSet<(u32, u8)> = HashSet::new();
    for &room in &live_rooms {
        let room_id = state
            .graph
            .bound_identity(room)
            .expect("build_guess runs only once every room is bound");
        for d in 0u8..6 {
            if emitted.contains(&(room_id, d)) {
                continue;
            }
            let slot = state.graph.door(room, d);
            let Some((partner, pd)) = slot.pair else {
                continue;
            };
            let partner_id = state
                .graph
                .bound_identity(partner)
                .expect("paired room must be bound");
            connections.push(Connection {
                from: Endpoint { room: room_id, door: d },
                to: Endpoint {
                    room: partner_id,
                    door: pd,
                },
            });
            emitted.insert((room_id, d));
            emitted.insert((partner_id, pd));
        }
    }

    Ok(MapDescription {
        rooms,
        start_index: start_id,
        connections,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_guess_on_two_room_loop() {
        let mut state = KnownState::new(0, 2, 2);
        let root = state.root();
        *state.graph.potential_mut(root) = std::collections::BTreeSet::from([0]);
        state.defined_rooms[0] = Some(root);
        let a = state.new_room(1);
        state.graph.open_door(root, 0, a).unwrap();
        state.graph.open_door(a, 0, root).unwrap();
        for d in 1u8..6 {
            state.graph.open_door(root, d, a).unwrap();
            state.graph.open_door(a, d, root).unwrap();
            // Pair every door explicitly up front: a fully symmetric
            // two-room graph has no unique-reciprocal evidence to fall
            // back on, so this test exercises emission/dedup rather
            // than close_unique_pair's search.
            state.graph.pair(root, d, a, d).unwrap();
        }
        state.graph.pair(root, 0, a, 0).unwrap();
        state.graph.update_all_paths();
        state.collapse_until_death().unwrap();
        assert!(state.is_complete());

        let map = build_guess(&mut state).unwrap();
        assert_eq!(map.rooms.len(), 2);
        assert_eq!(map.connections.len(), 6);
    }
}
