//! PingPlanner (§4.C6): constructs charcoal-marker plans that actively
//! disambiguate whether an unbound candidate room denotes the same
//! hidden room as an already-bound one.
//!
//! Grounded on the same BFS idiom as `graph::bfs_path`, reused here
//! because the walk starts at an arbitrary room (B) rather than root.

use std::collections::{BTreeMap, BTreeSet, VecDeque};

use rand::Rng;

use crate::error::Inconsistency;
use crate::graph::{ExplorationGraph, RoomHandle};
use crate::state::KnownState;
use crate::token::Token;

/// Where and on what room a charcoal marker was placed, within one plan.
#[derive(Debug, Clone, Copy)]
pub struct CharcoalMark {
    pub room: RoomHandle,
    /// Observation index (post-charcoal position) this marker covers.
    pub position: usize,
}

/// A constructed ping plan, kept around so the observation handler can
/// interpret the reply without re-deriving the plan's shape.
#[derive(Debug, Clone)]
pub struct PingQuery {
    pub tokens: Vec<Token>,
    /// overwrite label -> mark, per §4.C6's side-table.
    pub charcoaled: BTreeMap<u8, CharcoalMark>,
    pub target_room: RoomHandle,
    pub probe_identity: u32,
    /// Observation index of σB→R's destination — the position actually
    /// compared against the overwrite label.
    pub destination_index: usize,
    /// The room σB→R's scripted portion ends at, before any random-walk
    /// extension is appended.
    pub end_room: RoomHandle,
}

fn spare_label(used: &BTreeSet<u8>, avoid: u8) -> Option<u8> {
    (0u8..4).find(|l| !used.contains(l) && *l != avoid)
}

/// Shortest nonzero-length walk from `start`, using only opened doors,
/// to a room currently labeled `target_label`.
fn walk_to_label(graph: &ExplorationGraph, start: RoomHandle, target_label: u8) -> Option<Vec<Token>> {
    let start = graph.resolve(start);
    let mut visited = std::collections::HashSet::new();
    visited.insert(start);
    let mut queue = VecDeque::new();
    queue.push_back((start, Vec::<Token>::new()));

    while let Some((at, path)) = queue.pop_front() {
        for d in 0u8..6 {
            let slot = graph.door(at, d);
            let Some(dest) = slot.destination else {
                continue;
            };
            let dest = graph.resolve(dest);
            let mut next_path = path.clone();
            next_path.push(Token::Move(d));
            if graph.label(dest) == target_label {
                return Some(next_path);
            }
            if visited.insert(dest) {
                queue.push_back((dest, next_path));
            }
        }
    }
    None
}

/// Build the ping plan `πB · [L'] · σB→R` (§4.C6), opportunistically
/// charcoaling any other bound room σB→R passes through along the way
/// (excluding its own final destination, which must stay readable
/// against the primary `L'` comparison).
///
/// Returns `None` if B has no canonical path yet or no walk from B
/// reaches a room sharing R's label — the caller should try a
/// different candidate pair.
pub fn build_ping(state: &KnownState, r: RoomHandle, b: RoomHandle, b_identity: u32) -> Option<PingQuery> {
    let path_b = state.graph.canonical_path(b)?.to_vec();
    let r_label = state.graph.label(r);
    let b_label = state.graph.label(b);
    let sigma = walk_to_label(&state.graph, b, r_label)?;

    let overwrite = (b_label + 1) % 4;
    let mut tokens = path_b;
    let b_position = tokens.len();
    tokens.push(Token::Charcoal(overwrite));

    let mut charcoaled = BTreeMap::new();
    charcoaled.insert(
        overwrite,
        CharcoalMark {
            room: state.graph.resolve(b),
            position: b_position,
        },
    );
    let mut used = BTreeSet::from([overwrite]);

    let mut at = state.graph.resolve(b);
    let mut position = b_position;
    let last = sigma.len().saturating_sub(1);
    for (i, t) in sigma.iter().enumerate() {
        let Token::Move(d) = t else { continue };
        tokens.push(Token::Move(*d));
        position += 1;
        let slot = state.graph.door(at, *d);
        at = slot.destination.map(|h| state.graph.resolve(h)).unwrap_or(at);

        if i != last && state.graph.is_bound(at) {
            if let Some(spare) = spare_label(&used, state.graph.label(at)) {
                tokens.push(Token::Charcoal(spare));
                used.insert(spare);
                charcoaled.insert(
                    spare,
                    CharcoalMark {
                        room: at,
                        position,
                    },
                );
            }
        }
    }

    Some(PingQuery {
        tokens,
        charcoaled,
        target_room: r,
        probe_identity: b_identity,
        destination_index: position,
        end_room: at,
    })
}

/// Random-walk extension (§4.C6): append moves drawing from opened
/// doors when available, otherwise uniform random, until `budget`
/// move tokens have been used. Continues the same opportunistic
/// charcoal bookkeeping.
pub fn extend_with_random_walk(state: &KnownState, query: &mut PingQuery, rng: &mut impl Rng, budget: usize) {
    let mut at = query.end_room;
    let mut position = query.destination_index;
    let mut used: BTreeSet<u8> = query.charcoaled.keys().copied().collect();

    while position < budget {
        let opened: Vec<u8> = (0u8..6)
            .filter(|&d| state.graph.door(at, d).destination.is_some())
            .collect();
        let d = if opened.is_empty() {
            rng.gen_range(0u8..6)
        } else {
            opened[rng.gen_range(0..opened.len())]
        };
        query.tokens.push(Token::Move(d));
        position += 1;
        if let Some(dest) = state.graph.door(at, d).destination {
            at = state.graph.resolve(dest);
        }

        if state.graph.is_bound(at) {
            if let Some(spare) = spare_label(&used, state.graph.label(at)) {
                query.tokens.push(Token::Charcoal(spare));
                used.insert(spare);
                query.charcoaled.insert(
                    spare,
                    CharcoalMark {
                        room: at,
                        position,
                    },
                );
            }
        }
    }
}

/// Pick up to `k` (bound, unbound-candidate, identity) triples with
/// matching label where the candidate's potential still contains the
/// bound room's identity (§4.C7.2.a).
pub fn select_ping_candidates(state: &KnownState, k: usize) -> Vec<(RoomHandle, RoomHandle, u32)> {
    let mut out = Vec::new();
    for (id, b) in state.bound_rooms() {
        for r in state.unbound_rooms() {
            if state.graph.label(r) == state.graph.label(b) && state.graph.potential(r).contains(&id) {
                out.push((b, r, id));
                if out.len() >= k {
                    return out;
                }
            }
        }
    }
    out
}

/// Apply the core outcome rule (§4.C6): confirm or eliminate
/// `query.target_room` against `b` based on what the observation shows
/// at `query.destination_index`.
pub fn interpret_ping(
    state: &mut KnownState,
    query: &PingQuery,
    b: RoomHandle,
    observation: &[u8],
) -> Result<(), Inconsistency> {
    let b = state.graph.resolve(b);
    let l_prime = query
        .charcoaled
        .iter()
        .find(|(_, m)| state.graph.resolve(m.room) == b)
        .map(|(label, _)| *label)
        .expect("the ping's own bound room must carry a charcoal mark");

    let observed = observation[query.destination_index];
    if observed == l_prime {
        state.ping_confirm(query.target_room, b)
    } else {
        state.ping_eliminate(query.target_room, query.probe_identity)
    }
}

/// Generic revisit detector: any position strictly after a mark's own
/// application that still reports the mark's overwrite label means the
/// walk returned to that physical room (overwrites persist for the
/// rest of the plan once placed). The reciprocal-door evidence this
/// would otherwise carry is already captured directly off the cursor
/// walk in `exploration::apply_observation`, which sees every opened
/// door the plan retraces rather than only the charcoaled ones; this
/// is kept as the lower-level primitive and for diagnosing a ping's own
/// shape in tests.
pub fn detect_revisits(query: &PingQuery, observation: &[u8]) -> Vec<(RoomHandle, usize)> {
    let mut hits = Vec::new();
    for (&label, mark) in &query.charcoaled {
        for (idx, &obs_label) in observation.iter().enumerate().skip(mark.position + 1) {
            if obs_label == label {
                hits.push((mark.room, idx));
            }
        }
    }
    hits
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_two_room_state() -> (KnownState, RoomHandle, RoomHandle) {
        // root label 0, bound to identity 0 via a 2-room universe once
        // narrowed; a second room "a" reached via door 0, label 1.
        let mut state = KnownState::new(0, 2, 2);
        let root = state.root();
        *state.graph.potential_mut(root) = BTreeSet::from([0]);
        let a = state.new_room(1);
        state.graph.open_door(root, 0, a).unwrap();
        state.graph.open_door(a, 0, root).unwrap();
        state.graph.update_all_paths();
        *state.graph.potential_mut(a) = BTreeSet::from([1]);
        (state, root, a)
    }

    #[test]
    fn build_ping_walks_from_b_to_matching_label() {
        let (state, root, a) = make_two_room_state();
        // candidate r is a second unbound room also labeled 1
        let mut state = state;
        let r = state.new_room(1);
        let query = build_ping(&state, r, a, 1).expect("a has an opened door back to root (label 0)... need label 1 target");
        // destination must be a room whose true label is 1 (r's label)
        assert_eq!(query.target_room, r);
        assert_eq!(query.probe_identity, 1);
        let _ = root;
    }

    #[test]
    fn interpret_ping_confirms_when_destination_shows_overwrite() {
        let (mut state, root, a) = make_two_room_state();
        let r = state.new_room(1);
        *state.graph.potential_mut(r) = BTreeSet::from([0, 1]);

        // Force a ping query by hand: πB=[0] (root->a), charcoal root's
        // would-be overwrite... simplest is to ping root itself against r,
        // using a's door back to root as sigma.
        let query = PingQuery {
            tokens: vec![],
            charcoaled: BTreeMap::from([(1, CharcoalMark { room: root, position: 1 })]),
            target_room: r,
            probe_identity: 0,
            destination_index: 2,
            end_room: root,
        };
        let observation = [0u8, 1, 1]; // position 2 shows the overwrite (1)
        interpret_ping(&mut state, &query, root, &observation).unwrap();
        assert_eq!(state.graph.bound_identity(r), Some(0));
        let _ = a;
    }

    #[test]
    fn interpret_ping_eliminates_when_destination_shows_true_label() {
        let (mut state, root, a) = make_two_room_state();
        let r = state.new_room(1);
        *state.graph.potential_mut(r) = BTreeSet::from([0, 1]);

        let query = PingQuery {
            tokens: vec![],
            charcoaled: BTreeMap::from([(1, CharcoalMark { room: root, position: 1 })]),
            target_room: r,
            probe_identity: 0,
            destination_index: 2,
            end_room: root,
        };
        let observation = [0u8, 1, 0]; // position 2 shows true label 0, not the overwrite 1
        interpret_ping(&mut state, &query, root, &observation).unwrap();
        assert_eq!(state.graph.potential(r), &BTreeSet::from([1]));
        let _ = a;
    }

    #[test]
    fn detect_revisits_finds_positions_after_the_mark() {
        let mark_room = RoomHandle(0);
        let query = PingQuery {
            tokens: vec![],
            charcoaled: BTreeMap::from([(2, CharcoalMark { room: mark_room, position: 1 })]),
            target_room: RoomHandle(1),
            probe_identity: 0,
            destination_index: 1,
            end_room: mark_room,
        };
        let observation = [0u8, 2, 3, 2];
        let hits = detect_revisits(&query, &observation);
        assert_eq!(hits, vec![(mark_room, 3)]);
    }
}
