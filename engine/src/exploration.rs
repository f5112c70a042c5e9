//! The exploration loop (§4.C7): the per-iteration query-source
//! cascade, observation replay, compaction, and the termination check.
//!
//! Grounded on the teacher's own solving drivers (`garasubo-solver`'s
//! `run_phase_c` / multi-phase pipeline and `solver`'s top-level solve
//! loop): select once, then repeatedly batch plans, submit them to the
//! oracle, and fold the replies back into the tentative graph until
//! nothing is left to learn.

use std::collections::HashSet;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use tracing::{info, info_span};

use crate::error::EngineError;
use crate::graph::RoomHandle;
use crate::guess::{self, MapDescription};
use crate::oracle::{EngineConfig, Oracle};
use crate::ping::{self, PingQuery};
use crate::state::KnownState;
use crate::token::{self, Token};
use crate::walk;

/// How many fresh frontier-door probes to bundle into one `explore`
/// call alongside the ping/ping-followup/fancy/random sources. Kept
/// small and fixed, unlike `fancy_take`/`ping_batch_size`, which are
/// tunable because they trade off query count against convergence
/// speed more directly.
const REGULAR_BATCH: usize = 6;

enum QuerySource {
    Ping { query: PingQuery, b: RoomHandle },
    Plain,
}

pub struct ExplorationLoop<O: Oracle> {
    oracle: O,
    config: EngineConfig,
    n: usize,
    rng: SmallRng,
}

impl<O: Oracle> ExplorationLoop<O> {
    pub fn new(oracle: O, config: EngineConfig, n: usize) -> Self {
        let rng = SmallRng::seed_from_u64(config.seed);
        Self {
            oracle,
            config,
            n,
            rng,
        }
    }

    /// Run select, then the full explore/compact cycle, then submit a
    /// guess. Returns the map the oracle accepted.
    pub async fn run(&mut self, problem_name: &str) -> Result<MapDescription, EngineError> {
        self.oracle.select(problem_name).await?;

        let bootstrap_plan = walk::bounded_cover_plan(self.n);
        let bootstrap_tokens = token::decode(&bootstrap_plan).expect("self-generated plan is always well-formed");
        let result = self.oracle.explore(&[bootstrap_plan]).await?;
        let root_label = result.results[0][0];
        let mut state = KnownState::new(root_label, self.n, self.config.distinguishing_depth);
        apply_observation(&mut state, &bootstrap_tokens, &result.results[0], true)?;
        state.graph.update_all_paths();
        state.collapse_until_death()?;

        let mut iteration = 0usize;
        let mut recent_charcoal_rooms: HashSet<RoomHandle> = HashSet::new();

        while !state.is_complete() {
            if iteration >= self.config.max_iterations {
                return Err(EngineError::BudgetExhausted {
                    limit: self.config.max_iterations,
                });
            }
            let span = info_span!("iteration", iteration, n = self.n);
            let _enter = span.enter();

            let mut sources: Vec<QuerySource> = Vec::new();
            let mut plans: Vec<String> = Vec::new();

            // (a) Ping queries.
            for (b, r, id) in ping::select_ping_candidates(&state, self.config.ping_batch_size) {
                if let Some(mut query) = ping::build_ping(&state, r, b, id) {
                    let budget = walk::plan_budget(self.n);
                    ping::extend_with_random_walk(&state, &mut query, &mut self.rng, budget);
                    for mark in query.charcoaled.values() {
                        recent_charcoal_rooms.insert(state.graph.resolve(mark.room));
                    }
                    plans.push(token::encode(&query.tokens));
                    sources.push(QuerySource::Ping { query, b });
                }
            }

            // (b) Ping-followup: probe an unopened door of a room a
            // recent ping touched.
            for &room in recent_charcoal_rooms.iter().take(self.config.ping_batch_size) {
                if let Some(d) = first_unopened_door(&state, room) {
                    if let Some(path) = state.graph.canonical_path(room) {
                        let prefix = token::encode(path);
                        let plan = walk::templated_plan(&mut self.rng, &prefix, d, self.n);
                        plans.push(plan);
                        sources.push(QuerySource::Plain);
                    }
                }
            }

            // (c) Regular: probe frontier doors of rooms we can already
            // reach, up to REGULAR_BATCH.
            let mut regular_count = 0;
            for room in state.graph.live_handles() {
                if regular_count >= REGULAR_BATCH {
                    break;
                }
                let Some(d) = first_unopened_door(&state, room) else {
                    continue;
                };
                let Some(path) = state.graph.canonical_path(room) else {
                    continue;
                };
                let prefix = token::encode(path);
                let plan = walk::templated_plan(&mut self.rng, &prefix, d, self.n);
                plans.push(plan);
                sources.push(QuerySource::Plain);
                regular_count += 1;
            }

            // (d) Fancy: the T rooms with the smallest potential
            // (ties broken by shortest canonical path) that still have
            // an unopened door, each probed through one random such
            // door rather than always the first. Complements (c)'s
            // unordered sweep by prioritizing rooms closest to
            // completion; bound rooms, whose potential is already a
            // singleton, sort first.
            let mut fancy_candidates: Vec<RoomHandle> = state
                .graph
                .live_handles()
                .into_iter()
                .filter(|&room| (0u8..6).any(|d| state.graph.door(room, d).destination.is_none()))
                .collect();
            fancy_candidates.sort_by_key(|&room| {
                (
                    state.graph.potential(room).len(),
                    state.graph.canonical_path(room).map(<[_]>::len).unwrap_or(usize::MAX),
                )
            });
            for &room in fancy_candidates.iter().take(self.config.fancy_take) {
                let unopened: Vec<u8> = (0u8..6)
                    .filter(|&d| state.graph.door(room, d).destination.is_none())
                    .collect();
                let Some(path) = state.graph.canonical_path(room) else {
                    continue;
                };
                let d = unopened[self.rng.gen_range(0..unopened.len())];
                let prefix = token::encode(path);
                let plan = walk::templated_plan(&mut self.rng, &prefix, d, self.n);
                plans.push(plan);
                sources.push(QuerySource::Plain);
            }

            // (e) Random padding, if the batch is otherwise still thin.
            if plans.is_empty() {
                plans.push(walk::random_fill(&mut self.rng, walk::plan_budget(self.n)));
                sources.push(QuerySource::Plain);
            }

            info!(batch_size = plans.len(), "submitting exploration batch");
            let result = self.oracle.explore(&plans).await?;

            for ((plan, observation), source) in plans.iter().zip(result.results.iter()).zip(sources.into_iter()) {
                let tokens = token::decode(plan).expect("self-generated plan is always well-formed");
                // Ping plans walk the cursor to check identity, not to grow
                // the graph: their tail end (the random-walk extension) can
                // re-enter a room already charcoaled for this same plan
                // through a door the tentative graph still thinks is
                // unopened, and the observation at that position is the
                // overwrite label, not the room's true one (§4.C7.4).
                let is_ping = matches!(source, QuerySource::Ping { .. });
                apply_observation(&mut state, &tokens, observation, !is_ping)?;
                if let QuerySource::Ping { query, b } = source {
                    ping::interpret_ping(&mut state, &query, b, observation)?;
                }
            }

            state.graph.update_all_paths();
            state.collapse_until_death()?;
            iteration += 1;
        }

        let map = guess::build_guess(&mut state)?;
        if !self.config.dry_run {
            self.oracle.guess(&map).await?;
        }
        Ok(map)
    }
}

fn first_unopened_door(state: &KnownState, room: RoomHandle) -> Option<u8> {
    (0u8..6).find(|&d| state.graph.door(room, d).destination.is_none())
}

/// Replay a plan's move tokens against the current graph, opening a
/// fresh tentative room for each position not already reachable via an
/// opened door and recording pair-bonds wherever the walk itself proves
/// one (§4.C4).
///
/// Charcoal markers don't move the cursor, so they're skipped here
/// entirely. `allow_new_rooms` must be `false` for a ping plan: its
/// random-walk tail can re-enter an already-charcoaled room through a
/// door the tentative graph still has as unopened, and the reported
/// label at that position is the charcoal overwrite, not the room's
/// true one — minting a room from it would poison its potential with a
/// fabricated identity. A ping plan's cursor walk still proves doors
/// and bonds along the way (§4.C7.4 only forbids *creating* rooms from
/// it); it simply stops in place once it runs past the known frontier.
fn apply_observation(
    state: &mut KnownState,
    tokens: &[Token],
    observation: &[u8],
    allow_new_rooms: bool,
) -> Result<(), EngineError> {
    let mut at = state.root();
    let mut idx = 0usize;
    // (room, door) of the hop before the one just taken, so a move that
    // lands back on that room proves the two doors are reciprocal
    // (§4.C6 "paired"). Reset across a self-loop leg, which carries no
    // such evidence about the door that led into it.
    let mut prior_hop: Option<(RoomHandle, u8)> = None;

    for t in tokens {
        let Token::Move(d) = t else { continue };
        idx += 1;
        let from = at;
        let slot = state.graph.door(at, *d);
        let next = match slot.destination {
            Some(h) => h,
            None => {
                if !allow_new_rooms {
                    break;
                }
                let label = observation[idx];
                let h = state.new_room(label);
                state.graph.open_door(at, *d, h)?;
                h
            }
        };

        if let Some((origin, origin_door)) = prior_hop {
            try_bounce_pair(state, origin, origin_door, from, *d, next)?;
        }
        prior_hop = if state.graph.resolve(next) != state.graph.resolve(from) {
            Some((from, *d))
        } else {
            None
        };
        at = next;
    }
    Ok(())
}

/// If door `d_out` of `from` leads straight back to `origin` — the room
/// `origin_door` led out of one hop earlier — and neither door is
/// already bonded, `origin_door` and `d_out` are each other's
/// reciprocal: that's the only way a walk can leave a room and return
/// to it in one further hop. Left unpaired otherwise (including when
/// either slot is already bonded to something else), so a later,
/// better-evidenced pairing of the same door is never blocked by a
/// premature guess.
fn try_bounce_pair(
    state: &mut KnownState,
    origin: RoomHandle,
    origin_door: u8,
    from: RoomHandle,
    d_out: u8,
    next: RoomHandle,
) -> Result<(), EngineError> {
    let origin = state.graph.resolve(origin);
    let from = state.graph.resolve(from);
    if origin == from {
        return Ok(());
    }
    if state.graph.resolve(next) != origin {
        return Ok(());
    }
    if state.graph.door(origin, origin_door).pair.is_some() || state.graph.door(from, d_out).pair.is_some() {
        return Ok(());
    }
    state.graph.pair(origin, origin_door, from, d_out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn apply_observation_opens_new_doors_and_reuses_known_ones() {
        let mut state = KnownState::new(0, 3, 3);
        let tokens = vec![Token::Move(0), Token::Move(1)];
        let observation = [0u8, 1, 2];
        apply_observation(&mut state, &tokens, &observation, true).unwrap();

        let root = state.root();
        let first = state.graph.door(root, 0).destination.unwrap();
        assert_eq!(state.graph.label(first), 1);
        let second = state.graph.door(first, 1).destination.unwrap();
        assert_eq!(state.graph.label(second), 2);

        // Replaying the same plan must not create duplicate rooms.
        apply_observation(&mut state, &tokens, &observation, true).unwrap();
        assert_eq!(state.graph.live_handles().len(), 3);
    }

    #[test]
    fn apply_observation_pairs_doors_on_an_immediate_round_trip() {
        // Doors already opened (as they would be after an earlier probe
        // discovered them, tentatively, before the two merged into a
        // single known room); replaying a plan that retraces both in one
        // pass is what actually proves the reciprocal bond.
        let mut state = KnownState::new(0, 2, 2);
        let root = state.root();
        let a = state.new_room(1);
        state.graph.open_door(root, 2, a).unwrap();
        state.graph.open_door(a, 4, root).unwrap();

        let tokens = vec![Token::Move(2), Token::Move(4)];
        let observation = [0u8, 1, 0];
        apply_observation(&mut state, &tokens, &observation, true).unwrap();

        assert_eq!(state.graph.door(root, 2).pair, Some((a, 4)));
        assert_eq!(state.graph.door(a, 4).pair, Some((root, 2)));
    }

    #[test]
    fn apply_observation_does_not_create_rooms_when_disallowed() {
        let mut state = KnownState::new(0, 3, 3);
        let tokens = vec![Token::Move(0), Token::Move(1)];
        let observation = [0u8, 1, 2];
        apply_observation(&mut state, &tokens, &observation, false).unwrap();
        // Door 0 is unopened, so the walk stops before minting any room.
        assert_eq!(state.graph.live_handles().len(), 1);
    }
}
