//! KnownState and the Compactor (§4.C3 / §4.C4).
//!
//! `KnownState` owns the `ExplorationGraph` plus the `definedRooms`
//! slot table; it is the only place potential sets are narrowed and
//! the only place tentative rooms are merged, matching §4.C4's "the
//! only place rooms disappear or identities harden."

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::error::Inconsistency;
use crate::graph::{ExplorationGraph, RoomHandle};
use crate::token::Token;

pub struct KnownState {
    pub graph: ExplorationGraph,
    pub n: usize,
    /// Distinguishing depth k used by `isDifferent`.
    pub depth: usize,
    /// `definedRooms[i]` — the bound room currently holding identity
    /// `i`, if any.
    pub defined_rooms: Vec<Option<RoomHandle>>,
}

impl KnownState {
    pub fn new(root_label: u8, n: usize, depth: usize) -> Self {
        assert!(n >= 1, "a library must have at least one room");
        let universe: BTreeSet<u32> = (0..n as u32).collect();
        let graph = ExplorationGraph::new(root_label, universe);
        let mut state = Self {
            graph,
            n,
            depth,
            defined_rooms: vec![None; n],
        };
        let root = state.graph.root();
        state.register_if_bound(root);
        state
    }

    pub fn root(&self) -> RoomHandle {
        self.graph.root()
    }

    fn register_if_bound(&mut self, handle: RoomHandle) {
        let h = self.graph.resolve(handle);
        if let Some(id) = self.graph.bound_identity(h) {
            self.defined_rooms[id as usize] = Some(h);
        }
    }

    /// Create a new tentative room for an as-yet-unidentified door
    /// destination. Initial potential is the full identity universe
    /// minus any identity already proven to carry a different label
    /// (§3 lifecycle: "initial potential = {0..N−1} minus already-
    /// excluded identities").
    pub fn new_room(&mut self, label: u8) -> RoomHandle {
        let mut potential: BTreeSet<u32> = (0..self.n as u32).collect();
        for (i, slot) in self.defined_rooms.iter().enumerate() {
            if let Some(h) = slot {
                if self.graph.label(*h) != label {
                    potential.remove(&(i as u32));
                }
            }
        }
        let handle = self.graph.create_room(label, potential);
        self.register_if_bound(handle);
        handle
    }

    pub fn unbound_rooms(&self) -> Vec<RoomHandle> {
        self.graph
            .live_handles()
            .into_iter()
            .filter(|&h| !self.graph.is_bound(h))
            .collect()
    }

    pub fn bound_rooms(&self) -> Vec<(u32, RoomHandle)> {
        self.defined_rooms
            .iter()
            .enumerate()
            .filter_map(|(i, h)| h.map(|h| (i as u32, h)))
            .collect()
    }

    /// Structural inequality test (§4.C4): true iff the two rooms can be
    /// proven to denote different hidden rooms by label mismatch or by
    /// recursive disagreement along opened doors, within `depth` hops.
    /// Memoizes visited pairs so cycles in the opened-door graph don't
    /// cause exponential blowup (a pair already being checked is
    /// provisionally treated as "not yet proven different").
    pub fn is_different(&self, a: RoomHandle, b: RoomHandle, depth: usize) -> bool {
        let mut visiting = HashSet::new();
        self.is_different_inner(a, b, depth, &mut visiting)
    }

    fn is_different_inner(
        &self,
        a: RoomHandle,
        b: RoomHandle,
        depth: usize,
        visiting: &mut HashSet<(RoomHandle, RoomHandle)>,
    ) -> bool {
        let a = self.graph.resolve(a);
        let b = self.graph.resolve(b);
        if a == b {
            return false;
        }
        if self.graph.label(a) != self.graph.label(b) {
            return true;
        }
        let key = if a < b { (a, b) } else { (b, a) };
        if !visiting.insert(key) {
            return false;
        }
        if depth == 0 {
            return false;
        }
        for d in 0u8..6 {
            let da = self.graph.door(a, d);
            let db = self.graph.door(b, d);
            if let (Some(x), Some(y)) = (da.destination, db.destination) {
                if self.is_different_inner(x, y, depth - 1, visiting) {
                    return true;
                }
            }
        }
        false
    }

    /// Merge two tentative rooms proven (or assumed, via a ping
    /// confirmation) to denote the same hidden room. Symmetric; uses an
    /// explicit worklist rather than recursion for the cascading
    /// destination merges of §4.C4 step 2.
    pub fn merge(&mut self, a: RoomHandle, b: RoomHandle) -> Result<(), Inconsistency> {
        let mut worklist: VecDeque<(RoomHandle, RoomHandle)> = VecDeque::new();
        worklist.push_back((a, b));
        while let Some((x, y)) = worklist.pop_front() {
            let x = self.graph.resolve(x);
            let y = self.graph.resolve(y);
            if x == y {
                continue;
            }
            self.merge_pair(x, y, &mut worklist)?;
        }
        Ok(())
    }

    fn merge_pair(
        &mut self,
        a: RoomHandle,
        b: RoomHandle,
        worklist: &mut VecDeque<(RoomHandle, RoomHandle)>,
    ) -> Result<(), Inconsistency> {
        // Step 1: potential intersection.
        let intersected: BTreeSet<u32> = self
            .graph
            .potential(a)
            .intersection(self.graph.potential(b))
            .copied()
            .collect();
        if intersected.is_empty() {
            return Err(Inconsistency::MergeContradiction { a, b });
        }

        // Deterministic survivor: the lexicographically smaller
        // canonical path wins (§4.C4 step 5), tie-broken by handle id.
        let (survivor, retired) = if path_cmp(self.graph.canonical_path(a), self.graph.canonical_path(b))
            != std::cmp::Ordering::Greater
        {
            (a, b)
        } else {
            (b, a)
        };

        // Step 2/3: transplant doors and pair bonds from retired onto
        // survivor, recursively merging destinations that disagree.
        for d in 0u8..6 {
            let sd = self.graph.raw_door(survivor, d);
            let rd = self.graph.raw_door(retired, d);

            match (sd.destination, rd.destination) {
                (None, Some(rdest)) => {
                    self.graph.force_set_destination(survivor, d, rdest);
                }
                (Some(sdest), Some(rdest)) => {
                    let sdest = self.graph.resolve(sdest);
                    let rdest = self.graph.resolve(rdest);
                    if sdest != rdest {
                        worklist.push_back((sdest, rdest));
                    }
                }
                _ => {}
            }

            match (sd.pair, rd.pair) {
                (None, Some((rpartner, rpd))) => {
                    let rpartner = self.graph.resolve(rpartner);
                    self.graph.force_set_pair(survivor, d, Some((rpartner, rpd)));
                    self.graph.force_set_pair(rpartner, rpd, Some((survivor, d)));
                }
                (Some((spartner, spd)), Some((rpartner, rpd))) => {
                    let spartner = self.graph.resolve(spartner);
                    let rpartner = self.graph.resolve(rpartner);
                    if spartner == rpartner && spd == rpd {
                        // already consistent
                    } else {
                        let s_consistent = self.graph.door(spartner, spd).pair.map(|(h, _)| h)
                            == Some(survivor)
                            || self.graph.door(spartner, spd).pair.map(|(h, _)| h) == Some(retired);
                        let r_consistent = self.graph.door(rpartner, rpd).pair.map(|(h, _)| h)
                            == Some(survivor)
                            || self.graph.door(rpartner, rpd).pair.map(|(h, _)| h) == Some(retired);
                        if s_consistent && !r_consistent {
                            self.graph.force_set_pair(spartner, spd, Some((survivor, d)));
                        } else if r_consistent && !s_consistent {
                            self.graph.force_set_pair(survivor, d, Some((rpartner, rpd)));
                            self.graph.force_set_pair(rpartner, rpd, Some((survivor, d)));
                        } else {
                            return Err(Inconsistency::PairConflict { room: survivor, door: d });
                        }
                    }
                }
                _ => {}
            }
        }

        *self.graph.potential_mut(survivor) = intersected;

        let best_path = match (
            self.graph.canonical_path(survivor).map(<[Token]>::to_vec),
            self.graph.canonical_path(retired).map(<[Token]>::to_vec),
        ) {
            (Some(sp), Some(rp)) => {
                if path_cmp(Some(&rp), Some(&sp)) == std::cmp::Ordering::Less {
                    Some(rp)
                } else {
                    Some(sp)
                }
            }
            (Some(sp), None) => Some(sp),
            (None, Some(rp)) => Some(rp),
            (None, None) => None,
        };
        if let Some(p) = best_path {
            self.graph.set_canonical_path(survivor, p);
        }

        self.graph.set_redirect(retired, survivor);
        // Any defined_rooms slot that pointed at `retired` now points
        // at a tombstone; re-point it at the survivor.
        for slot in self.defined_rooms.iter_mut() {
            if *slot == Some(retired) {
                *slot = Some(survivor);
            }
        }
        self.register_if_bound(survivor);
        Ok(())
    }

    pub fn ping_eliminate(&mut self, room: RoomHandle, identity: u32) -> Result<(), Inconsistency> {
        let h = self.graph.resolve(room);
        let p = self.graph.potential_mut(h);
        p.remove(&identity);
        if p.is_empty() {
            return Err(Inconsistency::MergeContradiction { a: h, b: h });
        }
        self.register_if_bound(h);
        Ok(())
    }

    /// A ping confirmation that `room` equals `bound_room` is exactly a
    /// merge: intersecting `room`'s potential with the (singleton)
    /// potential of `bound_room` either narrows it to that identity or
    /// proves a contradiction.
    pub fn ping_confirm(&mut self, room: RoomHandle, bound_room: RoomHandle) -> Result<(), Inconsistency> {
        self.merge(room, bound_room)
    }

    /// Run label filter + structural test to fixpoint, then cardinality
    /// collapse, then process any merges those narrowings exposed —
    /// repeated until a full sweep makes no change (§4.C4
    /// `collapseUntilDeath`).
    pub fn collapse_until_death(&mut self) -> Result<(), Inconsistency> {
        loop {
            let mut changed = self.label_and_structural_pass()?;
            changed |= self.cardinality_collapse_pass();
            changed |= self.process_pending_merges()?;
            if !changed {
                break;
            }
        }
        Ok(())
    }

    fn label_and_structural_pass(&mut self) -> Result<bool, Inconsistency> {
        let mut changed = false;
        let bound = self.bound_rooms();
        for room in self.graph.live_handles() {
            if self.graph.is_bound(room) {
                continue;
            }
            let room_label = self.graph.label(room);
            let mut remove_ids = Vec::new();
            for &(id, bh) in &bound {
                if self.graph.resolve(bh) == room {
                    continue;
                }
                if !self.graph.potential(room).contains(&id) {
                    continue;
                }
                if self.graph.label(bh) != room_label || self.is_different(room, bh, self.depth) {
                    remove_ids.push(id);
                }
            }
            if !remove_ids.is_empty() {
                let p = self.graph.potential_mut(room);
                for id in remove_ids {
                    p.remove(&id);
                }
                changed = true;
            }
            if self.graph.potential(room).is_empty() {
                return Err(Inconsistency::MergeContradiction { a: room, b: room });
            }
            self.register_if_bound(room);
        }
        Ok(changed)
    }

    /// §4.C3 cardinality collapse, gated (per the Open Question
    /// resolution in SPEC_FULL.md / DESIGN.md) to run only after label
    /// filter and structural test have reached fixpoint for this sweep.
    /// A room whose potential retains exactly one identity not already
    /// claimed by some other bound room must be that identity, even if
    /// the label/structural filter hasn't yet managed to rule out every
    /// already-bound id still technically present in its potential.
    /// Processed in deterministic canonical-path order so repeated runs
    /// over the same state produce the same assignment.
    fn cardinality_collapse_pass(&mut self) -> bool {
        let bound_count = self.defined_rooms.iter().filter(|x| x.is_some()).count();
        if bound_count >= self.n {
            return false;
        }

        let mut candidates: Vec<RoomHandle> = self
            .graph
            .live_handles()
            .into_iter()
            .filter(|&h| !self.graph.is_bound(h))
            .collect();
        candidates.sort_by(|&a, &b| path_sort_key(self.graph.canonical_path(a)).cmp(&path_sort_key(self.graph.canonical_path(b))));

        let mut changed = false;
        for room in candidates {
            if self.graph.is_bound(room) {
                continue;
            }
            let free: Vec<u32> = self
                .graph
                .potential(room)
                .iter()
                .copied()
                .filter(|id| self.defined_rooms[*id as usize].is_none())
                .collect();
            if free.len() == 1 {
                let id = free[0];
                *self.graph.potential_mut(room) = BTreeSet::from([id]);
                self.defined_rooms[id as usize] = Some(self.graph.resolve(room));
                changed = true;
            }
        }
        changed
    }

    fn process_pending_merges(&mut self) -> Result<bool, Inconsistency> {
        let mut changed = false;
        loop {
            let mut by_id: HashMap<u32, RoomHandle> = HashMap::new();
            let mut pair = None;
            for h in self.graph.live_handles() {
                if let Some(id) = self.graph.bound_identity(h) {
                    if let Some(&existing) = by_id.get(&id) {
                        if existing != h {
                            pair = Some((existing, h));
                            break;
                        }
                    } else {
                        by_id.insert(id, h);
                    }
                }
            }
            match pair {
                Some((x, y)) => {
                    self.merge(x, y)?;
                    changed = true;
                }
                None => break,
            }
        }
        Ok(changed)
    }

    /// Termination condition of §4.C7.6: every identity bound, every
    /// door of every bound room opened and pointing at a bound room.
    pub fn is_complete(&self) -> bool {
        let bound_count = self.defined_rooms.iter().filter(|x| x.is_some()).count();
        if bound_count != self.n {
            return false;
        }
        for room in self.graph.live_handles() {
            if !self.graph.is_bound(room) {
                return false;
            }
            for d in 0u8..6 {
                let slot = self.graph.door(room, d);
                match slot.destination {
                    None => return false,
                    Some(dest) => {
                        if !self.graph.is_bound(dest) {
                            return false;
                        }
                    }
                }
            }
        }
        true
    }
}

fn path_sort_key(path: Option<&[Token]>) -> (usize, Vec<u8>) {
    match path {
        Some(p) => (
            p.len(),
            p.iter()
                .map(|t| match t {
                    Token::Move(d) => *d,
                    Token::Charcoal(_) => 0,
                })
                .collect(),
        ),
        None => (usize::MAX, Vec::new()),
    }
}

fn path_cmp(a: Option<&[Token]>, b: Option<&[Token]>) -> std::cmp::Ordering {
    path_sort_key(a).cmp(&path_sort_key(b))
}
