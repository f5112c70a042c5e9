//! ExplorationGraph (§4.C2): the in-memory tentative graph of rooms,
//! doors, and pair-bonds.
//!
//! Re-architected per §9's first Design Note: rooms live in a single
//! arena (`Vec<TentativeRoomData>`) addressed by `RoomHandle`, never by
//! owning reference. A merge (§4.C4, implemented in `state.rs`) retires
//! a handle by writing a tombstone redirect rather than tearing down a
//! cyclic object graph; `resolve` follows and path-compresses redirect
//! chains, mirroring a union-find `find`.

use std::collections::{BTreeSet, VecDeque};

use crate::error::{EngineError, Inconsistency};
use crate::token::Token;

/// Opaque handle into the room arena. Never reused — a merged-away
/// handle keeps its slot as a tombstone pointing at the surviving one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RoomHandle(pub u32);

/// One of a room's six doors.
#[derive(Debug, Clone, Copy, Default)]
pub struct DoorSlot {
    pub destination: Option<RoomHandle>,
    pub pair: Option<(RoomHandle, u8)>,
}

impl DoorSlot {
    pub fn is_opened(&self) -> bool {
        self.destination.is_some()
    }

    pub fn is_paired(&self) -> bool {
        self.pair.is_some()
    }
}

#[derive(Debug, Clone)]
pub(crate) struct TentativeRoomData {
    pub label: u8,
    pub canonical_path: Option<Vec<Token>>,
    pub doors: [DoorSlot; 6],
    pub potential: BTreeSet<u32>,
    /// Set when this room has been merged into another; `resolve`
    /// follows this chain to the live representative.
    pub redirect: Option<RoomHandle>,
}

impl TentativeRoomData {
    fn fresh(label: u8, potential: BTreeSet<u32>) -> Self {
        Self {
            label,
            canonical_path: None,
            doors: [DoorSlot::default(); 6],
            potential,
            redirect: None,
        }
    }
}

pub struct ExplorationGraph {
    pub(crate) arena: Vec<TentativeRoomData>,
    root: RoomHandle,
}

impl ExplorationGraph {
    /// Create a graph with just the root room, whose label is the one
    /// reported at plan position 0 of the first observation.
    pub fn new(root_label: u8, full_universe: BTreeSet<u32>) -> Self {
        let mut arena = Vec::new();
        arena.push(TentativeRoomData::fresh(root_label, full_universe));
        arena[0].canonical_path = Some(Vec::new());
        Self {
            arena,
            root: RoomHandle(0),
        }
    }

    pub fn root(&self) -> RoomHandle {
        self.resolve(self.root)
    }

    /// Allocate a brand new tentative room and return its handle.
    pub fn create_room(&mut self, label: u8, potential: BTreeSet<u32>) -> RoomHandle {
        let handle = RoomHandle(self.arena.len() as u32);
        self.arena.push(TentativeRoomData::fresh(label, potential));
        handle
    }

    /// Follow redirect tombstones to the live representative, with path
    /// compression (the union-find "find" of the merge model).
    pub fn resolve(&self, handle: RoomHandle) -> RoomHandle {
        let mut h = handle;
        while let Some(next) = self.arena[h.0 as usize].redirect {
            h = next;
        }
        h
    }

    /// Same as `resolve` but compresses every visited link, for callers
    /// that hold `&mut self` (the compactor).
    pub fn resolve_mut(&mut self, handle: RoomHandle) -> RoomHandle {
        let root = self.resolve(handle);
        let mut h = handle;
        while let Some(next) = self.arena[h.0 as usize].redirect {
            if next == root {
                break;
            }
            self.arena[h.0 as usize].redirect = Some(root);
            h = next;
        }
        root
    }

    pub fn label(&self, handle: RoomHandle) -> u8 {
        self.arena[self.resolve(handle).0 as usize].label
    }

    pub fn potential(&self, handle: RoomHandle) -> &BTreeSet<u32> {
        &self.arena[self.resolve(handle).0 as usize].potential
    }

    pub fn potential_mut(&mut self, handle: RoomHandle) -> &mut BTreeSet<u32> {
        let h = self.resolve_mut(handle);
        &mut self.arena[h.0 as usize].potential
    }

    pub fn is_bound(&self, handle: RoomHandle) -> bool {
        self.potential(handle).len() == 1
    }

    pub fn bound_identity(&self, handle: RoomHandle) -> Option<u32> {
        let p = self.potential(handle);
        if p.len() == 1 {
            p.iter().next().copied()
        } else {
            None
        }
    }

    /// The door slot of `handle`, with any stale destination/pair
    /// handles resolved to their live representative. Storage itself is
    /// only rewritten during a merge transaction (`state::merge`); this
    /// lazily resolves on every read so a reference recorded before a
    /// later merge still dereferences correctly (the "rewrite every
    /// reference" requirement of §4.C4 step 4, applied lazily).
    pub fn door(&self, handle: RoomHandle, d: u8) -> DoorSlot {
        let raw = self.arena[self.resolve(handle).0 as usize].doors[d as usize];
        DoorSlot {
            destination: raw.destination.map(|h| self.resolve(h)),
            pair: raw.pair.map(|(h, d)| (self.resolve(h), d)),
        }
    }

    pub fn canonical_path(&self, handle: RoomHandle) -> Option<&[Token]> {
        self.arena[self.resolve(handle).0 as usize]
            .canonical_path
            .as_deref()
    }

    pub fn set_canonical_path(&mut self, handle: RoomHandle, path: Vec<Token>) {
        let h = self.resolve_mut(handle);
        self.arena[h.0 as usize].canonical_path = Some(path);
    }

    /// All live (non-tombstoned) handles, in arena allocation order.
    /// Allocation order is a valid deterministic base order because
    /// rooms are only ever created in the single-threaded loop, in the
    /// order doors are walked (§4.C2's tie-break is applied on top of
    /// this by callers that need canonical-path ordering).
    pub fn live_handles(&self) -> Vec<RoomHandle> {
        (0..self.arena.len() as u32)
            .map(RoomHandle)
            .filter(|&h| self.arena[h.0 as usize].redirect.is_none())
            .collect()
    }

    /// Open door `d` of `room` to point at `dest`. If already opened to
    /// a *different* live room, that's `InconsistentOpen` — the caller
    /// (the compactor) is responsible for merging tentative rooms
    /// before this would ever legitimately fire twice for the same
    /// hidden room.
    pub fn open_door(
        &mut self,
        room: RoomHandle,
        d: u8,
        dest: RoomHandle,
    ) -> Result<(), Inconsistency> {
        let room = self.resolve_mut(room);
        let dest = self.resolve_mut(dest);
        let existing = self.arena[room.0 as usize].doors[d as usize].destination;
        match existing {
            None => {
                self.arena[room.0 as usize].doors[d as usize].destination = Some(dest);
                Ok(())
            }
            Some(e) if self.resolve(e) == dest => Ok(()),
            Some(e) => Err(Inconsistency::InconsistentOpen {
                room,
                door: d,
                existing: self.resolve(e),
                attempted: dest,
            }),
        }
    }

    /// Bond door `d` of `room` with door `d2` of `room2`, symmetrically.
    pub fn pair(
        &mut self,
        room: RoomHandle,
        d: u8,
        room2: RoomHandle,
        d2: u8,
    ) -> Result<(), Inconsistency> {
        let room = self.resolve_mut(room);
        let room2 = self.resolve_mut(room2);

        let existing_a = self.arena[room.0 as usize].doors[d as usize].pair;
        if let Some((er, ed)) = existing_a {
            if self.resolve(er) != room2 || ed != d2 {
                return Err(Inconsistency::PairConflict { room, door: d });
            }
        }
        let existing_b = self.arena[room2.0 as usize].doors[d2 as usize].pair;
        if let Some((er, ed)) = existing_b {
            if self.resolve(er) != room || ed != d {
                return Err(Inconsistency::PairConflict {
                    room: room2,
                    door: d2,
                });
            }
        }
        self.arena[room.0 as usize].doors[d as usize].pair = Some((room2, d2));
        self.arena[room2.0 as usize].doors[d2 as usize].pair = Some((room, d));
        Ok(())
    }

    /// Force door `d` of `room` to point at `dest`, bypassing the
    /// `InconsistentOpen` check. Used only by the compactor while
    /// transplanting a retired room's door knowledge onto its survivor.
    pub(crate) fn force_set_destination(&mut self, room: RoomHandle, d: u8, dest: RoomHandle) {
        let room = self.resolve_mut(room);
        self.arena[room.0 as usize].doors[d as usize].destination = Some(dest);
    }

    pub(crate) fn force_set_pair(&mut self, room: RoomHandle, d: u8, pair: Option<(RoomHandle, u8)>) {
        let room = self.resolve_mut(room);
        self.arena[room.0 as usize].doors[d as usize].pair = pair;
    }

    /// Tombstone `retired`, redirecting it (and its resolve chain) to
    /// `survivor`. Caller must have already transplanted any door/pair/
    /// potential knowledge it wants preserved.
    pub(crate) fn set_redirect(&mut self, retired: RoomHandle, survivor: RoomHandle) {
        self.arena[retired.0 as usize].redirect = Some(survivor);
    }

    /// Raw, unresolved door slot — used by the compactor to read a
    /// room's own doors immediately before retiring it, where we want
    /// the exact stored values rather than a lazily re-resolved view.
    pub(crate) fn raw_door(&self, room: RoomHandle, d: u8) -> DoorSlot {
        self.arena[room.0 as usize].doors[d as usize]
    }

    /// A cursor walking the graph from a fixed starting room.
    pub fn cursor(&self, start: RoomHandle) -> Cursor<'_> {
        Cursor {
            graph: self,
            at: self.resolve(start),
        }
    }

    /// Shortest plan from root to `handle` using only opened doors,
    /// ties broken by ascending door id at each step (§4.C2).
    pub fn path_to(&self, handle: RoomHandle) -> Result<Vec<Token>, EngineError> {
        let target = self.resolve(handle);
        self.bfs_path(self.root(), |h| h == target)
            .ok_or(EngineError::Unreachable(target))
    }

    /// Shortest plan from `from` to any room satisfying `predicate`,
    /// again breaking ties by ascending door id.
    pub fn path_from(
        &self,
        from: RoomHandle,
        predicate: impl Fn(RoomHandle) -> bool,
    ) -> Option<(Vec<Token>, RoomHandle)> {
        let start = self.resolve(from);
        let path = self.bfs_path(start, &predicate)?;
        let dest = self.walk_path(start, &path).expect("path was just found by BFS");
        Some((path, dest))
    }

    fn bfs_path(
        &self,
        start: RoomHandle,
        predicate: impl Fn(RoomHandle) -> bool,
    ) -> Option<Vec<Token>> {
        if predicate(start) {
            return Some(Vec::new());
        }
        let mut visited = std::collections::HashSet::new();
        visited.insert(start);
        let mut queue = VecDeque::new();
        queue.push_back((start, Vec::<Token>::new()));

        while let Some((at, path)) = queue.pop_front() {
            for d in 0u8..6 {
                let slot = self.door(at, d);
                let Some(dest) = slot.destination else {
                    continue;
                };
                let dest = self.resolve(dest);
                if !visited.insert(dest) {
                    continue;
                }
                let mut next_path = path.clone();
                next_path.push(Token::Move(d));
                if predicate(dest) {
                    return Some(next_path);
                }
                queue.push_back((dest, next_path));
            }
        }
        None
    }

    /// Refresh the canonical path of every room reachable from root by
    /// a single BFS (§4.C2 `updateAllPaths`).
    pub fn update_all_paths(&mut self) {
        let root = self.root();
        let mut visited = std::collections::HashSet::new();
        visited.insert(root);
        let mut queue = VecDeque::new();
        queue.push_back((root, Vec::<Token>::new()));
        let mut updates = Vec::new();

        while let Some((at, path)) = queue.pop_front() {
            updates.push((at, path.clone()));
            for d in 0u8..6 {
                let slot = self.door(at, d);
                let Some(dest) = slot.destination else {
                    continue;
                };
                let dest = self.resolve(dest);
                if !visited.insert(dest) {
                    continue;
                }
                let mut next_path = path.clone();
                next_path.push(Token::Move(d));
                queue.push_back((dest, next_path));
            }
        }

        for (handle, path) in updates {
            self.set_canonical_path(handle, path);
        }
    }

    /// Walk `path` from `start`, following only opened doors. Used to
    /// recover the destination of a path already known to exist.
    fn walk_path(&self, start: RoomHandle, path: &[Token]) -> Result<RoomHandle, EngineError> {
        let mut at = self.resolve(start);
        for t in path {
            let Token::Move(d) = t else { continue };
            let slot = self.door(at, *d);
            let Some(dest) = slot.destination else {
                return Err(EngineError::DeadEnd { room: at, door: *d });
            };
            at = self.resolve(dest);
        }
        Ok(at)
    }
}

/// A mutable walker over the graph, used by the exploration loop to
/// replay an observed plan.
pub struct Cursor<'g> {
    graph: &'g ExplorationGraph,
    at: RoomHandle,
}

impl<'g> Cursor<'g> {
    pub fn at(&self) -> RoomHandle {
        self.at
    }

    pub fn move_through(&mut self, door: u8) -> Result<RoomHandle, EngineError> {
        let slot = self.graph.door(self.at, door);
        match slot.destination {
            Some(dest) => {
                self.at = self.graph.resolve(dest);
                Ok(self.at)
            }
            None => Err(EngineError::DeadEnd {
                room: self.at,
                door,
            }),
        }
    }
}
