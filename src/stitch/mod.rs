//! The stitch graph (§4.A): an arena of stitches addressed by integer id, with course (≤2) and
//! wale (unbounded) neighbor sets stored as id-sets rather than owning references, per §9's
//! note on cyclic structures.

pub mod metadata;

use crate::pattern::Pattern;
use metadata::{Context, MetaValue, Metadata, NO_CONTEXT};
use std::collections::{BTreeSet, HashSet, VecDeque};

pub type StitchId = u64;

/// a three-valued side tag (§9): `other(Both) == Both`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum Side {
    Front,
    Back,
    Both,
}

impl crate::Arbitrary for Side {
    fn random(rng: &mut rand::rngs::SmallRng) -> Self {
        use rand::Rng;
        match rng.gen_range(0..3) {
            0 => Side::Front,
            1 => Side::Back,
            _ => Side::Both,
        }
    }
}

impl Side {
    pub fn other(self) -> Side {
        match self {
            Side::Front => Side::Back,
            Side::Back => Side::Front,
            Side::Both => Side::Both,
        }
    }

    /// the 2-bit mask used by `Course::reset` (§4.B): front=1, back=2, both=3
    pub fn mask(self) -> u8 {
        match self {
            Side::Front => 0b01,
            Side::Back => 0b10,
            Side::Both => 0b11,
        }
    }

    pub fn from_mask(mask: u8) -> Side {
        match mask & 0b11 {
            0b01 => Side::Front,
            0b10 => Side::Back,
            _ => Side::Both,
        }
    }
}

/// three-valued yarn direction (§9): CW=+1, CCW=-1, 0=invalid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Cw,
    Ccw,
    Invalid,
}

impl Direction {
    pub fn sign(self) -> i32 {
        match self {
            Direction::Cw => 1,
            Direction::Ccw => -1,
            Direction::Invalid => 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectMode {
    Course,
    Wale,
}

#[derive(Debug, Clone)]
pub struct Stitch {
    pub id: StitchId,
    courses: BTreeSet<StitchId>,
    wales: BTreeSet<StitchId>,
    pub pattern: Pattern,
    pub modifier: i32,
    pub mark: i32,
    pub unrestricted: bool,
    metadata: Metadata,
}

impl Stitch {
    fn new(id: StitchId) -> Self {
        Self {
            id,
            courses: BTreeSet::new(),
            wales: BTreeSet::new(),
            pattern: Pattern::default(),
            modifier: 0,
            mark: 0,
            unrestricted: false,
            metadata: Metadata::new(),
        }
    }

    pub fn courses(&self) -> &BTreeSet<StitchId> {
        &self.courses
    }

    pub fn wales(&self) -> &BTreeSet<StitchId> {
        &self.wales
    }

    /// every stitch directly reachable by a course or wale edge
    pub fn neighbors(&self) -> BTreeSet<StitchId> {
        self.courses.union(&self.wales).copied().collect()
    }

    /// fewer than two course neighbors: a chain end
    pub fn is_endpoint(&self) -> bool {
        self.courses.len() < 2
    }

    /// exactly two course neighbors: mid-chain
    pub fn is_internal(&self) -> bool {
        self.courses.len() == 2
    }

    /// a course endpoint with no wale neighbors at all (never produced, never consumed)
    pub fn is_boundary(&self) -> bool {
        self.is_endpoint() && self.wales.is_empty()
    }

    pub fn meta(&self, name: &str, context: Option<Context>) -> Vec<&MetaValue> {
        self.metadata.get(name, context)
    }

    pub fn set_meta(&mut self, name: impl Into<String>, context: Context, value: impl Into<MetaValue>) {
        self.metadata.push(name, context, value.into());
    }

    pub fn set_meta_default(&mut self, name: impl Into<String>, value: impl Into<MetaValue>) {
        self.metadata.push(name, NO_CONTEXT, value.into());
    }
}

/// an arena of stitches. Implementations that parallelize across independent shape groups (§5)
/// give each worker its own `StitchGraph` with its own id space.
#[derive(Debug, Default)]
pub struct StitchGraph {
    arena: std::collections::HashMap<StitchId, Stitch>,
    next_id: StitchId,
}

impl StitchGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// reset the id generator; exposed for deterministic testing (§5)
    pub fn reset(&mut self) {
        self.arena.clear();
        self.next_id = 0;
    }

    pub fn alloc(&mut self) -> StitchId {
        let id = self.next_id;
        self.next_id += 1;
        self.arena.insert(id, Stitch::new(id));
        id
    }

    pub fn get(&self, id: StitchId) -> &Stitch {
        self.arena.get(&id).expect("stitch id must exist in this arena")
    }

    pub fn get_mut(&mut self, id: StitchId) -> &mut Stitch {
        self.arena.get_mut(&id).expect("stitch id must exist in this arena")
    }

    pub fn len(&self) -> usize {
        self.arena.len()
    }

    pub fn is_empty(&self) -> bool {
        self.arena.is_empty()
    }

    /// `connect(a, b, Course)` fails with *TooManyCourseNeighbors* if either side would exceed
    /// two course neighbors (§4.A, fatal per §7).
    pub fn connect(&mut self, a: StitchId, b: StitchId, mode: ConnectMode) {
        match mode {
            ConnectMode::Course => {
                assert!(
                    self.get(a).courses.len() < 2,
                    "TooManyCourseNeighbors: stitch {} already has two course neighbors",
                    a
                );
                assert!(
                    self.get(b).courses.len() < 2,
                    "TooManyCourseNeighbors: stitch {} already has two course neighbors",
                    b
                );
                self.get_mut(a).courses.insert(b);
                self.get_mut(b).courses.insert(a);
            }
            ConnectMode::Wale => {
                self.get_mut(a).wales.insert(b);
                self.get_mut(b).wales.insert(a);
            }
        }
    }

    pub fn disconnect(&mut self, a: StitchId, b: StitchId, mode: ConnectMode) {
        match mode {
            ConnectMode::Course => {
                self.get_mut(a).courses.remove(&b);
                self.get_mut(b).courses.remove(&a);
            }
            ConnectMode::Wale => {
                self.get_mut(a).wales.remove(&b);
                self.get_mut(b).wales.remove(&a);
            }
        }
    }

    /// symmetrically remove every course and/or wale edge touching `s`
    pub fn clear(&mut self, s: StitchId, mode: Option<ConnectMode>) {
        let clear_courses = mode.map_or(true, |m| m == ConnectMode::Course);
        let clear_wales = mode.map_or(true, |m| m == ConnectMode::Wale);
        if clear_courses {
            for other in self.get(s).courses.clone() {
                self.disconnect(s, other, ConnectMode::Course);
            }
        }
        if clear_wales {
            for other in self.get(s).wales.clone() {
                self.disconnect(s, other, ConnectMode::Wale);
            }
        }
    }

    /// transfer all wales and metadata of `other` into `self`, then empty `other`'s course set
    /// (§4.A). `other` is never deallocated (arena-style, §3) — it survives as an orphan node.
    pub fn merge(&mut self, into: StitchId, other: StitchId) {
        let wales: Vec<StitchId> = self.get(other).wales.iter().copied().collect();
        for w in wales {
            self.disconnect(other, w, ConnectMode::Wale);
            if w != into {
                self.connect(into, w, ConnectMode::Wale);
            }
        }
        let other_meta = std::mem::take(&mut self.arena.get_mut(&other).unwrap().metadata);
        self.arena.get_mut(&into).unwrap().metadata.absorb(other_meta);
        self.clear(other, Some(ConnectMode::Course));
    }

    /// full connected component of `start` by BFS over courses + wales
    pub fn all(&self, start: StitchId) -> Vec<StitchId> {
        let mut seen = HashSet::new();
        let mut queue = VecDeque::new();
        seen.insert(start);
        queue.push_back(start);
        let mut order = Vec::new();
        while let Some(id) = queue.pop_front() {
            order.push(id);
            for n in self.get(id).neighbors() {
                if seen.insert(n) {
                    queue.push_back(n);
                }
            }
        }
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connect_is_symmetric() {
        let mut g = StitchGraph::new();
        let a = g.alloc();
        let b = g.alloc();
        g.connect(a, b, ConnectMode::Course);
        assert!(g.get(a).courses().contains(&b));
        assert!(g.get(b).courses().contains(&a));
    }

    #[test]
    #[should_panic(expected = "TooManyCourseNeighbors")]
    fn third_course_neighbor_panics() {
        let mut g = StitchGraph::new();
        let a = g.alloc();
        let b = g.alloc();
        let c = g.alloc();
        let d = g.alloc();
        g.connect(a, b, ConnectMode::Course);
        g.connect(a, c, ConnectMode::Course);
        g.connect(a, d, ConnectMode::Course);
    }

    #[test]
    fn merge_transfers_wales_and_metadata_and_clears_courses() {
        let mut g = StitchGraph::new();
        let a = g.alloc();
        let b = g.alloc();
        let w = g.alloc();
        let c = g.alloc();
        g.connect(b, w, ConnectMode::Wale);
        g.connect(a, c, ConnectMode::Course);
        g.connect(b, c, ConnectMode::Course);
        g.get_mut(b).set_meta_default("tag", "from-b");

        g.merge(a, b);

        assert!(g.get(a).wales().contains(&w));
        assert!(g.get(w).wales().contains(&a));
        assert!(g.get(b).courses().is_empty());
        assert_eq!(g.get(a).meta("tag", None), vec![&MetaValue::Str("from-b".into())]);
    }

    #[test]
    fn all_finds_the_full_connected_component() {
        let mut g = StitchGraph::new();
        let a = g.alloc();
        let b = g.alloc();
        let c = g.alloc();
        let isolated = g.alloc();
        g.connect(a, b, ConnectMode::Course);
        g.connect(b, c, ConnectMode::Wale);
        let mut component = g.all(a);
        component.sort();
        assert_eq!(component, vec![a, b, c]);
        assert!(!component.contains(&isolated));
    }

    #[test]
    fn other_of_both_is_both() {
        assert_eq!(Side::Both.other(), Side::Both);
        assert_eq!(Side::Front.other(), Side::Back);
    }
}
