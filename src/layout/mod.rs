//! The layout tree (§4.C): a strict tree of groups (single owning parent per node), modeled as
//! an arena of nodes addressed by index with owned child lists and non-owning parent back-links,
//! per §9's note on cyclic/tree structures.

pub mod builder;
pub mod optimizer;

use crate::course::Course;
use crate::stitch::{Side, StitchGraph, StitchId};
use crate::{Needle, Time};
use std::collections::{BTreeSet, HashMap};

pub type LayoutId = usize;

#[derive(Debug, Clone)]
pub struct Leaf {
    pub shape_ref: Option<u64>,
    pub course_id: Option<u64>,
    pub course: Course,
    pub suspended: Vec<StitchId>,
    pub susp_map: HashMap<StitchId, (Needle, Side)>,
    pub links: BTreeSet<LayoutId>,
}

impl Leaf {
    fn new(course: Course) -> Self {
        Self {
            shape_ref: None,
            course_id: None,
            course,
            suspended: Vec::new(),
            susp_map: HashMap::new(),
            links: BTreeSet::new(),
        }
    }

    /// suspend `stitches` inside this leaf, carrying their last-known `(index, side)` (§4.D)
    pub fn suspend(&mut self, stitches: &[StitchId], positions: &HashMap<StitchId, (Needle, Side)>) {
        for &s in stitches {
            if let Some(&pos) = positions.get(&s) {
                self.susp_map.insert(s, pos);
            }
            if !self.suspended.contains(&s) {
                self.suspended.push(s);
            }
        }
    }

    /// min/max needle index and per-side presence among this leaf's own stitches (course +
    /// suspended), without walking to parents (§3 `susp_meta` cache)
    pub fn susp_meta(&self) -> (Needle, Needle, bool, bool) {
        let mut lo = Needle::MAX;
        let mut hi = Needle::MIN;
        let mut has_front = false;
        let mut has_back = false;
        for s in self.course.stitches_slice() {
            let (idx, side) = self.course.needle_of(*s, 0, false);
            lo = lo.min(idx);
            hi = hi.max(idx);
            match side {
                Side::Front => has_front = true,
                Side::Back => has_back = true,
                Side::Both => {
                    has_front = true;
                    has_back = true;
                }
            }
        }
        for (_, (idx, side)) in &self.susp_map {
            lo = lo.min(*idx);
            hi = hi.max(*idx);
            match side {
                Side::Front => has_front = true,
                Side::Back => has_back = true,
                Side::Both => {
                    has_front = true;
                    has_back = true;
                }
            }
        }
        if lo > hi {
            (0, -1, false, false)
        } else {
            (lo, hi, has_front, has_back)
        }
    }
}

#[derive(Debug, Clone)]
pub enum Data {
    Leaf(Leaf),
    Internal(Vec<LayoutId>),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub id: LayoutId,
    pub parent: Option<LayoutId>,
    pub time: Time,
    pub offset: Needle,
    pub flip: bool,
    pub data: Data,
}

/// the arena owning every layout node in a compilation run
#[derive(Debug, Default)]
pub struct LayoutArena {
    nodes: Vec<Node>,
}

impl LayoutArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: LayoutId) -> &Node {
        &self.nodes[id]
    }
    pub fn node_mut(&mut self, id: LayoutId) -> &mut Node {
        &mut self.nodes[id]
    }

    pub fn new_leaf(&mut self, course: Course) -> LayoutId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            id,
            parent: None,
            time: 0,
            offset: 0,
            flip: false,
            data: Data::Leaf(Leaf::new(course)),
        });
        id
    }

    /// wrap `children` (already in the arena) in a new internal node; each child's `parent` is
    /// set, enforcing single ownership (§3 invariant)
    pub fn new_internal(&mut self, children: Vec<LayoutId>) -> LayoutId {
        let id = self.nodes.len();
        for &c in &children {
            assert!(self.nodes[c].parent.is_none(), "layout node {} already has a parent", c);
        }
        self.nodes.push(Node {
            id,
            parent: None,
            time: 0,
            offset: 0,
            flip: false,
            data: Data::Internal(children.clone()),
        });
        for c in children {
            self.nodes[c].parent = Some(id);
        }
        id
    }

    pub fn leaf(&self, id: LayoutId) -> Option<&Leaf> {
        match &self.nodes[id].data {
            Data::Leaf(l) => Some(l),
            Data::Internal(_) => None,
        }
    }
    pub fn leaf_mut(&mut self, id: LayoutId) -> Option<&mut Leaf> {
        match &mut self.nodes[id].data {
            Data::Leaf(l) => Some(l),
            Data::Internal(_) => None,
        }
    }
    pub fn children(&self, id: LayoutId) -> &[LayoutId] {
        match &self.nodes[id].data {
            Data::Internal(c) => c,
            Data::Leaf(_) => &[],
        }
    }

    /// every leaf id in `id`'s subtree, in left-to-right order
    pub fn leaves_of(&self, id: LayoutId) -> Vec<LayoutId> {
        match &self.nodes[id].data {
            Data::Leaf(_) => vec![id],
            Data::Internal(children) => children.iter().flat_map(|&c| self.leaves_of(c)).collect(),
        }
    }

    pub fn stitches(&self, id: LayoutId) -> Vec<StitchId> {
        match &self.nodes[id].data {
            Data::Leaf(l) => {
                let mut v: Vec<StitchId> = l.course.stitches_slice().to_vec();
                v.extend(l.suspended.iter().copied());
                v
            }
            Data::Internal(children) => children.iter().flat_map(|&c| self.stitches(c)).collect(),
        }
    }

    /// `front|back<<1` union mask across the subtree (§4.B side semantics)
    pub fn side(&self, id: LayoutId) -> Side {
        match &self.nodes[id].data {
            Data::Leaf(l) => l.course.side(),
            Data::Internal(children) => {
                let mut mask = 0u8;
                for &c in children {
                    mask |= self.side(c).mask();
                }
                Side::from_mask(mask)
            }
        }
    }

    /// `(min_index, max_index)` in this node's own local transform (not walking to parents)
    pub fn extents(&self, id: LayoutId) -> (Needle, Needle) {
        match &self.nodes[id].data {
            Data::Leaf(l) => {
                let (lo, hi, _, _) = l.susp_meta();
                let node = &self.nodes[id];
                if lo > hi {
                    (node.offset, node.offset)
                } else {
                    (lo + node.offset, hi + node.offset)
                }
            }
            Data::Internal(children) => {
                let mut lo = Needle::MAX;
                let mut hi = Needle::MIN;
                for &c in children {
                    let (clo, chi) = self.extents(c);
                    lo = lo.min(clo);
                    hi = hi.max(chi);
                }
                let node = &self.nodes[id];
                (lo + node.offset, hi + node.offset)
            }
        }
    }

    pub fn needle_of(&self, id: LayoutId, s: StitchId) -> (Needle, Side) {
        let node = &self.nodes[id];
        let leaf = self.leaf(id).expect("needle_of is only defined for leaves");
        if leaf.course.contains(s) {
            leaf.course.needle_of(s, node.offset, node.flip)
        } else {
            let (idx, side) = *leaf.susp_map.get(&s).expect("stitch not present in this leaf");
            let index = idx + node.offset;
            let side = if node.flip { side.other() } else { side };
            (index, side)
        }
    }

    /// the sum of `time`s, sum of `offset`s, and XOR of `flip`s from `id` up to the root (§3)
    pub fn full_time(&self, id: LayoutId) -> Time {
        let node = &self.nodes[id];
        node.time + node.parent.map_or(0, |p| self.full_time(p))
    }
    pub fn full_offset(&self, id: LayoutId) -> Needle {
        let node = &self.nodes[id];
        node.offset + node.parent.map_or(0, |p| self.full_offset(p))
    }
    pub fn full_flip(&self, id: LayoutId) -> bool {
        let node = &self.nodes[id];
        node.flip ^ node.parent.map_or(false, |p| self.full_flip(p))
    }

    /// push this node's own `time` down into every child, zeroing it here (§4.C)
    pub fn apply_time(&mut self, id: LayoutId) {
        let delta = self.nodes[id].time;
        if delta != 0 {
            if let Data::Internal(children) = self.nodes[id].data.clone() {
                for c in children {
                    self.nodes[c].time += delta;
                }
            }
            self.nodes[id].time = 0;
        }
        let children = self.children(id).to_vec();
        for c in children {
            self.apply_time(c);
        }
    }
    pub fn apply_offset(&mut self, id: LayoutId) {
        let delta = self.nodes[id].offset;
        if delta != 0 {
            if let Data::Internal(children) = self.nodes[id].data.clone() {
                for c in children {
                    self.nodes[c].offset += delta;
                }
            }
            self.nodes[id].offset = 0;
        }
        let children = self.children(id).to_vec();
        for c in children {
            self.apply_offset(c);
        }
    }
    pub fn apply_flip(&mut self, id: LayoutId) {
        let delta = self.nodes[id].flip;
        if delta {
            if let Data::Internal(children) = self.nodes[id].data.clone() {
                for c in children {
                    self.nodes[c].flip ^= delta;
                }
            }
            self.nodes[id].flip = false;
        }
        let children = self.children(id).to_vec();
        for c in children {
            self.apply_flip(c);
        }
    }

    /// link two leaves symmetrically, but only if they share a stitch or a wale/course neighbor
    /// — "relatedness" is structural (§4.C)
    pub fn link_to(&mut self, a: LayoutId, b: LayoutId, graph: &StitchGraph) {
        if a == b {
            return;
        }
        let related = {
            let la = self.leaf(a).expect("link_to requires leaves");
            let lb = self.leaf(b).expect("link_to requires leaves");
            let a_stitches: BTreeSet<StitchId> = la.course.stitches_slice().iter().copied().chain(la.suspended.iter().copied()).collect();
            let b_stitches: BTreeSet<StitchId> = lb.course.stitches_slice().iter().copied().chain(lb.suspended.iter().copied()).collect();
            a_stitches.intersection(&b_stitches).next().is_some()
                || a_stitches.iter().any(|s| graph.get(*s).neighbors().iter().any(|n| b_stitches.contains(n)))
        };
        if related {
            self.leaf_mut(a).unwrap().links.insert(b);
            self.leaf_mut(b).unwrap().links.insert(a);
        }
    }

    /// leaves within `id`'s subtree whose link set reaches outside the subtree. When `link_map`
    /// is provided it is populated with each such leaf's outside targets (§4.C)
    pub fn boundary_leaves(&self, id: LayoutId, link_map: Option<&mut HashMap<LayoutId, BTreeSet<LayoutId>>>) -> Vec<LayoutId> {
        let inside: BTreeSet<LayoutId> = self.leaves_of(id).into_iter().collect();
        let mut out = Vec::new();
        let mut map = link_map;
        for &leaf_id in &inside {
            let leaf = self.leaf(leaf_id).unwrap();
            let outside: BTreeSet<LayoutId> = leaf.links.iter().copied().filter(|l| !inside.contains(l)).collect();
            if !outside.is_empty() {
                out.push(leaf_id);
                if let Some(map) = map.as_deref_mut() {
                    map.insert(leaf_id, outside);
                }
            }
        }
        out
    }

    /// build an internal node spanning `duration` time steps, each an empty-course leaf holding
    /// `stitches` as suspended (used by the layout builder for suspended groups, §4.D)
    pub fn repeat_suspended(&mut self, stitches: &[StitchId], positions: &HashMap<StitchId, (Needle, Side)>, duration: i32) -> LayoutId {
        let mut children = Vec::new();
        for _ in 0..duration.max(1) {
            let leaf_id = self.new_leaf(Course::empty());
            self.leaf_mut(leaf_id).unwrap().suspend(stitches, positions);
            children.push(leaf_id);
        }
        self.new_internal(children)
    }
}
