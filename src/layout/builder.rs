//! The layout builder (§4.D): turns a schedule of course blocks into a list of top-level layout
//! groups, introducing *suspended groups* to keep stitches alive across time when their wales
//! extend beyond their home course.

use super::{LayoutArena, LayoutId};
use crate::course::Course;
use crate::stitch::{Side, StitchGraph, StitchId};
use crate::{Needle, Time};
use std::collections::{HashMap, HashSet};

/// one `(shape, course-id)` entry inside a block; `course` is the already-traced course for it
pub struct BlockEntry {
    pub shape: u64,
    pub course_id: u64,
    pub course: Course,
}

pub type Block = Vec<BlockEntry>;

fn positions_of(course: &Course, stitches: &[StitchId]) -> HashMap<StitchId, (Needle, Side)> {
    stitches.iter().map(|&s| (s, course.needle_of(s, 0, false))).collect()
}

/// `s` still has at least one wale-neighbor not yet produced by any seen course (§4.D)
fn is_unfinished(s: StitchId, seen: &HashSet<StitchId>, graph: &StitchGraph) -> bool {
    graph.get(s).wales().iter().any(|w| !seen.contains(w))
}

pub struct Builder<'a> {
    arena: &'a mut LayoutArena,
    graph: &'a mut StitchGraph,
    time: Time,
    seen: HashSet<StitchId>,
    last: Option<LayoutId>,
    suspended: Vec<LayoutId>,
    output: Vec<LayoutId>,
}

impl<'a> Builder<'a> {
    pub fn new(arena: &'a mut LayoutArena, graph: &'a mut StitchGraph) -> Self {
        Self {
            arena,
            graph,
            time: 0,
            seen: HashSet::new(),
            last: None,
            suspended: Vec::new(),
            output: Vec::new(),
        }
    }

    fn tail_leaf(&self, group: LayoutId) -> LayoutId {
        *self.arena.children(group).last().expect("layout group has no children")
    }
    fn head_leaf(&self, group: LayoutId) -> LayoutId {
        *self.arena.children(group).first().expect("layout group has no children")
    }

    pub fn build(mut self, blocks: Vec<Block>) -> Vec<LayoutId> {
        for block in blocks {
            self.step(block);
        }
        assert!(self.suspended.is_empty(), "SuspendedAtEnd: layout builder ended with a non-empty suspended list");
        self.output
    }

    fn step(&mut self, block: Block) {
        if block.is_empty() {
            return;
        }
        let mut leaf_ids = Vec::with_capacity(block.len());
        for entry in block {
            let leaf = self.arena.new_leaf(entry.course);
            self.arena.leaf_mut(leaf).unwrap().shape_ref = Some(entry.shape);
            self.arena.leaf_mut(leaf).unwrap().course_id = Some(entry.course_id);
            leaf_ids.push(leaf);
        }
        for w in leaf_ids.windows(2) {
            self.arena.link_to(w[0], w[1], self.graph);
        }

        // suspend, within this block, stitches that still need wales beyond the next course
        for i in 1..leaf_ids.len() {
            let prev = leaf_ids[i - 1];
            let cur = leaf_ids[i];
            let prev_course = self.arena.leaf(prev).unwrap().course.clone();
            let cur_course_has = |s: StitchId| self.arena.leaf(cur).unwrap().course.contains(s);
            let unfinished: Vec<StitchId> = prev_course
                .stitches_slice()
                .iter()
                .copied()
                .filter(|&s| is_unfinished(s, &self.seen, self.graph) && !cur_course_has(s))
                .collect();
            if !unfinished.is_empty() {
                let positions = positions_of(&prev_course, &unfinished);
                self.arena.leaf_mut(cur).unwrap().suspend(&unfinished, &positions);
            }
        }

        let grp = self.arena.new_internal(leaf_ids.clone());
        self.arena.node_mut(grp).time = self.time;

        for &leaf in &leaf_ids {
            let course_stitches: Vec<StitchId> = self.arena.leaf(leaf).unwrap().course.stitches_slice().to_vec();
            self.seen.extend(course_stitches);
        }

        if let Some(last_leaf) = self.last {
            self.arena.link_to(leaf_ids[0], last_leaf, self.graph);
        }
        for &s_grp in &self.suspended {
            let s_last_leaf = self.tail_leaf(s_grp);
            self.arena.link_to(leaf_ids[0], s_last_leaf, self.graph);
        }

        let duration = leaf_ids.len() as i32;

        let mut still_active = Vec::new();
        for s_grp in std::mem::take(&mut self.suspended) {
            let s_last_leaf = self.tail_leaf(s_grp);
            let leaf = self.arena.leaf(s_last_leaf).unwrap();
            let candidates: Vec<StitchId> = leaf.suspended.clone();
            let positions = leaf.susp_map.clone();
            let in_block = |s: StitchId| leaf_ids.iter().any(|&l| self.arena.leaf(l).unwrap().course.contains(s));
            let unfinished: Vec<StitchId> = candidates
                .into_iter()
                .filter(|&s| is_unfinished(s, &self.seen, self.graph) && !in_block(s))
                .collect();
            if !unfinished.is_empty() {
                let sg = self.arena.repeat_suspended(&unfinished, &positions, duration);
                self.arena.node_mut(sg).time = self.time;
                self.output.push(sg);
                let sg_head = self.head_leaf(sg);
                self.arena.link_to(sg_head, s_last_leaf, self.graph);
                still_active.push(sg);
            }
        }
        self.suspended = still_active;

        if let Some(last_leaf) = self.last {
            let leaf = self.arena.leaf(last_leaf).unwrap();
            let candidates: Vec<StitchId> = leaf.course.stitches_slice().iter().copied().chain(leaf.suspended.iter().copied()).collect();
            let mut positions: HashMap<StitchId, (Needle, Side)> = leaf.course.stitches_slice().iter().map(|&s| (s, leaf.course.needle_of(s, 0, false))).collect();
            positions.extend(leaf.susp_map.clone());
            let in_block = |s: StitchId| leaf_ids.iter().any(|&l| self.arena.leaf(l).unwrap().course.contains(s));
            let unfinished: Vec<StitchId> = candidates
                .into_iter()
                .filter(|&s| is_unfinished(s, &self.seen, self.graph) && !in_block(s))
                .collect();
            if !unfinished.is_empty() {
                let sg = self.arena.repeat_suspended(&unfinished, &positions, duration);
                self.arena.node_mut(sg).time = self.time;
                self.output.push(sg);
                let sg_head = self.head_leaf(sg);
                self.arena.link_to(sg_head, last_leaf, self.graph);
                self.suspended.push(sg);
            }
        }

        self.output.push(grp);
        self.last = Some(self.tail_leaf(grp));
        self.time += duration;
    }
}
