//! The time–needle bed (§4.F): the packed, physical representation of a compiled layout — a
//! timeline of `NeedleBed`s, each a front/back needle array plus the interpreter's passes.

pub mod compact;
pub mod interpret;
pub mod simulate;

use crate::diagnostics::{self, Diagnostic, Kind};
use crate::layout::{LayoutArena, LayoutId};
use crate::stitch::{Side, StitchGraph, StitchId};
use crate::{Needle, Time, MAX_BED_WIDTH};
use simulate::BackwardFlow;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum PassType {
    CastOn,
    Action,
    Transfer,
    CastOff,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ActionKind {
    Knit,
    Purl,
    Tuck,
    Miss,
    FbKnit,
    Split,
    SplitMiss,
    Kickback,
    Stack,
    Transfer,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Action {
    pub kind: ActionKind,
    pub regular: bool,
    pub reverse: bool,
    pub source: (Needle, Side),
    pub targets: Vec<(Needle, Side)>,
    pub casting: bool,
    pub restack: bool,
    pub shortrow: bool,
    pub increase_type: Option<ActionKind>,
    pub increase_target: Option<(Needle, Side)>,
    pub pairing: Option<(bool, bool, bool)>,
}

impl Action {
    pub fn new(kind: ActionKind, source: (Needle, Side)) -> Self {
        Self {
            kind,
            regular: false,
            reverse: false,
            source,
            targets: Vec::new(),
            casting: false,
            restack: false,
            shortrow: false,
            increase_type: None,
            increase_target: None,
            pairing: None,
        }
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct Pass {
    pub kind_slot: Option<PassType>,
    pub sequence: Vec<StitchId>,
    pub action_map: HashMap<StitchId, Action>,
}

impl Pass {
    pub fn new(kind: PassType) -> Self {
        Self {
            kind_slot: Some(kind),
            sequence: Vec::new(),
            action_map: HashMap::new(),
        }
    }
    pub fn kind(&self) -> PassType {
        self.kind_slot.expect("pass always carries a kind once constructed")
    }
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct NeedleBed {
    pub time: Time,
    pub groups: Vec<LayoutId>,
    pub active_group: Option<LayoutId>,
    pub front: Vec<Vec<StitchId>>,
    pub back: Vec<Vec<StitchId>>,
    pub passes: Vec<Pass>,
    /// "has" maps carried over from the previous bed's "set" maps (§4.G increase carry-over)
    pub has_kickback: HashMap<StitchId, bool>,
    pub has_split: HashMap<StitchId, bool>,
    pub has_splitted: HashMap<StitchId, bool>,
    pub set_kickback: HashMap<StitchId, bool>,
    pub set_split: HashMap<StitchId, bool>,
    pub set_splitted: HashMap<StitchId, bool>,
    pub front_state: Vec<Option<BackwardFlow>>,
    pub back_state: Vec<Option<BackwardFlow>>,
    pub active: bool,
    pub duplicate: bool,
}

impl NeedleBed {
    fn empty(time: Time, width: usize) -> Self {
        Self {
            time,
            groups: Vec::new(),
            active_group: None,
            front: vec![Vec::new(); width],
            back: vec![Vec::new(); width],
            passes: Vec::new(),
            has_kickback: HashMap::new(),
            has_split: HashMap::new(),
            has_splitted: HashMap::new(),
            set_kickback: HashMap::new(),
            set_split: HashMap::new(),
            set_splitted: HashMap::new(),
            front_state: vec![None; width],
            back_state: vec![None; width],
            active: false,
            duplicate: false,
        }
    }

    fn grid(&self, side: Side) -> &Vec<Vec<StitchId>> {
        match side {
            Side::Back => &self.back,
            _ => &self.front,
        }
    }
    fn grid_mut(&mut self, side: Side) -> &mut Vec<Vec<StitchId>> {
        match side {
            Side::Back => &mut self.back,
            _ => &mut self.front,
        }
    }

    pub fn stitch_at(&self, side: Side, idx: Needle) -> Option<StitchId> {
        if idx < 0 {
            return None;
        }
        self.grid(side).get(idx as usize).and_then(|cell| cell.first().copied())
    }

    pub fn position_of(&self, s: StitchId) -> Option<(Needle, Side)> {
        for (idx, cell) in self.front.iter().enumerate() {
            if cell.contains(&s) {
                return Some((idx as Needle, Side::Front));
            }
        }
        for (idx, cell) in self.back.iter().enumerate() {
            if cell.contains(&s) {
                return Some((idx as Needle, Side::Back));
            }
        }
        None
    }

    /// every action of `kind` recorded on this bed's passes, most recent pass wins
    pub fn actions_of(&self, kind: PassType) -> Option<&Pass> {
        self.passes.iter().rev().find(|p| p.kind() == kind)
    }

    fn resize(&mut self, width: usize) {
        self.front.resize(width, Vec::new());
        self.back.resize(width, Vec::new());
        self.front_state.resize(width, None);
        self.back_state.resize(width, None);
    }
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct GroupInfo {
    pub shape: Option<u64>,
    pub groups: Vec<LayoutId>,
    pub times: Vec<Time>,
    pub start_time: Time,
}

#[derive(serde::Serialize, serde::Deserialize)]
pub struct TimeNeedleBed {
    pub timeline: Vec<NeedleBed>,
    pub width: usize,
    pub stitch_map: HashMap<StitchId, usize>,
    pub group_map: HashMap<LayoutId, GroupInfo>,
    pub node_map: HashMap<LayoutId, GroupInfo>,
}

impl Default for TimeNeedleBed {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeNeedleBed {
    pub fn new() -> Self {
        Self {
            timeline: Vec::new(),
            width: 0,
            stitch_map: HashMap::new(),
            group_map: HashMap::new(),
            node_map: HashMap::new(),
        }
    }

    pub fn length(&self) -> usize {
        self.timeline.len()
    }

    /// the bed at `t` if in range, otherwise a fresh inactive empty bed (§4.F)
    pub fn at(&self, t: Time) -> NeedleBed {
        if t >= 0 && (t as usize) < self.timeline.len() {
            self.timeline[t as usize].clone()
        } else {
            NeedleBed::empty(t, self.width)
        }
    }

    fn ensure_width(&mut self, needed: usize, namespace: &str) {
        if needed <= self.width {
            return;
        }
        if needed > MAX_BED_WIDTH {
            diagnostics::push(
                namespace,
                Diagnostic::new(
                    Kind::BedWidthExceeded,
                    0,
                    needed as Needle,
                    Side::Both,
                    format!("packed width {} exceeds the platform maximum of {}", needed, MAX_BED_WIDTH),
                ),
            );
        }
        self.width = needed;
        for bed in &mut self.timeline {
            bed.resize(self.width);
        }
    }

    /// pack `groups` (top-level layout roots, already optimized) into the timeline and interpret
    /// the newly added beds (§4.F steps 1-8). Returns the index of the first newly added bed.
    pub fn append_layout(
        &mut self,
        groups: &[LayoutId],
        arena: &mut LayoutArena,
        graph: &StitchGraph,
        namespace: &str,
    ) -> usize {
        for &g in groups {
            arena.apply_time(g);
            arena.apply_offset(g);
            arena.apply_flip(g);
        }

        let mut leaves = Vec::new();
        for &g in groups {
            leaves.extend(arena.leaves_of(g));
        }

        let mut t_min = Time::MAX;
        let mut t_max = Time::MIN;
        let mut idx_max = Needle::MIN;
        for &leaf in &leaves {
            let node = arena.node(leaf);
            t_min = t_min.min(node.time);
            t_max = t_max.max(node.time);
            let (_, hi) = arena.extents(leaf);
            idx_max = idx_max.max(hi);
        }
        if leaves.is_empty() {
            return self.timeline.len();
        }

        self.ensure_width((idx_max + 1).max(0) as usize, namespace);

        if !self.timeline.is_empty() {
            self.timeline.push(NeedleBed::empty(self.timeline.len() as Time, self.width));
        }
        let base = self.timeline.len();
        let duration = (t_max - t_min + 1).max(1) as usize;
        for i in 0..duration {
            self.timeline.push(NeedleBed::empty((base + i) as Time, self.width));
        }
        let first_new = base;

        for &leaf in &leaves {
            let node = arena.node(leaf);
            let bed_index = base + (node.time - t_min) as usize;
            let Some(bed) = self.timeline.get_mut(bed_index) else { continue };
            let l = arena.leaf(leaf).unwrap();
            bed.groups.push(leaf);
            if !l.course.stitches_slice().is_empty() {
                bed.active = true;
                bed.active_group = Some(leaf);
            }
            let owned: Vec<StitchId> = l.course.stitches_slice().iter().copied().chain(l.suspended.iter().copied()).collect();
            for s in owned {
                let (idx, side) = arena.needle_of(leaf, s);
                self.place(bed_index, idx, side, s, namespace);
            }
        }

        for i in 0..duration {
            let bed_index = base + i;
            let stitches: Vec<StitchId> = {
                let bed = &self.timeline[bed_index];
                bed.front.iter().chain(bed.back.iter()).flatten().copied().collect()
            };
            let prev_present = if bed_index > 0 {
                let prev = &self.timeline[bed_index - 1];
                let prev_stitches: std::collections::HashSet<StitchId> =
                    prev.front.iter().chain(prev.back.iter()).flatten().copied().collect();
                stitches.iter().all(|s| {
                    prev_stitches.contains(s) && prev.position_of(*s) == self.timeline[bed_index].position_of(*s)
                })
            } else {
                false
            };
            self.timeline[bed_index].duplicate = prev_present && !stitches.is_empty();
            for &s in &stitches {
                self.stitch_map.entry(s).or_insert(bed_index);
            }
        }

        for &g in groups {
            let descendants = arena.leaves_of(g);
            let times: Vec<Time> = descendants.iter().map(|&l| arena.node(l).time).collect();
            let start_time = times.iter().copied().min().unwrap_or(0);
            let shape = descendants.iter().find_map(|&l| arena.leaf(l).and_then(|leaf| leaf.shape_ref));
            let info = GroupInfo {
                shape,
                groups: descendants.clone(),
                times: times.clone(),
                start_time,
            };
            self.group_map.insert(g, info.clone());
            for &l in &descendants {
                self.node_map.insert(
                    l,
                    GroupInfo {
                        shape,
                        groups: vec![l],
                        times: vec![arena.node(l).time],
                        start_time: arena.node(l).time,
                    },
                );
            }
        }

        interpret::Interpreter::new(graph, namespace).run(self, first_new);
        first_new
    }

    fn place(&mut self, bed_index: usize, idx: Needle, side: Side, s: StitchId, namespace: &str) {
        if idx < 0 {
            return;
        }
        let bed = &mut self.timeline[bed_index];
        let width = bed.front.len();
        if (idx as usize) >= width {
            return;
        }
        let cell = bed.grid_mut(side).get_mut(idx as usize).unwrap();
        if !cell.is_empty() {
            diagnostics::push(
                namespace,
                Diagnostic::new(
                    Kind::OverlappingStitch,
                    bed.time,
                    idx,
                    side,
                    format!("stitch {} collides with {:?} at needle {}", s, cell, idx),
                ),
            );
        }
        cell.push(s);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course::Course;
    use crate::stitch::ConnectMode;

    #[test]
    fn appending_a_flat_sheet_produces_one_bed_per_course() {
        let mut g = StitchGraph::new();
        let mut arena = LayoutArena::new();
        let mut leaves = Vec::new();
        let mut prev_course: Option<Course> = None;
        for _ in 0..4 {
            let course = Course::flat(&mut g, Side::Front, 3, 1);
            if let Some(prev) = &prev_course {
                for (a, b) in prev.stitches_slice().iter().zip(course.stitches_slice().iter()) {
                    g.connect(*a, *b, ConnectMode::Wale);
                }
            }
            prev_course = Some(course.clone());
            leaves.push(arena.new_leaf(course));
        }
        for (i, w) in leaves.windows(2).enumerate() {
            arena.node_mut(w[1]).time = (i + 1) as Time;
        }
        let root = arena.new_internal(leaves.clone());

        diagnostics::clear("test::tnb::flat");
        let mut tnb = TimeNeedleBed::new();
        tnb.append_layout(&[root], &mut arena, &g, "test::tnb::flat");

        assert_eq!(tnb.length(), 4);
        assert_eq!(tnb.width, 3);
        for bed in &tnb.timeline {
            assert!(bed.active);
        }
    }

    #[test]
    fn at_returns_an_empty_bed_out_of_range() {
        let tnb = TimeNeedleBed::new();
        let bed = tnb.at(5);
        assert!(!bed.active);
        assert!(bed.front.is_empty());
    }
}
