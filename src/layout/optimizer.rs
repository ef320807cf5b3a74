//! The layout optimizer (§4.E): builds a level hierarchy over the layout tree and iteratively
//! relaxes group offsets and side-flips to minimize stitch-displacement stress and bed-side
//! conflicts across the links recorded by `LayoutArena::link_to`.

use super::{LayoutArena, LayoutId};
use crate::diagnostics::{self, Diagnostic, Kind};
use crate::stitch::{Side, StitchGraph, StitchId};
use crate::{Needle, MAX_OPTIMIZER_SWEEPS};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Forward,
    Backward,
}

/// a cached `(leaf_a, a) <-> (leaf_b, b)` relation between two groups, found once from the
/// boundary links and reused across every sweep (§4.E "caches")
struct StressPair {
    peer: LayoutId,
    leaf_a: LayoutId,
    a: StitchId,
    leaf_b: LayoutId,
    b: StitchId,
}

/// raw `(index, side)` of `s` inside `leaf`, before that leaf's own offset/flip are applied
fn raw_pos(arena: &LayoutArena, leaf: LayoutId, s: StitchId) -> (Needle, Side) {
    let l = arena.leaf(leaf).expect("stress pairs only ever name leaves");
    if l.course.contains(s) {
        l.course.needle_of(s, 0, false)
    } else {
        *l.susp_map.get(&s).expect("stitch not present in this leaf")
    }
}

/// this stitch's fully-composed absolute position (§3 `full_offset`/`full_flip`)
fn absolute_pos(arena: &LayoutArena, leaf: LayoutId, s: StitchId) -> (Needle, Side) {
    let (idx, side) = raw_pos(arena, leaf, s);
    let index = idx + arena.full_offset(leaf);
    let side = if arena.full_flip(leaf) { side.other() } else { side };
    (index, side)
}

pub struct Optimizer<'a> {
    arena: &'a mut LayoutArena,
    graph: &'a StitchGraph,
    levels: Vec<Vec<LayoutId>>,
    level_of: HashMap<LayoutId, usize>,
    pairs: HashMap<LayoutId, Vec<StressPair>>,
}

impl<'a> Optimizer<'a> {
    pub fn new(arena: &'a mut LayoutArena, graph: &'a StitchGraph, roots: &[LayoutId]) -> Self {
        let mut levels = vec![roots.to_vec()];
        loop {
            let mut next = Vec::new();
            for &id in levels.last().unwrap() {
                next.extend(arena.children(id).iter().copied());
            }
            if next.is_empty() {
                break;
            }
            levels.push(next);
        }
        let mut level_of = HashMap::new();
        for (depth, level) in levels.iter().enumerate() {
            for &id in level {
                level_of.insert(id, depth);
            }
        }
        let mut opt = Self {
            arena,
            graph,
            levels,
            level_of,
            pairs: HashMap::new(),
        };
        opt.build_stress_pairs();
        opt
    }

    fn ancestor_at_level(&self, mut id: LayoutId, level: usize) -> Option<LayoutId> {
        while self.level_of.get(&id).copied() != Some(level) {
            id = self.arena.node(id).parent?;
        }
        Some(id)
    }

    fn build_stress_pairs(&mut self) {
        let levels = self.levels.clone();
        for (depth, level) in levels.iter().enumerate() {
            for &g in level {
                let mut link_map = HashMap::new();
                let boundary = self.arena.boundary_leaves(g, Some(&mut link_map));
                let mut pairs = Vec::new();
                for leaf_a in boundary {
                    let Some(targets) = link_map.get(&leaf_a) else { continue };
                    let a_stitches: Vec<StitchId> = self.arena.stitches(leaf_a);
                    for &leaf_b in targets {
                        let Some(peer) = self.ancestor_at_level(leaf_b, depth) else { continue };
                        if peer == g {
                            continue;
                        }
                        let b_stitches: Vec<StitchId> = self.arena.stitches(leaf_b);
                        for &a in &a_stitches {
                            for &b in &b_stitches {
                                if a == b || self.graph.get(a).neighbors().contains(&b) {
                                    pairs.push(StressPair { peer, leaf_a, a, leaf_b, b });
                                }
                            }
                        }
                    }
                }
                self.pairs.insert(g, pairs);
            }
        }
    }

    /// one forward or backward pass over every level, coarsest first; returns the number of
    /// groups whose offset or flip changed (§4.E)
    fn sweep(&mut self, dir: Direction) -> usize {
        let mut changed = 0;
        let levels = self.levels.clone();
        for level in &levels {
            let mut ordered = level.clone();
            ordered.sort_by_key(|&id| self.arena.full_time(id));
            if dir == Direction::Backward {
                ordered.reverse();
            }
            for g in ordered {
                if self.relax_one(g, dir) {
                    changed += 1;
                }
            }
        }
        changed
    }

    fn relax_one(&mut self, g: LayoutId, dir: Direction) -> bool {
        let g_time = self.arena.full_time(g);
        let current_offset = self.arena.node(g).offset;
        let mut sum_required = 0i64;
        let mut count = 0i64;
        let mut good = 0usize;
        let mut bad = 0usize;
        let Some(pairs) = self.pairs.get(&g) else { return false };
        for pair in pairs {
            let peer_time = self.arena.full_time(pair.peer);
            let keep = match dir {
                Direction::Forward => peer_time <= g_time,
                Direction::Backward => peer_time >= g_time,
            };
            if !keep {
                continue;
            }
            let (a_idx, a_side) = absolute_pos(self.arena, pair.leaf_a, pair.a);
            let (b_idx, b_side) = absolute_pos(self.arena, pair.leaf_b, pair.b);
            let a_fixed = a_idx - current_offset;
            sum_required += (b_idx - a_fixed) as i64;
            count += 1;
            if a_side == b_side {
                good += 1;
            } else {
                bad += 1;
            }
        }
        if count == 0 {
            return false;
        }
        let best_offset = (sum_required as f64 / count as f64).round() as i32;
        let offset_change = best_offset - current_offset;
        let mut changed = false;
        if offset_change != 0 {
            self.arena.node_mut(g).offset += offset_change;
            changed = true;
        }
        if matches!(self.arena.side(g), Side::Front | Side::Back) && good < bad {
            let flip = self.arena.node(g).flip;
            self.arena.node_mut(g).flip = !flip;
            changed = true;
        }
        changed
    }

    /// run sweeps (alternating forward/backward) until two consecutive sweeps make zero changes,
    /// or the 20-sweep cap is hit, whichever comes first (§4.E)
    pub fn run(&mut self, namespace: &str) -> usize {
        let mut dirs = [Direction::Forward, Direction::Backward].into_iter().cycle();
        let mut consecutive_dry = 0usize;
        let mut sweeps = 0usize;
        while sweeps < MAX_OPTIMIZER_SWEEPS {
            let dir = dirs.next().unwrap();
            let changed = self.sweep(dir);
            sweeps += 1;
            log::debug!("optimizer sweep {} ({:?}): {} groups changed", sweeps, dir, changed);
            if changed == 0 {
                consecutive_dry += 1;
                if consecutive_dry >= 2 {
                    break;
                }
            } else {
                consecutive_dry = 0;
            }
        }
        if sweeps >= MAX_OPTIMIZER_SWEEPS && consecutive_dry < 2 {
            diagnostics::push(
                namespace,
                Diagnostic::new(
                    Kind::OptimizerNonconvergence,
                    0,
                    0,
                    Side::Both,
                    format!("optimizer did not converge within {} sweeps", MAX_OPTIMIZER_SWEEPS),
                ),
            );
        }
        sweeps
    }
}

/// optimize `roots` in place; optimization level `none` is simply not calling this (§4.E)
pub fn optimize(arena: &mut LayoutArena, graph: &StitchGraph, roots: &[LayoutId], namespace: &str) -> usize {
    let mut opt = Optimizer::new(arena, graph, roots);
    opt.run(namespace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course::Course;
    use crate::stitch::ConnectMode;

    #[test]
    fn pulls_a_misaligned_group_toward_its_linked_neighbor() {
        let mut g = StitchGraph::new();
        let mut arena = LayoutArena::new();
        let c1 = Course::flat(&mut g, Side::Front, 3, 1);
        let c2 = Course::flat(&mut g, Side::Front, 3, 1);
        for (a, b) in c1.stitches_slice().iter().zip(c2.stitches_slice().iter()) {
            g.connect(*a, *b, ConnectMode::Wale);
        }
        let l1 = arena.new_leaf(c1);
        let l2 = arena.new_leaf(c2);
        arena.link_to(l1, l2, &g);
        arena.node_mut(l2).time = 1;
        arena.node_mut(l2).offset = 50; // badly misplaced relative to l1

        diagnostics::clear("test::optimizer::pull");
        optimize(&mut arena, &g, &[l1, l2], "test::optimizer::pull");
        // l1 and l2 should end up stress-aligned: same absolute needle indices for the wale pairs
        let s0a = *arena.leaf(l1).unwrap().course.stitches_slice().first().unwrap();
        let s0b = *arena.leaf(l2).unwrap().course.stitches_slice().first().unwrap();
        let (pos_a, _) = absolute_pos(&arena, l1, s0a);
        let (pos_b, _) = absolute_pos(&arena, l2, s0b);
        assert_eq!(pos_a, pos_b);
    }

    #[test]
    fn one_sided_group_flips_when_conflicts_favor_it() {
        let mut g = StitchGraph::new();
        let mut arena = LayoutArena::new();
        let c1 = Course::flat(&mut g, Side::Back, 2, 1);
        let c2 = Course::flat(&mut g, Side::Front, 2, 1);
        for (a, b) in c1.stitches_slice().iter().zip(c2.stitches_slice().iter()) {
            g.connect(*a, *b, ConnectMode::Wale);
        }
        let l1 = arena.new_leaf(c1);
        let l2 = arena.new_leaf(c2);
        arena.link_to(l1, l2, &g);
        arena.node_mut(l2).time = 1;

        diagnostics::clear("test::optimizer::flip");
        optimize(&mut arena, &g, &[l1, l2], "test::optimizer::flip");
        assert!(arena.node(l1).flip || arena.node(l2).flip);
    }

    #[test]
    fn nonconvergence_emits_a_notice_within_the_sweep_cap() {
        // two groups whose best offset keeps oscillating by construction would be unusual to
        // build deterministically here; instead we assert the cap itself is respected when no
        // stress pairs exist at all (zero-change sweeps converge immediately, no notice).
        let mut g = StitchGraph::new();
        let mut arena = LayoutArena::new();
        let c1 = Course::flat(&mut g, Side::Front, 2, 1);
        let l1 = arena.new_leaf(c1);
        diagnostics::clear("test::optimizer::converge");
        let sweeps = optimize(&mut arena, &g, &[l1], "test::optimizer::converge");
        assert!(sweeps <= MAX_OPTIMIZER_SWEEPS);
        assert!(diagnostics::entries("test::optimizer::converge").is_empty());
    }
}
