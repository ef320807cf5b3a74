//! Courses (§4.B): an ordered sequence of stitches placed at integer needle indices on a side,
//! immutable after tracing. `link`/`continuity_bind` connect consecutive courses; `close` folds
//! a circular course into flat form; `spread`/`apply_pending` defer many-to-one wale mappings.

pub mod sequence;

use crate::diagnostics::{self, Diagnostic, Kind};
use crate::stitch::{ConnectMode, Side, StitchGraph, StitchId};
use anyhow::{bail, Result};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseMode {
    Collapse,
    ZigZag,
    ZigZagReturn,
}

#[derive(Debug, Clone)]
pub struct Course {
    stitches: Vec<StitchId>,
    needle_of: HashMap<StitchId, (i32, Side)>,
    width: i32,
    side: Side,
    circular: bool,
    offset: i32,
    pending: Vec<PendingLink>,
}

#[derive(Debug, Clone)]
struct PendingLink {
    /// degree of freedom: fewer options (smaller) resolves first in `apply_pending`
    freedom: usize,
    from: StitchId,
    to: StitchId,
}

impl Course {
    fn empty_with(stitches: Vec<StitchId>, placements: Vec<(StitchId, i32, Side)>, circular: bool) -> Self {
        let mut needle_of = HashMap::new();
        for (id, idx, side) in placements {
            needle_of.insert(id, (idx, side));
        }
        let mut course = Self {
            stitches,
            needle_of,
            width: 0,
            side: Side::Front,
            circular,
            offset: 0,
            pending: Vec::new(),
        };
        course.reset(Some(circular), Some(true));
        course
    }

    pub fn empty() -> Self {
        Self::empty_with(Vec::new(), Vec::new(), false)
    }

    /// `n` disconnected stitches at successive front indices, no course links between them
    pub fn stitches(graph: &mut StitchGraph, n: usize) -> Self {
        let mut ids = Vec::new();
        let mut placements = Vec::new();
        for i in 0..n {
            let id = graph.alloc();
            placements.push((id, i as i32, Side::Front));
            ids.push(id);
        }
        Self::empty_with(ids, placements, false)
    }

    /// a flat run of `width` stitches on one side, needles spaced by `gauge`
    pub fn flat(graph: &mut StitchGraph, side: Side, width: i32, gauge: i32) -> Self {
        let gauge = gauge.max(1);
        let mut ids = Vec::new();
        let mut placements = Vec::new();
        let mut prev = None;
        for i in 0..width {
            let id = graph.alloc();
            if let Some(p) = prev {
                graph.connect(p, id, ConnectMode::Course);
            }
            placements.push((id, i * gauge, side));
            ids.push(id);
            prev = Some(id);
        }
        Self::empty_with(ids, placements, false)
    }

    /// a "C"-shaped course: `pre` stitches descend on the opposite side, `width` stitches cross
    /// the named side, `post` stitches continue on the opposite side (used for collar/neckline
    /// shaping where a course dips to the other bed at both ends; §4.B).
    pub fn c_shape(graph: &mut StitchGraph, side: Side, width: i32, pre: i32, post: i32, gauge: i32) -> Self {
        let gauge = gauge.max(1);
        let other = side.other();
        let mut ids = Vec::new();
        let mut placements = Vec::new();
        let mut prev = None;
        let mut idx = 0i32;
        let mut push = |graph: &mut StitchGraph, idx: i32, s: Side, ids: &mut Vec<StitchId>, placements: &mut Vec<(StitchId, i32, Side)>, prev: &mut Option<StitchId>| {
            let id = graph.alloc();
            if let Some(p) = *prev {
                graph.connect(p, id, ConnectMode::Course);
            }
            placements.push((id, idx, s));
            ids.push(id);
            *prev = Some(id);
        };
        for _ in 0..pre {
            push(graph, idx, other, &mut ids, &mut placements, &mut prev);
            idx += gauge;
        }
        for _ in 0..width {
            push(graph, idx, side, &mut ids, &mut placements, &mut prev);
            idx += gauge;
        }
        for _ in 0..post {
            push(graph, idx, other, &mut ids, &mut placements, &mut prev);
            idx += gauge;
        }
        Self::empty_with(ids, placements, false)
    }

    /// a closed circular tube cross-section: `width` stitches across the front, then `width`
    /// back across the back at the same indices, front-last linked to back-first and back-last
    /// linked to front-first to close the loop (§8 scenario 2).
    pub fn tube(graph: &mut StitchGraph, width: i32, gauge: i32) -> Self {
        let gauge = gauge.max(1);
        let mut ids = Vec::new();
        let mut placements = Vec::new();
        let mut prev = None;
        for i in 0..width {
            let id = graph.alloc();
            if let Some(p) = prev {
                graph.connect(p, id, ConnectMode::Course);
            }
            placements.push((id, i * gauge, Side::Front));
            ids.push(id);
            prev = Some(id);
        }
        for i in (0..width).rev() {
            let id = graph.alloc();
            if let Some(p) = prev {
                graph.connect(p, id, ConnectMode::Course);
            }
            placements.push((id, i * gauge, Side::Back));
            ids.push(id);
            prev = Some(id);
        }
        if let (Some(&first), Some(&last)) = (ids.first(), ids.last()) {
            graph.connect(last, first, ConnectMode::Course);
        }
        Self::empty_with(ids, placements, true)
    }

    /// `width` stitches alternating front/back at each successive index (§4.B)
    pub fn zig_zag(graph: &mut StitchGraph, width: i32, gauge: i32) -> Self {
        let gauge = gauge.max(1);
        let mut ids = Vec::new();
        let mut placements = Vec::new();
        let mut prev = None;
        for i in 0..width {
            let id = graph.alloc();
            if let Some(p) = prev {
                graph.connect(p, id, ConnectMode::Course);
            }
            let side = if i % 2 == 0 { Side::Front } else { Side::Back };
            placements.push((id, i * gauge, side));
            ids.push(id);
            prev = Some(id);
        }
        Self::empty_with(ids, placements, false)
    }

    /// a zigzag out to `width` and back, swapping every other front/back pair on the return leg
    /// so the path re-enters its own column (§4.B)
    pub fn zig_zag_return(graph: &mut StitchGraph, width: i32, gauge: i32, circular: bool) -> Self {
        let gauge = gauge.max(1);
        let mut ids = Vec::new();
        let mut placements = Vec::new();
        let mut prev = None;
        for i in 0..width {
            let id = graph.alloc();
            if let Some(p) = prev {
                graph.connect(p, id, ConnectMode::Course);
            }
            let side = if i % 2 == 0 { Side::Front } else { Side::Back };
            placements.push((id, i * gauge, side));
            ids.push(id);
            prev = Some(id);
        }
        for i in (0..width).rev() {
            let id = graph.alloc();
            if let Some(p) = prev {
                graph.connect(p, id, ConnectMode::Course);
            }
            // swap every other pair on the return leg
            let side = if i % 2 == 0 { Side::Back } else { Side::Front };
            placements.push((id, i * gauge, side));
            ids.push(id);
            prev = Some(id);
        }
        if circular {
            if let (Some(&first), Some(&last)) = (ids.first(), ids.last()) {
                graph.connect(last, first, ConnectMode::Course);
            }
        }
        Self::empty_with(ids, placements, circular)
    }

    /// parse the §6 grammar and build the course it describes
    pub fn sequence(graph: &mut StitchGraph, grammar: &str, gauge: i32, circular: bool) -> Result<Self> {
        let parsed = sequence::parse(grammar, gauge.max(1))?;
        let mut ids = Vec::new();
        let mut placements = Vec::new();
        let mut prev = None;
        for (idx, side) in parsed.placements {
            let id = graph.alloc();
            if let Some(p) = prev {
                graph.connect(p, id, ConnectMode::Course);
            }
            placements.push((id, idx, side));
            ids.push(id);
            prev = Some(id);
        }
        let circular = circular || parsed.circular;
        if circular {
            if let (Some(&first), Some(&last)) = (ids.first(), ids.last()) {
                if first != last {
                    graph.connect(last, first, ConnectMode::Course);
                }
            }
        }
        Ok(Self::empty_with(ids, placements, circular))
    }

    pub fn width(&self) -> i32 {
        self.width
    }
    pub fn side(&self) -> Side {
        self.side
    }
    pub fn circular(&self) -> bool {
        self.circular
    }
    pub fn offset(&self) -> i32 {
        self.offset
    }
    pub fn stitches_slice(&self) -> &[StitchId] {
        &self.stitches
    }
    pub fn first(&self) -> Option<StitchId> {
        self.stitches.first().copied()
    }
    pub fn last(&self) -> Option<StitchId> {
        self.stitches.last().copied()
    }
    pub fn contains(&self, s: StitchId) -> bool {
        self.needle_of.contains_key(&s)
    }

    /// recompute `width`/`side` and normalize stored indices so the minimum is 0 (§4.B)
    pub fn reset(&mut self, circular: Option<bool>, zero_offset: Option<bool>) {
        if let Some(c) = circular {
            self.circular = c;
        }
        if self.needle_of.is_empty() {
            self.width = 0;
            self.side = Side::Front;
            return;
        }
        let mut mask = 0u8;
        let mut min_idx = i32::MAX;
        let mut max_idx = i32::MIN;
        for (idx, side) in self.needle_of.values() {
            mask |= side.mask();
            min_idx = min_idx.min(*idx);
            max_idx = max_idx.max(*idx);
        }
        if zero_offset.unwrap_or(true) {
            for (idx, _) in self.needle_of.values_mut() {
                *idx -= min_idx;
            }
            self.offset += min_idx;
            max_idx -= min_idx;
            min_idx = 0;
        }
        self.width = max_idx - min_idx + 1;
        self.side = Side::from_mask(mask);
    }

    /// composed `(index, side)` for `s`: `index = stored + offset + extra_offset`,
    /// `side = flip ? other(stored_side) : stored_side`
    pub fn needle_of(&self, s: StitchId, extra_offset: i32, flip: bool) -> (i32, Side) {
        let (idx, side) = self.needle_of.get(&s).copied().expect("stitch not in this course");
        let index = idx + self.offset + extra_offset;
        let side = if flip { side.other() } else { side };
        (index, side)
    }

    pub fn is_within(&self, idx: i32, side: Side) -> bool {
        let lo = self.offset;
        let hi = self.offset + self.width;
        let side_ok = match (self.side, side) {
            (Side::Both, _) | (_, Side::Both) => true,
            (a, b) => a == b,
        };
        side_ok && idx >= lo && idx < hi
    }

    /// link `self` to `next`: pick the endpoint pair minimizing needle-index distance among
    /// candidates consistent with circularity and side (§4.B). Delegates to whichever course has
    /// fewer free endpoints first, since that side is more constrained.
    pub fn link(&mut self, next: &mut Course, graph: &mut StitchGraph) -> Result<()> {
        let this_ends = self.free_endpoints(graph);
        let next_ends = next.free_endpoints(graph);
        if this_ends.is_empty() || next_ends.is_empty() {
            bail!("NoContinuityPath: no free endpoints to link courses");
        }
        let mut best: Option<(i32, StitchId, StitchId)> = None;
        for &a in &this_ends {
            let (ai, aside) = self.needle_of(a, 0, false);
            for &b in &next_ends {
                let (bi, bside) = next.needle_of(b, 0, false);
                if matches!(aside, Side::Front | Side::Back) && matches!(bside, Side::Front | Side::Back) && aside != bside {
                    continue;
                }
                let dist = (ai - bi).abs();
                if best.map_or(true, |(d, _, _)| dist < d) {
                    best = Some((dist, a, b));
                }
            }
        }
        let (_, a, b) = best.ok_or_else(|| anyhow::anyhow!("NoContinuityPath: no compatible endpoint pair"))?;
        graph.connect(a, b, ConnectMode::Course);
        Ok(())
    }

    fn free_endpoints(&self, graph: &StitchGraph) -> Vec<StitchId> {
        self.stitches
            .iter()
            .copied()
            .filter(|&s| graph.get(s).is_endpoint())
            .collect()
    }

    /// walk needle positions along `path` from `self`'s outgoing endpoint until reaching an
    /// endpoint of `next`, manufacturing an intermediate stitch at each step (§4.B). `path` is a
    /// sequence of `(index, side)` positions to visit in order. Fails with *NoContinuityPath* if
    /// the path is exhausted without reaching an endpoint of `next`. Each manufactured step's
    /// yarn direction is inferred from its predecessor (§4.B), pushing `UndefinedCourseDirection`
    /// under `namespace` whenever that pair isn't a consecutive same-side needle pair.
    pub fn continuity_bind(
        &mut self,
        next: &mut Course,
        path: &[(i32, Side)],
        graph: &mut StitchGraph,
        namespace: &str,
    ) -> Result<Vec<StitchId>> {
        let start = self
            .free_endpoints(graph)
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("NoContinuityPath: course has no free endpoint to continue from"))?;
        let next_ends = next.free_endpoints(graph);
        let mut made = Vec::new();
        let mut prev = start;
        for &(idx, side) in path {
            if let Some(&target) = next_ends.iter().find(|&&e| {
                let (ei, eside) = next.needle_of(e, 0, false);
                ei == idx && (eside == side || matches!(eside, Side::Both) || matches!(side, Side::Both))
            }) {
                self.infer_direction(prev, target, namespace);
                graph.connect(prev, target, ConnectMode::Course);
                return Ok(made);
            }
            let id = graph.alloc();
            self.needle_of.insert(id, (idx - self.offset, side));
            self.infer_direction(prev, id, namespace);
            graph.connect(prev, id, ConnectMode::Course);
            self.stitches.push(id);
            made.push(id);
            prev = id;
        }
        bail!("NoContinuityPath: exhausted path without reaching the next course")
    }

    /// infer yarn direction from two consecutive needles on the same side: front ascending is
    /// `Cw`, back ascending is `Ccw` (the sign convention in §4.B). Pushes `UndefinedCourseDirection`
    /// under `namespace` when `a`/`b` aren't a consecutive same-side needle pair (§7).
    pub fn infer_direction(&self, a: StitchId, b: StitchId, namespace: &str) -> crate::stitch::Direction {
        let (ai, aside) = self.needle_of(a, 0, false);
        let (bi, bside) = self.needle_of(b, 0, false);
        if aside != bside || matches!(aside, Side::Both) {
            diagnostics::push(
                namespace,
                Diagnostic::new(
                    Kind::UndefinedCourseDirection,
                    0,
                    ai,
                    aside,
                    format!("no consecutive same-side needle pair between stitch {} and {}", a, b),
                ),
            );
            return crate::stitch::Direction::Invalid;
        }
        let ascending = bi > ai;
        match (aside, ascending) {
            (Side::Front, true) => crate::stitch::Direction::Cw,
            (Side::Front, false) => crate::stitch::Direction::Ccw,
            (Side::Back, true) => crate::stitch::Direction::Ccw,
            (Side::Back, false) => crate::stitch::Direction::Cw,
            _ => crate::stitch::Direction::Invalid,
        }
    }

    /// fold a two-sided circular course of even length into non-circular form (§4.B)
    pub fn close(&mut self, mode: CloseMode, graph: &mut StitchGraph) {
        assert!(self.circular, "close() requires a circular course");
        assert_eq!(self.stitches.len() % 2, 0, "close() requires an even-length course");
        let half = self.stitches.len() / 2;
        match mode {
            CloseMode::Collapse => {
                // merge each back stitch into the matching front stitch (adds double wales)
                let (front, back) = self.stitches.split_at(half);
                let pairs: Vec<(StitchId, StitchId)> = front.iter().copied().zip(back.iter().rev().copied()).collect();
                for (f, b) in &pairs {
                    graph.disconnect(self.last_before_wrap(), self.stitches[0], ConnectMode::Course);
                    graph.merge(*f, *b);
                    graph.get_mut(*f).set_meta_default("closed", true);
                }
                self.stitches.retain(|s| !pairs.iter().any(|(_, b)| b == s));
                self.needle_of.retain(|s, _| self.stitches.contains(s));
                self.circular = false;
            }
            CloseMode::ZigZag => {
                let (front, back) = self.stitches.split_at(half);
                let mut reordered = Vec::with_capacity(self.stitches.len());
                for i in 0..half {
                    reordered.push(front[i]);
                    reordered.push(back[half - 1 - i]);
                }
                self.relink_in_order(&reordered, graph);
                for s in &reordered {
                    graph.get_mut(*s).set_meta_default("closed", true);
                }
                self.stitches = reordered;
                self.circular = false;
            }
            CloseMode::ZigZagReturn => {
                // swap every other front/back pair, circularity is preserved
                let mut reordered = self.stitches.clone();
                for chunk in reordered.chunks_mut(2).skip(0).step_by(2) {
                    if chunk.len() == 2 {
                        chunk.swap(0, 1);
                    }
                }
                self.relink_in_order(&reordered, graph);
                for s in &reordered {
                    graph.get_mut(*s).set_meta_default("closed", true);
                }
                self.stitches = reordered;
            }
        }
        self.reset(Some(self.circular), Some(true));
    }

    fn last_before_wrap(&self) -> StitchId {
        *self.stitches.last().expect("non-empty course")
    }

    fn relink_in_order(&self, order: &[StitchId], graph: &mut StitchGraph) {
        for w in order.windows(2) {
            graph.disconnect(w[0], w[1], ConnectMode::Course);
        }
        for s in order.iter() {
            graph.clear(*s, Some(ConnectMode::Course));
        }
        for w in order.windows(2) {
            graph.connect(w[0], w[1], ConnectMode::Course);
        }
        if self.circular {
            graph.connect(*order.last().unwrap(), order[0], ConnectMode::Course);
        }
    }

    /// queue a deferred many-to-one or one-to-many wale map between `self` and `other`, to be
    /// resolved later by `apply_pending` (§4.B, §9)
    pub fn link_later(&mut self, other: &Course, freedom: usize) -> Result<()> {
        let from = self.last().ok_or_else(|| anyhow::anyhow!("NoContinuityPath: empty course"))?;
        let to = other.first().ok_or_else(|| anyhow::anyhow!("NoContinuityPath: empty course"))?;
        if self.pending.iter().any(|p| p.to == to) {
            bail!("duplicate pending link against the same target stitch {}", to);
        }
        self.pending.push(PendingLink { freedom, from, to });
        Ok(())
    }

    /// create a biased many-to-one (`factor > 1`) or one-to-many (`factor < 1`... expressed as
    /// `1/n`) wale map to `other`, deferring the actual course link (§4.B)
    pub fn spread(&mut self, other: &mut Course, factor: i32, graph: &mut StitchGraph) -> Result<()> {
        let src = self.stitches_slice().to_vec();
        let dst = other.stitches_slice().to_vec();
        if src.is_empty() || dst.is_empty() {
            bail!("cannot spread an empty course");
        }
        if factor >= 1 {
            // many-to-one: `factor` source stitches per destination stitch
            let factor = factor.max(1) as usize;
            for (i, &d) in dst.iter().enumerate() {
                let start = i * factor;
                for &s in src.iter().skip(start).take(factor) {
                    graph.connect(s, d, ConnectMode::Wale);
                }
            }
        } else {
            // one-to-many: `1/factor` destination stitches per source stitch
            let factor = (-factor).max(1) as usize;
            for (i, &s) in src.iter().enumerate() {
                let start = i * factor;
                for &d in dst.iter().skip(start).take(factor) {
                    graph.connect(s, d, ConnectMode::Wale);
                }
            }
        }
        self.link_later(other, src.len().min(dst.len()))
    }

    /// resolve every queued `link_later` pair, in order of increasing degree-of-freedom, always
    /// invoking the course connection on the more-constrained side (§9)
    pub fn apply_pending(&mut self, graph: &mut StitchGraph) {
        let mut pending = std::mem::take(&mut self.pending);
        pending.sort_by_key(|p| p.freedom);
        for p in pending {
            if graph.get(p.from).is_endpoint() && graph.get(p.to).is_endpoint() {
                graph.connect(p.from, p.to, ConnectMode::Course);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infer_direction_reads_ascending_front_as_cw() {
        let mut g = StitchGraph::new();
        let c = Course::flat(&mut g, Side::Front, 3, 1);
        let a = c.stitches_slice()[0];
        let b = c.stitches_slice()[1];
        diagnostics::clear("test::course::direction_ok");
        assert_eq!(c.infer_direction(a, b, "test::course::direction_ok"), crate::stitch::Direction::Cw);
        assert!(diagnostics::entries("test::course::direction_ok").is_empty());
    }

    #[test]
    fn infer_direction_warns_when_no_consecutive_same_side_pair_exists() {
        let mut g = StitchGraph::new();
        let c = Course::tube(&mut g, 3, 1);
        let front = c.stitches_slice()[0];
        let back = c.stitches_slice()[3];
        diagnostics::clear("test::course::direction_undefined");
        let dir = c.infer_direction(front, back, "test::course::direction_undefined");
        assert_eq!(dir, crate::stitch::Direction::Invalid);
        let entries = diagnostics::entries("test::course::direction_undefined");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, Kind::UndefinedCourseDirection);
    }

    #[test]
    fn continuity_bind_manufactures_a_path_to_the_next_course() {
        let mut g = StitchGraph::new();
        let mut a = Course::flat(&mut g, Side::Front, 2, 1);
        let mut b = Course::flat(&mut g, Side::Front, 2, 1);
        // shift `b` far enough away that `link` alone can't reach it directly
        for s in b.stitches.clone() {
            let (idx, side) = *b.needle_of.get(&s).unwrap();
            b.needle_of.insert(s, (idx + 5, side));
        }
        b.reset(None, Some(false));
        let path = vec![(3, Side::Front), (4, Side::Front), (5, Side::Front)];
        diagnostics::clear("test::course::continuity");
        let made = a.continuity_bind(&mut b, &path, &mut g, "test::course::continuity").unwrap();
        assert_eq!(made.len(), 2);
        assert!(diagnostics::entries("test::course::continuity").is_empty());
    }

    #[test]
    fn flat_course_has_expected_width_and_side() {
        let mut g = StitchGraph::new();
        let c = Course::flat(&mut g, Side::Front, 4, 1);
        assert_eq!(c.width(), 4);
        assert_eq!(c.side(), Side::Front);
        assert!(!c.circular());
    }

    #[test]
    fn tube_course_is_circular_with_doubled_length() {
        let mut g = StitchGraph::new();
        let c = Course::tube(&mut g, 3, 1);
        assert_eq!(c.stitches_slice().len(), 6);
        assert!(c.circular());
        assert_eq!(c.width(), 3);
        assert_eq!(c.side(), Side::Both);
    }

    #[test]
    fn needle_of_composes_offset_and_flip() {
        let mut g = StitchGraph::new();
        let c = Course::flat(&mut g, Side::Front, 3, 1);
        let s = c.stitches_slice()[1];
        assert_eq!(c.needle_of(s, 0, false), (1, Side::Front));
        assert_eq!(c.needle_of(s, 10, false), (11, Side::Front));
        assert_eq!(c.needle_of(s, 0, true), (1, Side::Back));
    }

    #[test]
    fn link_connects_closest_compatible_endpoints() {
        let mut g = StitchGraph::new();
        let mut a = Course::flat(&mut g, Side::Front, 3, 1);
        let mut b = Course::flat(&mut g, Side::Front, 3, 1);
        a.link(&mut b, &mut g).unwrap();
        let last_a = a.last().unwrap();
        assert!(g.get(last_a).is_internal() || g.get(last_a).courses().len() == 1);
        assert!(g.get(last_a).courses().contains(&b.first().unwrap()) || g.get(last_a).courses().contains(&b.last().unwrap()));
    }

    #[test]
    fn sequence_grammar_builds_a_course() {
        let mut g = StitchGraph::new();
        let c = Course::sequence(&mut g, "F R A 4", 1, false).unwrap();
        assert_eq!(c.stitches_slice().len(), 4);
        assert_eq!(c.width(), 4);
    }

    #[test]
    fn reset_normalizes_minimum_index_to_zero() {
        let mut g = StitchGraph::new();
        let mut c = Course::flat(&mut g, Side::Front, 3, 1);
        c.offset = 5;
        // simulate externally-shifted indices, then re-zero them
        let ids: Vec<_> = c.stitches_slice().to_vec();
        for (i, id) in ids.iter().enumerate() {
            c.needle_of.insert(*id, ((i as i32) + 2, Side::Front));
        }
        c.reset(None, Some(true));
        let min = ids.iter().map(|id| c.needle_of.get(id).unwrap().0).min().unwrap();
        assert_eq!(min, 0);
    }
}
