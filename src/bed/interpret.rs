//! The interpreter (§4.G): walks each newly packed bed and turns its occupied needles into
//! passes of machine actions — suspended-stitch transfers, cast-on, the knit/tuck/increase
//! action pass, the pattern-target rewrite sweep, a post-action transfer pass, and cast-off.
//!
//! Unlike the builder and optimizer, the interpreter never touches the `LayoutArena` — its only
//! inputs are a `TimeNeedleBed` and the `StitchGraph` that produced it, matching the call made at
//! the end of `TimeNeedleBed::append_layout`. Active-course membership and order are therefore
//! rediscovered per bed from the course graph rather than carried over from the layout tree: the
//! largest course-connected component present in the bed is treated as the active course, and
//! every other occupant is treated as suspended.

use super::{Action, ActionKind, NeedleBed, Pass, PassType, TimeNeedleBed};
use crate::diagnostics::{self, Diagnostic, Kind};
use crate::pattern::Pattern;
use crate::stitch::{Side, StitchGraph, StitchId};
use crate::{Needle, Time};
use std::collections::{HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastMode {
    Standard,
    Waste,
    Tubular,
}

impl Default for CastMode {
    fn default() -> Self {
        CastMode::Standard
    }
}

impl CastMode {
    fn from_name(name: &str) -> Self {
        match name {
            "waste" => CastMode::Waste,
            "tubular" => CastMode::Tubular,
            _ => CastMode::Standard,
        }
    }
}

fn side_order(side: Side) -> u8 {
    match side {
        Side::Front => 0,
        Side::Back => 1,
        Side::Both => 2,
    }
}

fn bed_stitches(bed: &NeedleBed) -> Vec<StitchId> {
    bed.front.iter().chain(bed.back.iter()).flatten().copied().collect()
}

pub struct Interpreter<'a> {
    graph: &'a StitchGraph,
    namespace: String,
}

impl<'a> Interpreter<'a> {
    pub fn new(graph: &'a StitchGraph, namespace: &str) -> Self {
        Self {
            graph,
            namespace: namespace.to_string(),
        }
    }

    pub fn run(&self, tnb: &mut TimeNeedleBed, from: usize) {
        for t in from..tnb.length() {
            self.suspended_transfer_pass(tnb, t);
            self.cast_on_pass(tnb, t);
            self.action_pass(tnb, t);
            self.rewrite_pass(tnb, t);
            self.transfer_pass(tnb, t);
            self.castoff_pass(tnb, t);
            self.carry_increase_flags(tnb, t);
        }
    }

    /// the connected course component with the most members; ties keep the first one found
    fn active_component(&self, stitches: &[StitchId]) -> Vec<StitchId> {
        let present: HashSet<StitchId> = stitches.iter().copied().collect();
        let mut visited = HashSet::new();
        let mut best: Vec<StitchId> = Vec::new();
        for &s in stitches {
            if visited.contains(&s) {
                continue;
            }
            let mut stack = vec![s];
            let mut local = HashSet::new();
            local.insert(s);
            let mut comp = Vec::new();
            while let Some(cur) = stack.pop() {
                comp.push(cur);
                for &n in self.graph.get(cur).courses() {
                    if present.contains(&n) && local.insert(n) {
                        stack.push(n);
                    }
                }
            }
            visited.extend(comp.iter().copied());
            if comp.len() > best.len() {
                best = comp;
            }
        }
        self.order_course(&best)
    }

    /// walk `members` in course order, starting from an endpoint if one exists inside the set
    fn order_course(&self, members: &[StitchId]) -> Vec<StitchId> {
        if members.is_empty() {
            return Vec::new();
        }
        let set: HashSet<StitchId> = members.iter().copied().collect();
        let degree = |s: StitchId| self.graph.get(s).courses().iter().filter(|n| set.contains(n)).count();
        let start = members.iter().copied().find(|&s| degree(s) <= 1).unwrap_or(members[0]);
        let mut order = vec![start];
        let mut seen = HashSet::new();
        seen.insert(start);
        let mut prev = start;
        loop {
            let next = self
                .graph
                .get(prev)
                .courses()
                .iter()
                .copied()
                .find(|n| set.contains(n) && !seen.contains(n));
            match next {
                Some(n) => {
                    order.push(n);
                    seen.insert(n);
                    prev = n;
                }
                None => break,
            }
        }
        order
    }

    fn active_sequence(&self, bed: &NeedleBed) -> Vec<StitchId> {
        if !bed.active {
            return Vec::new();
        }
        self.active_component(&bed_stitches(bed))
    }

    fn is_first_active(&self, tnb: &TimeNeedleBed, t: usize) -> bool {
        tnb.timeline[..t].iter().all(|b| !b.active)
    }

    fn castmode_of(&self, leader: Option<StitchId>, key: &str) -> CastMode {
        leader
            .and_then(|s| {
                self.graph
                    .get(s)
                    .meta(key, None)
                    .into_iter()
                    .find_map(|v| match v {
                        crate::stitch::metadata::MetaValue::Str(name) => Some(CastMode::from_name(name)),
                        _ => None,
                    })
            })
            .unwrap_or_default()
    }

    // ---- pass 1: suspended-stitch transfer --------------------------------------------------

    fn suspended_transfer_pass(&self, tnb: &mut TimeNeedleBed, t: usize) {
        let bed = tnb.timeline[t].clone();
        let gate = bed.groups.len() > 1 || bed.active_group.is_none();
        if !gate {
            return;
        }
        let all = bed_stitches(&bed);
        let active: HashSet<StitchId> = self.active_sequence(&bed).into_iter().collect();
        let prev = tnb.at(t as Time - 1);
        let mut entries: Vec<((Needle, Side), (Needle, Side), StitchId)> = Vec::new();
        for s in all {
            if active.contains(&s) {
                continue;
            }
            let Some(cur_pos) = bed.position_of(s) else { continue };
            let Some(prev_pos) = prev.position_of(s) else { continue };
            if cur_pos != prev_pos {
                entries.push((prev_pos, cur_pos, s));
            }
        }
        if entries.is_empty() {
            return;
        }
        entries.sort_by_key(|(src, _, s)| (side_order(src.1), *s));
        let mut pass = Pass::new(PassType::Transfer);
        for (src, tgt, s) in entries {
            let mut action = Action::new(ActionKind::Transfer, src);
            action.targets = vec![tgt];
            pass.sequence.push(s);
            pass.action_map.insert(s, action);
        }
        tnb.timeline[t].passes.push(pass);
    }

    // ---- pass 2: cast-on ---------------------------------------------------------------------

    fn cast_on_pass(&self, tnb: &mut TimeNeedleBed, t: usize) {
        let bed = tnb.timeline[t].clone();
        if !self.is_first_active(tnb, t) {
            return;
        }
        let seq = self.active_sequence(&bed);
        if seq.is_empty() {
            return;
        }
        let mode = self.castmode_of(seq.first().copied(), "castOnMode");
        let mut pass = Pass::new(PassType::CastOn);
        pass.sequence = seq.clone();
        for s in seq {
            let pos = bed.position_of(s).expect("cast-on stitch must be placed in its own bed");
            let mut action = Action::new(ActionKind::Knit, pos);
            action.casting = true;
            action.targets = vec![pos];
            action.increase_type = Some(match mode {
                CastMode::Waste => ActionKind::Tuck,
                CastMode::Tubular => ActionKind::FbKnit,
                CastMode::Standard => ActionKind::Knit,
            });
            pass.action_map.insert(s, action);
        }
        tnb.timeline[t].passes.push(pass);
    }

    // ---- pass 3: action -----------------------------------------------------------------------

    fn action_pass(&self, tnb: &mut TimeNeedleBed, t: usize) {
        let bed = tnb.timeline[t].clone();
        let seq = self.active_sequence(&bed);
        if seq.is_empty() {
            return;
        }
        let prev = tnb.at(t as Time - 1);
        let next = tnb.at(t as Time + 1);
        let is_cast_on_bed = self.is_first_active(tnb, t);
        let circular = seq.len() > 1 && self.graph.get(seq[0]).courses().contains(seq.last().unwrap());

        let mut pass = Pass::new(PassType::Action);
        pass.sequence = seq.clone();
        let mut set_kickback = HashMap::new();
        let mut set_split = HashMap::new();
        let mut set_splitted = HashMap::new();

        for &s in &seq {
            let source = bed.position_of(s).expect("active stitch must have a needle this bed");
            let lower_exists = self.graph.get(s).wales().iter().any(|&w| prev.position_of(w).is_some());
            let casting = !lower_exists && !is_cast_on_bed;

            let mut target_stitches: Vec<StitchId> = self
                .graph
                .get(s)
                .wales()
                .iter()
                .copied()
                .filter(|&w| next.position_of(w).is_some())
                .collect();
            if target_stitches.len() > 2 {
                diagnostics::push(
                    &self.namespace,
                    Diagnostic::new(
                        Kind::TooManyUpperWales,
                        bed.time,
                        source.0,
                        source.1,
                        format!("stitch {} has {} upper wales on the next bed", s, target_stitches.len()),
                    ),
                );
                target_stitches.truncate(2);
            }
            let targets: Vec<(Needle, Side)> = target_stitches.iter().map(|&w| next.position_of(w).unwrap()).collect();

            let mut action = match targets.len() {
                0 | 1 => self.classify_narrow(&bed, s, source, target_stitches.first().copied(), targets.first().copied(), &next),
                _ => self.classify_increase(
                    source,
                    &target_stitches,
                    &targets,
                    !circular,
                    &mut set_kickback,
                    &mut set_split,
                    &mut set_splitted,
                ),
            };
            action.casting = casting;
            pass.action_map.insert(s, action);
        }

        tnb.timeline[t].passes.push(pass);
        tnb.timeline[t].set_kickback = set_kickback;
        tnb.timeline[t].set_split = set_split;
        tnb.timeline[t].set_splitted = set_splitted;
    }

    fn classify_narrow(
        &self,
        bed: &NeedleBed,
        s: StitchId,
        source: (Needle, Side),
        target_stitch: Option<StitchId>,
        target: Option<(Needle, Side)>,
        next: &NeedleBed,
    ) -> Action {
        let is_course_neighbor = target_stitch.map_or(false, |w| self.graph.get(s).courses().contains(&w));
        let splitted = bed.has_splitted.get(&s).copied().unwrap_or(false);
        let kickback = bed.has_kickback.get(&s).copied().unwrap_or(false);
        let split = bed.has_split.get(&s).copied().unwrap_or(false);
        let regular = target.is_some() && !is_course_neighbor && !splitted && !kickback && !split;

        if regular {
            return self.regular_action(bed, s, source, target.unwrap());
        }

        let kind = if splitted {
            ActionKind::SplitMiss
        } else if kickback {
            ActionKind::Kickback
        } else if split {
            ActionKind::Split
        } else if target.is_none() && next.position_of(s).is_some() {
            ActionKind::Tuck
        } else {
            ActionKind::Knit
        };
        let mut action = Action::new(kind, source);
        action.regular = false;
        action.shortrow = matches!(kind, ActionKind::Tuck) && target.is_none();
        if let Some(t) = target {
            action.targets = vec![t];
        }
        action
    }

    fn regular_action(&self, bed: &NeedleBed, s: StitchId, source: (Needle, Side), target: (Needle, Side)) -> Action {
        let pattern = self.graph.get(s).pattern;
        let reverse = pattern.is_reverse();
        let kind = match pattern {
            Pattern::Tuck => ActionKind::Tuck,
            Pattern::Miss => ActionKind::Miss,
            Pattern::Stack => ActionKind::Stack,
            _ if reverse => ActionKind::Purl,
            _ => ActionKind::Knit,
        };
        if matches!(kind, ActionKind::Purl) && bed.stitch_at(source.1.other(), source.0).is_some() {
            diagnostics::push(
                &self.namespace,
                Diagnostic::new(
                    Kind::ReverseStitchConflict,
                    bed.time,
                    source.0,
                    source.1,
                    format!("reverse action on stitch {} conflicts with an occupied opposite needle", s),
                ),
            );
        }
        let mut action = Action::new(kind, source);
        action.regular = true;
        action.reverse = reverse;
        action.restack = matches!(kind, ActionKind::Stack);
        if !matches!(pattern, Pattern::Miss) {
            action.targets = vec![target];
        }
        action
    }

    /// two-target increase resolution (§4.G): FB_KNIT when both targets share a needle on
    /// opposite sides of a bounded course; otherwise SPLIT when the nearer target sits at the
    /// source needle and the farther one is within two needles, else KICKBACK.
    #[allow(clippy::too_many_arguments)]
    fn classify_increase(
        &self,
        source: (Needle, Side),
        target_stitches: &[StitchId],
        targets: &[(Needle, Side)],
        bounded: bool,
        set_kickback: &mut HashMap<StitchId, bool>,
        set_split: &mut HashMap<StitchId, bool>,
        set_splitted: &mut HashMap<StitchId, bool>,
    ) -> Action {
        let (t0, t1) = (targets[0], targets[1]);
        if t0.0 == t1.0 && t0.1 != t1.1 && bounded {
            let mut action = Action::new(ActionKind::FbKnit, source);
            action.targets = vec![t0, t1];
            action.increase_target = Some(t1);
            return action;
        }

        let dist = |t: (Needle, Side)| (t.0 - source.0).unsigned_abs() + if t.1 != source.1 { 1 } else { 0 };
        let mut pairs: Vec<((Needle, Side), StitchId)> = targets.iter().copied().zip(target_stitches.iter().copied()).collect();
        pairs.sort_by_key(|(t, _)| dist(*t));
        let (near, _near_id) = pairs[0];
        let (far, far_id) = pairs[1];

        if near == source && (far.0 - source.0).unsigned_abs() <= 2 {
            let mut action = Action::new(ActionKind::Split, source);
            action.targets = vec![far, near];
            action.increase_target = Some(far);
            set_splitted.insert(far_id, true);
            action
        } else {
            let mut action = Action::new(ActionKind::Kickback, source);
            action.targets = vec![far, source];
            action.increase_target = Some(far);
            set_kickback.insert(far_id, true);
            action
        }
    }

    // ---- pass 4: pattern-target rewrite --------------------------------------------------------

    fn rewrite_pass(&self, tnb: &mut TimeNeedleBed, t: usize) {
        let Some(pass_idx) = tnb.timeline[t].passes.iter().position(|p| p.kind() == PassType::Action) else { return };
        let seq = tnb.timeline[t].passes[pass_idx].sequence.clone();
        let circular = seq.len() > 1 && self.graph.get(seq[0]).courses().contains(seq.last().unwrap());
        let mut action_map = tnb.timeline[t].passes[pass_idx].action_map.clone();

        for (i, &s) in seq.iter().enumerate() {
            let Some(action) = action_map.get(&s) else { continue };
            if !action.regular {
                continue;
            }
            let pattern = self.graph.get(s).pattern;
            let Some((dir, steps)) = pattern.move_step() else { continue };
            let Some(neighbor_idx) = Self::step_index(i, dir * steps, seq.len(), circular) else { continue };
            let neighbor = seq[neighbor_idx];
            let Some(n_target) = action_map.get(&neighbor).and_then(|a| a.targets.first().copied()) else { continue };
            action_map.get_mut(&s).unwrap().targets = vec![n_target];
        }

        self.rewrite_crosses(&seq, &mut action_map, circular, tnb.timeline[t].time);

        for action in action_map.values_mut() {
            if matches!(action.kind, ActionKind::Miss) {
                action.targets.clear();
            }
        }

        tnb.timeline[t].passes[pass_idx].action_map = action_map;
    }

    fn step_index(i: usize, delta: i32, len: usize, circular: bool) -> Option<usize> {
        if len == 0 {
            return None;
        }
        let raw = i as i32 + delta;
        if circular {
            Some(raw.rem_euclid(len as i32) as usize)
        } else if raw >= 0 && (raw as usize) < len {
            Some(raw as usize)
        } else {
            None
        }
    }

    fn pairing_for_first(dir_right: bool) -> (bool, bool, bool) {
        (true, dir_right, false)
    }
    fn pairing_for_second(first: (bool, bool, bool)) -> (bool, bool, bool) {
        (!first.2, !first.1, !first.0)
    }

    fn rewrite_crosses(&self, seq: &[StitchId], action_map: &mut HashMap<StitchId, Action>, circular: bool, time: Time) {
        let n = seq.len();
        if n == 0 {
            return;
        }
        // steps forward from `i` by `k` positions in scan direction `dir`; wraps when circular,
        // otherwise runs off the end and stops the scan
        let norm = |i: usize, k: i32, dir: i32| -> Option<usize> {
            let raw = i as i32 + dir * k;
            if circular {
                Some(raw.rem_euclid(n as i32) as usize)
            } else if raw >= 0 && (raw as usize) < n {
                Some(raw as usize)
            } else {
                None
            }
        };

        let mut consumed = vec![false; n];
        for i in 0..n {
            if consumed[i] {
                continue;
            }
            let pattern0 = self.graph.get(seq[i]).pattern;
            if !pattern0.is_cross() {
                continue;
            }
            let Some(dir) = pattern0.cross_direction() else { continue };

            let mut first_idx = Vec::new();
            let mut k = 0i32;
            while let Some(idx) = norm(i, k, dir) {
                if first_idx.len() >= n || consumed[idx] || self.graph.get(seq[idx]).pattern != pattern0 {
                    break;
                }
                first_idx.push(idx);
                k += 1;
            }

            let mut relief_idx = Vec::new();
            while let Some(idx) = norm(i, k, dir) {
                if relief_idx.len() >= n || consumed[idx] || self.graph.get(seq[idx]).pattern.is_cross() {
                    break;
                }
                relief_idx.push(idx);
                k += 1;
            }

            let Some(complement) = pattern0.cross_complement() else { continue };
            let mut second_idx = Vec::new();
            while let Some(idx) = norm(i, k, dir) {
                if second_idx.len() >= n || consumed[idx] || self.graph.get(seq[idx]).pattern != complement {
                    break;
                }
                second_idx.push(idx);
                k += 1;
            }

            if second_idx.is_empty() || first_idx.len() != second_idx.len() {
                for &fi in &first_idx {
                    if let Some(a) = action_map.get_mut(&seq[fi]) {
                        a.kind = ActionKind::Miss;
                    }
                }
                diagnostics::push(
                    &self.namespace,
                    Diagnostic::new(Kind::InvalidCrossPair, time, 0, Side::Both, "cross recognition found no matching complement; falling back to MISS"),
                );
                for &fi in &first_idx {
                    consumed[fi] = true;
                }
                continue;
            }

            let side_of = |idx: usize| action_map.get(&seq[idx]).map(|a| a.source.1);
            let sides: Vec<Side> = first_idx.iter().chain(second_idx.iter()).filter_map(|&idx| side_of(idx)).collect();
            let all_same_side = sides.windows(2).all(|w| w[0] == w[1]);
            if !all_same_side {
                for &idx in first_idx.iter().chain(second_idx.iter()) {
                    if let Some(a) = action_map.get_mut(&seq[idx]) {
                        a.kind = ActionKind::Miss;
                    }
                }
                diagnostics::push(
                    &self.namespace,
                    Diagnostic::new(Kind::InvalidCrossPair, time, 0, Side::Both, "cross pair spans mismatched bed sides; falling back to MISS"),
                );
                for &idx in first_idx.iter().chain(second_idx.iter()) {
                    consumed[idx] = true;
                }
                continue;
            }

            for (&fi, &si) in first_idx.iter().zip(second_idx.iter()) {
                let f_target = action_map.get(&seq[fi]).and_then(|a| a.targets.first().copied());
                let s_target = action_map.get(&seq[si]).and_then(|a| a.targets.first().copied());
                let first_pairing = Self::pairing_for_first(dir > 0);
                let second_pairing = Self::pairing_for_second(first_pairing);
                if let (Some(ft), Some(st)) = (f_target, s_target) {
                    if let Some(a) = action_map.get_mut(&seq[fi]) {
                        a.targets = vec![st];
                        a.pairing = Some(first_pairing);
                    }
                    if let Some(a) = action_map.get_mut(&seq[si]) {
                        a.targets = vec![ft];
                        a.pairing = Some(second_pairing);
                    }
                }
            }

            for &idx in first_idx.iter().chain(relief_idx.iter()).chain(second_idx.iter()) {
                consumed[idx] = true;
            }
        }
    }

    // ---- pass 5: post-action transfer ----------------------------------------------------------

    fn transfer_pass(&self, tnb: &mut TimeNeedleBed, t: usize) {
        let Some(pass_idx) = tnb.timeline[t].passes.iter().position(|p| p.kind() == PassType::Action) else { return };
        let action_map = tnb.timeline[t].passes[pass_idx].action_map.clone();
        let mut entries: Vec<((Needle, Side), (Needle, Side), StitchId)> = Vec::new();
        for (&s, action) in &action_map {
            if matches!(action.kind, ActionKind::FbKnit) {
                continue;
            }
            if let Some(&target) = action.targets.first() {
                if target != action.source {
                    entries.push((action.source, target, s));
                }
            }
        }
        if entries.is_empty() {
            return;
        }
        entries.sort_by_key(|(src, _, s)| (side_order(src.1), *s));
        let mut pass = Pass::new(PassType::Transfer);
        for (src, tgt, s) in entries {
            let mut a = Action::new(ActionKind::Transfer, src);
            a.targets = vec![tgt];
            pass.sequence.push(s);
            pass.action_map.insert(s, a);
        }
        tnb.timeline[t].passes.push(pass);
    }

    // ---- pass 6: cast-off / clear ---------------------------------------------------------------

    fn castoff_pass(&self, tnb: &mut TimeNeedleBed, t: usize) {
        let Some(pass_idx) = tnb.timeline[t].passes.iter().position(|p| p.kind() == PassType::Action) else { return };
        let seq = tnb.timeline[t].passes[pass_idx].sequence.clone();
        let Some(&tail) = seq.last() else { return };
        let current: HashSet<StitchId> = seq.iter().copied().collect();
        let next = tnb.at(t as Time + 1);

        let candidate = self.graph.get(tail).courses().iter().copied().find(|n| !current.contains(n));
        let continues = candidate.map_or(false, |n| next.position_of(n).is_some());

        let bed = tnb.timeline[t].clone();
        if continues {
            let action_map = &tnb.timeline[t].passes[pass_idx].action_map;
            let orphans: Vec<StitchId> = seq
                .iter()
                .copied()
                .filter(|s| {
                    action_map
                        .get(s)
                        .map_or(false, |a| a.targets.is_empty() && next.position_of(*s).is_none())
                })
                .collect();
            if orphans.is_empty() {
                return;
            }
            let mut pass = Pass::new(PassType::CastOff);
            pass.sequence = orphans.clone();
            for s in orphans {
                let pos = bed.position_of(s).expect("orphan stitch must sit in its own bed");
                pass.action_map.insert(s, Action::new(ActionKind::Miss, pos));
            }
            tnb.timeline[t].passes.push(pass);
        } else {
            let filtered: Vec<StitchId> = seq.iter().rev().copied().filter(|s| next.position_of(*s).is_none()).collect();
            if filtered.is_empty() {
                return;
            }
            let mode = self.castmode_of(filtered.first().copied(), "castOffMode");
            let mut pass = Pass::new(PassType::CastOff);
            pass.sequence = filtered.clone();
            for s in filtered {
                let pos = bed.position_of(s).expect("cast-off stitch must sit in its own bed");
                let mut a = Action::new(ActionKind::Knit, pos);
                a.casting = false;
                a.increase_type = Some(match mode {
                    CastMode::Waste => ActionKind::Tuck,
                    CastMode::Tubular => ActionKind::FbKnit,
                    CastMode::Standard => ActionKind::Knit,
                });
                pass.action_map.insert(s, a);
            }
            tnb.timeline[t].passes.push(pass);
        }
    }

    fn carry_increase_flags(&self, tnb: &mut TimeNeedleBed, t: usize) {
        if t + 1 >= tnb.length() {
            return;
        }
        let (sk, ss, sp) = {
            let bed = &tnb.timeline[t];
            (bed.set_kickback.clone(), bed.set_splitted.clone(), bed.set_split.clone())
        };
        let next = &mut tnb.timeline[t + 1];
        next.has_kickback.extend(sk);
        next.has_splitted.extend(ss);
        next.has_split.extend(sp);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::course::Course;
    use crate::layout::LayoutArena;
    use crate::stitch::ConnectMode;

    fn build_flat_two_rows() -> (StitchGraph, TimeNeedleBed) {
        let mut g = StitchGraph::new();
        let mut arena = LayoutArena::new();
        let c0 = Course::flat(&mut g, Side::Front, 3, 1);
        let c1 = Course::flat(&mut g, Side::Front, 3, 1);
        for (a, b) in c0.stitches_slice().iter().zip(c1.stitches_slice().iter()) {
            g.connect(*a, *b, ConnectMode::Wale);
        }
        let l0 = arena.new_leaf(c0);
        let l1 = arena.new_leaf(c1);
        arena.node_mut(l1).time = 1;
        let root = arena.new_internal(vec![l0, l1]);

        diagnostics::clear("test::interpret::flat");
        let mut tnb = TimeNeedleBed::new();
        tnb.append_layout(&[root], &mut arena, &g, "test::interpret::flat");
        (g, tnb)
    }

    #[test]
    fn plain_sheet_knits_every_stitch_to_its_wale_target() {
        let (g, tnb) = build_flat_two_rows();
        let action_pass = tnb.timeline[0].actions_of(PassType::Action).unwrap();
        assert_eq!(action_pass.sequence.len(), 3);
        for (&s, action) in &action_pass.action_map {
            assert!(action.regular);
            assert_eq!(action.kind, ActionKind::Knit);
            assert_eq!(action.targets.len(), 1);
            let (idx, side) = action.source;
            assert_eq!(idx, tnb.timeline[0].position_of(s).unwrap().0);
            assert_eq!(side, tnb.timeline[0].position_of(s).unwrap().1);
        }
        assert!(diagnostics::entries("test::interpret::flat").is_empty());
    }

    #[test]
    fn cast_on_fires_only_on_the_first_active_bed() {
        let (_, tnb) = build_flat_two_rows();
        assert!(tnb.timeline[0].actions_of(PassType::CastOn).is_some());
        assert!(tnb.timeline[1].actions_of(PassType::CastOn).is_none());
    }

    #[test]
    fn too_many_upper_wales_is_reported_and_truncated() {
        let mut g = StitchGraph::new();
        let mut arena = LayoutArena::new();
        let c0 = Course::flat(&mut g, Side::Front, 1, 1);
        let c1 = Course::flat(&mut g, Side::Front, 3, 1);
        let s0 = c0.stitches_slice()[0];
        for &w in c1.stitches_slice() {
            g.connect(s0, w, ConnectMode::Wale);
        }
        let l0 = arena.new_leaf(c0);
        let l1 = arena.new_leaf(c1);
        arena.node_mut(l1).time = 1;
        let root = arena.new_internal(vec![l0, l1]);

        diagnostics::clear("test::interpret::toomany");
        let mut tnb = TimeNeedleBed::new();
        tnb.append_layout(&[root], &mut arena, &g, "test::interpret::toomany");

        let entries = diagnostics::entries("test::interpret::toomany");
        assert!(entries.iter().any(|d| d.kind == Kind::TooManyUpperWales));
        let action_pass = tnb.timeline[0].actions_of(PassType::Action).unwrap();
        let action = &action_pass.action_map[&s0];
        assert_eq!(action.targets.len(), 2);
    }

    #[test]
    fn move_pattern_retargets_to_a_course_neighbor() {
        let mut g = StitchGraph::new();
        let mut arena = LayoutArena::new();
        let c0 = Course::flat(&mut g, Side::Front, 3, 1);
        let c1 = Course::flat(&mut g, Side::Front, 3, 1);
        for (a, b) in c0.stitches_slice().iter().zip(c1.stitches_slice().iter()) {
            g.connect(*a, *b, ConnectMode::Wale);
        }
        g.get_mut(c0.stitches_slice()[0]).pattern = Pattern::FrontMoveRight1;
        let l0 = arena.new_leaf(c0.clone());
        let l1 = arena.new_leaf(c1.clone());
        arena.node_mut(l1).time = 1;
        let root = arena.new_internal(vec![l0, l1]);

        diagnostics::clear("test::interpret::move");
        let mut tnb = TimeNeedleBed::new();
        tnb.append_layout(&[root], &mut arena, &g, "test::interpret::move");

        let action_pass = tnb.timeline[0].actions_of(PassType::Action).unwrap();
        let moved = &action_pass.action_map[&c0.stitches_slice()[0]];
        let neighbor = &action_pass.action_map[&c0.stitches_slice()[1]];
        assert_eq!(moved.targets, neighbor.targets);
    }

    #[test]
    fn cross_pair_swaps_targets_symmetrically() {
        let mut g = StitchGraph::new();
        let mut arena = LayoutArena::new();
        let c0 = Course::flat(&mut g, Side::Front, 4, 1);
        let c1 = Course::flat(&mut g, Side::Front, 4, 1);
        for (a, b) in c0.stitches_slice().iter().zip(c1.stitches_slice().iter()) {
            g.connect(*a, *b, ConnectMode::Wale);
        }
        let s = c0.stitches_slice().to_vec();
        g.get_mut(s[0]).pattern = Pattern::CrossRightUpper;
        g.get_mut(s[1]).pattern = Pattern::CrossRightUpper;
        g.get_mut(s[2]).pattern = Pattern::CrossLeftLower;
        g.get_mut(s[3]).pattern = Pattern::CrossLeftLower;
        let l0 = arena.new_leaf(c0);
        let l1 = arena.new_leaf(c1.clone());
        arena.node_mut(l1).time = 1;
        let root = arena.new_internal(vec![l0, l1]);

        diagnostics::clear("test::interpret::cross");
        let mut tnb = TimeNeedleBed::new();
        tnb.append_layout(&[root], &mut arena, &g, "test::interpret::cross");

        let action_pass = tnb.timeline[0].actions_of(PassType::Action).unwrap();
        let a0 = &action_pass.action_map[&s[0]];
        let a2 = &action_pass.action_map[&s[2]];
        assert_eq!(a0.targets, vec![tnb.timeline[1].position_of(c1.stitches_slice()[2]).unwrap()]);
        assert_eq!(a2.targets, vec![tnb.timeline[1].position_of(c1.stitches_slice()[0]).unwrap()]);
        let (f0, r0, s0) = a0.pairing.unwrap();
        let (f2, r2, s2) = a2.pairing.unwrap();
        assert_eq!((f2, r2, s2), (!s0, !r0, !f0));
    }

    #[test]
    fn short_row_suspension_produces_a_transfer_on_rejoin() {
        let mut g = StitchGraph::new();
        let mut arena = LayoutArena::new();
        let c0 = Course::flat(&mut g, Side::Front, 3, 1);
        let c1 = Course::flat(&mut g, Side::Front, 2, 1);
        let c2 = Course::flat(&mut g, Side::Front, 3, 1);
        g.connect(c0.stitches_slice()[0], c1.stitches_slice()[0], ConnectMode::Wale);
        g.connect(c0.stitches_slice()[1], c1.stitches_slice()[1], ConnectMode::Wale);
        g.connect(c0.stitches_slice()[2], c2.stitches_slice()[2], ConnectMode::Wale);
        g.connect(c1.stitches_slice()[0], c2.stitches_slice()[0], ConnectMode::Wale);
        g.connect(c1.stitches_slice()[1], c2.stitches_slice()[1], ConnectMode::Wale);

        let mut builder_arena = LayoutArena::new();
        let l0 = builder_arena.new_leaf(c0.clone());
        let l1 = builder_arena.new_leaf(c1.clone());
        builder_arena.node_mut(l1).time = 1;
        builder_arena.leaf_mut(l1).unwrap().suspend(
            &[c0.stitches_slice()[2]],
            &std::collections::HashMap::from([(c0.stitches_slice()[2], c0.needle_of(c0.stitches_slice()[2], 0, false))]),
        );
        builder_arena.link_to(l0, l1, &g);
        let l2 = builder_arena.new_leaf(c2.clone());
        builder_arena.node_mut(l2).time = 2;
        builder_arena.link_to(l1, l2, &g);
        let root = builder_arena.new_internal(vec![l0, l1, l2]);

        diagnostics::clear("test::interpret::shortrow");
        let mut tnb = TimeNeedleBed::new();
        tnb.append_layout(&[root], &mut builder_arena, &g, "test::interpret::shortrow");

        let action0 = tnb.timeline[0].actions_of(PassType::Action).unwrap();
        let held = &action0.action_map[&c0.stitches_slice()[2]];
        assert!(held.shortrow);
        assert_eq!(held.kind, ActionKind::Tuck);
    }

    #[test]
    fn purl_on_a_doubly_occupied_needle_reports_reverse_stitch_conflict() {
        let mut g = StitchGraph::new();
        let mut arena = LayoutArena::new();
        let c0 = Course::tube(&mut g, 3, 1);
        let c1 = Course::tube(&mut g, 3, 1);
        for (a, b) in c0.stitches_slice().iter().zip(c1.stitches_slice().iter()) {
            g.connect(*a, *b, ConnectMode::Wale);
        }
        g.get_mut(c0.stitches_slice()[0]).pattern = Pattern::Purl;
        let l0 = arena.new_leaf(c0.clone());
        let l1 = arena.new_leaf(c1);
        arena.node_mut(l1).time = 1;
        let root = arena.new_internal(vec![l0, l1]);

        diagnostics::clear("test::interpret::reverseconflict");
        let mut tnb = TimeNeedleBed::new();
        tnb.append_layout(&[root], &mut arena, &g, "test::interpret::reverseconflict");

        let entries = diagnostics::entries("test::interpret::reverseconflict");
        assert!(entries.iter().any(|d| d.kind == Kind::ReverseStitchConflict));
        let action_pass = tnb.timeline[0].actions_of(PassType::Action).unwrap();
        let action = &action_pass.action_map[&c0.stitches_slice()[0]];
        assert_eq!(action.kind, ActionKind::Purl);
        assert!(action.reverse);
    }

    #[test]
    fn stack_pattern_sets_restack() {
        let mut g = StitchGraph::new();
        let mut arena = LayoutArena::new();
        let c0 = Course::flat(&mut g, Side::Front, 3, 1);
        let c1 = Course::flat(&mut g, Side::Front, 3, 1);
        for (a, b) in c0.stitches_slice().iter().zip(c1.stitches_slice().iter()) {
            g.connect(*a, *b, ConnectMode::Wale);
        }
        g.get_mut(c0.stitches_slice()[0]).pattern = Pattern::Stack;
        let l0 = arena.new_leaf(c0.clone());
        let l1 = arena.new_leaf(c1);
        arena.node_mut(l1).time = 1;
        let root = arena.new_internal(vec![l0, l1]);

        diagnostics::clear("test::interpret::stack");
        let mut tnb = TimeNeedleBed::new();
        tnb.append_layout(&[root], &mut arena, &g, "test::interpret::stack");

        let action_pass = tnb.timeline[0].actions_of(PassType::Action).unwrap();
        let action = &action_pass.action_map[&c0.stitches_slice()[0]];
        assert_eq!(action.kind, ActionKind::Stack);
        assert!(action.restack);
    }

    #[test]
    fn kickback_increase_records_its_increase_target() {
        let mut g = StitchGraph::new();
        let mut arena = LayoutArena::new();
        let c0 = Course::flat(&mut g, Side::Front, 1, 1);
        let c1 = Course::flat(&mut g, Side::Front, 3, 1);
        let s0 = c0.stitches_slice()[0];
        for &w in c1.stitches_slice() {
            g.connect(s0, w, ConnectMode::Wale);
        }
        let l0 = arena.new_leaf(c0);
        let l1 = arena.new_leaf(c1);
        arena.node_mut(l1).time = 1;
        let root = arena.new_internal(vec![l0, l1]);

        diagnostics::clear("test::interpret::increasetarget");
        let mut tnb = TimeNeedleBed::new();
        tnb.append_layout(&[root], &mut arena, &g, "test::interpret::increasetarget");

        let action_pass = tnb.timeline[0].actions_of(PassType::Action).unwrap();
        let action = &action_pass.action_map[&s0];
        assert!(matches!(action.kind, ActionKind::Split | ActionKind::Kickback));
        assert_eq!(action.targets.len(), 2);
        assert_eq!(action.increase_target, Some(action.targets[0]));
    }
}
