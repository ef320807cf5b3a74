//! The simulator (§4.H): a forward time-sweep over the packed bed that replays every pass and
//! maintains, per needle, a `BackwardFlow` describing which stitch last produced the loop
//! resting there and how many misses it has accumulated since. Used to catch a stitch being
//! knit before its source loop was ever produced (`TimeTravel`, fatal) and to flag excessive
//! stacking or knitting over too many accumulated misses (recoverable, §7).

use super::{ActionKind, NeedleBed, Pass, PassType, TimeNeedleBed};
use crate::diagnostics::{self, Diagnostic, Kind};
use crate::stitch::{Side, StitchId};
use crate::{Needle, Time};

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct BackwardFlow {
    pub pointers: Vec<(StitchId, Time)>,
    pub misses: i32,
}

impl BackwardFlow {
    pub fn single(s: StitchId, time: Time) -> Self {
        Self {
            pointers: vec![(s, time)],
            misses: 0,
        }
    }

    /// fold another flow's pointers and misses into this one (used when a transfer merges two
    /// needles' worth of held loops onto a single needle)
    pub fn merge(&mut self, other: &BackwardFlow) {
        self.pointers.extend(other.pointers.iter().copied());
        self.misses = self.misses.max(other.misses);
    }
}

fn flow_at(bed: &NeedleBed, side: Side, idx: Needle) -> Option<&BackwardFlow> {
    if idx < 0 {
        return None;
    }
    let state = match side {
        Side::Back => &bed.back_state,
        _ => &bed.front_state,
    };
    state.get(idx as usize).and_then(|o| o.as_ref())
}

fn set_flow(bed: &mut NeedleBed, side: Side, idx: Needle, flow: Option<BackwardFlow>) {
    if idx < 0 {
        return;
    }
    let state = match side {
        Side::Back => &mut bed.back_state,
        _ => &mut bed.front_state,
    };
    if let Some(slot) = state.get_mut(idx as usize) {
        *slot = flow;
    }
}

pub struct Simulator<'a> {
    namespace: &'a str,
}

impl<'a> Simulator<'a> {
    pub fn new(namespace: &'a str) -> Self {
        Self { namespace }
    }

    pub fn run(&self, tnb: &mut TimeNeedleBed) {
        for t in 0..tnb.length() {
            self.step(tnb, t);
        }
    }

    fn step(&self, tnb: &mut TimeNeedleBed, t: usize) {
        if t > 0 {
            let (front_prev, back_prev) = {
                let prev = &tnb.timeline[t - 1];
                (prev.front_state.clone(), prev.back_state.clone())
            };
            let width = tnb.timeline[t].front.len();
            let bed = &mut tnb.timeline[t];
            bed.front_state = front_prev;
            bed.back_state = back_prev;
            bed.front_state.resize(width, None);
            bed.back_state.resize(width, None);
        }

        let passes = tnb.timeline[t].passes.clone();
        let time = tnb.timeline[t].time;
        for pass in &passes {
            match pass.kind() {
                PassType::Transfer => self.replay_transfer(tnb, t, pass),
                _ => self.replay_actions(tnb, t, pass, time),
            }
        }
    }

    fn replay_actions(&self, tnb: &mut TimeNeedleBed, t: usize, pass: &Pass, time: Time) {
        let mut order: Vec<StitchId> = pass.sequence.clone();
        for &s in pass.action_map.keys() {
            if !order.contains(&s) {
                order.push(s);
            }
        }
        for s in order {
            let Some(action) = pass.action_map.get(&s) else { continue };
            let (idx, side) = action.source;
            match action.kind {
                ActionKind::Miss => {
                    let bed = &mut tnb.timeline[t];
                    let mut flow = flow_at(bed, side, idx).cloned().unwrap_or_default();
                    flow.misses += 1;
                    set_flow(bed, side, idx, Some(flow));
                }
                ActionKind::Tuck => {
                    let bed = &mut tnb.timeline[t];
                    let mut flow = flow_at(bed, side, idx).cloned().unwrap_or_default();
                    flow.pointers.push((s, time));
                    flow.misses += 1;
                    set_flow(bed, side, idx, Some(flow));
                }
                ActionKind::Transfer => {}
                _ => {
                    {
                        let bed = &tnb.timeline[t];
                        if let Some(flow) = flow_at(bed, side, idx) {
                            assert!(
                                flow.pointers.iter().all(|&(_, pt)| pt <= time),
                                "TimeTravel: needle ({:?}, {}) references a loop produced after time {}",
                                side,
                                idx,
                                time
                            );
                            if flow.pointers.len() > 3 {
                                diagnostics::push(
                                    self.namespace,
                                    Diagnostic::new(
                                        Kind::ExcessiveStackedLoops,
                                        time,
                                        idx,
                                        side,
                                        format!("needle ({:?}, {}) holds {} stacked loops", side, idx, flow.pointers.len()),
                                    ),
                                );
                            }
                            if flow.misses > 2 {
                                diagnostics::push(
                                    self.namespace,
                                    Diagnostic::new(
                                        Kind::KnitOverMisses,
                                        time,
                                        idx,
                                        side,
                                        format!("knitting over {} accumulated misses at needle ({:?}, {})", flow.misses, side, idx),
                                    ),
                                );
                            }
                        }
                    }
                    let bed = &mut tnb.timeline[t];
                    if action.restack {
                        let mut flow = flow_at(bed, side, idx).cloned().unwrap_or_default();
                        flow.merge(&BackwardFlow::single(s, time));
                        set_flow(bed, side, idx, Some(flow));
                    } else {
                        set_flow(bed, side, idx, Some(BackwardFlow::single(s, time)));
                    }
                    for &(sidx, sside) in action.targets.iter().skip(1) {
                        if matches!(action.kind, ActionKind::Kickback) && (sidx, sside) == action.source {
                            continue;
                        }
                        set_flow(bed, sside, sidx, Some(BackwardFlow::single(s, time)));
                    }
                }
            }
        }
    }

    fn replay_transfer(&self, tnb: &mut TimeNeedleBed, t: usize, pass: &Pass) {
        let bed = &tnb.timeline[t];
        let mut collected: Vec<((Needle, Side), Option<(Needle, Side)>, BackwardFlow)> = Vec::new();
        for action in pass.action_map.values() {
            let (idx, side) = action.source;
            let flow = flow_at(bed, side, idx).cloned().unwrap_or_default();
            collected.push((action.source, action.targets.first().copied(), flow));
        }
        let bed = &mut tnb.timeline[t];
        for (src, _, _) in &collected {
            set_flow(bed, src.1, src.0, None);
        }
        for (_, target, flow) in collected {
            let Some((tidx, tside)) = target else { continue };
            let mut merged = flow_at(bed, tside, tidx).cloned().unwrap_or_default();
            merged.merge(&flow);
            set_flow(bed, tside, tidx, Some(merged));
        }
    }
}

pub fn simulate(tnb: &mut TimeNeedleBed, namespace: &str) {
    Simulator::new(namespace).run(tnb);
}
