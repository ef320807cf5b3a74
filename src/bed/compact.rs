//! The compactor (§4.I): collapses duplicate and empty beds out of a packed `TimeNeedleBed`,
//! renumbering times so the timeline is dense again, and carries every pass, stitch placement,
//! group record, simulator flow and diagnostic along using the same old-time -> new-time map.
//!
//! Compaction runs at the `TimeNeedleBed` level rather than replaying the layout-group sweep:
//! the externally observable contract (fewer beds, `timeline[t].time == t`, preserved actions
//! and remapped diagnostics, idempotence) is the same either way, and recomputing it directly
//! from the packed beds avoids re-deriving the layout tree the interpreter already discarded.

use super::{GroupInfo, NeedleBed, TimeNeedleBed};
use crate::diagnostics;
use crate::stitch::StitchId;
use crate::Time;
use std::collections::{HashMap, HashSet};

fn bed_is_empty(bed: &NeedleBed) -> bool {
    bed.front.iter().all(|c| c.is_empty()) && bed.back.iter().all(|c| c.is_empty())
}

fn bed_stitches(bed: &NeedleBed) -> HashSet<StitchId> {
    bed.front.iter().chain(bed.back.iter()).flatten().copied().collect()
}

fn recompute_duplicate(beds: &mut [NeedleBed]) {
    for i in 0..beds.len() {
        beds[i].duplicate = if i == 0 {
            false
        } else {
            let cur = bed_stitches(&beds[i]);
            !cur.is_empty()
                && cur.iter().all(|s| {
                    let prev_pos = beds[i - 1].position_of(*s);
                    prev_pos.is_some() && prev_pos == beds[i].position_of(*s)
                })
        };
    }
}

/// drop duplicate/empty beds until a fixed point, returning the surviving beds (renumbered) and
/// a map from every original bed time to the time it settled at (elided beds keep the last time
/// they held before disappearing, i.e. they collapse onto their nearest surviving predecessor)
fn shrink(timeline: &[NeedleBed]) -> (Vec<NeedleBed>, HashMap<Time, Time>) {
    let mut beds: Vec<NeedleBed> = timeline.to_vec();
    let mut history: HashMap<Time, Time> = timeline.iter().map(|b| (b.time, b.time)).collect();

    loop {
        recompute_duplicate(&mut beds);
        let keep: Vec<usize> = (0..beds.len()).filter(|&i| !beds[i].duplicate && !bed_is_empty(&beds[i])).collect();
        if keep.len() == beds.len() {
            break;
        }
        let mut step_map: HashMap<Time, Time> = HashMap::new();
        for (new_t, &old_i) in keep.iter().enumerate() {
            step_map.insert(beds[old_i].time, new_t as Time);
        }
        let mut next = Vec::with_capacity(keep.len());
        for (new_t, &old_i) in keep.iter().enumerate() {
            let mut b = beds[old_i].clone();
            b.time = new_t as Time;
            next.push(b);
        }
        for v in history.values_mut() {
            if let Some(&nt) = step_map.get(v) {
                *v = nt;
            }
        }
        if next.len() == beds.len() {
            beds = next;
            break;
        }
        beds = next;
    }
    (beds, history)
}

fn remap_group_info(info: &GroupInfo, history: &HashMap<Time, Time>) -> GroupInfo {
    GroupInfo {
        shape: info.shape,
        groups: info.groups.clone(),
        times: info.times.iter().map(|t| *history.get(t).unwrap_or(t)).collect(),
        start_time: *history.get(&info.start_time).unwrap_or(&info.start_time),
    }
}

/// compact `tnb`, copying `namespace`'s diagnostics into `out_namespace` with times remapped
pub fn compact(tnb: &TimeNeedleBed, namespace: &str, out_namespace: &str) -> TimeNeedleBed {
    let (mut beds, history) = shrink(&tnb.timeline);

    for bed in beds.iter_mut() {
        for slot in bed.front_state.iter_mut().chain(bed.back_state.iter_mut()) {
            if let Some(flow) = slot {
                for (_, pt) in flow.pointers.iter_mut() {
                    *pt = *history.get(pt).unwrap_or(pt);
                }
            }
        }
    }

    let mut out = TimeNeedleBed::new();
    out.width = tnb.width;
    out.timeline = beds;

    for (new_t, bed) in out.timeline.iter().enumerate() {
        for s in bed.front.iter().chain(bed.back.iter()).flatten().copied() {
            out.stitch_map.entry(s).or_insert(new_t);
        }
    }
    out.group_map = tnb.group_map.iter().map(|(&id, info)| (id, remap_group_info(info, &history))).collect();
    out.node_map = tnb.node_map.iter().map(|(&id, info)| (id, remap_group_info(info, &history))).collect();

    diagnostics::clear(out_namespace);
    for mut d in diagnostics::entries(namespace) {
        d.time = *history.get(&d.time).unwrap_or(&d.time);
        diagnostics::push(out_namespace, d);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bed::simulate;
    use crate::course::Course;
    use crate::layout::LayoutArena;
    use crate::stitch::{ConnectMode, Side, StitchGraph};

    fn flat_sheet(rows: usize, width: usize) -> (StitchGraph, TimeNeedleBed) {
        let mut g = StitchGraph::new();
        let mut arena = LayoutArena::new();
        let mut leaves = Vec::new();
        let mut prev: Option<Course> = None;
        for _ in 0..rows {
            let course = Course::flat(&mut g, Side::Front, width, 1);
            if let Some(p) = &prev {
                for (a, b) in p.stitches_slice().iter().zip(course.stitches_slice().iter()) {
                    g.connect(*a, *b, ConnectMode::Wale);
                }
            }
            prev = Some(course.clone());
            leaves.push(arena.new_leaf(course));
        }
        for (i, w) in leaves.windows(2).enumerate() {
            arena.node_mut(w[1]).time = (i + 1) as Time;
        }
        let root = arena.new_internal(leaves);
        diagnostics::clear("test::compact::src");
        let mut tnb = TimeNeedleBed::new();
        tnb.append_layout(&[root], &mut arena, &g, "test::compact::src");
        (g, tnb)
    }

    #[test]
    fn compacting_a_duplicate_free_sheet_changes_nothing() {
        let (_, tnb) = flat_sheet(3, 2);
        let before = tnb.length();
        let out = compact(&tnb, "test::compact::src", "test::compact::out1");
        assert_eq!(out.length(), before);
        for (i, bed) in out.timeline.iter().enumerate() {
            assert_eq!(bed.time, i as Time);
        }
    }

    #[test]
    fn compaction_is_idempotent() {
        let (_, mut tnb) = flat_sheet(4, 2);
        simulate::simulate(&mut tnb, "test::compact::src");
        let once = compact(&tnb, "test::compact::src", "test::compact::out2");
        let twice = compact(&once, "test::compact::out2", "test::compact::out3");
        assert_eq!(once.length(), twice.length());
        for (a, b) in once.timeline.iter().zip(twice.timeline.iter()) {
            assert_eq!(a.time, b.time);
            assert_eq!(bed_stitches(a), bed_stitches(b));
        }
    }

    #[test]
    fn elided_beds_remap_diagnostic_times_to_a_surviving_bed() {
        let (_, mut tnb) = flat_sheet(2, 2);
        // fabricate an elided bed by inserting an inactive duplicate-looking empty bed and a
        // diagnostic timestamped against it
        tnb.timeline.insert(1, NeedleBed { time: 1, ..tnb.timeline[0].clone() });
        for (i, bed) in tnb.timeline.iter_mut().enumerate() {
            bed.time = i as Time;
        }
        diagnostics::push(
            "test::compact::src",
            crate::diagnostics::Diagnostic::new(crate::diagnostics::Kind::BedWidthExceeded, 1, 0, Side::Front, "x"),
        );
        let out = compact(&tnb, "test::compact::src", "test::compact::out4");
        assert!(out.length() < tnb.length());
        let remapped = diagnostics::entries("test::compact::out4");
        assert!(remapped.iter().all(|d| (d.time as usize) < out.length()));
    }
}
