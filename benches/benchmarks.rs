criterion::criterion_main!(benches);
criterion::criterion_group! {
    name = benches;
    config = criterion::Criterion::default()
        .without_plots()
        .noise_threshold(3.0)
        .significance_level(0.01)
        .sample_size(10)
        .measurement_time(std::time::Duration::from_secs(1));
    targets =
        tracing_a_flat_sheet_course,
        tracing_a_sequence_grammar_course,
        building_a_layout_from_blocks,
        optimizing_a_misaligned_stack,
        packing_and_interpreting_a_sheet,
        simulating_a_packed_sheet,
        compacting_a_duplicate_heavy_timeline,
}

fn sheet_blocks(graph: &mut StitchGraph, width: i32, rows: i32) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut prev: Option<Course> = None;
    for i in 0..rows {
        let course = Course::flat(graph, Side::Front, width, 1);
        if let Some(p) = &prev {
            for (a, b) in p.stitches_slice().iter().zip(course.stitches_slice().iter()) {
                graph.connect(*a, *b, ConnectMode::Wale);
            }
        }
        prev = Some(course.clone());
        blocks.push(vec![BlockEntry { shape: 0, course_id: i as u64, course }]);
    }
    blocks
}

fn tracing_a_flat_sheet_course(c: &mut criterion::Criterion) {
    c.bench_function("trace a 200-stitch flat course", |b| {
        b.iter(|| {
            let mut g = StitchGraph::new();
            Course::flat(&mut g, Side::Front, 200, 1)
        })
    });
}

fn tracing_a_sequence_grammar_course(c: &mut criterion::Criterion) {
    let grammar = "F R A 400";
    c.bench_function("parse and trace a 400-stitch sequence grammar course", |b| {
        b.iter(|| {
            let mut g = StitchGraph::new();
            Course::sequence(&mut g, grammar, 1, false).unwrap()
        })
    });
}

fn building_a_layout_from_blocks(c: &mut criterion::Criterion) {
    c.bench_function("build a layout tree from 100 wale-connected course blocks", |b| {
        b.iter_batched(
            || {
                let mut graph = StitchGraph::new();
                let blocks = sheet_blocks(&mut graph, 40, 100);
                (graph, blocks)
            },
            |(mut graph, blocks)| {
                let mut arena = LayoutArena::new();
                Builder::new(&mut arena, &mut graph).build(blocks)
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn optimizing_a_misaligned_stack(c: &mut criterion::Criterion) {
    c.bench_function("optimize 50 misaligned flat courses to stress-alignment", |b| {
        b.iter_batched(
            || {
                let mut graph = StitchGraph::new();
                let blocks = sheet_blocks(&mut graph, 40, 50);
                let mut arena = LayoutArena::new();
                let roots = Builder::new(&mut arena, &mut graph).build(blocks);
                for &root in &roots {
                    arena.node_mut(root).offset = 17;
                }
                (arena, graph, roots)
            },
            |(mut arena, graph, roots)| {
                diagnostics::clear("bench::optimize");
                optimizer::optimize(&mut arena, &graph, &roots, "bench::optimize")
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn packing_and_interpreting_a_sheet(c: &mut criterion::Criterion) {
    c.bench_function("pack and interpret a 200-course flat sheet", |b| {
        b.iter_batched(
            || {
                let mut graph = StitchGraph::new();
                let blocks = sheet_blocks(&mut graph, 40, 200);
                let mut arena = LayoutArena::new();
                let roots = Builder::new(&mut arena, &mut graph).build(blocks);
                optimizer::optimize(&mut arena, &graph, &roots, "bench::pack");
                (arena, graph, roots)
            },
            |(mut arena, graph, roots)| {
                diagnostics::clear("bench::pack");
                let mut tnb = TimeNeedleBed::new();
                tnb.append_layout(&roots, &mut arena, &graph, "bench::pack");
                tnb
            },
            criterion::BatchSize::SmallInput,
        )
    });
}

fn simulating_a_packed_sheet(c: &mut criterion::Criterion) {
    c.bench_function("simulate a packed 200-course flat sheet", |b| {
        b.iter_batched(
            || {
                let mut graph = StitchGraph::new();
                let blocks = sheet_blocks(&mut graph, 40, 200);
                let mut arena = LayoutArena::new();
                let roots = Builder::new(&mut arena, &mut graph).build(blocks);
                diagnostics::clear("bench::simulate");
                let mut tnb = TimeNeedleBed::new();
                tnb.append_layout(&roots, &mut arena, &graph, "bench::simulate");
                tnb
            },
            |mut tnb| simulate::simulate(&mut tnb, "bench::simulate"),
            criterion::BatchSize::SmallInput,
        )
    });
}

fn compacting_a_duplicate_heavy_timeline(c: &mut criterion::Criterion) {
    c.bench_function("compact a 200-bed timeline padded with duplicate beds", |b| {
        b.iter_batched(
            || {
                let mut graph = StitchGraph::new();
                let blocks = sheet_blocks(&mut graph, 40, 200);
                let mut arena = LayoutArena::new();
                let roots = Builder::new(&mut arena, &mut graph).build(blocks);
                diagnostics::clear("bench::compact");
                let mut tnb = TimeNeedleBed::new();
                tnb.append_layout(&roots, &mut arena, &graph, "bench::compact");
                simulate::simulate(&mut tnb, "bench::compact");
                tnb
            },
            |tnb| compact::compact(&tnb, "bench::compact", "bench::compact::out"),
            criterion::BatchSize::SmallInput,
        )
    });
}

use knitc::bed::{compact, simulate, TimeNeedleBed};
use knitc::course::Course;
use knitc::diagnostics;
use knitc::layout::builder::{Block, BlockEntry, Builder};
use knitc::layout::optimizer;
use knitc::layout::LayoutArena;
use knitc::stitch::{ConnectMode, Side, StitchGraph};
