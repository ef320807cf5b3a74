//! A small CLI that compiles a flat sheet or a tube skeleton straight through the pipeline
//! (§4: builder -> optimizer -> packer -> interpreter -> simulator -> compactor) and prints a
//! per-bed summary of the resulting schedule.

use clap::{Parser, Subcommand};
use knitc::bed::{compact, simulate, TimeNeedleBed};
use knitc::course::Course;
use knitc::layout::builder::{Block, BlockEntry, Builder};
use knitc::layout::optimizer;
use knitc::layout::LayoutArena;
use knitc::stitch::{ConnectMode, Side, StitchGraph};

#[derive(Subcommand)]
enum Shape {
    #[command(about = "Compile a flat sheet of `rows` courses, `width` stitches wide", alias = "sheet")]
    Sheet {
        #[arg(long, default_value_t = 20)]
        width: i32,
        #[arg(long, default_value_t = 20)]
        rows: i32,
    },
    #[command(about = "Compile a closed circular tube of `rows` courses, `width` stitches around", alias = "tube")]
    Tube {
        #[arg(long, default_value_t = 20)]
        width: i32,
        #[arg(long, default_value_t = 20)]
        rows: i32,
    },
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    shape: Shape,
    /// print the compacted schedule as JSON instead of the per-bed summary
    #[arg(long)]
    json: bool,
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

fn tube_blocks(graph: &mut StitchGraph, width: i32, rows: i32) -> Vec<Block> {
    let mut blocks = Vec::new();
    let mut prev: Option<Course> = None;
    for i in 0..rows {
        let course = Course::tube(graph, width, 1);
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

fn main() {
    knitc::init();
    let args = Args::parse();

    let namespace = "knitc-demo";
    knitc::diagnostics::clear(namespace);

    let mut graph = StitchGraph::new();
    let mut arena = LayoutArena::new();
    let blocks = match args.shape {
        Shape::Sheet { width, rows } => sheet_blocks(&mut graph, width, rows),
        Shape::Tube { width, rows } => tube_blocks(&mut graph, width, rows),
    };

    let roots = Builder::new(&mut arena, &mut graph).build(blocks);
    optimizer::optimize(&mut arena, &graph, &roots, namespace);

    let mut tnb = TimeNeedleBed::new();
    tnb.append_layout(&roots, &mut arena, &graph, namespace);
    simulate::simulate(&mut tnb, namespace);
    let packed = compact::compact(&tnb, namespace, "knitc-demo::compacted");

    log::info!("packed {} beds into {} after compaction", tnb.length(), packed.length());
    if args.json {
        match serde_json::to_string_pretty(&packed) {
            Ok(text) => println!("{}", text),
            Err(e) => eprintln!("failed to serialize schedule: {}", e),
        }
    } else {
        for bed in &packed.timeline {
            let kinds: Vec<String> = bed.passes.iter().map(|p| format!("{:?}", p.kind())).collect();
            println!("t={:>4} width={:<4} passes=[{}]", bed.time, packed.width, kinds.join(", "));
        }
    }

    let diags = knitc::diagnostics::entries("knitc-demo::compacted");
    if !diags.is_empty() {
        eprintln!("-- {} diagnostics --", diags.len());
        for d in &diags {
            eprintln!("t={} {:?} ({:?}, {}): {}", d.time, d.kind, d.side, d.index, d.message);
        }
    }
}
