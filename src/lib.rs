pub mod bed;
pub mod course;
pub mod diagnostics;
pub mod layout;
pub mod pattern;
pub mod stitch;

/// needle / time indices throughout the pipeline
pub type Needle = i32;
pub type Time = i32;

/// platform limit beyond which packing emits a `BedWidthExceeded` warning (§7)
pub const MAX_BED_WIDTH: usize = 541;

/// optimizer sweep cap before an `OptimizerNonconvergence` notice is recorded (§4.E)
pub const MAX_OPTIMIZER_SWEEPS: usize = 20;

/// trait for random generation, mainly (strictly?) for testing
pub trait Arbitrary {
    fn random(rng: &mut rand::rngs::SmallRng) -> Self;
}

/// progress bar for long-running sweeps (optimizer levels, interpreter timelines)
#[cfg(feature = "native")]
pub fn progress(n: usize) -> indicatif::ProgressBar {
    let tick = std::time::Duration::from_millis(250);
    let style = "{spinner:.cyan} {elapsed} ~ {percent:>3}% {wide_bar:.cyan}";
    let style = indicatif::ProgressStyle::with_template(style).unwrap();
    let progress = indicatif::ProgressBar::new(n as u64);
    progress.set_style(style);
    progress.enable_steady_tick(tick);
    progress
}

/// initialize logging to a timestamped file plus the terminal
#[cfg(feature = "native")]
pub fn init() {
    std::fs::create_dir_all("logs").expect("create logs directory");
    let config = simplelog::ConfigBuilder::new()
        .set_location_level(log::LevelFilter::Off)
        .set_target_level(log::LevelFilter::Off)
        .set_thread_level(log::LevelFilter::Off)
        .build();
    let time = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("time moves slow")
        .as_secs();
    let file = simplelog::WriteLogger::new(
        log::LevelFilter::Debug,
        config.clone(),
        std::fs::File::create(format!("logs/{}.log", time)).expect("create log file"),
    );
    let term = simplelog::TermLogger::new(
        log::LevelFilter::Info,
        config,
        simplelog::TerminalMode::Mixed,
        simplelog::ColorChoice::Auto,
    );
    simplelog::CombinedLogger::init(vec![term, file]).expect("initialize logger");
}
