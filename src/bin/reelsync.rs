use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use reelsync::{
    CancelToken, EffectParameters, PipelineConfig, Status, assets::media::source_label,
    foundation::random::fresh_seed, plan_segments, process_batch,
};

#[derive(Parser, Debug)]
#[command(name = "reelsync", version, about = "Vertical short-form episodes from any video")]
struct Cli {
    /// Log at debug level unless RUST_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process videos into `run_{n}` directories (requires `ffmpeg`/`ffprobe` on PATH).
    Process(ProcessArgs),
    /// Print the segment plan for a given output duration as JSON.
    Plan(PlanArgs),
    /// Print the effective configuration as JSON.
    PrintConfig(ConfigArgs),
}

#[derive(Args, Debug)]
struct ConfigArgs {
    /// JSON config file; omitted fields take their defaults.
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ProcessArgs {
    /// Input video files.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    #[command(flatten)]
    config: ConfigArgs,

    /// Root directory for run directories.
    #[arg(long, default_value = "output")]
    out_dir: PathBuf,

    /// Directory holding the overlay clips.
    #[arg(long)]
    overlay_dir: Option<PathBuf>,

    /// Seed for every random draw. A fresh one is logged when omitted.
    #[arg(long)]
    seed: Option<u64>,

    /// Inputs processed at the same time.
    #[arg(long, default_value_t = 1)]
    jobs: usize,

    /// Composite frames of one input in parallel.
    #[arg(long)]
    parallel: bool,

    /// Worker threads for parallel compositing.
    #[arg(long)]
    threads: Option<usize>,

    /// Skip `final_output.mp4`; write segments only.
    #[arg(long)]
    no_full_output: bool,
}

#[derive(Args, Debug)]
struct PlanArgs {
    /// Total output duration in seconds.
    #[arg(long)]
    duration: f64,

    #[arg(long)]
    seed: Option<u64>,

    #[command(flatten)]
    config: ConfigArgs,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.cmd {
        Command::Process(args) => cmd_process(args),
        Command::Plan(args) => cmd_plan(args),
        Command::PrintConfig(args) => cmd_print_config(args),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .with(filter)
        .init();
}

fn load_config(args: &ConfigArgs) -> anyhow::Result<PipelineConfig> {
    match &args.config {
        Some(path) => PipelineConfig::from_path(path)
            .with_context(|| format!("load config '{}'", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

fn cmd_process(args: ProcessArgs) -> anyhow::Result<()> {
    let mut cfg = load_config(&args.config)?;
    if let Some(dir) = args.overlay_dir {
        cfg.overlays.dir = dir;
    }
    if args.seed.is_some() {
        cfg.seed = args.seed;
    }
    if args.parallel {
        cfg.threading.parallel = true;
    }
    if args.threads.is_some() {
        cfg.threading.threads = args.threads;
    }
    if args.no_full_output {
        cfg.write_full_output = false;
    }
    cfg.validate().context("invalid configuration")?;

    let cancel = CancelToken::new();
    let outcomes = process_batch(
        &args.inputs,
        &args.out_dir,
        &cfg,
        args.jobs,
        &cancel,
        &|input: &Path, status: &Status| {
            let name = source_label(input);
            match status {
                Status::Processing => println!("processing {name}"),
                Status::Done(dir) => println!("done {name} -> {}", dir.display()),
                Status::Error(msg) => println!("error: {msg} ({name})"),
            }
        },
    )?;

    let failed = outcomes.iter().filter(|o| o.result.is_err()).count();
    if failed > 0 {
        anyhow::bail!("{failed} of {} inputs failed", outcomes.len());
    }
    Ok(())
}

fn cmd_plan(args: PlanArgs) -> anyhow::Result<()> {
    let cfg = load_config(&args.config)?;
    let seed = args.seed.or(cfg.seed).unwrap_or_else(fresh_seed);
    tracing::info!(seed, "planning segments");
    let mut rng = EffectParameters::draw(&cfg, seed).segment_rng();
    let segments = plan_segments(args.duration, &cfg.segments, &mut rng)?;
    println!("{}", serde_json::to_string_pretty(&segments)?);
    Ok(())
}

fn cmd_print_config(args: ConfigArgs) -> anyhow::Result<()> {
    let cfg = load_config(&args)?;
    println!("{}", serde_json::to_string_pretty(&cfg)?);
    Ok(())
}
