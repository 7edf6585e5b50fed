//! DRISC cycle-accurate simulator CLI.
//!
//! A single entry point: boot one program image on a place of cores and
//! run it to completion, termination, or a cycle budget, then report
//! per-core performance counters.

use std::collections::HashMap;
use std::path::PathBuf;
use std::{fs, process};

use clap::Parser;
use drisc_core::common::InvalidArgument;
use drisc_core::config::Config;
use drisc_core::isa::demo::DemoIsa;
use drisc_core::sim::{load_elf, LoaderError, Simulator};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "drisc-sim",
    author,
    version,
    about = "Cycle-accurate simulator for a many-core, data-driven RISC machine",
    long_about = "Boots a program image on a place of DRISC cores and runs it to completion.\n\nExamples:\n  drisc-sim program.elf\n  drisc-sim --cores 4 --max-cycles 2000000 program.elf\n  drisc-sim --config place.json --init-reg R0=42 program.bin"
)]
struct Cli {
    /// Program image to boot: an ELF file, or a raw binary loaded at address 0.
    image: PathBuf,

    /// Number of cores in the place's ring.
    #[arg(long, default_value_t = 1)]
    cores: usize,

    /// Shared memory size, in bytes.
    #[arg(long, default_value_t = 1 << 24)]
    memory: usize,

    /// Main memory's fixed read latency, in cycles.
    #[arg(long, default_value_t = 4)]
    memory_latency: u64,

    /// Cycle budget; the run stops early if the place terminates or goes idle first.
    #[arg(long, default_value_t = 10_000_000)]
    max_cycles: u64,

    /// Core to boot the program on.
    #[arg(long, default_value_t = 0)]
    boot_core: usize,

    /// Override the entry point an ELF's header supplies (required for a raw binary).
    #[arg(long)]
    run_address: Option<u64>,

    /// Boot in legacy (non-distributed) addressing mode.
    #[arg(long)]
    legacy: bool,

    /// Initial integer register value, `R<index>=<value>`; may be repeated.
    #[arg(long = "init-reg")]
    init_regs: Vec<String>,

    /// JSON object of key/value configuration options (spec's `CacheLineSize`, `NumThreads`, ...).
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    if let Err(code) = run(&cli) {
        process::exit(code);
    }
}

fn run(cli: &Cli) -> Result<(), i32> {
    let config = load_config(cli.config.as_deref())?;
    let bytes = fs::read(&cli.image).map_err(|e| {
        eprintln!("error: couldn't read {}: {e}", cli.image.display());
        1
    })?;

    let mut sim = Simulator::new(cli.cores, &config, || Box::new(DemoIsa), cli.memory, cli.memory_latency);

    let run_address = match load_elf(sim.place_mut(), &bytes) {
        Ok(entry) => entry,
        Err(LoaderError::Parse(_)) => {
            info!("not an ELF image, loading as a raw binary at address 0");
            sim.load_image(0, &bytes);
            0
        }
        Err(err @ LoaderError::OutOfBounds { .. }) => {
            eprintln!("error: {err}");
            return Err(1);
        }
    };
    let run_address = cli.run_address.unwrap_or(run_address);

    let init_regs = parse_init_regs(&cli.init_regs)?;
    sim.boot(cli.boot_core, run_address, cli.legacy, &init_regs);

    info!(cores = cli.cores, run_address, "booted");
    let report = sim.run(cli.max_cycles).map_err(|err| {
        eprintln!("error: {err}");
        1
    })?;

    if report.cycles_run + 1 >= cli.max_cycles && report.exit_code.is_none() {
        warn!(max_cycles = cli.max_cycles, "stopped at the cycle budget without the program terminating");
    }

    println!("cycles: {}", report.cycles_run);
    match report.exit_code {
        Some(code) => println!("exit code: {code}"),
        None => println!("exit code: (place went idle or ran out of cycles)"),
    }
    for (i, counters) in report.perfcounters.iter().enumerate() {
        println!(
            "core{i}: instructions_retired={} dcache_hits={} dcache_misses={} completed_loads={} completed_stores={}",
            counters.instructions_retired,
            counters.dcache_hits,
            counters.dcache_misses,
            counters.completed_loads,
            counters.completed_stores
        );
    }

    match report.exit_code {
        Some(code) if code != 0 => Err(code),
        _ => Ok(()),
    }
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config, i32> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let text = fs::read_to_string(path).map_err(|e| {
        eprintln!("error: couldn't read {}: {e}", path.display());
        1
    })?;
    let options: HashMap<String, String> = serde_json::from_str(&text).map_err(|e| {
        eprintln!("error: {} isn't a flat JSON object of strings: {e}", path.display());
        1
    })?;
    Config::from_options(&options).map_err(|e: InvalidArgument| {
        eprintln!("error: {e}");
        1
    })
}

fn parse_init_regs(entries: &[String]) -> Result<Vec<(u32, u64)>, i32> {
    entries
        .iter()
        .map(|entry| {
            let (index, value) = entry.split_once('=').ok_or(entry)?;
            let index: u32 = index.trim_start_matches(['R', 'r']).parse().map_err(|_| entry)?;
            let value: u64 = value.trim().parse().map_err(|_| entry)?;
            Ok((index, value))
        })
        .collect::<Result<Vec<_>, &String>>()
        .map_err(|bad| {
            eprintln!("error: malformed --init-reg {bad:?}, expected R<index>=<value>");
            1
        })
}
