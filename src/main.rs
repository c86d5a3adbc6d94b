//! noc-engine: NoC transaction engine scenarios on a software fabric

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use noc_engine::config::Config;
use noc_engine::device::{CoreCoord, NocId, Platform, PlatformFamily};
use noc_engine::multicast::MulticastRequest;
use noc_engine::testing::{self, ReadPipeline, ScenarioSuite};

/// NoC transaction engine
#[derive(Parser, Debug)]
#[command(name = "noc-engine")]
#[command(version)]
#[command(about = "Run NoC transaction scenarios against a simulated fabric", long_about = None)]
struct Args {
    /// Platform family: grayskull, wormhole or blackhole (default: from config)
    #[arg(short, long, value_name = "FAMILY", global = true)]
    platform: Option<String>,

    /// Reject reusing a transaction ID while its previous transaction is still pending
    #[arg(long, global = true)]
    checked: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the built-in comparison suite
    Check,

    /// Stream blocks from DRAM through a circular buffer
    Read {
        #[arg(long, default_value_t = 50)]
        blocks: u32,
        #[arg(long, default_value_t = 512)]
        block_bytes: u32,
        /// Transaction IDs in rotation
        #[arg(short, long, default_value_t = 2)]
        trids: u8,
        /// Cycles spent consuming each block
        #[arg(long, default_value_t = 64)]
        consume: u64,
    },

    /// Plan and run a multicast write
    Multicast {
        /// Sender, logical "x,y"
        #[arg(long, value_name = "X,Y", value_parser = parse_coord)]
        sender: CoreCoord,
        /// Rectangle start, logical "x,y"
        #[arg(long, value_name = "X,Y", value_parser = parse_coord)]
        start: CoreCoord,
        /// Rectangle end, logical "x,y"
        #[arg(long, value_name = "X,Y", value_parser = parse_coord)]
        end: CoreCoord,
        #[arg(long, default_value_t = 4096)]
        bytes: u32,
        #[arg(long, default_value_t = 10)]
        iterations: u32,
        /// Leave the sender out of an enclosing rectangle
        #[arg(long)]
        no_loopback: bool,
        /// Use NoC 1 instead of NoC 0
        #[arg(long)]
        noc1: bool,
    },

    /// Print a sample configuration file
    Config,
}

fn parse_coord(s: &str) -> Result<CoreCoord, String> {
    let (x, y) = s.split_once(',').ok_or_else(|| format!("expected X,Y, got '{}'", s))?;
    let x = x.trim().parse::<u8>().map_err(|e| format!("bad x '{}': {}", x, e))?;
    let y = y.trim().parse::<u8>().map_err(|e| format!("bad y '{}': {}", y, e))?;
    Ok(CoreCoord::new(x, y))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let config = Config::get();

    let platform = match &args.platform {
        Some(name) => match PlatformFamily::from_name(name) {
            Some(family) => Platform::preset(family),
            None => bail!("Unknown platform: {}", name),
        },
        None => config.platform(),
    };
    let mut engine_config = config.engine_config().context("invalid engine configuration")?;
    if args.checked {
        engine_config = engine_config.checked();
    }

    match args.command {
        Command::Check => {
            let mut suite = ScenarioSuite::new(platform, engine_config);
            let result = suite.run_all();
            print!("{}", suite.summary_report(&result));
            if result.passed != result.total {
                bail!("{} of {} checks did not pass", result.total - result.passed, result.total);
            }
        }
        Command::Read { blocks, block_bytes, trids, consume } => {
            let params = ReadPipeline { num_blocks: blocks, block_bytes, num_trids: trids, consume_cycles: consume };
            let report = testing::run_read_pipeline(&platform, engine_config, params)?;
            println!("{}", report);
        }
        Command::Multicast { sender, start, end, bytes, iterations, no_loopback, noc1 } => {
            let noc = if noc1 { NocId::Noc1 } else { NocId::Noc0 };
            let request = MulticastRequest::new(sender, start, end).with_loopback(!no_loopback).on_noc(noc);
            let report = testing::run_multicast(&platform, engine_config, request, bytes, iterations)?;
            let plan = &report.plan;

            println!("{}", plan.scheme);
            println!("Destinations: {}", plan.num_destinations);
            println!("Loopback: {}", plan.loopback_active());
            for (addr, (s, e)) in plan.effective_addresses.iter().zip(&plan.segments) {
                println!("  {}..{}  {}", s, e, addr);
            }
            println!("Links: {} ({} shared with acks)", plan.write_links, plan.shared_links);
            for warning in &plan.warnings {
                println!("warning: {}", warning);
            }
            if plan.recommend_disable_loopback {
                println!("hint: disabling loopback may raise throughput");
            }
            println!(
                "Estimate: {} cycles, {:.3} B/cyc to {} cores",
                report.estimate.cycles, report.estimate.bytes_per_cycle, report.estimate.destinations
            );
            println!("{}", report.measured);
        }
        Command::Config => {
            if let Some(path) = Config::user_config_path() {
                println!("# {}", path.display());
            }
            print!("{}", Config::sample_config());
        }
    }

    Ok(())
}
