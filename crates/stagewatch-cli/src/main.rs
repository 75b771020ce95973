use std::path::PathBuf;

use clap::Parser;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[cfg(target_env = "msvc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use stagewatch::{OutputStyle, PollOptions, StagewatchOptions, run_main};

#[derive(Parser, Debug)]
#[command(
    name = "stagewatch",
    about = "stagewatch: follow a resource's conditions stage by stage",
    version
)]
pub struct Cli {
    /// Scenario file describing stages and resource snapshots (TOML or JSON)
    #[arg(short = 's', long = "scenario", value_name = "FILE")]
    scenario: PathBuf,

    #[command(flatten)]
    poll: PollOptions,

    /// Progress style on stderr
    #[arg(long, value_enum, default_value_t = OutputStyle::Auto)]
    style: OutputStyle,

    /// Print the final report as JSON
    #[arg(long, default_value_t = false)]
    json: bool,

    /// Output file path (writes to file instead of stdout)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,
}

pub fn run(args: Cli) -> anyhow::Result<()> {
    if std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_writer(std::io::stderr)
            .init();
    }

    let opts = StagewatchOptions {
        scenario: args.scenario,
        poll: args.poll,
        style: args.style,
        json: args.json,
    };

    let output = run_main(&opts).inspect_err(|e| {
        tracing::error!(error = %e, "execution failed");
    })?;

    match args.output {
        Some(path) => {
            std::fs::write(&path, &output)?;
            tracing::info!(path = %path.display(), "output written");
        }
        None => println!("{}", output.trim_end()),
    }
    Ok(())
}

pub fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    run(args)
}
