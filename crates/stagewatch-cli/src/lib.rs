//! stagewatch command-line interface.
//!
pub mod console;
pub mod options;
pub mod output;
pub mod scenario;

use std::io::{IsTerminal, Write};
use std::path::PathBuf;
use std::time::Instant;

use stagewatch_core::{
    Clock, ConditionPoller, PollConfig, Result, SystemClock, poll_until_done,
};

pub use console::{ConsoleTracker, FAILED_MESSAGE, OutputStyle};
pub use options::PollOptions;
pub use output::{RunReport, StageReport};
pub use scenario::{Layout, Scenario, ScriptedResource};

/// Options for running stagewatch.
pub struct StagewatchOptions {
    pub scenario: PathBuf,
    pub poll: PollOptions,
    pub style: OutputStyle,
    pub json: bool,
}

/// Main entry point: replay a scenario file with progress on stderr.
pub fn run_main(opts: &StagewatchOptions) -> Result<String> {
    let start = Instant::now();
    let scenario = Scenario::from_path(&opts.scenario)?;
    let config = opts.poll.resolve()?;

    let mut stderr = std::io::stderr();
    let style = opts.style.resolve(stderr.is_terminal());
    let report = run_scenario(&scenario, &config, style, &mut stderr, &mut SystemClock::new())?;
    tracing::info!(
        polls = report.polls,
        secs = start.elapsed().as_secs_f64(),
        "scenario complete"
    );

    if opts.json {
        report.render_json()
    } else {
        Ok(report.render_summary())
    }
}

/// Poll a scenario to its terminal state, drawing progress to `out`.
pub fn run_scenario<W, C>(
    scenario: &Scenario,
    config: &PollConfig,
    style: OutputStyle,
    out: &mut W,
    clock: &mut C,
) -> Result<RunReport>
where
    W: Write,
    C: Clock,
{
    let Layout {
        header,
        stages,
        dependencies,
        terminal,
    } = scenario.layout();
    tracing::debug!(
        stages = stages.len(),
        snapshots = scenario.snapshots.len(),
        terminal = %terminal,
        "running scenario"
    );

    let tracker = ConsoleTracker::new(out, style, header, stages);
    let mut poller = ConditionPoller::new(scenario.resource(), tracker, Some(dependencies))?;
    let result = poll_until_done(&mut poller, &(), config, clock);
    poller.tracker_mut().finish(result.as_ref().map(|_| ()));

    let failures = poller.stage_failures();
    if !failures.is_empty() {
        tracing::info!(count = failures.len(), "stages failed");
    }
    let conditions = result?;
    let polls = poller.getter().fetches();
    let tracker = poller.into_tracker();
    Ok(RunReport::new(tracker.book(), conditions, polls))
}
