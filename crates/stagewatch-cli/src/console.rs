//! Console rendering of staged progress.

use std::io::Write;

use clap::ValueEnum;
use stagewatch_core::poller::DONE_MESSAGE;
use stagewatch_core::{Error, ErrorKind, Stage, StageBook, StageState, StageTracker};

const SPIN_MARKS: [char; 4] = ['|', '/', '-', '\\'];
const WRAP_WIDTH: usize = 80;

/// Header shown once the run ends in an error.
pub const FAILED_MESSAGE: &str = "Failed.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputStyle {
    /// Interactive when stderr is a terminal, plain otherwise
    #[default]
    Auto,
    /// Redraw the stage block in place with a spinner
    Interactive,
    /// One line per transition, for logs and pipes
    Plain,
    /// Print nothing
    Off,
}

impl OutputStyle {
    /// Resolve `Auto` against whether the output is a terminal.
    pub fn resolve(self, is_terminal: bool) -> Self {
        match self {
            OutputStyle::Auto if is_terminal => OutputStyle::Interactive,
            OutputStyle::Auto => OutputStyle::Plain,
            other => other,
        }
    }
}

/// A [`StageTracker`] that draws to a writer.
pub struct ConsoleTracker<W: Write> {
    book: StageBook,
    style: OutputStyle,
    out: W,
    lines_drawn: usize,
}

impl<W: Write> ConsoleTracker<W> {
    pub fn new(
        out: W,
        style: OutputStyle,
        header: impl Into<String>,
        stages: impl IntoIterator<Item = Stage>,
    ) -> Self {
        let mut tracker = Self {
            book: StageBook::new(header, stages),
            // callers that know the terminal resolve Auto first
            style: style.resolve(false),
            out,
            lines_drawn: 0,
        };
        if tracker.style == OutputStyle::Plain {
            let header = tracker.book.header().to_string();
            tracker.line(&header);
        }
        tracker.redraw();
        tracker
    }

    pub fn book(&self) -> &StageBook {
        &self.book
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    /// Close the display once polling has ended.
    ///
    /// On error every stage still running is failed as aborted (or timed
    /// out) and the header becomes [`FAILED_MESSAGE`]. On success the header
    /// becomes [`DONE_MESSAGE`] if the poller has not set it already.
    pub fn finish(&mut self, outcome: std::result::Result<(), &Error>) {
        match outcome {
            Ok(()) => self.update_header_message(DONE_MESSAGE),
            Err(error) => {
                let reason = match error.kind() {
                    ErrorKind::Timeout => "timed out",
                    _ => "aborted",
                };
                let running: Vec<String> = self
                    .book
                    .entries()
                    .iter()
                    .filter(|e| e.state == StageState::Running)
                    .map(|e| e.stage.key.clone())
                    .collect();
                for key in running {
                    if self.book.fail(&key, reason) {
                        let text = format!("  {} {}", self.stage_header(&key), reason);
                        self.line(&text);
                    }
                }
                self.update_header_message(FAILED_MESSAGE);
                // header may be unchanged; the aborted stages still need a frame
                self.redraw();
            }
        }
    }

    fn stage_header(&self, key: &str) -> String {
        self.book
            .entry(key)
            .map(|e| e.stage.header.clone())
            .unwrap_or_else(|| key.to_string())
    }

    fn line(&mut self, text: &str) {
        if self.style != OutputStyle::Plain {
            return;
        }
        if let Err(e) = writeln!(self.out, "{text}").and_then(|_| self.out.flush()) {
            tracing::warn!(error = %e, "failed to write progress");
        }
    }

    fn redraw(&mut self) {
        if self.style != OutputStyle::Interactive {
            return;
        }
        let spin = SPIN_MARKS[(self.book.ticks() % SPIN_MARKS.len() as u64) as usize];
        let mut frame = String::new();
        if self.lines_drawn > 0 {
            // move to the top of the previous frame and clear it
            frame.push_str(&format!("\x1b[{}A\x1b[J", self.lines_drawn));
        }
        frame.push_str(self.book.header());
        frame.push('\n');
        for entry in self.book.entries() {
            let mark = match entry.state {
                StageState::Waiting => '.',
                StageState::Running => spin,
                StageState::Complete => '\u{2713}',
                StageState::Failed => 'X',
            };
            frame.push_str(&format!("  {} {}", mark, entry.stage.header));
            if !entry.message.is_empty() {
                frame.push(' ');
                frame.push_str(&entry.message);
            }
            frame.push('\n');
        }
        self.lines_drawn = self.book.entries().len() + 1;
        if let Err(e) = self
            .out
            .write_all(frame.as_bytes())
            .and_then(|_| self.out.flush())
        {
            tracing::warn!(error = %e, "failed to redraw progress");
        }
    }
}

impl<W: Write> StageTracker for ConsoleTracker<W> {
    fn state(&self, key: &str) -> Option<StageState> {
        self.book.state(key)
    }

    fn stage_keys(&self) -> Vec<String> {
        self.book.stage_keys()
    }

    fn start_stage(&mut self, key: &str) {
        if self.book.start(key) {
            let text = format!("  {}", self.stage_header(key));
            self.line(&text);
            self.redraw();
        }
    }

    fn update_stage(&mut self, key: &str, message: &str) {
        if self.book.update(key, message) {
            let text = format!("  {} {}", self.stage_header(key), message);
            self.line(&text);
            self.redraw();
        }
    }

    fn complete_stage(&mut self, key: &str, message: Option<&str>) {
        if self.book.complete(key, message) {
            let text = format!("  {} done", self.stage_header(key));
            self.line(&text);
            self.redraw();
        }
    }

    fn fail_stage(&mut self, key: &str, error: &Error, message: &str) {
        if self.book.fail(key, message) {
            tracing::debug!(stage = %key, error = %error, "rendering stage failure");
            let head = format!("  {} failed: ", self.stage_header(key));
            let options = textwrap::Options::new(WRAP_WIDTH)
                .initial_indent(&head)
                .subsequent_indent("      ");
            let text = textwrap::fill(message, options);
            self.line(&text);
            self.redraw();
        }
    }

    fn tick(&mut self) {
        self.book.advance();
        self.redraw();
    }

    fn update_header_message(&mut self, message: &str) {
        if self.book.set_header(message) {
            self.line(message);
            self.redraw();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn plain() -> ConsoleTracker<Vec<u8>> {
        ConsoleTracker::new(
            Vec::new(),
            OutputStyle::Plain,
            "Deploying...",
            [
                Stage::new("ConfigurationsReady", "Creating Revision..."),
                Stage::new("RoutesReady", "Routing traffic..."),
            ],
        )
    }

    fn text(tracker: ConsoleTracker<Vec<u8>>) -> String {
        String::from_utf8(tracker.into_inner()).unwrap()
    }

    #[test]
    fn auto_resolves_by_terminal() {
        assert_eq!(OutputStyle::Auto.resolve(true), OutputStyle::Interactive);
        assert_eq!(OutputStyle::Auto.resolve(false), OutputStyle::Plain);
        assert_eq!(OutputStyle::Off.resolve(true), OutputStyle::Off);
    }

    #[test]
    fn plain_prints_one_line_per_transition() {
        let mut tracker = plain();
        tracker.start_stage("ConfigurationsReady");
        tracker.tick();
        tracker.complete_stage("ConfigurationsReady", None);
        tracker.complete_stage("ConfigurationsReady", None);
        tracker.update_header_message("Done.");

        assert_eq!(
            text(tracker),
            "Deploying...\n  Creating Revision...\n  Creating Revision... done\nDone.\n"
        );
    }

    #[test]
    fn plain_wraps_long_failures() {
        let mut tracker = plain();
        let message = "revision failed to become ready because the container did not listen on the expected port within the allocated timeout";
        tracker.fail_stage(
            "RoutesReady",
            &Error::stage_failed("RoutesReady", message),
            message,
        );

        let out = text(tracker);
        let lines: Vec<&str> = out.lines().collect();
        assert!(lines[1].starts_with("  Routing traffic... failed: revision"));
        assert!(lines.len() > 2);
        assert!(lines[2].starts_with("      "));
        assert!(lines.iter().all(|l| l.len() <= WRAP_WIDTH));
    }

    #[test]
    fn interactive_redraws_in_place() {
        let mut tracker = ConsoleTracker::new(
            Vec::new(),
            OutputStyle::Interactive,
            "Deploying...",
            [Stage::new("A", "Stage A...")],
        );
        tracker.start_stage("A");
        tracker.complete_stage("A", None);

        let out = text(tracker);
        assert!(out.starts_with("Deploying...\n  . Stage A...\n"));
        assert!(out.contains("\x1b[2A\x1b[J"));
        assert!(out.ends_with("  \u{2713} Stage A...\n"));
    }

    #[test]
    fn finish_after_timeout_closes_running_stages() {
        let mut tracker = plain();
        tracker.start_stage("ConfigurationsReady");
        tracker.complete_stage("ConfigurationsReady", None);
        tracker.start_stage("RoutesReady");
        tracker.finish(Err(&Error::timeout(300, "Waiting for load balancer")));

        assert!(tracker.is_failed("RoutesReady"));
        assert_eq!(tracker.book().entry("RoutesReady").unwrap().message, "timed out");
        assert_eq!(
            text(tracker),
            "Deploying...\n  Creating Revision...\n  Creating Revision... done\n  Routing traffic...\n  Routing traffic... timed out\nFailed.\n"
        );
    }

    #[test]
    fn finish_after_failure_leaves_waiting_stages_alone() {
        let mut tracker = plain();
        tracker.start_stage("ConfigurationsReady");
        tracker.finish(Err(&Error::operation_failed("quota exceeded")));

        assert!(tracker.is_failed("ConfigurationsReady"));
        assert!(tracker.is_waiting("RoutesReady"));
        assert!(text(tracker).ends_with("  Creating Revision... aborted\nFailed.\n"));
    }

    #[test]
    fn finish_on_success_prints_done_once() {
        let mut tracker = plain();
        tracker.finish(Ok(()));
        tracker.update_header_message(DONE_MESSAGE);
        assert_eq!(text(tracker), "Deploying...\nDone.\n");
    }

    #[test]
    fn interactive_finish_redraws_failed_frame() {
        let mut tracker = ConsoleTracker::new(
            Vec::new(),
            OutputStyle::Interactive,
            "Deploying...",
            [Stage::new("A", "Stage A...")],
        );
        tracker.start_stage("A");
        tracker.finish(Err(&Error::timeout(10, "")));

        assert!(text(tracker).ends_with("Failed.\n  X Stage A... timed out\n"));
    }

    #[test]
    fn off_prints_nothing_but_tracks_state() {
        let mut tracker =
            ConsoleTracker::new(Vec::new(), OutputStyle::Off, "", [Stage::new("A", "A")]);
        tracker.start_stage("A");
        assert!(tracker.is_running("A"));
        assert!(text(tracker).is_empty());
    }
}
