//! Generic "poll until done" driver.
//!
//! The driver owns the wait budget and all sleeping; pollers only take steps.

use std::time::{Duration, Instant};

use stagewatch_error::{Error, Result};

use crate::config::PollConfig;

/// One pollable long-running operation.
pub trait OperationPoller {
    /// What identifies the operation to poll.
    type Ref;
    /// What a single poll returns.
    type Polled;
    /// What the driver hands back once done.
    type Output;

    fn poll(&mut self, reference: &Self::Ref) -> Result<Self::Polled>;

    fn is_done(&self, polled: &Self::Polled) -> bool;

    fn get_result(&mut self, polled: Self::Polled) -> Result<Self::Output>;

    /// Best known status, appended to timeout errors.
    fn status_message(&self) -> String {
        String::new()
    }
}

pub trait Clock {
    /// Time since the clock was created.
    fn elapsed(&self) -> Duration;

    fn sleep(&mut self, duration: Duration);
}

#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&mut self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// A clock that only moves when slept on. Records every sleep.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Duration,
    sleeps: Vec<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> &[Duration] {
        &self.sleeps
    }

    pub fn advance(&mut self, duration: Duration) {
        self.now += duration;
    }
}

impl Clock for ManualClock {
    fn elapsed(&self) -> Duration {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.sleeps.push(duration);
        self.now += duration;
    }
}

/// Poll `poller` until it reports done, an error, or the wait budget runs out.
///
/// Errors from the poller propagate untouched. Running out of budget yields a
/// `Timeout` error carrying the poller's last status message.
pub fn poll_until_done<P, C>(
    poller: &mut P,
    reference: &P::Ref,
    config: &PollConfig,
    clock: &mut C,
) -> Result<P::Output>
where
    P: OperationPoller,
    C: Clock,
{
    config.validate()?;

    let pre_start = config.pre_start_sleep();
    if !pre_start.is_zero() {
        clock.sleep(pre_start);
    }

    let started = clock.elapsed();
    let max_wait = config.max_wait();
    let mut attempt: u32 = 0;
    loop {
        let polled = poller.poll(reference)?;
        if poller.is_done(&polled) {
            tracing::debug!(attempts = attempt + 1, "operation done");
            return poller.get_result(polled);
        }

        let interval = config.interval(attempt);
        let waited = clock.elapsed().saturating_sub(started);
        if waited + interval > max_wait {
            let message = poller.status_message();
            tracing::warn!(
                waited_ms = waited.as_millis() as u64,
                max_wait_ms = config.max_wait_ms,
                last_message = %message,
                "gave up waiting"
            );
            return Err(Error::timeout(config.max_wait_ms, message)
                .with_operation("waiter::poll_until_done")
                .with_context("attempts", (attempt + 1).to_string()));
        }

        tracing::trace!(attempt, interval_ms = interval.as_millis() as u64, "not done, sleeping");
        clock.sleep(interval);
        attempt = attempt.saturating_add(1);
    }
}
