use crate::error::{PaymentError, Result};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, Interval, MissedTickBehavior, Sleep};
use tokio_util::sync::CancellationToken;

/// Bounds for a repeated status check: a fixed interval, an attempt ceiling and
/// an absolute deadline measured from the moment the schedule is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollSchedule {
    interval: Duration,
    max_attempts: u32,
    deadline: Duration,
}

impl Default for PollSchedule {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            max_attempts: 20,
            deadline: Duration::from_secs(90),
        }
    }
}

impl PollSchedule {
    pub fn new(interval: Duration, max_attempts: u32, deadline: Duration) -> Result<Self> {
        if interval.is_zero() {
            return Err(PaymentError::ValidationError(
                "Poll interval must be greater than zero".to_string(),
            ));
        }
        if max_attempts == 0 {
            return Err(PaymentError::ValidationError(
                "Maximum poll attempts must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            interval,
            max_attempts,
            deadline,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Starts a fresh ticker. The first attempt fires one interval from now.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> Ticker {
        let start = Instant::now();
        let mut interval = time::interval_at(start + self.interval, self.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Ticker {
            interval,
            deadline: Box::pin(time::sleep_until(start + self.deadline)),
            attempts: 0,
            max_attempts: self.max_attempts,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    AttemptsExhausted,
    DeadlineReached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// The n-th attempt (1-based) is due.
    Attempt(u32),
    Expired(Expiry),
}

/// Running instance of a [`PollSchedule`].
#[derive(Debug)]
pub struct Ticker {
    interval: Interval,
    deadline: Pin<Box<Sleep>>,
    attempts: u32,
    max_attempts: u32,
}

impl Ticker {
    /// Waits for the next tick.
    ///
    /// The tick following the last permitted attempt reports
    /// `AttemptsExhausted`. The deadline wins when both are due together.
    pub async fn next(&mut self) -> Tick {
        tokio::select! {
            biased;
            _ = &mut self.deadline => Tick::Expired(Expiry::DeadlineReached),
            _ = self.interval.tick() => {
                if self.attempts >= self.max_attempts {
                    Tick::Expired(Expiry::AttemptsExhausted)
                } else {
                    self.attempts += 1;
                    Tick::Attempt(self.attempts)
                }
            }
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}

/// A spawned, timer-driven task bound to a cancellation token.
///
/// Cancelling the token (or dropping the handle) stops the task at its next
/// suspension point, taking every timer it owns down with it.
#[derive(Debug)]
pub struct ScheduledTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    pub fn spawn<F>(token: CancellationToken, task: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = token.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                biased;
                _ = guard.cancelled() => {}
                _ = task => {}
            }
        });
        Self { token, handle }
    }

    /// Idempotent.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_schedule_validation() {
        assert!(PollSchedule::new(Duration::ZERO, 3, Duration::from_secs(10)).is_err());
        assert!(PollSchedule::new(Duration::from_secs(1), 0, Duration::from_secs(10)).is_err());
        assert!(PollSchedule::new(Duration::from_secs(1), 1, Duration::ZERO).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_exhausts_attempts() {
        let schedule =
            PollSchedule::new(Duration::from_secs(3), 2, Duration::from_secs(60)).unwrap();
        let start = Instant::now();
        let mut ticker = schedule.start();

        assert_eq!(ticker.next().await, Tick::Attempt(1));
        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert_eq!(ticker.next().await, Tick::Attempt(2));
        assert_eq!(ticker.next().await, Tick::Expired(Expiry::AttemptsExhausted));
        assert_eq!(start.elapsed(), Duration::from_secs(9));
        assert_eq!(ticker.attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_deadline_before_ceiling() {
        let schedule =
            PollSchedule::new(Duration::from_secs(3), 100, Duration::from_secs(7)).unwrap();
        let start = Instant::now();
        let mut ticker = schedule.start();

        assert_eq!(ticker.next().await, Tick::Attempt(1));
        assert_eq!(ticker.next().await, Tick::Attempt(2));
        assert_eq!(ticker.next().await, Tick::Expired(Expiry::DeadlineReached));
        assert_eq!(start.elapsed(), Duration::from_secs(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticker_deadline_wins_tie() {
        let schedule =
            PollSchedule::new(Duration::from_secs(5), 100, Duration::from_secs(5)).unwrap();
        let mut ticker = schedule.start();
        assert_eq!(ticker.next().await, Tick::Expired(Expiry::DeadlineReached));
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_task_cancel_stops_work() {
        let counter = Arc::new(AtomicU32::new(0));
        let seen = counter.clone();
        let task = ScheduledTask::spawn(CancellationToken::new(), async move {
            let mut interval = time::interval(Duration::from_secs(1));
            loop {
                interval.tick().await;
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        time::sleep(Duration::from_millis(2500)).await;
        task.cancel();
        task.cancel();
        let at_cancel = counter.load(Ordering::SeqCst);

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(counter.load(Ordering::SeqCst), at_cancel);
        assert!(task.is_cancelled());
        assert!(task.is_finished());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_task_drop_cancels() {
        let token = CancellationToken::new();
        let task = ScheduledTask::spawn(token.clone(), std::future::pending());
        drop(task);
        assert!(token.is_cancelled());
    }
}
