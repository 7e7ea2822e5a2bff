//! Policies deciding how long to wait between two reads of a pending
//! request's status, and when to give up.
//!
//! A [`PollingStrategy`] is asked once per pending attempt for the time to
//! wait before the next read. Strategies are stateful and are created anew
//! for every request; they are combined with [`Sequence`].
use crate::messages::RequestId;
use crate::request_status::CallStatus;
use ic_call_base_types::CanisterId;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum PollingError {
    #[error("request {request_id} did not complete within {deadline:?}")]
    Timeout {
        request_id: RequestId,
        deadline: Duration,
    },
    #[error("request {request_id} did not complete within {attempts} attempts")]
    AttemptsExhausted { request_id: RequestId, attempts: u32 },
}

pub trait PollingStrategy: Send {
    /// Returns how long to wait before reading the status of `request_id`
    /// again, or a terminal error if polling must stop.
    fn next_wait(
        &mut self,
        canister_id: &CanisterId,
        request_id: &RequestId,
        status: CallStatus,
    ) -> Result<Duration, PollingError>;
}

impl<S: PollingStrategy + ?Sized> PollingStrategy for Box<S> {
    fn next_wait(
        &mut self,
        canister_id: &CanisterId,
        request_id: &RequestId,
        status: CallStatus,
    ) -> Result<Duration, PollingError> {
        (**self).next_wait(canister_id, request_id, status)
    }
}

/// Does not wait on the first attempt and waits `delay` on every later one.
#[derive(Clone, Debug)]
pub struct OnceThenDelay {
    delay: Duration,
    first: bool,
}

impl OnceThenDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay, first: true }
    }
}

impl PollingStrategy for OnceThenDelay {
    fn next_wait(
        &mut self,
        _canister_id: &CanisterId,
        _request_id: &RequestId,
        _status: CallStatus,
    ) -> Result<Duration, PollingError> {
        if std::mem::replace(&mut self.first, false) {
            Ok(Duration::ZERO)
        } else {
            Ok(self.delay)
        }
    }
}

/// Waits `initial` on the first attempt, and `factor` times the previous
/// wait on every later one.
#[derive(Clone, Debug)]
pub struct ExponentialBackoff {
    current: Duration,
    factor: f64,
}

impl ExponentialBackoff {
    pub fn new(initial: Duration, factor: f64) -> Self {
        Self {
            current: initial,
            factor,
        }
    }
}

impl PollingStrategy for ExponentialBackoff {
    fn next_wait(
        &mut self,
        _canister_id: &CanisterId,
        _request_id: &RequestId,
        _status: CallStatus,
    ) -> Result<Duration, PollingError> {
        let wait = self.current;
        self.current = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.factor)
            .unwrap_or(Duration::MAX);
        Ok(wait)
    }
}

/// Waits the same `delay` on every attempt.
#[derive(Clone, Debug)]
pub struct Throttle {
    delay: Duration,
}

impl Throttle {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl PollingStrategy for Throttle {
    fn next_wait(
        &mut self,
        _canister_id: &CanisterId,
        _request_id: &RequestId,
        _status: CallStatus,
    ) -> Result<Duration, PollingError> {
        Ok(self.delay)
    }
}

/// Fails once it is invoked more than `max_attempts` times for the same
/// request id.
#[derive(Clone, Debug)]
pub struct AttemptLimit {
    max_attempts: u32,
    attempts: HashMap<RequestId, u32>,
}

impl AttemptLimit {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            attempts: HashMap::new(),
        }
    }
}

impl PollingStrategy for AttemptLimit {
    fn next_wait(
        &mut self,
        _canister_id: &CanisterId,
        request_id: &RequestId,
        _status: CallStatus,
    ) -> Result<Duration, PollingError> {
        let attempts = self.attempts.entry(*request_id).or_insert(0);
        *attempts += 1;
        if *attempts > self.max_attempts {
            return Err(PollingError::AttemptsExhausted {
                request_id: *request_id,
                attempts: self.max_attempts,
            });
        }
        Ok(Duration::ZERO)
    }
}

/// Fails once more than `total` has elapsed since the strategy was created.
#[derive(Clone, Debug)]
pub struct Deadline {
    start: Instant,
    total: Duration,
}

impl Deadline {
    pub fn new(total: Duration) -> Self {
        Self {
            start: Instant::now(),
            total,
        }
    }
}

impl PollingStrategy for Deadline {
    fn next_wait(
        &mut self,
        _canister_id: &CanisterId,
        request_id: &RequestId,
        _status: CallStatus,
    ) -> Result<Duration, PollingError> {
        if self.start.elapsed() > self.total {
            return Err(PollingError::Timeout {
                request_id: *request_id,
                deadline: self.total,
            });
        }
        Ok(Duration::ZERO)
    }
}

/// Runs every stage on each attempt, in order, and waits for the sum of
/// their waits. The first failing stage stops the remaining ones.
#[derive(Default)]
pub struct Sequence {
    stages: Vec<Box<dyn PollingStrategy>>,
}

impl Sequence {
    pub fn new(stages: Vec<Box<dyn PollingStrategy>>) -> Self {
        Self { stages }
    }

    pub fn then<S: PollingStrategy + 'static>(mut self, stage: S) -> Self {
        self.stages.push(Box::new(stage));
        self
    }
}

impl PollingStrategy for Sequence {
    fn next_wait(
        &mut self,
        canister_id: &CanisterId,
        request_id: &RequestId,
        status: CallStatus,
    ) -> Result<Duration, PollingError> {
        let mut wait = Duration::ZERO;
        for stage in self.stages.iter_mut() {
            wait = wait.saturating_add(stage.next_wait(canister_id, request_id, status)?);
        }
        Ok(wait)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollingConfig;
    use assert_matches::assert_matches;

    fn next(strategy: &mut dyn PollingStrategy, request_id: u8) -> Result<Duration, PollingError> {
        strategy.next_wait(
            &CanisterId::from_u64(1),
            &RequestId::from([request_id; 32]),
            CallStatus::Processing,
        )
    }

    #[test]
    fn once_then_delay_skips_first_wait() {
        let mut strategy = OnceThenDelay::new(Duration::from_secs(1));
        assert_eq!(next(&mut strategy, 0), Ok(Duration::ZERO));
        assert_eq!(next(&mut strategy, 0), Ok(Duration::from_secs(1)));
        assert_eq!(next(&mut strategy, 0), Ok(Duration::from_secs(1)));
    }

    #[test]
    fn backoff_scales_every_wait() {
        let mut strategy = ExponentialBackoff::new(Duration::from_millis(1000), 1.5);
        let waits: Vec<_> = (0..4).map(|_| next(&mut strategy, 0).unwrap()).collect();
        assert_eq!(
            waits,
            vec![
                Duration::from_millis(1000),
                Duration::from_millis(1500),
                Duration::from_millis(2250),
                Duration::from_micros(3_375_000),
            ]
        );
    }

    #[test]
    fn backoff_saturates_instead_of_overflowing() {
        let mut strategy = ExponentialBackoff::new(Duration::from_secs(u64::MAX / 2), 4.0);
        assert_eq!(next(&mut strategy, 0), Ok(Duration::from_secs(u64::MAX / 2)));
        assert_eq!(next(&mut strategy, 0), Ok(Duration::MAX));
        assert_eq!(next(&mut strategy, 0), Ok(Duration::MAX));

        let mut strategy = ExponentialBackoff::new(Duration::from_secs(1), -1.0);
        assert_eq!(next(&mut strategy, 0), Ok(Duration::from_secs(1)));
        assert_eq!(next(&mut strategy, 0), Ok(Duration::MAX));
    }

    #[test]
    fn sequence_saturates_the_summed_wait() {
        let mut strategy = Sequence::default()
            .then(Throttle::new(Duration::MAX))
            .then(Throttle::new(Duration::from_secs(1)));
        assert_eq!(next(&mut strategy, 0), Ok(Duration::MAX));
    }

    #[test]
    fn throttle_is_constant() {
        let mut strategy = Throttle::new(Duration::from_millis(250));
        for _ in 0..3 {
            assert_eq!(next(&mut strategy, 0), Ok(Duration::from_millis(250)));
        }
    }

    #[test]
    fn attempt_limit_counts_per_request() {
        let mut strategy = AttemptLimit::new(2);
        assert!(next(&mut strategy, 1).is_ok());
        assert!(next(&mut strategy, 1).is_ok());
        assert!(next(&mut strategy, 2).is_ok());
        assert_matches!(
            next(&mut strategy, 1),
            Err(PollingError::AttemptsExhausted { attempts: 2, .. })
        );
        assert!(next(&mut strategy, 2).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn deadline_fails_only_after_total_has_elapsed() {
        let mut strategy = Deadline::new(Duration::from_secs(10));
        assert!(next(&mut strategy, 0).is_ok());

        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(next(&mut strategy, 0).is_ok());

        tokio::time::advance(Duration::from_millis(1)).await;
        assert_matches!(
            next(&mut strategy, 0),
            Err(PollingError::Timeout { deadline, .. }) if deadline == Duration::from_secs(10)
        );
    }

    #[test]
    fn sequence_sums_waits_and_stops_at_first_failure() {
        let mut strategy = Sequence::default()
            .then(Throttle::new(Duration::from_millis(100)))
            .then(ExponentialBackoff::new(Duration::from_millis(10), 2.0))
            .then(AttemptLimit::new(1));
        assert_eq!(next(&mut strategy, 0), Ok(Duration::from_millis(110)));
        assert_matches!(
            next(&mut strategy, 0),
            Err(PollingError::AttemptsExhausted { .. })
        );

        // A failing stage prevents later stages from running.
        let mut strategy = Sequence::default()
            .then(AttemptLimit::new(0))
            .then(AttemptLimit::new(0));
        assert_matches!(next(&mut strategy, 0), Err(PollingError::AttemptsExhausted { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn default_strategy_grows_by_a_fifth_until_five_minutes() {
        let mut strategy = PollingConfig::default().strategy();
        let start = Instant::now();
        let mut previous = Duration::ZERO;
        loop {
            match next(&mut strategy, 0) {
                Ok(wait) => {
                    assert!(wait >= Duration::from_secs(1));
                    if previous > Duration::ZERO {
                        assert_eq!(wait, previous.mul_f64(1.2));
                    }
                    previous = wait;
                    tokio::time::advance(wait).await;
                }
                Err(err) => {
                    assert_matches!(err, PollingError::Timeout { .. });
                    break;
                }
            }
        }
        assert!(start.elapsed() > Duration::from_secs(300));
    }
}
