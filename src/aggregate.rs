use std::collections::BTreeMap;

use crate::executor::Outcome;

/// Histogram key used for requests that timed out.
pub const TIMEOUT_STATUS: u16 = 0;

/// Running totals over every outcome seen so far.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct AggregateState {
    pub requests: u64,
    pub count_2xx: u64,
    /// Everything that is not a 2xx response, timeouts included.
    pub count_non_2xx: u64,
    pub timeouts: u64,
    /// Requests that got no response for a reason other than a timeout.
    /// They share status bucket `0` with timeouts.
    pub connection_errors: u64,
    pub bytes_uploaded: u64,
    pub bytes_downloaded: u64,
    pub status_counts: BTreeMap<u16, u64>,
    /// Seconds, non-timeout outcomes only.
    pub ttfb_samples: Vec<f64>,
    /// Seconds, non-timeout outcomes only.
    pub total_time_samples: Vec<f64>,
}

impl AggregateState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: &Outcome) {
        self.requests += 1;
        self.bytes_uploaded += outcome.bytes_uploaded;
        self.bytes_downloaded += outcome.bytes_downloaded;

        if outcome.is_success() {
            self.count_2xx += 1;
        } else {
            self.count_non_2xx += 1;
        }

        if outcome.timed_out {
            self.timeouts += 1;
            *self.status_counts.entry(TIMEOUT_STATUS).or_insert(0) += 1;
            return;
        }

        if outcome.status == 0 {
            self.connection_errors += 1;
        }
        *self.status_counts.entry(outcome.status).or_insert(0) += 1;
        self.ttfb_samples.push(outcome.ttfb.as_secs_f64());
        self.total_time_samples.push(outcome.total_time.as_secs_f64());
    }

    pub fn record_batch(&mut self, outcomes: &[Outcome]) {
        for outcome in outcomes {
            self.record(outcome);
        }
    }

    pub fn all_timed_out(&self) -> bool {
        self.total_time_samples.is_empty()
    }

    /// Status codes ordered by descending frequency, ties by ascending code.
    pub fn status_counts_by_frequency(&self) -> Vec<(u16, u64)> {
        let mut counts: Vec<(u16, u64)> = self.status_counts.iter().map(|(s, c)| (*s, *c)).collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn outcome(sequence: u64, status: u16, timed_out: bool, millis: u64) -> Outcome {
        let time = Duration::from_millis(millis);
        Outcome {
            sequence,
            wall_time: time,
            total_time: time,
            ttfb: time / 2,
            bytes_uploaded: 3,
            bytes_downloaded: if status == 0 { 0 } else { 100 },
            status,
            timed_out,
        }
    }

    #[test]
    fn test_mixed_outcomes() {
        let outcomes = vec![
            outcome(3, 200, false, 10),
            outcome(1, 204, false, 20),
            outcome(2, 500, false, 30),
            outcome(5, 0, true, 2000),
            outcome(4, 0, false, 5),
            outcome(6, 404, false, 8),
        ];
        let mut state = AggregateState::new();
        state.record_batch(&outcomes);

        assert_eq!(state.requests, 6);
        assert_eq!(state.count_2xx, 2);
        assert_eq!(state.count_non_2xx, 4);
        assert_eq!(state.count_2xx + state.count_non_2xx, state.requests);
        assert_eq!(state.timeouts, 1);
        assert_eq!(state.connection_errors, 1);
        assert_eq!(state.bytes_uploaded, 18);
        assert_eq!(state.bytes_downloaded, 400);
        assert_eq!(state.ttfb_samples.len(), 5);
        assert_eq!(state.total_time_samples.len(), 5);
        assert_eq!(state.status_counts.get(&TIMEOUT_STATUS), Some(&2));
        assert_eq!(state.status_counts.get(&200), Some(&1));
        assert_eq!(state.status_counts.get(&500), Some(&1));
        assert!(!state.all_timed_out());
    }

    #[test]
    fn test_status_counts_cover_every_request() {
        let mut state = AggregateState::new();
        state.record(&outcome(1, 0, false, 3));
        state.record(&outcome(2, 0, true, 2000));
        state.record(&outcome(3, 0, false, 4));
        state.record(&outcome(4, 200, false, 10));

        assert_eq!(state.status_counts.values().sum::<u64>(), state.requests);
        assert_eq!(state.status_counts.get(&0), Some(&3));
        assert_eq!(state.connection_errors, 2);
        assert_eq!(state.timeouts, 1);
    }

    #[test]
    fn test_arrival_order_does_not_matter() {
        let outcomes: Vec<Outcome> = (1..=8).map(|i| outcome(i, 200 + (i % 2) as u16, false, i * 3)).collect();
        let mut forward = AggregateState::new();
        forward.record_batch(&outcomes);
        let mut reversed = AggregateState::new();
        for o in outcomes.iter().rev() {
            reversed.record(o);
        }

        assert_eq!(forward.count_2xx, reversed.count_2xx);
        assert_eq!(forward.status_counts, reversed.status_counts);
        let mut a = forward.total_time_samples.clone();
        let mut b = reversed.total_time_samples.clone();
        a.sort_by(|x, y| x.partial_cmp(y).unwrap());
        b.sort_by(|x, y| x.partial_cmp(y).unwrap());
        assert_eq!(a, b);
    }

    #[test]
    fn test_all_timed_out() {
        let mut state = AggregateState::new();
        for i in 1..=5 {
            state.record(&outcome(i, 0, true, 2000));
        }
        assert!(state.all_timed_out());
        assert_eq!(state.timeouts, 5);
        assert_eq!(state.count_2xx, 0);
        assert_eq!(state.count_non_2xx, 5);
        assert!(state.ttfb_samples.is_empty());
        assert_eq!(state.status_counts_by_frequency(), vec![(TIMEOUT_STATUS, 5)]);
    }

    #[test]
    fn test_status_counts_by_frequency() {
        let mut state = AggregateState::new();
        for (i, status) in [404, 200, 200, 500, 200, 404].into_iter().enumerate() {
            state.record(&outcome(i as u64 + 1, status, false, 1));
        }
        assert_eq!(
            state.status_counts_by_frequency(),
            vec![(200, 3), (404, 2), (500, 1)]
        );
    }
}
