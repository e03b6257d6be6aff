//! Per-destination queue concurrency and feedback (§4.9).
//!
//! Grounded on `qmgr/qmgr_queue.c`. The concurrency limit ("window") is
//! a slow-open, hysteresis-controlled value: positive feedback accrues
//! in a `success` band until it crosses `pos_hysteresis`, at which
//! point the window grows by that whole band; negative feedback works
//! the same way in reverse and can drive the window to zero, at which
//! point the destination is dead until an unthrottle timer fires.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackMethod {
    Fixed1,
    InverseWindow,
    InverseSqrtWindow,
}

impl FeedbackMethod {
    fn value(self, window: i64) -> f64 {
        let window = window.max(1) as f64;
        match self {
            FeedbackMethod::Fixed1 => 1.0,
            FeedbackMethod::InverseWindow => 1.0 / window,
            FeedbackMethod::InverseSqrtWindow => 1.0 / window.sqrt(),
        }
    }
}

pub struct FeedbackConfig {
    pub pos_feedback: FeedbackMethod,
    pub neg_feedback: FeedbackMethod,
    pub pos_hysteresis: i64,
    pub neg_hysteresis: i64,
    pub sac_cohorts: f64,
    pub min_backoff_time: u64,
    pub init_dest_concurrency: i64,
}

/// A destination with a dead window and the reason it died, returned so
/// the caller can arm the real unthrottle timer at `min_backoff_time`.
pub struct DeadUntil {
    pub at: u64,
    pub reason: String,
}

pub struct DestinationQueue {
    pub name: String,
    pub window: i64,
    pub success: f64,
    pub failure: f64,
    pub fail_cohorts: f64,
    pub busy_refcount: i64,
    pub dest_concurrency_limit: i64,
    dead_reason: Option<String>,
}

impl DestinationQueue {
    pub fn new(name: impl Into<String>, config: &FeedbackConfig, dest_concurrency_limit: i64) -> Self {
        DestinationQueue {
            name: name.into(),
            window: config.init_dest_concurrency,
            success: 0.0,
            failure: 0.0,
            fail_cohorts: 0.0,
            busy_refcount: 0,
            dest_concurrency_limit,
            dead_reason: None,
        }
    }

    pub fn is_dead(&self) -> bool {
        self.window == 0
    }

    /// A successful delivery: grows the window by whole hysteresis
    /// bands once enough positive feedback has accumulated.
    pub fn unthrottle(&mut self, config: &FeedbackConfig) -> Option<DeadUntil> {
        self.fail_cohorts = 0.0;

        if self.window == 0 {
            self.window = if self.busy_refcount > 0 {
                self.busy_refcount
            } else {
                config.init_dest_concurrency
            };
            self.success = 0.0;
            self.failure = 0.0;
            self.dead_reason = None;
            return None;
        }

        let margin = self.busy_refcount + config.init_dest_concurrency;
        if (self.dest_concurrency_limit == 0 || self.dest_concurrency_limit > self.window)
            && self.window < margin
        {
            let feedback = config.pos_feedback.value(self.window);
            self.success += feedback;
            while self.success >= config.pos_hysteresis as f64 {
                self.window += config.pos_hysteresis;
                self.success -= config.pos_hysteresis as f64;
                self.failure = 0.0;
            }
            if self.dest_concurrency_limit > 0 && self.window > self.dest_concurrency_limit {
                self.window = self.dest_concurrency_limit;
            }
        }
        None
    }

    /// A failed delivery: shrinks the window, and once `sac_cohorts`
    /// worth of pseudo-cohort failures have been seen, declares the
    /// destination dead and returns when it should be retried.
    pub fn throttle(&mut self, config: &FeedbackConfig, reason: impl Into<String>, now: u64) -> Option<DeadUntil> {
        if self.window > 0 {
            self.fail_cohorts += 1.0 / self.window as f64;
            if self.fail_cohorts >= config.sac_cohorts {
                self.window = 0;
            }
        }

        if self.window > 0 {
            let feedback = config.neg_feedback.value(self.window);
            self.failure -= feedback;
            while self.failure < 0.0 {
                self.window -= config.neg_hysteresis;
                self.success = 0.0;
                self.failure += config.neg_hysteresis as f64;
            }
            if self.window < 1 {
                self.window = 1;
            }
        }

        if self.window == 0 {
            let reason = reason.into();
            self.dead_reason = Some(reason.clone());
            return Some(DeadUntil {
                at: now + config.min_backoff_time,
                reason,
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> FeedbackConfig {
        FeedbackConfig {
            pos_feedback: FeedbackMethod::InverseWindow,
            neg_feedback: FeedbackMethod::InverseWindow,
            pos_hysteresis: 1,
            neg_hysteresis: 1,
            sac_cohorts: 10.0,
            min_backoff_time: 300,
            init_dest_concurrency: 5,
        }
    }

    #[test]
    fn new_queue_starts_at_initial_concurrency() {
        let q = DestinationQueue::new("example.com", &config(), 0);
        assert_eq!(q.window, 5);
    }

    #[test]
    fn inverse_window_feedback_grows_window_by_one_hysteresis_band() {
        let mut q = DestinationQueue::new("example.com", &config(), 0);
        q.busy_refcount = 10;
        q.unthrottle(&config());
        assert_eq!(q.window, 6);
    }

    #[test]
    fn repeated_failures_eventually_declare_destination_dead() {
        let mut q = DestinationQueue::new("example.com", &config(), 0);
        let cfg = FeedbackConfig {
            sac_cohorts: 2.0,
            ..config()
        };
        q.window = 1;
        assert!(q.throttle(&cfg, "4.3.0 timeout", 1000).is_none());
        let dead = q.throttle(&cfg, "4.3.0 timeout", 1000);
        assert!(dead.is_some());
        assert_eq!(q.window, 0);
    }

    #[test]
    fn dead_destination_schedules_retry_at_min_backoff_time() {
        let mut q = DestinationQueue::new("example.com", &config(), 0);
        let cfg = FeedbackConfig {
            sac_cohorts: 1.0,
            ..config()
        };
        q.window = 1;
        let dead = q.throttle(&cfg, "5.0.0 rejected", 1000).unwrap();
        assert_eq!(dead.at, 1300);
    }

    #[test]
    fn unthrottle_from_dead_restores_busy_refcount_as_new_window() {
        let mut q = DestinationQueue::new("example.com", &config(), 0);
        q.window = 0;
        q.busy_refcount = 3;
        q.unthrottle(&config());
        assert_eq!(q.window, 3);
    }

    #[test]
    fn window_never_exceeds_transport_concurrency_limit() {
        let cfg = config();
        let mut q = DestinationQueue::new("example.com", &cfg, 6);
        q.busy_refcount = 20;
        for _ in 0..10 {
            q.unthrottle(&cfg);
        }
        assert!(q.window <= 6);
    }
}
