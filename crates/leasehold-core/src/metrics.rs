// Election metrics
// Emitted through the `metrics` facade; they are no-ops until the host
// process installs a recorder.

use metrics::{counter, describe_counter, describe_gauge, gauge};

pub const IS_LEADER: &str = "leasehold_is_leader";
pub const STORAGE_ERRORS_TOTAL: &str = "leasehold_storage_errors_total";
pub const LEADERSHIP_ACQUIRED_TOTAL: &str = "leasehold_leadership_acquired_total";
pub const LEADERSHIP_LOST_TOTAL: &str = "leasehold_leadership_lost_total";

/// Initialize all metric descriptions
/// Should be called once at application startup
pub fn describe_metrics() {
    describe_gauge!(IS_LEADER, "Whether the local candidate holds the lease (1) or not (0)");
    describe_counter!(
        STORAGE_ERRORS_TOTAL,
        "Total number of failed storage calls, by election phase"
    );
    describe_counter!(
        LEADERSHIP_ACQUIRED_TOTAL,
        "Total number of times the local candidate acquired the lease"
    );
    describe_counter!(
        LEADERSHIP_LOST_TOTAL,
        "Total number of times the local candidate stopped leading, by reason"
    );
}

/// Election phase a storage error happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Follow,
    Hold,
}

impl Phase {
    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Follow => "follow",
            Phase::Hold => "hold",
        }
    }
}

/// One series per candidate; candidates sharing a key in one process do not
/// overwrite each other
pub(crate) fn record_leadership(key: &str, id: &str, leading: bool) {
    gauge!(IS_LEADER, "key" => key.to_string(), "id" => id.to_string())
        .set(if leading { 1.0 } else { 0.0 });
}

pub(crate) fn record_storage_error(key: &str, phase: Phase) {
    counter!(STORAGE_ERRORS_TOTAL, "key" => key.to_string(), "phase" => phase.as_str()).increment(1);
}

pub(crate) fn record_acquired(key: &str) {
    counter!(LEADERSHIP_ACQUIRED_TOTAL, "key" => key.to_string()).increment(1);
}

pub(crate) fn record_lost(key: &str, reason: &'static str) {
    counter!(LEADERSHIP_LOST_TOTAL, "key" => key.to_string(), "reason" => reason).increment(1);
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU64, Ordering};

    use dashmap::DashMap;
    use metrics::{
        Counter, Gauge, GaugeFn, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
    };

    use super::*;

    #[derive(Debug, Default)]
    struct TestGauge(AtomicU64);

    impl TestGauge {
        fn value(&self) -> f64 {
            f64::from_bits(self.0.load(Ordering::SeqCst))
        }
    }

    impl GaugeFn for TestGauge {
        fn increment(&self, value: f64) {
            self.set(self.value() + value);
        }

        fn decrement(&self, value: f64) {
            self.set(self.value() - value);
        }

        fn set(&self, value: f64) {
            self.0.store(value.to_bits(), Ordering::SeqCst);
        }
    }

    /// Keeps every gauge series, keyed by name and labels
    #[derive(Debug, Default)]
    struct TestRecorder {
        gauges: DashMap<String, Arc<TestGauge>>,
    }

    impl TestRecorder {
        fn series(key: &Key) -> String {
            let labels: Vec<String> = key
                .labels()
                .map(|l| format!("{}={}", l.key(), l.value()))
                .collect();
            format!("{}{{{}}}", key.name(), labels.join(","))
        }

        fn gauge(&self, series: &str) -> Option<f64> {
            self.gauges.get(series).map(|g| TestGauge::value(&g))
        }
    }

    impl Recorder for TestRecorder {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, _key: &Key, _metadata: &Metadata<'_>) -> Counter {
            Counter::noop()
        }

        fn register_gauge(&self, key: &Key, _metadata: &Metadata<'_>) -> Gauge {
            let gauge = self
                .gauges
                .entry(Self::series(key))
                .or_default()
                .clone();
            Gauge::from_arc(gauge)
        }

        fn register_histogram(&self, _key: &Key, _metadata: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    #[test]
    fn test_followers_do_not_clear_leader_gauge() {
        let recorder = TestRecorder::default();

        metrics::with_local_recorder(&recorder, || {
            record_leadership("job", "node-1", true);
            record_leadership("job", "node-2", false);
            record_leadership("job", "node-3", false);
        });

        assert_eq!(recorder.gauge("leasehold_is_leader{key=job,id=node-1}"), Some(1.0));
        assert_eq!(recorder.gauge("leasehold_is_leader{key=job,id=node-2}"), Some(0.0));
        assert_eq!(recorder.gauges.len(), 3);
    }
}
