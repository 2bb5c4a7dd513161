//! Metrics Tracker: counters, gauges, and bounded-reservoir histograms,
//! exposed as Prometheus text. The teacher has no metrics
//! surface at all; this is grounded on the generic "counters/gauges/
//! histograms behind one shared lock, labelled by a small enumerated key"
//! shape common across the pack's server-ish crates, kept here as one
//! `Mutex`-guarded struct rather than a metrics crate dependency, since
//! cardinality is intentionally bounded to enumerated codes/types (never
//! raw user IDs) and a hand-rolled exposition text is only a few lines.

use std::collections::BTreeMap;
use std::sync::Mutex;

const HISTOGRAM_CAP: usize = 1000;

#[derive(Default)]
struct Inner {
    counters: BTreeMap<String, u64>,
    gauges: BTreeMap<String, f64>,
    histograms: BTreeMap<String, Vec<f64>>,
}

/// Bounded-reservoir: once a histogram hits `HISTOGRAM_CAP` samples, new
/// samples evict the oldest (ring-buffer semantics) rather than growing
/// unboundedly.
fn push_capped(values: &mut Vec<f64>, sample: f64) {
    if values.len() >= HISTOGRAM_CAP {
        values.remove(0);
    }
    values.push(sample);
}

pub struct Metrics {
    inner: Mutex<Inner>,
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics {
            inner: Mutex::new(Inner::default()),
        }
    }
}

impl Metrics {
    pub fn incr(&self, key: &str) {
        self.incr_by(key, 1);
    }

    pub fn incr_by(&self, key: &str, n: u64) {
        let mut inner = self.inner.lock().expect("metrics lock poisoned");
        *inner.counters.entry(key.to_string()).or_insert(0) += n;
    }

    pub fn counter(&self, key: &str) -> u64 {
        let inner = self.inner.lock().expect("metrics lock poisoned");
        inner.counters.get(key).copied().unwrap_or(0)
    }

    pub fn set_gauge(&self, key: &str, value: f64) {
        let mut inner = self.inner.lock().expect("metrics lock poisoned");
        inner.gauges.insert(key.to_string(), value);
    }

    pub fn gauge(&self, key: &str) -> f64 {
        let inner = self.inner.lock().expect("metrics lock poisoned");
        inner.gauges.get(key).copied().unwrap_or(0.0)
    }

    pub fn incr_gauge(&self, key: &str, delta: f64) {
        let mut inner = self.inner.lock().expect("metrics lock poisoned");
        let entry = inner.gauges.entry(key.to_string()).or_insert(0.0);
        *entry += delta;
    }

    pub fn observe(&self, key: &str, sample: f64) {
        let mut inner = self.inner.lock().expect("metrics lock poisoned");
        let values = inner.histograms.entry(key.to_string()).or_default();
        push_capped(values, sample);
    }

    /// Renders the Prometheus text exposition format: `# TYPE` headers, the
    /// raw series, and `{quantile=...}` summary lines per histogram.
    pub fn render(&self) -> String {
        let inner = self.inner.lock().expect("metrics lock poisoned");
        let mut out = String::new();

        for (name, value) in &inner.counters {
            out.push_str(&format!("# TYPE {name} counter\n{name} {value}\n"));
        }
        for (name, value) in &inner.gauges {
            out.push_str(&format!("# TYPE {name} gauge\n{name} {value}\n"));
        }
        for (name, values) in &inner.histograms {
            out.push_str(&format!("# TYPE {name} summary\n"));
            let mut sorted = values.clone();
            sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
            for (label, q) in [("0.5", 0.5), ("0.95", 0.95), ("0.99", 0.99)] {
                let v = quantile(&sorted, q);
                out.push_str(&format!("{name}{{quantile=\"{label}\"}} {v}\n"));
            }
            out.push_str(&format!("{name}_count {}\n", values.len()));
        }
        out
    }
}

fn quantile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let idx = ((sorted.len() - 1) as f64 * q).round() as usize;
    sorted[idx.min(sorted.len() - 1)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let m = Metrics::default();
        m.incr("msgs_handled_total");
        m.incr("msgs_handled_total");
        assert_eq!(m.counter("msgs_handled_total"), 2);
    }

    #[test]
    fn histogram_caps_at_reservoir_size() {
        let m = Metrics::default();
        for i in 0..(HISTOGRAM_CAP + 10) {
            m.observe("handle_duration_ms", i as f64);
        }
        let rendered = m.render();
        assert!(rendered.contains(&format!("handle_duration_ms_count {HISTOGRAM_CAP}")));
    }

    #[test]
    fn gauges_last_write_wins() {
        let m = Metrics::default();
        m.set_gauge("room_count", 3.0);
        m.set_gauge("room_count", 5.0);
        assert_eq!(m.gauge("room_count"), 5.0);
    }
}
