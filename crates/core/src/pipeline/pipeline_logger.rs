use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

/// Observer for frame loop events.
///
/// Keeps the loop free of output concerns: the CLI prints stage timings,
/// the desktop app and tests discard them.
pub trait PipelineLogger: Send {
    /// Called after every processed tick with the running total.
    fn tick(&mut self, processed: u64);

    /// A tick that did no work, keyed by reason.
    fn skipped(&mut self, reason: &str);

    /// Record how long a named stage took within one tick.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time metric (e.g. faces detected).
    fn metric(&mut self, name: &str, value: f64);

    /// Emit an end-of-run summary. Default: no-op.
    fn summary(&self) {}
}

pub struct NullPipelineLogger;

impl PipelineLogger for NullPipelineLogger {
    fn tick(&mut self, _processed: u64) {}
    fn skipped(&mut self, _reason: &str) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
}

/// CLI logger: per-stage timing, metrics, skip counts and a summary at the
/// end of the run.
///
/// Progress lines are throttled to one every `throttle_ticks` ticks.
pub struct StdoutPipelineLogger {
    throttle_ticks: u64,
    timings: HashMap<String, Vec<f64>>,
    metrics: HashMap<String, Vec<f64>>,
    skips: BTreeMap<String, u64>,
    start_time: Instant,
    processed: u64,
}

impl StdoutPipelineLogger {
    pub fn new(throttle_ticks: u64) -> Self {
        Self {
            throttle_ticks: throttle_ticks.max(1),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            skips: BTreeMap::new(),
            start_time: Instant::now(),
            processed: 0,
        }
    }

    fn ticks_per_second(&self) -> f64 {
        let secs = self.start_time.elapsed().as_secs_f64();
        if secs > 0.0 {
            self.processed as f64 / secs
        } else {
            0.0
        }
    }

    /// Returns the formatted summary string, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() && self.skips.is_empty() {
            return None;
        }

        let mut lines = vec![format!(
            "Frame loop summary ({} ticks, {:.1}s):",
            self.processed,
            self.start_time.elapsed().as_secs_f64()
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            let total_ms: f64 = durations.iter().sum();
            let avg_ms = total_ms / durations.len().max(1) as f64;
            let max_ms = durations.iter().copied().fold(0.0, f64::max);
            lines.push(format!(
                "  {stage:10}: avg {avg_ms:6.1}ms  max {max_ms:6.1}ms  total {total_ms:7.0}ms"
            ));
        }

        let mut metric_names: Vec<_> = self.metrics.keys().collect();
        metric_names.sort();
        for name in metric_names {
            let values = &self.metrics[name];
            let avg = values.iter().sum::<f64>() / values.len().max(1) as f64;
            lines.push(format!("  {name}: avg {avg:.1}"));
        }

        for (reason, count) in &self.skips {
            lines.push(format!("  skipped ({reason}): {count}"));
        }

        if self.processed > 0 {
            lines.push(format!("  Throughput: {:.1} ticks/s", self.ticks_per_second()));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<&[f64]> {
        self.timings.get(stage).map(|v| v.as_slice())
    }

    pub fn metrics_for(&self, name: &str) -> Option<&[f64]> {
        self.metrics.get(name).map(|v| v.as_slice())
    }

    pub fn skips_for(&self, reason: &str) -> u64 {
        self.skips.get(reason).copied().unwrap_or(0)
    }
}

impl Default for StdoutPipelineLogger {
    fn default() -> Self {
        Self::new(300)
    }
}

impl PipelineLogger for StdoutPipelineLogger {
    fn tick(&mut self, processed: u64) {
        self.processed = processed;
        if processed % self.throttle_ticks == 0 {
            log::info!(
                "Processed {processed} ticks ({:.1} ticks/s)",
                self.ticks_per_second()
            );
        }
    }

    fn skipped(&mut self, reason: &str) {
        *self.skips.entry(reason.to_string()).or_default() += 1;
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .push(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics
            .entry(name.to_string())
            .or_default()
            .push(value);
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_logger_all_methods_are_noop() {
        let mut logger = NullPipelineLogger;
        logger.tick(1);
        logger.skipped("detector pending");
        logger.timing("detect", 5.0);
        logger.metric("faces", 2.0);
        logger.summary();
    }

    #[test]
    fn test_timing_records_values() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.timing("detect", 20.0);
        logger.timing("detect", 30.0);
        logger.timing("render", 5.0);

        assert_eq!(logger.timings_for("detect"), Some(&[20.0, 30.0][..]));
        assert_eq!(logger.timings_for("render"), Some(&[5.0][..]));
        assert!(logger.timings_for("assign").is_none());
    }

    #[test]
    fn test_summary_includes_stages_max_and_metrics() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.tick(3);
        logger.timing("detect", 20.0);
        logger.timing("detect", 40.0);
        logger.metric("faces", 1.0);
        logger.metric("faces", 2.0);

        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("Frame loop summary (3 ticks"));
        assert!(summary.contains("avg   30.0ms"));
        assert!(summary.contains("max   40.0ms"));
        assert!(summary.contains("faces: avg 1.5"));
        assert!(summary.contains("ticks/s"));
    }

    #[test]
    fn test_skips_are_counted_per_reason() {
        let mut logger = StdoutPipelineLogger::new(10);
        logger.skipped("source pending");
        logger.skipped("source pending");
        logger.skipped("detector pending");

        assert_eq!(logger.skips_for("source pending"), 2);
        assert_eq!(logger.skips_for("detector pending"), 1);
        assert_eq!(logger.skips_for("abandoned"), 0);
        let summary = logger.summary_string().unwrap();
        assert!(summary.contains("skipped (source pending): 2"));
    }

    #[test]
    fn test_empty_summary_returns_none() {
        assert!(StdoutPipelineLogger::new(10).summary_string().is_none());
    }

    #[test]
    fn test_tick_tracks_processed_total() {
        let mut logger = StdoutPipelineLogger::new(10);
        for i in 1..=25 {
            logger.tick(i);
        }
        assert_eq!(logger.processed, 25);
    }

    #[test]
    fn test_throttle_is_at_least_one() {
        assert_eq!(StdoutPipelineLogger::new(0).throttle_ticks, 1);
        assert_eq!(StdoutPipelineLogger::default().throttle_ticks, 300);
    }
}
