//! Performance metrics and statistics tracking for a detection run.

use crate::types::BatchReport;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tracing::info;

/// Metrics collector for one detection run
pub struct RunMetrics {
    /// Total model invocations (one per image per model)
    pub inferences_run: AtomicU64,
    /// Model inference times (in microseconds)
    model_times: RwLock<HashMap<String, Vec<u64>>>,
    /// Opacity score distribution buckets
    score_buckets: RwLock<[u64; 10]>,
    /// Start time for rate calculation
    start_time: Instant,
}

impl RunMetrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            inferences_run: AtomicU64::new(0),
            model_times: RwLock::new(HashMap::new()),
            score_buckets: RwLock::new([0; 10]),
            start_time: Instant::now(),
        }
    }

    /// Record one model invocation
    pub fn record_inference(&self, model_name: &str, duration: Duration) {
        self.inferences_run.fetch_add(1, Ordering::Relaxed);

        if let Ok(mut times) = self.model_times.write() {
            let model_times = times.entry(model_name.to_string()).or_insert_with(Vec::new);
            model_times.push(duration.as_micros() as u64);
        }
    }

    /// Record a raw model score into the distribution buckets
    pub fn record_score(&self, score: f32) {
        let bucket = (score * 10.0).min(9.0) as usize;
        if let Ok(mut buckets) = self.score_buckets.write() {
            buckets[bucket] += 1;
        }
    }

    /// Get model performance stats
    pub fn get_model_stats(&self) -> HashMap<String, ModelStats> {
        let times = self.model_times.read().unwrap();
        let mut stats = HashMap::new();

        for (model, model_times) in times.iter() {
            if model_times.is_empty() {
                continue;
            }

            let mut sorted: Vec<u64> = model_times.clone();
            sorted.sort();

            let sum: u64 = sorted.iter().sum();
            let count = sorted.len();

            stats.insert(
                model.clone(),
                ModelStats {
                    calls: count as u64,
                    mean_us: sum / count as u64,
                    p50_us: sorted[count / 2],
                    p99_us: sorted[(count as f64 * 0.99) as usize],
                },
            );
        }

        stats
    }

    /// Get current throughput (inferences per second)
    pub fn get_throughput(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed > 0.0 {
            self.inferences_run.load(Ordering::Relaxed) as f64 / elapsed
        } else {
            0.0
        }
    }

    /// Get score distribution
    pub fn get_score_distribution(&self) -> [u64; 10] {
        *self.score_buckets.read().unwrap()
    }

    /// Print summary statistics for a finished batch
    pub fn print_summary(&self, report: &BatchReport) {
        let counts = report.counts();
        let elapsed = self.start_time.elapsed().as_secs_f64();
        let throughput = self.get_throughput();
        let score_dist = self.get_score_distribution();

        info!("╔══════════════════════════════════════════════════════════════╗");
        info!("║              OPACITY DETECTION - RUN SUMMARY                 ║");
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!(
            "║ Images Scored:  {:>8}  │  Files Skipped: {:>8}         ║",
            report.verdicts.len(),
            report.skipped
        );
        info!(
            "║ Positive:       {:>8}  │  Negative:      {:>8}         ║",
            counts.positive, counts.negative
        );
        info!(
            "║ Elapsed: {:>8.2}s         │  Rate: {:>8.1} inferences/s    ║",
            elapsed, throughput
        );
        info!("╠══════════════════════════════════════════════════════════════╣");
        info!("║ Opacity Score Distribution:                                  ║");
        let total: u64 = score_dist.iter().sum();
        for (i, &count) in score_dist.iter().enumerate() {
            let pct = if total > 0 {
                (count as f64 / total as f64) * 100.0
            } else {
                0.0
            };
            let bar_len = (pct / 2.0) as usize;
            let bar: String = "█".repeat(bar_len.min(20));
            info!(
                "║   {:.1}-{:.1}: {:>6} ({:>5.1}%) {}",
                i as f64 / 10.0,
                (i + 1) as f64 / 10.0,
                count,
                pct,
                bar
            );
        }
        info!("╚══════════════════════════════════════════════════════════════╝");

        // Model-specific stats
        let model_stats = self.get_model_stats();
        if !model_stats.is_empty() {
            info!("Model Inference Times (μs):");
            for (model, stats) in &model_stats {
                info!(
                    "  {}: mean={} p50={} p99={} (calls={})",
                    model, stats.mean_us, stats.p50_us, stats.p99_us, stats.calls
                );
            }
        }
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Model-specific statistics
#[derive(Debug)]
pub struct ModelStats {
    pub calls: u64,
    pub mean_us: u64,
    pub p50_us: u64,
    pub p99_us: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_recording() {
        let metrics = RunMetrics::new();

        metrics.record_inference("covid_resnet", Duration::from_micros(100));
        metrics.record_inference("covid_resnet", Duration::from_micros(200));
        metrics.record_inference("opacity_detector", Duration::from_micros(150));

        assert_eq!(metrics.inferences_run.load(Ordering::Relaxed), 3);

        let stats = metrics.get_model_stats();
        assert_eq!(stats.len(), 2);
        assert_eq!(stats["covid_resnet"].calls, 2);
        assert_eq!(stats["covid_resnet"].mean_us, 150);
    }

    #[test]
    fn test_score_buckets() {
        let metrics = RunMetrics::new();

        metrics.record_score(0.05);
        metrics.record_score(0.95);
        metrics.record_score(1.0); // Clamps into the top bucket

        let dist = metrics.get_score_distribution();
        assert_eq!(dist[0], 1);
        assert_eq!(dist[9], 2);
    }

    #[test]
    fn test_model_stats_percentiles() {
        let metrics = RunMetrics::new();
        for us in [100u64, 200, 300, 400, 500] {
            metrics.record_inference("m", Duration::from_micros(us));
        }

        let stats = metrics.get_model_stats();
        assert_eq!(stats["m"].calls, 5);
        assert_eq!(stats["m"].mean_us, 300);
        assert_eq!(stats["m"].p50_us, 300);
        assert_eq!(stats["m"].p99_us, 500);
    }
}
