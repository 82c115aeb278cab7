//! Timing samples

use serde::Serialize;

/// Millisecond samples of repeated runs
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    samples: Vec<f64>,
}

impl Stats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample_ms: f64) {
        self.samples.push(sample_ms);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Arithmetic mean, 0 with no samples
    pub fn amean(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        self.samples.iter().sum::<f64>() / self.samples.len() as f64
    }

    pub fn min(&self) -> f64 {
        self.samples.iter().copied().fold(f64::NAN, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.samples.iter().copied().fold(f64::NAN, f64::max)
    }

    /// Population standard deviation
    pub fn stddev(&self) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mean = self.amean();
        let variance = self
            .samples
            .iter()
            .map(|s| (s - mean) * (s - mean))
            .sum::<f64>()
            / self.samples.len() as f64;
        variance.sqrt()
    }

    /// Ratio of this mean to `baseline`'s, as printed in overhead lines
    pub fn overhead_vs(&self, baseline: &Stats) -> f64 {
        self.amean() / baseline.amean()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(samples: &[f64]) -> Stats {
        let mut s = Stats::new();
        for &sample in samples {
            s.push(sample);
        }
        s
    }

    #[test]
    fn test_mean_min_max() {
        let s = stats(&[120.0, 80.0, 100.0]);
        assert_eq!(s.len(), 3);
        assert_eq!(s.amean(), 100.0);
        assert_eq!(s.min(), 80.0);
        assert_eq!(s.max(), 120.0);
    }

    #[test]
    fn test_stddev() {
        let s = stats(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]);
        assert!((s.stddev() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_empty_stats() {
        let s = Stats::new();
        assert!(s.is_empty());
        assert_eq!(s.amean(), 0.0);
        assert!(s.min().is_nan());
    }

    #[test]
    fn test_overhead() {
        let base = stats(&[50.0, 50.0]);
        let inst = stats(&[100.0, 200.0]);
        assert_eq!(inst.overhead_vs(&base), 3.0);
    }
}
