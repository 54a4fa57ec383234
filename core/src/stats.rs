/// Summary of a sample series. All values share the unit of the samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Statistics {
    pub count: usize,
    pub std: f64,
    pub mean: f64,
    pub min: f64,
    pub max: f64,
}

impl Statistics {
    /// Summary of a series with no samples. Mean and deviation read as zero so
    /// an empty operation class renders as `0.0000 ms` instead of NaN.
    pub const EMPTY: Statistics = Statistics {
        count: 0,
        std: 0.0,
        mean: 0.0,
        min: 0.0,
        max: 0.0,
    };
}

/// Unbounded series of latency samples.
///
/// Unlike a rolling window, every sample pushed is kept: a benchmark mean has
/// to cover the whole run, not the last N operations.
#[derive(Debug, Clone, Default)]
pub struct SampleSeries {
    samples: Vec<f64>,
}

impl SampleSeries {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, sample: f64) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    /// Arithmetic mean, or 0.0 for an empty series.
    pub fn mean(&self) -> f64 {
        Self::mean_of(&self.samples).unwrap_or(0.0)
    }

    /// Nearest-rank percentile (`pct` in 0..=100), or 0.0 for an empty series.
    pub fn percentile(&self, pct: f64) -> f64 {
        if self.samples.is_empty() {
            return 0.0;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_by(f64::total_cmp);
        let pct = pct.clamp(0.0, 100.0);
        let idx = ((pct / 100.0) * (sorted.len() - 1) as f64).round() as usize;
        sorted[idx.min(sorted.len() - 1)]
    }

    pub fn stats(&self) -> Statistics {
        if self.samples.is_empty() {
            return Statistics::EMPTY;
        }
        Statistics {
            count: self.samples.len(),
            std: Self::std_deviation(&self.samples).unwrap_or(0.0),
            mean: self.mean(),
            min: self.samples.iter().copied().fold(f64::MAX, f64::min),
            max: self.samples.iter().copied().fold(f64::MIN, f64::max),
        }
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    fn mean_of(data: &[f64]) -> Option<f64> {
        let sum = data.iter().sum::<f64>();
        let count = data.len();

        match count {
            positive if positive > 0 => Some(sum / count as f64),
            _ => None,
        }
    }

    fn std_deviation(data: &[f64]) -> Option<f64> {
        match (Self::mean_of(data), data.len()) {
            (Some(data_mean), count) if count > 0 => {
                let variance = data
                    .iter()
                    .map(|value| {
                        let diff = data_mean - (*value);

                        diff * diff
                    })
                    .sum::<f64>()
                    / count as f64;

                Some(variance.sqrt())
            }
            _ => None,
        }
    }
}

impl FromIterator<f64> for SampleSeries {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        SampleSeries {
            samples: iter.into_iter().collect(),
        }
    }
}

impl Extend<f64> for SampleSeries {
    fn extend<I: IntoIterator<Item = f64>>(&mut self, iter: I) {
        self.samples.extend(iter);
    }
}
