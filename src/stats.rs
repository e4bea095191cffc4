use std::cmp::Ordering;

pub const PERCENTILES: [u32; 6] = [25, 50, 75, 90, 95, 99];

/// Summary of one latency sample set, in seconds.
#[derive(Debug, Clone, PartialEq)]
pub struct DistributionStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
    /// One entry per value of [`PERCENTILES`], in the same order.
    pub percentiles: Vec<(u32, f64)>,
}

impl DistributionStats {
    /// Returns `None` for an empty sample set.
    pub fn from_samples(samples: &[f64]) -> Option<Self> {
        if samples.is_empty() {
            return None;
        }
        let sorted = sorted(samples);
        let count = sorted.len();

        let mean = sorted.iter().sum::<f64>() / count as f64;
        let std_dev = if count > 1 {
            let squares: f64 = sorted.iter().map(|x| (x - mean).powi(2)).sum();
            (squares / (count - 1) as f64).sqrt()
        } else {
            0.0
        };

        Some(DistributionStats {
            min: sorted[0],
            max: sorted[count - 1],
            mean,
            std_dev,
            percentiles: PERCENTILES
                .iter()
                .map(|&p| (p, percentile(&sorted, p)))
                .collect(),
        })
    }

    pub fn percentile(&self, p: u32) -> Option<f64> {
        self.percentiles
            .iter()
            .find(|(q, _)| *q == p)
            .map(|(_, value)| *value)
    }
}

fn sorted(samples: &[f64]) -> Vec<f64> {
    let mut sorted = samples.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Ordering::Equal));
    sorted
}

/// Averages the element at rank `floor(n·p/100)` with the one just below it.
/// The median keeps the usual odd/even split. `sorted` must be non-empty.
fn percentile(sorted: &[f64], p: u32) -> f64 {
    let count = sorted.len();
    if p == 50 {
        let half = count / 2;
        return if count % 2 == 0 {
            (sorted[half] + sorted[half - 1]) / 2.0
        } else {
            sorted[half]
        };
    }

    let k = (count * p as usize / 100).min(count - 1);
    if k == 0 {
        sorted[0]
    } else {
        (sorted[k] + sorted[k - 1]) / 2.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: u64,
}

/// Splits `[min, max]` of the samples into `bins` equal-width bins.
///
/// Every bin is `[lower, upper)` except the last, which also holds `max`.
/// Returns an empty vec for an empty sample set or fewer than two bins.
pub fn histogram(samples: &[f64], bins: usize) -> Vec<HistogramBin> {
    if samples.is_empty() || bins <= 1 {
        return Vec::new();
    }
    let sorted = sorted(samples);
    let min = sorted[0];
    let max = sorted[sorted.len() - 1];
    let step = (max - min) / bins as f64;

    let mut result: Vec<HistogramBin> = (0..bins)
        .map(|i| HistogramBin {
            lower: min + i as f64 * step,
            upper: if i == bins - 1 { max } else { min + (i + 1) as f64 * step },
            count: 0,
        })
        .collect();

    let last = bins - 1;
    for &sample in &sorted {
        if let Some(bin) = result.iter_mut().enumerate().find_map(|(i, bin)| {
            let inside = if i == last {
                sample >= bin.lower && sample <= bin.upper
            } else {
                sample >= bin.lower && sample < bin.upper
            };
            inside.then_some(bin)
        }) {
            bin.count += 1;
        }
    }
    result
}
