use serde::Serialize;

/// Fixed-range histogram.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Histogram {
    /// Bin edges (inclusive of the left edge, exclusive of the right edge except the last bin).
    pub edges: Vec<f64>,
    /// Counts recorded per bin.
    pub counts: Vec<u64>,
}

impl Histogram {
    /// Total number of samples binned.
    pub fn total(&self) -> u64 {
        self.counts.iter().sum()
    }
}

/// Quantile summary for a single column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quantiles {
    /// 5th percentile estimate.
    pub q05: f64,
    /// Median (50th percentile) estimate.
    pub q50: f64,
    /// 95th percentile estimate.
    pub q95: f64,
}

/// Bins `values` into `bins` equal-width bins spanning `[start, end]`.
///
/// Values outside the range are clamped into the first or last bin.
pub fn histogram(values: &[f64], start: f64, end: f64, bins: usize) -> Histogram {
    if bins == 0 {
        return Histogram {
            edges: vec![start],
            counts: Vec::new(),
        };
    }
    let step = (end - start) / bins as f64;
    let mut edges = Vec::with_capacity(bins + 1);
    for idx in 0..bins {
        edges.push(start + idx as f64 * step);
    }
    edges.push(end);
    let mut counts = vec![0u64; bins];
    for value in values.iter().filter(|v| !v.is_nan()) {
        let mut bin = ((value - start) / step).floor() as isize;
        if bin < 0 {
            bin = 0;
        }
        if bin as usize >= bins {
            bin = (bins as isize) - 1;
        }
        counts[bin as usize] += 1;
    }
    Histogram { edges, counts }
}

/// Histogram whose range is the sample range of `values`.
///
/// A degenerate range (a constant sample) is widened by half a unit on each side.
pub fn histogram_auto(values: &[f64], bins: usize) -> Histogram {
    let finite = values.iter().copied().filter(|v| v.is_finite());
    let (min, max) = finite.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    });
    if min > max {
        return histogram(&[], 0.0, 1.0, bins);
    }
    if min == max {
        return histogram(values, min - 0.5, max + 0.5, bins);
    }
    histogram(values, min, max, bins)
}

/// 5/50/95 percentile summary; NaN entries when `values` is empty.
pub fn quantiles(values: &[f64]) -> Quantiles {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return Quantiles {
            q05: f64::NAN,
            q50: f64::NAN,
            q95: f64::NAN,
        };
    }
    sorted.sort_by(f64::total_cmp);
    Quantiles {
        q05: percentile(&sorted, 0.05),
        q50: percentile(&sorted, 0.5),
        q95: percentile(&sorted, 0.95),
    }
}

/// Linear-interpolation percentile of an ascending slice.
pub fn percentile(sorted: &[f64], quantile: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let position = quantile * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let weight = position - lower as f64;
        sorted[lower] * (1.0 - weight) + sorted[upper] * weight
    }
}

/// Arithmetic mean; NaN for an empty slice.
pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample moments of a column.
///
/// `variance` uses the `n - 1` denominator. `skewness` and `kurtosis` are the
/// bias-adjusted sample estimators (excess kurtosis), zero for a constant
/// sample and NaN when too few values are available (fewer than 3 and 4
/// respectively).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments {
    /// Number of values.
    pub count: usize,
    /// Arithmetic mean.
    pub mean: f64,
    /// Unbiased sample variance.
    pub variance: f64,
    /// Adjusted Fisher-Pearson skewness.
    pub skewness: f64,
    /// Adjusted excess kurtosis.
    pub kurtosis: f64,
}

impl Moments {
    /// Computes the moments of `values`.
    pub fn of(values: &[f64]) -> Self {
        let count = values.len();
        let n = count as f64;
        let mean = mean(values);
        let (mut m2, mut m3, mut m4) = (0.0, 0.0, 0.0);
        for value in values {
            let d = value - mean;
            let d2 = d * d;
            m2 += d2;
            m3 += d2 * d;
            m4 += d2 * d2;
        }
        let variance = if count > 1 { m2 / (n - 1.0) } else { f64::NAN };
        let (m2, m3, m4) = (m2 / n, m3 / n, m4 / n);

        let skewness = if count < 3 {
            f64::NAN
        } else if m2 == 0.0 {
            0.0
        } else {
            let g1 = m3 / m2.powf(1.5);
            (n * (n - 1.0)).sqrt() / (n - 2.0) * g1
        };
        let kurtosis = if count < 4 {
            f64::NAN
        } else if m2 == 0.0 {
            0.0
        } else {
            let g2 = m4 / (m2 * m2) - 3.0;
            ((n + 1.0) * g2 + 6.0) * (n - 1.0) / ((n - 2.0) * (n - 3.0))
        };

        Self {
            count,
            mean,
            variance,
            skewness,
            kurtosis,
        }
    }

    /// Standard error of the mean.
    pub fn std_error(&self) -> f64 {
        (self.variance / self.count as f64).sqrt()
    }
}
