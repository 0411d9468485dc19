use std::io::Write;

use tracing::debug;

use crate::errors::BenchError;
use crate::report;
use crate::types::OverflowPolicy;

/// A fixed-memory latency histogram with bounded relative error.
///
/// Counts live in a flat array of log/linear buckets: each bucket doubles the
/// width of the previous one and is split into `sub_bucket_count / 2` linear
/// sub-buckets. Any value `v` with
/// `lowest_discernible_value <= v <= highest_trackable_value` is represented
/// with a relative error below `10^-significant_value_digits`. Values below
/// the lowest discernible value are still counted, only with a coarser bound.
///
/// Min and max are tracked exactly. Mean and standard deviation are derived
/// from the buckets, so they carry the same error bound as the percentiles.
#[derive(Debug, Clone)]
pub struct Histogram {
    lowest_discernible_value: u64,
    highest_trackable_value: u64,
    significant_value_digits: u8,
    overflow: OverflowPolicy,

    unit_magnitude: u32,
    sub_bucket_half_count_magnitude: u32,
    sub_bucket_half_count: usize,
    sub_bucket_mask: u64,
    leading_zero_count_base: u32,
    bucket_count: u32,

    counts: Vec<u64>,
    total_count: u64,
    clamped_count: u64,
    min_value: u64,
    max_value: u64,
}

impl Histogram {
    /// Build an empty histogram covering `[lowest, highest]` with `digits`
    /// significant decimal digits (0..=5).
    pub fn new(
        lowest: u64,
        highest: u64,
        digits: u8,
        overflow: OverflowPolicy,
    ) -> Result<Self, BenchError> {
        if lowest < 1 || highest <= lowest {
            return Err(BenchError::InvalidHistogramRange { lowest, highest });
        }
        if digits > 5 {
            return Err(BenchError::InvalidSignificantDigits { digits });
        }

        let precision = 10u64.pow(u32::from(digits));
        let largest_value_with_single_unit_resolution = 2 * precision;
        // ceil(log2(x)) for x >= 2
        let sub_bucket_count_magnitude =
            64 - (largest_value_with_single_unit_resolution - 1).leading_zeros();
        let sub_bucket_half_count_magnitude = sub_bucket_count_magnitude.max(1) - 1;

        // Pick the unit so that one unit at `lowest` is already within the
        // relative error bound.
        let unit_magnitude = 63 - (lowest / precision).max(1).leading_zeros();

        if unit_magnitude + sub_bucket_half_count_magnitude > 61 {
            return Err(BenchError::UnsupportedPrecision { lowest, digits });
        }

        let sub_bucket_count: u64 = 1 << (sub_bucket_half_count_magnitude + 1);
        let sub_bucket_half_count = (sub_bucket_count / 2) as usize;
        let sub_bucket_mask = (sub_bucket_count - 1) << unit_magnitude;
        let leading_zero_count_base = 64 - unit_magnitude - sub_bucket_half_count_magnitude - 1;

        let mut smallest_untrackable_value = sub_bucket_count << unit_magnitude;
        let mut bucket_count = 1u32;
        while smallest_untrackable_value <= highest {
            if smallest_untrackable_value > u64::MAX / 2 {
                bucket_count += 1;
                break;
            }
            smallest_untrackable_value <<= 1;
            bucket_count += 1;
        }

        let counts_len = (bucket_count as usize + 1) * sub_bucket_half_count;

        debug!(
            lowest,
            highest,
            digits,
            unit_magnitude,
            bucket_count,
            counts_len,
            "histogram allocated"
        );

        Ok(Self {
            lowest_discernible_value: lowest,
            highest_trackable_value: highest,
            significant_value_digits: digits,
            overflow,
            unit_magnitude,
            sub_bucket_half_count_magnitude,
            sub_bucket_half_count,
            sub_bucket_mask,
            leading_zero_count_base,
            bucket_count,
            counts: vec![0; counts_len],
            total_count: 0,
            clamped_count: 0,
            min_value: u64::MAX,
            max_value: 0,
        })
    }

    pub fn lowest_discernible_value(&self) -> u64 {
        self.lowest_discernible_value
    }

    pub fn highest_trackable_value(&self) -> u64 {
        self.highest_trackable_value
    }

    pub fn significant_value_digits(&self) -> u8 {
        self.significant_value_digits
    }

    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow
    }

    pub fn bucket_count(&self) -> u32 {
        self.bucket_count
    }

    pub fn sub_bucket_count(&self) -> usize {
        self.sub_bucket_half_count * 2
    }

    /// Number of count slots backing the histogram. Fixed at construction.
    pub fn counts_len(&self) -> usize {
        self.counts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total_count == 0
    }

    /// Record a single sample.
    pub fn record(&mut self, value: u64) -> Result<(), BenchError> {
        self.record_n(value, 1)
    }

    /// Record `count` samples of `value`.
    ///
    /// Values above the highest trackable value either fail with
    /// `ValueOutOfRange`, leaving the histogram unchanged, or are counted at
    /// the highest trackable value, depending on the overflow policy.
    pub fn record_n(&mut self, value: u64, count: u64) -> Result<(), BenchError> {
        let value = if value > self.highest_trackable_value {
            match self.overflow {
                OverflowPolicy::Reject => {
                    return Err(BenchError::ValueOutOfRange {
                        value,
                        highest: self.highest_trackable_value,
                    });
                }
                OverflowPolicy::Clamp => {
                    self.clamped_count = self.clamped_count.saturating_add(count);
                    self.highest_trackable_value
                }
            }
        } else {
            value
        };

        if count == 0 {
            return Ok(());
        }

        let index = self.index_for(value);
        self.counts[index] = self.counts[index].saturating_add(count);
        self.total_count = self.total_count.saturating_add(count);
        self.min_value = self.min_value.min(value);
        self.max_value = self.max_value.max(value);
        Ok(())
    }

    /// Drop every recorded sample, keeping the bucket layout.
    pub fn reset(&mut self) {
        self.counts.iter_mut().for_each(|c| *c = 0);
        self.total_count = 0;
        self.clamped_count = 0;
        self.min_value = u64::MAX;
        self.max_value = 0;
    }

    pub fn count(&self) -> u64 {
        self.total_count
    }

    /// Samples that were above range and counted at the highest trackable value.
    pub fn clamped_count(&self) -> u64 {
        self.clamped_count
    }

    /// Smallest recorded value, or 0 when empty.
    pub fn min(&self) -> u64 {
        if self.total_count == 0 { 0 } else { self.min_value }
    }

    /// Largest recorded value, or 0 when empty.
    pub fn max(&self) -> u64 {
        self.max_value
    }

    pub fn mean(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        let total: f64 = self
            .recorded()
            .map(|(value, count)| self.median_equivalent(value) as f64 * count as f64)
            .sum();
        total / self.total_count as f64
    }

    pub fn stdev(&self) -> f64 {
        if self.total_count == 0 {
            return 0.0;
        }
        let mean = self.mean();
        let geometric_dev_total: f64 = self
            .recorded()
            .map(|(value, count)| {
                let dev = self.median_equivalent(value) as f64 - mean;
                dev * dev * count as f64
            })
            .sum();
        (geometric_dev_total / self.total_count as f64).sqrt()
    }

    /// The smallest bucket boundary `v` such that at least `percentile`% of
    /// the recorded samples are `<= v`.
    ///
    /// `percentile` is clamped to `[0, 100]`. At 0 the lowest value of the
    /// first non-empty bucket is returned; otherwise the highest value of the
    /// bucket holding the target rank. Returns 0 for an empty histogram.
    pub fn value_at_percentile(&self, percentile: f64) -> u64 {
        if self.total_count == 0 {
            return 0;
        }
        let percentile = if percentile.is_nan() {
            0.0
        } else {
            percentile.clamp(0.0, 100.0)
        };

        let target = rank_for_percentile(percentile, self.total_count);
        let mut cumulative = 0u64;
        for (index, &count) in self.counts.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                let value = self.value_from_index(index);
                return if percentile == 0.0 {
                    self.lowest_equivalent(value)
                } else {
                    self.highest_equivalent(value)
                };
            }
        }
        self.highest_equivalent(self.max_value)
    }

    /// Total count of samples in buckets at or below the bucket holding `value`.
    pub fn count_at_or_below(&self, value: u64) -> u64 {
        let last = self.index_for(value).min(self.counts.len() - 1);
        self.counts[..=last].iter().sum()
    }

    /// Write the percentile table to `sink`, dividing displayed values by
    /// `scale_factor`.
    pub fn output_percentile_distribution<W: Write + ?Sized>(
        &self,
        sink: &mut W,
        scale_factor: f64,
    ) -> std::io::Result<()> {
        report::write_percentile_distribution(self, sink, scale_factor)
    }

    pub fn lowest_equivalent(&self, value: u64) -> u64 {
        let bucket_index = self.bucket_index(value);
        let sub_bucket_index = self.sub_bucket_index(value, bucket_index);
        (sub_bucket_index as u64) << (bucket_index + self.unit_magnitude)
    }

    /// The top bucket may end at 2^64, in which case this is `u64::MAX`.
    pub fn highest_equivalent(&self, value: u64) -> u64 {
        match self.next_non_equivalent(value) {
            Some(next) => next - 1,
            None => u64::MAX,
        }
    }

    pub fn median_equivalent(&self, value: u64) -> u64 {
        self.lowest_equivalent(value)
            .saturating_add(self.size_of_equivalent_range(value) >> 1)
    }

    /// Width of the bucket range that `value` falls into.
    pub fn size_of_equivalent_range(&self, value: u64) -> u64 {
        let bucket_index = self.bucket_index(value);
        let sub_bucket_index = self.sub_bucket_index(value, bucket_index);
        let adjusted_bucket = if sub_bucket_index >= self.sub_bucket_count() {
            bucket_index + 1
        } else {
            bucket_index
        };
        1u64 << (self.unit_magnitude + adjusted_bucket)
    }

    fn next_non_equivalent(&self, value: u64) -> Option<u64> {
        self.lowest_equivalent(value)
            .checked_add(self.size_of_equivalent_range(value))
    }

    /// Non-empty buckets as `(lowest value in bucket, count)`.
    fn recorded(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.counts
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count > 0)
            .map(|(index, &count)| (self.value_from_index(index), count))
    }

    fn bucket_index(&self, value: u64) -> u32 {
        self.leading_zero_count_base - (value | self.sub_bucket_mask).leading_zeros()
    }

    fn sub_bucket_index(&self, value: u64, bucket_index: u32) -> usize {
        (value >> (bucket_index + self.unit_magnitude)) as usize
    }

    fn index_for(&self, value: u64) -> usize {
        let bucket_index = self.bucket_index(value);
        let sub_bucket_index = self.sub_bucket_index(value, bucket_index);
        ((bucket_index as usize + 1) << self.sub_bucket_half_count_magnitude) + sub_bucket_index
            - self.sub_bucket_half_count
    }

    fn value_from_index(&self, index: usize) -> u64 {
        let mut bucket_index = (index >> self.sub_bucket_half_count_magnitude) as i64 - 1;
        let mut sub_bucket_index =
            (index & (self.sub_bucket_half_count - 1)) + self.sub_bucket_half_count;
        if bucket_index < 0 {
            sub_bucket_index -= self.sub_bucket_half_count;
            bucket_index = 0;
        }
        (sub_bucket_index as u64) << (bucket_index as u32 + self.unit_magnitude)
    }
}

/// Rank (1-based) a sample must reach to cover `percentile`% of `total`.
///
/// Products within 1e-9 of an integer snap to it before rounding up, so
/// 99.9% of 1000 samples is rank 999 and not 1000.
fn rank_for_percentile(percentile: f64, total: u64) -> u64 {
    let exact = percentile * total as f64 / 100.0;
    let nearest = exact.round();
    let rank = if (exact - nearest).abs() < 1e-9 {
        nearest
    } else {
        exact.ceil()
    };
    (rank as u64).clamp(1, total)
}
