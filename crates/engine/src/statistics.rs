//! Replicate statistics using `rust_decimal`.
//!
//! Every reported figure is rounded half-up to four decimal places. The
//! variance uses the sample divisor `n - 1`, falling back to `1` for a
//! single observation. No `f64` anywhere in the computation.

use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};
use serde::Serialize;

/// Decimal places kept by every statistic.
pub const SCALE: u32 = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StatsError {
    #[error("no observations to summarize")]
    EmptyInput,
    #[error("mean is zero; coefficient of variation is undefined")]
    ZeroMean,
    #[error("arithmetic overflow computing {0}")]
    Overflow(&'static str),
}

/// Summary of a set of 100-seed weighings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReplicateStatistics {
    pub count: usize,
    pub mean: Decimal,
    pub std_dev: Decimal,
    /// Standard deviation as a percentage of the mean.
    pub coefficient_of_variation: Decimal,
    /// Mean scaled from 100 seeds to 1000 seeds.
    pub derived_weight: Decimal,
}

/// Round half-up (away from zero) to [`SCALE`] places.
pub fn round_half_up(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(SCALE, RoundingStrategy::MidpointAwayFromZero)
}

impl ReplicateStatistics {
    pub fn compute(weights: &[Decimal]) -> Result<Self, StatsError> {
        if weights.is_empty() {
            return Err(StatsError::EmptyInput);
        }
        let n = Decimal::from(weights.len());
        let sum = weights
            .iter()
            .try_fold(Decimal::ZERO, |acc, w| acc.checked_add(*w))
            .ok_or(StatsError::Overflow("sum"))?;
        let mean = round_half_up(sum.checked_div(n).ok_or(StatsError::Overflow("mean"))?);

        let divisor = if weights.len() > 1 {
            n - Decimal::ONE
        } else {
            Decimal::ONE
        };
        let squares = weights
            .iter()
            .try_fold(Decimal::ZERO, |acc, w| {
                let deviation = w.checked_sub(mean)?;
                acc.checked_add(deviation.checked_mul(deviation)?)
            })
            .ok_or(StatsError::Overflow("variance"))?;
        let variance = squares
            .checked_div(divisor)
            .ok_or(StatsError::Overflow("variance"))?;
        let std_dev = round_half_up(variance.sqrt().ok_or(StatsError::Overflow("std_dev"))?);

        if mean.is_zero() {
            return Err(StatsError::ZeroMean);
        }
        let ratio = std_dev
            .checked_div(mean)
            .ok_or(StatsError::Overflow("coefficient of variation"))?;
        let coefficient_of_variation = round_half_up(
            ratio
                .checked_mul(Decimal::ONE_HUNDRED)
                .ok_or(StatsError::Overflow("coefficient of variation"))?,
        );
        let derived_weight = round_half_up(
            mean.checked_mul(Decimal::TEN)
                .ok_or(StatsError::Overflow("derived weight"))?,
        );

        Ok(Self {
            count: weights.len(),
            mean,
            std_dev,
            coefficient_of_variation,
            derived_weight,
        })
    }

    /// Closed interval `mean ± sigma * std_dev` used for outlier rejection.
    pub fn acceptance_bounds(&self, sigma: Decimal) -> (Decimal, Decimal) {
        let spread = self.std_dev * sigma;
        (self.mean - spread, self.mean + spread)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn d(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    fn ds(values: &[&str]) -> Vec<Decimal> {
        values.iter().map(|v| d(v)).collect()
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(
            ReplicateStatistics::compute(&[]),
            Err(StatsError::EmptyInput)
        );
    }

    #[test]
    fn sample_data_summary() {
        let weights = ds(&[
            "5.234", "5.189", "5.267", "5.221", "5.198", "5.245", "5.212", "5.278",
        ]);
        let stats = ReplicateStatistics::compute(&weights).unwrap();
        assert_eq!(stats.count, 8);
        assert_eq!(stats.mean, d("5.2305"));
        // sum of squared deviations 0.007022 over 7
        assert_eq!(stats.std_dev, d("0.0317"));
        assert_eq!(stats.coefficient_of_variation, d("0.6061"));
        assert_eq!(stats.derived_weight, d("52.305"));
    }

    #[test]
    fn mean_rounds_half_up() {
        // 1.00005 exactly halfway at the fifth place
        let stats = ReplicateStatistics::compute(&ds(&["1.0000", "1.0001"])).unwrap();
        assert_eq!(stats.mean, d("1.0001"));
    }

    #[test]
    fn singleton_uses_divisor_one() {
        let stats = ReplicateStatistics::compute(&ds(&["4.5"])).unwrap();
        assert_eq!(stats.mean, d("4.5"));
        assert_eq!(stats.std_dev, Decimal::ZERO);
        assert_eq!(stats.coefficient_of_variation, Decimal::ZERO);
        assert_eq!(stats.derived_weight, d("45"));
    }

    #[test]
    fn two_observations_use_sample_divisor() {
        // deviations ±1 from mean 5, squares sum 2, divisor 1 -> sqrt(2)
        let stats = ReplicateStatistics::compute(&ds(&["4", "6"])).unwrap();
        assert_eq!(stats.mean, d("5"));
        assert_eq!(stats.std_dev, d("1.4142"));
        assert_eq!(stats.coefficient_of_variation, d("28.284"));
    }

    #[test]
    fn zero_mean_is_guarded() {
        assert_eq!(
            ReplicateStatistics::compute(&ds(&["0", "0"])),
            Err(StatsError::ZeroMean)
        );
    }

    #[test]
    fn order_does_not_change_result() {
        let forward = ds(&["5.1", "5.3", "4.9", "5.0"]);
        let mut reversed = forward.clone();
        reversed.reverse();
        assert_eq!(
            ReplicateStatistics::compute(&forward),
            ReplicateStatistics::compute(&reversed)
        );
    }

    #[test]
    fn bounds_span_two_sigma() {
        let stats = ReplicateStatistics::compute(&ds(&["4", "6"])).unwrap();
        let (lower, upper) = stats.acceptance_bounds(Decimal::TWO);
        assert_eq!(lower, d("2.1716"));
        assert_eq!(upper, d("7.8284"));
    }
}
