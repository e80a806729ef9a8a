//! Seasonal pattern analysis of historical yields.
//!
//! The seasonal index of a month is its mean historical yield divided by the
//! overall mean yield. The overall mean is taken over the monthly means of the
//! months that have observations, so the indices of observed months average
//! to 1.0. Months without observations get [`NEUTRAL_FACTOR`].

use crate::error::{Result, YieldError};
use crate::history::HistoricalSeries;
use crate::store::{SeasonalFactors, MONTHS, NEUTRAL_FACTOR};
use chrono::NaiveDate;
use serde::Serialize;
use statrs::statistics::Statistics;
use tracing::warn;

/// Minimum spread between the largest and smallest factor for a series to
/// be reported as seasonal.
pub const SEASONAL_AMPLITUDE_THRESHOLD: f64 = 0.1;

/// Yield statistics for one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MonthlyYieldStats {
    /// Calendar month (1-12)
    pub month: u32,
    /// Number of historical observations
    pub count: usize,
    /// Mean yield (None when there are no observations)
    pub mean: Option<f64>,
    /// Sample standard deviation (None with fewer than two observations)
    pub std_dev: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    /// Seasonal index
    pub factor: f64,
}

/// Result of seasonal pattern analysis.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeasonalAnalysis {
    /// Seasonal index for every month
    pub seasonal_factors: SeasonalFactors,
    /// Per-month statistics, January first
    pub monthly: Vec<MonthlyYieldStats>,
    /// Mean of the monthly means over covered months
    pub overall_mean: f64,
    /// Covered month with the highest index
    pub peak_month: u32,
    /// Covered month with the lowest index
    pub low_month: u32,
    /// Highest minus lowest index over covered months
    pub seasonal_amplitude: f64,
    /// Whether the amplitude reaches [`SEASONAL_AMPLITUDE_THRESHOLD`]
    pub is_seasonal: bool,
    /// Number of historical observations
    pub n_observations: usize,
    /// Number of months with at least one observation
    pub months_covered: usize,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

fn ensure_not_empty(series: &HistoricalSeries) -> Result<()> {
    if series.is_empty() {
        return Err(YieldError::InsufficientData { needed: 1, got: 0 });
    }
    Ok(())
}

fn monthly_means(grouped: &[Vec<f64>; MONTHS]) -> [Option<f64>; MONTHS] {
    let mut means = [None; MONTHS];
    for (slot, values) in means.iter_mut().zip(grouped.iter()) {
        if !values.is_empty() {
            *slot = Some(values.iter().mean());
        }
    }
    means
}

/// Overall mean and factor table from per-month means.
fn factors_from_means(means: &[Option<f64>; MONTHS]) -> Result<(f64, SeasonalFactors)> {
    let covered: Vec<f64> = means.iter().flatten().copied().collect();
    let overall_mean = covered.iter().mean();

    if overall_mean.abs() < f64::EPSILON {
        warn!("overall mean yield is zero; using neutral seasonal factors");
        return Ok((overall_mean, SeasonalFactors::neutral()));
    }

    let mut factors = [NEUTRAL_FACTOR; MONTHS];
    for (i, mean) in means.iter().enumerate() {
        match mean {
            Some(mean) => factors[i] = mean / overall_mean,
            None => warn!(month = i + 1, "no history for month; using neutral factor"),
        }
    }
    Ok((overall_mean, SeasonalFactors::from_array(factors)?))
}

/// Compute the seasonal index of every month from a historical series.
pub fn compute_seasonal_factors(series: &HistoricalSeries) -> Result<SeasonalFactors> {
    ensure_not_empty(series)?;
    let means = monthly_means(&series.yields_by_month());
    let (_, factors) = factors_from_means(&means)?;
    Ok(factors)
}

/// Full seasonal analysis: factors plus per-month statistics.
pub fn analyze_seasonal_patterns(series: &HistoricalSeries) -> Result<SeasonalAnalysis> {
    ensure_not_empty(series)?;

    let grouped = series.yields_by_month();
    let means = monthly_means(&grouped);
    let (overall_mean, factors) = factors_from_means(&means)?;

    let monthly: Vec<MonthlyYieldStats> = grouped
        .iter()
        .zip(factors.iter())
        .zip(means.iter())
        .map(|((values, (month, factor)), mean)| MonthlyYieldStats {
            month,
            count: values.len(),
            mean: *mean,
            std_dev: (values.len() >= 2).then(|| values.iter().std_dev()),
            min: values.iter().copied().reduce(f64::min),
            max: values.iter().copied().reduce(f64::max),
            factor,
        })
        .collect();

    let covered: Vec<&MonthlyYieldStats> = monthly.iter().filter(|m| m.count > 0).collect();
    // Ties resolve to the earliest month.
    let peak = covered
        .iter()
        .copied()
        .reduce(|best, m| if m.factor > best.factor { m } else { best });
    let low = covered
        .iter()
        .copied()
        .reduce(|best, m| if m.factor < best.factor { m } else { best });
    let (peak_month, peak_factor) = peak.map_or((1, NEUTRAL_FACTOR), |m| (m.month, m.factor));
    let (low_month, low_factor) = low.map_or((1, NEUTRAL_FACTOR), |m| (m.month, m.factor));
    let seasonal_amplitude = peak_factor - low_factor;

    let (start_date, end_date) = series
        .date_range()
        .ok_or(YieldError::InsufficientData { needed: 1, got: 0 })?;

    Ok(SeasonalAnalysis {
        seasonal_factors: factors,
        months_covered: covered.len(),
        monthly,
        overall_mean,
        peak_month,
        low_month,
        seasonal_amplitude,
        is_seasonal: seasonal_amplitude >= SEASONAL_AMPLITUDE_THRESHOLD,
        n_observations: series.len(),
        start_date,
        end_date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::HistoricalRecord;
    use approx::assert_relative_eq;

    fn record(year: i32, month: u32, value: f64) -> HistoricalRecord {
        HistoricalRecord::new(NaiveDate::from_ymd_opt(year, month, 28).unwrap(), value)
    }

    fn series(records: Vec<HistoricalRecord>) -> HistoricalSeries {
        HistoricalSeries::from_records(records).unwrap()
    }

    #[test]
    fn test_empty_series_is_insufficient() {
        let err = compute_seasonal_factors(&HistoricalSeries::new()).unwrap_err();
        assert_eq!(err, YieldError::InsufficientData { needed: 1, got: 0 });
        assert!(analyze_seasonal_patterns(&HistoricalSeries::new()).is_err());
    }

    #[test]
    fn test_single_month_history_is_neutral_elsewhere() {
        let factors = compute_seasonal_factors(&series(vec![
            record(2019, 3, 420.0),
            record(2020, 3, 480.0),
        ]))
        .unwrap();
        for (month, factor) in factors.iter() {
            assert_relative_eq!(factor, 1.0);
            assert!((1..=12).contains(&month));
        }
    }

    #[test]
    fn test_one_month_double_the_rest() {
        let records = (1..=12)
            .map(|m| record(2020, m, if m == 4 { 200.0 } else { 100.0 }))
            .collect();
        let factors = compute_seasonal_factors(&series(records)).unwrap();
        let overall = 1300.0 / 12.0;

        assert_relative_eq!(factors.get(4).unwrap(), 200.0 / overall, epsilon = 1e-12);
        assert_relative_eq!(factors.get(4).unwrap(), 1.846, epsilon = 1e-3);
        for month in (1..=12).filter(|m| *m != 4) {
            assert_relative_eq!(factors.get(month).unwrap(), 0.923, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_uneven_counts_use_monthly_means() {
        let factors = compute_seasonal_factors(&series(vec![
            record(2019, 1, 100.0),
            record(2020, 1, 300.0),
            record(2020, 2, 100.0),
        ]))
        .unwrap();
        // monthly means 200 and 100, overall 150
        assert_relative_eq!(factors.get(1).unwrap(), 200.0 / 150.0, epsilon = 1e-12);
        assert_relative_eq!(factors.get(2).unwrap(), 100.0 / 150.0, epsilon = 1e-12);
        assert_relative_eq!(factors.get(7).unwrap(), 1.0);
    }

    #[test]
    fn test_zero_yields_are_neutral() {
        let factors = compute_seasonal_factors(&series(vec![
            record(2020, 1, 0.0),
            record(2020, 2, 0.0),
        ]))
        .unwrap();
        assert_eq!(factors, SeasonalFactors::neutral());
    }

    #[test]
    fn test_analysis_report() {
        let analysis = analyze_seasonal_patterns(&series(vec![
            record(2019, 5, 500.0),
            record(2020, 5, 520.0),
            record(2019, 6, 400.0),
            record(2019, 7, 480.0),
        ]))
        .unwrap();

        assert_eq!(analysis.n_observations, 4);
        assert_eq!(analysis.months_covered, 3);
        assert_eq!(analysis.peak_month, 5);
        assert_eq!(analysis.low_month, 6);
        assert!(analysis.is_seasonal);
        assert_relative_eq!(analysis.overall_mean, (510.0 + 400.0 + 480.0) / 3.0);
        assert_eq!(analysis.start_date, NaiveDate::from_ymd_opt(2019, 5, 28).unwrap());
        assert_eq!(analysis.end_date, NaiveDate::from_ymd_opt(2020, 5, 28).unwrap());

        let may = &analysis.monthly[4];
        assert_eq!(may.count, 2);
        assert_relative_eq!(may.mean.unwrap(), 510.0);
        assert_relative_eq!(may.std_dev.unwrap(), 200.0_f64.sqrt(), epsilon = 1e-9);
        assert_eq!(may.min, Some(500.0));
        assert_eq!(may.max, Some(520.0));

        let june = &analysis.monthly[5];
        assert_eq!(june.std_dev, None);

        let january = &analysis.monthly[0];
        assert_eq!(january.count, 0);
        assert_eq!(january.mean, None);
        assert_relative_eq!(january.factor, 1.0);
        assert_relative_eq!(
            analysis.seasonal_amplitude,
            analysis.monthly[4].factor - analysis.monthly[5].factor
        );
    }

    #[test]
    fn test_flat_history_is_not_seasonal() {
        let records = (1..=12).map(|m| record(2021, m, 300.0)).collect();
        let analysis = analyze_seasonal_patterns(&series(records)).unwrap();
        assert!(!analysis.is_seasonal);
        assert_relative_eq!(analysis.seasonal_amplitude, 0.0);
        assert_eq!(analysis.peak_month, 1);
        assert_eq!(analysis.low_month, 1);
    }
}
