//! Technical indicators derived from historical bars.
//!
//! Each function feeds a fresh `ta` indicator from the first point to the
//! last and keeps the final output. No state survives a call, so identical
//! input yields bit-identical output.
//!
//! | Indicator | Parameters | Minimum points |
//! |-----------|------------|----------------|
//! | RSI | 14 | 15 |
//! | MACD | 12 / 26 / 9 | 26 |
//! | Bollinger Bands | 20, 2σ (population) | 20 |
//! | SMA | 20 / 50 / 200 | period |
//! | EMA | 12 / 26 | period |
//! | Stochastic | 14 / 3 | 16 |
//! | ATR | 14 | 15 |

use serde::{Deserialize, Serialize};
use ta::indicators::{
    AverageTrueRange, BollingerBands as TaBollinger, ExponentialMovingAverage, FastStochastic,
    MovingAverageConvergenceDivergence, RelativeStrengthIndex, SimpleMovingAverage,
    SlowStochastic,
};
use ta::{Close, High, Low, Next};

use crate::{Bar, BarSeries};

/// Shorter histories produce no indicator set at all.
pub const MIN_HISTORY: usize = 20;

pub const RSI_PERIOD: usize = 14;
pub const MACD_FAST: usize = 12;
pub const MACD_SLOW: usize = 26;
pub const MACD_SIGNAL: usize = 9;
pub const BOLLINGER_PERIOD: usize = 20;
pub const BOLLINGER_WIDTH: f64 = 2.0;
pub const STOCHASTIC_K: usize = 14;
pub const STOCHASTIC_D: usize = 3;
pub const ATR_PERIOD: usize = 14;

impl High for Bar {
    fn high(&self) -> f64 {
        self.high
    }
}

impl Low for Bar {
    fn low(&self) -> f64 {
        self.low
    }
}

impl Close for Bar {
    fn close(&self) -> f64 {
        self.close
    }
}

/// Runs `indicator` over `inputs` and returns its last output.
fn run<T, I>(mut indicator: I, inputs: impl IntoIterator<Item = T>) -> Option<I::Output>
where
    I: Next<T>,
{
    inputs.into_iter().map(|input| indicator.next(input)).last()
}

/// Mean of the last `period` values.
pub fn sma(values: &[f64], period: usize) -> Option<f64> {
    if values.len() < period {
        return None;
    }
    run(SimpleMovingAverage::new(period).ok()?, values.iter().copied())
}

/// Exponential moving average, α = 2/(period+1), seeded with the first value.
pub fn ema(values: &[f64], period: usize) -> Option<f64> {
    if values.len() < period {
        return None;
    }
    run(ExponentialMovingAverage::new(period).ok()?, values.iter().copied())
}

/// Relative strength index over exponentially smoothed gains and losses.
pub fn rsi(closes: &[f64], period: usize) -> Option<f64> {
    if closes.len() < period + 1 {
        return None;
    }
    run(RelativeStrengthIndex::new(period).ok()?, closes.iter().copied())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Macd {
    pub line: f64,
    pub signal: f64,
    pub histogram: f64,
}

pub fn macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> Option<Macd> {
    if fast >= slow || closes.len() < slow {
        return None;
    }
    let indicator = MovingAverageConvergenceDivergence::new(fast, slow, signal).ok()?;
    let output = run(indicator, closes.iter().copied())?;
    Some(Macd {
        line: output.macd,
        signal: output.signal,
        histogram: output.histogram,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BollingerBands {
    pub upper: f64,
    pub middle: f64,
    pub lower: f64,
}

/// Bands at `width` population standard deviations around the `period` SMA.
pub fn bollinger(closes: &[f64], period: usize, width: f64) -> Option<BollingerBands> {
    if period < 2 || closes.len() < period {
        return None;
    }
    let output = run(TaBollinger::new(period, width).ok()?, closes.iter().copied())?;
    Some(BollingerBands {
        upper: output.upper,
        middle: output.average,
        lower: output.lower,
    })
}

/// `%K` is the raw stochastic, `%D` its exponential smoothing.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Stochastic {
    pub k: f64,
    pub d: f64,
}

pub fn stochastic(bars: &[Bar], k_period: usize, d_period: usize) -> Option<Stochastic> {
    if k_period == 0 || d_period == 0 || bars.len() < k_period + d_period - 1 {
        return None;
    }
    let k = run(FastStochastic::new(k_period).ok()?, bars)?;
    let d = run(SlowStochastic::new(k_period, d_period).ok()?, bars)?;
    Some(Stochastic { k, d })
}

/// Exponentially smoothed true range.
pub fn atr(bars: &[Bar], period: usize) -> Option<f64> {
    if bars.len() < period + 1 {
        return None;
    }
    run(AverageTrueRange::new(period).ok()?, bars)
}

/// Indicator set attached to each symbol in a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalIndicators {
    pub last_close: f64,
    pub rsi: Option<f64>,
    pub macd: Option<Macd>,
    pub bollinger: Option<BollingerBands>,
    pub sma_20: Option<f64>,
    pub sma_50: Option<f64>,
    pub sma_200: Option<f64>,
    pub ema_12: Option<f64>,
    pub ema_26: Option<f64>,
    pub stochastic: Option<Stochastic>,
    pub atr: Option<f64>,
}

impl TechnicalIndicators {
    /// Returns `None` for histories shorter than [`MIN_HISTORY`].
    pub fn from_series(series: &BarSeries) -> Option<Self> {
        if series.bars.len() < MIN_HISTORY {
            return None;
        }
        let closes = series.closes();

        Some(Self {
            last_close: *closes.last()?,
            rsi: rsi(&closes, RSI_PERIOD),
            macd: macd(&closes, MACD_FAST, MACD_SLOW, MACD_SIGNAL),
            bollinger: bollinger(&closes, BOLLINGER_PERIOD, BOLLINGER_WIDTH),
            sma_20: sma(&closes, 20),
            sma_50: sma(&closes, 50),
            sma_200: sma(&closes, 200),
            ema_12: ema(&closes, 12),
            ema_26: ema(&closes, 26),
            stochastic: stochastic(&series.bars, STOCHASTIC_K, STOCHASTIC_D),
            atr: atr(&series.bars, ATR_PERIOD),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Interval, ProviderId, Symbol, UtcDateTime};

    fn close_enough(actual: f64, expected: f64) -> bool {
        (actual - expected).abs() < 1e-9
    }

    fn bars(rows: &[(f64, f64, f64)]) -> Vec<Bar> {
        let start = UtcDateTime::parse("2024-01-01T00:00:00Z").expect("ts");
        rows.iter()
            .enumerate()
            .map(|(index, (high, low, close))| {
                let ts = start
                    .checked_add(time::Duration::days(index as i64))
                    .expect("in range");
                Bar::new(ts, *close, *high, *low, *close, Some(1_000)).expect("bar")
            })
            .collect()
    }

    fn series(closes: &[f64]) -> BarSeries {
        let rows = closes
            .iter()
            .map(|close| (close + 1.0, close - 1.0, *close))
            .collect::<Vec<_>>();
        BarSeries::new(
            Symbol::parse("SPY").expect("symbol"),
            Interval::OneDay,
            bars(&rows),
            ProviderId::Yahoo,
        )
    }

    fn wave(len: usize) -> Vec<f64> {
        (0..len)
            .map(|index| 100.0 + (index as f64 * 0.7).sin() * 5.0 + index as f64 * 0.1)
            .collect()
    }

    #[test]
    fn sma_averages_trailing_window() {
        let values = (1..=20).map(f64::from).collect::<Vec<_>>();
        assert_eq!(sma(&values, 20), Some(10.5));
        assert_eq!(sma(&values, 4), Some(18.5));
        assert_eq!(sma(&values, 21), None);
    }

    #[test]
    fn ema_of_constant_series_is_the_constant() {
        let flat = vec![7.5; 12];

        assert!(close_enough(ema(&flat, 12).expect("ema"), 7.5));
        assert_eq!(ema(&flat[..11], 12), None);
    }

    #[test]
    fn rsi_tracks_direction_and_balance() {
        let rising = (0..20).map(f64::from).collect::<Vec<_>>();
        let falling = rising.iter().rev().copied().collect::<Vec<_>>();
        let flat = vec![5.0; 20];

        assert!(rsi(&rising, 14).expect("rsi") > 95.0);
        assert!(rsi(&falling, 14).expect("rsi") < 5.0);
        assert!(close_enough(rsi(&flat, 14).expect("rsi"), 50.0));
        assert_eq!(rsi(&rising[..14], 14), None);
    }

    #[test]
    fn constant_series_has_collapsed_bands_and_zero_macd() {
        let flat = vec![42.0; 30];

        let bands = bollinger(&flat, 20, 2.0).expect("enough points");
        assert!(close_enough(bands.upper, 42.0));
        assert!(close_enough(bands.lower, 42.0));

        let macd = macd(&flat, 12, 26, 9).expect("enough points");
        assert!(close_enough(macd.line, 0.0));
        assert!(close_enough(macd.histogram, 0.0));
        assert_eq!(super::macd(&flat[..25], 12, 26, 9), None);
    }

    #[test]
    fn bollinger_uses_population_deviation() {
        let mut values = vec![10.0; 18];
        values.extend([8.0, 12.0]);

        let bands = bollinger(&values, 20, 2.0).expect("enough points");
        let population_sd = (8.0_f64 / 20.0).sqrt();

        assert!(close_enough(bands.middle, 10.0));
        assert!(close_enough(bands.upper, 10.0 + 2.0 * population_sd));
        assert!(close_enough(bands.lower, 10.0 - 2.0 * population_sd));
    }

    #[test]
    fn stochastic_at_range_high_is_one_hundred() {
        let rows = (0..20)
            .map(|index| (index as f64 + 1.0, index as f64, index as f64 + 1.0))
            .collect::<Vec<_>>();

        let value = stochastic(&bars(&rows), 14, 3).expect("enough points");
        assert!(close_enough(value.k, 100.0));
        assert!(close_enough(value.d, 100.0));
        assert_eq!(stochastic(&bars(&rows[..15]), 14, 3), None);
    }

    #[test]
    fn atr_of_constant_range_bars() {
        let rows = vec![(51.0, 49.0, 50.0); 20];

        assert!(close_enough(atr(&bars(&rows), 14).expect("atr"), 2.0));
        assert_eq!(atr(&bars(&rows[..14]), 14), None);
    }

    #[test]
    fn short_history_yields_no_indicator_set() {
        assert!(TechnicalIndicators::from_series(&series(&wave(19))).is_none());

        let indicators = TechnicalIndicators::from_series(&series(&wave(20))).expect("20 points");
        assert!(indicators.rsi.is_some());
        assert!(indicators.bollinger.is_some());
        assert!(indicators.stochastic.is_some());
        assert!(indicators.macd.is_none(), "MACD needs 26 points");
        assert!(indicators.sma_50.is_none());
    }

    #[test]
    fn indicator_set_is_bit_identical_across_runs() {
        let input = series(&wave(250));

        let first = TechnicalIndicators::from_series(&input).expect("indicators");
        let second = TechnicalIndicators::from_series(&input.clone()).expect("indicators");

        let bits = |value: &TechnicalIndicators| {
            let macd = value.macd.expect("macd");
            let bands = value.bollinger.expect("bands");
            let stochastic = value.stochastic.expect("stochastic");
            vec![
                value.rsi.map(f64::to_bits),
                Some(macd.line.to_bits()),
                Some(macd.signal.to_bits()),
                Some(bands.upper.to_bits()),
                Some(bands.lower.to_bits()),
                Some(stochastic.d.to_bits()),
                value.sma_200.map(f64::to_bits),
                value.atr.map(f64::to_bits),
            ]
        };
        assert_eq!(bits(&first), bits(&second));
        assert!(first.sma_200.is_some());
    }
}
