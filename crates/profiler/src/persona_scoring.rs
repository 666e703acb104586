use common::types::{Archetype, Metric, MetricVector, Position};
use serde::{Deserialize, Serialize};

use crate::reference_stats::ReferenceStats;
use crate::rounding::round1;

/// Archetype weights per metric, rows in [`Metric::ALL`] order and columns in
/// [`Archetype::ALL`] order (Explorer, Diamond, Whale, Degen).
pub const WEIGHTS: [[f64; 4]; 6] = [
    [4.0, 1.0, 0.0, 1.0], // distinct_contract_count
    [2.0, 1.0, 0.0, 4.0], // dex_platform_diversity
    [0.0, 5.0, 2.0, 0.0], // avg_token_holding_period
    [1.0, 0.0, 1.0, 3.0], // transaction_frequency
    [0.0, 1.0, 5.0, 2.0], // dex_volume_usd
    [3.0, 2.0, 2.0, 1.0], // nft_collections_diversity
];

const MAX_SUB_SCORE: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ArchetypeScores {
    #[serde(rename = "Explorer")]
    pub explorer: f64,
    #[serde(rename = "Diamond")]
    pub diamond: f64,
    #[serde(rename = "Whale")]
    pub whale: f64,
    #[serde(rename = "Degen")]
    pub degen: f64,
}

impl ArchetypeScores {
    pub fn get(&self, archetype: Archetype) -> f64 {
        match archetype {
            Archetype::Explorer => self.explorer,
            Archetype::Diamond => self.diamond,
            Archetype::Whale => self.whale,
            Archetype::Degen => self.degen,
        }
    }

    fn set(&mut self, archetype: Archetype, value: f64) {
        match archetype {
            Archetype::Explorer => self.explorer = value,
            Archetype::Diamond => self.diamond = value,
            Archetype::Whale => self.whale = value,
            Archetype::Degen => self.degen = value,
        }
    }

    /// Top two archetypes, higher first. Equal scores keep table order.
    pub fn position(&self) -> Position {
        let mut ranked = Archetype::ALL;
        ranked.sort_by(|a, b| self.get(*b).total_cmp(&self.get(*a)));
        Position {
            primary: ranked[0],
            secondary: ranked[1],
        }
    }
}

/// Percentile (0-100, one decimal) of each metric against the population.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Percentiles {
    pub distinct_contract_count: f64,
    pub dex_platform_diversity: f64,
    pub avg_token_holding_period: f64,
    pub transaction_frequency: f64,
    pub dex_volume_usd: f64,
    pub nft_collections_diversity: f64,
}

impl Percentiles {
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::DistinctContractCount => self.distinct_contract_count,
            Metric::DexPlatformDiversity => self.dex_platform_diversity,
            Metric::AvgTokenHoldingPeriod => self.avg_token_holding_period,
            Metric::TransactionFrequency => self.transaction_frequency,
            Metric::DexVolumeUsd => self.dex_volume_usd,
            Metric::NftCollectionsDiversity => self.nft_collections_diversity,
        }
    }

    pub fn set(&mut self, metric: Metric, value: f64) {
        match metric {
            Metric::DistinctContractCount => self.distinct_contract_count = value,
            Metric::DexPlatformDiversity => self.dex_platform_diversity = value,
            Metric::AvgTokenHoldingPeriod => self.avg_token_holding_period = value,
            Metric::TransactionFrequency => self.transaction_frequency = value,
            Metric::DexVolumeUsd => self.dex_volume_usd = value,
            Metric::NftCollectionsDiversity => self.nft_collections_diversity = value,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PersonaScore {
    pub scores: ArchetypeScores,
    pub percentiles: Percentiles,
    pub position: Position,
}

/// Abramowitz-Stegun 7.1.26, |error| <= 1.5e-7.
pub fn erf(x: f64) -> f64 {
    const A1: f64 = 0.254_829_592;
    const A2: f64 = -0.284_496_736;
    const A3: f64 = 1.421_413_741;
    const A4: f64 = -1.453_152_027;
    const A5: f64 = 1.061_405_429;
    const P: f64 = 0.327_591_1;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + P * x);
    let y = 1.0 - (((((A5 * t + A4) * t) + A3) * t + A2) * t + A1) * t * (-x * x).exp();
    sign * y
}

pub fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

pub fn z_score(value: f64, mean: f64, std: f64) -> f64 {
    if std == 0.0 || !std.is_finite() {
        return 0.0;
    }
    let z = (value - mean) / std;
    if z.is_finite() {
        z
    } else {
        0.0
    }
}

pub fn percentile(z: f64) -> f64 {
    round1(normal_cdf(z) * 100.0).clamp(0.0, 100.0)
}

pub fn sub_score(percentile: f64) -> f64 {
    round1(percentile / 100.0 * MAX_SUB_SCORE)
}

/// Weighted 0-10 score for one archetype column.
pub fn archetype_score(subs: &[f64; 6], column: usize) -> f64 {
    let weight_sum: f64 = WEIGHTS.iter().map(|row| row[column]).sum();
    if weight_sum == 0.0 {
        return 0.0;
    }
    let weighted: f64 = WEIGHTS
        .iter()
        .zip(subs)
        .map(|(row, s)| row[column] * s)
        .sum();
    round1(weighted / (weight_sum * MAX_SUB_SCORE) * 10.0)
}

pub fn score(vector: &MetricVector, stats: &ReferenceStats) -> PersonaScore {
    let mut percentiles = Percentiles::default();
    let mut subs = [0.0; 6];
    for (i, metric) in Metric::ALL.into_iter().enumerate() {
        let s = stats.get(metric);
        let p = percentile(z_score(vector.get(metric), s.mean, s.std));
        percentiles.set(metric, p);
        subs[i] = sub_score(p);
    }

    let mut scores = ArchetypeScores::default();
    for (column, archetype) in Archetype::ALL.into_iter().enumerate() {
        scores.set(archetype, archetype_score(&subs, column));
    }

    PersonaScore {
        scores,
        percentiles,
        position: scores.position(),
    }
}
