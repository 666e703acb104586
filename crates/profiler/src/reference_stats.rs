use common::types::{Metric, MetricVector};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

use crate::wallet_store::WalletStore;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("reference population is empty")]
    EmptyPopulation,
    #[error("failed to read reference population: {0}")]
    Storage(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MetricStats {
    pub mean: f64,
    /// Population standard deviation (divides by N).
    pub std: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceStats {
    pub population: usize,
    pub distinct_contract_count: MetricStats,
    pub dex_platform_diversity: MetricStats,
    pub avg_token_holding_period: MetricStats,
    pub transaction_frequency: MetricStats,
    pub dex_volume_usd: MetricStats,
    pub nft_collections_diversity: MetricStats,
}

impl ReferenceStats {
    pub fn get(&self, metric: Metric) -> MetricStats {
        match metric {
            Metric::DistinctContractCount => self.distinct_contract_count,
            Metric::DexPlatformDiversity => self.dex_platform_diversity,
            Metric::AvgTokenHoldingPeriod => self.avg_token_holding_period,
            Metric::TransactionFrequency => self.transaction_frequency,
            Metric::DexVolumeUsd => self.dex_volume_usd,
            Metric::NftCollectionsDiversity => self.nft_collections_diversity,
        }
    }
}

fn metric_stats(population: &[MetricVector], metric: Metric) -> MetricStats {
    let n = population.len() as f64;
    let mean = population.iter().map(|v| v.get(metric)).sum::<f64>() / n;
    let variance = population
        .iter()
        .map(|v| (v.get(metric) - mean).powi(2))
        .sum::<f64>()
        / n;
    MetricStats {
        mean,
        std: variance.sqrt(),
    }
}

pub fn compute(population: &[MetricVector]) -> Result<ReferenceStats, StatsError> {
    if population.is_empty() {
        return Err(StatsError::EmptyPopulation);
    }
    metrics::counter!("profiler_reference_stats_computed_total").increment(1);
    Ok(ReferenceStats {
        population: population.len(),
        distinct_contract_count: metric_stats(population, Metric::DistinctContractCount),
        dex_platform_diversity: metric_stats(population, Metric::DexPlatformDiversity),
        avg_token_holding_period: metric_stats(population, Metric::AvgTokenHoldingPeriod),
        transaction_frequency: metric_stats(population, Metric::TransactionFrequency),
        dex_volume_usd: metric_stats(population, Metric::DexVolumeUsd),
        nft_collections_diversity: metric_stats(population, Metric::NftCollectionsDiversity),
    })
}

struct Snapshot {
    stats: ReferenceStats,
    taken_at: Instant,
    writes_at: u64,
}

/// Reference statistics with optional reuse. A zero TTL recomputes on every call.
pub struct ReferenceStatsCache {
    ttl: Duration,
    max_writes: u64,
    writes: AtomicU64,
    snapshot: Mutex<Option<Snapshot>>,
}

impl ReferenceStatsCache {
    pub fn new(ttl: Duration, max_writes: u64) -> Self {
        Self {
            ttl,
            max_writes,
            writes: AtomicU64::new(0),
            snapshot: Mutex::new(None),
        }
    }

    pub fn from_config(cfg: &common::config::Scoring) -> Self {
        Self::new(
            Duration::from_secs(cfg.stats_cache_ttl_secs),
            cfg.stats_cache_max_writes,
        )
    }

    /// Count one store write against the cached snapshot.
    pub fn note_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    fn cached(&self) -> Option<ReferenceStats> {
        if self.ttl.is_zero() {
            return None;
        }
        let writes = self.writes.load(Ordering::Relaxed);
        let guard = self
            .snapshot
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let snap = guard.as_ref()?;
        let fresh = snap.taken_at.elapsed() < self.ttl
            && (self.max_writes == 0 || writes - snap.writes_at < self.max_writes);
        fresh.then(|| snap.stats.clone())
    }

    pub async fn get(&self, store: &WalletStore) -> Result<ReferenceStats, StatsError> {
        if let Some(stats) = self.cached() {
            return Ok(stats);
        }
        let writes_at = self.writes.load(Ordering::Relaxed);
        let population = store.population().await?;
        let stats = compute(&population)?;
        if !self.ttl.is_zero() {
            *self
                .snapshot
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner) = Some(Snapshot {
                stats: stats.clone(),
                taken_at: Instant::now(),
                writes_at,
            });
        }
        Ok(stats)
    }
}
