use common::types::{AccountAddress, AddressError, MetricVector};
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::Instrument;

use crate::aggregator::{Aggregator, RawActivityBundle};
use crate::features::extract;
use crate::persona_scoring::{score, PersonaScore};
use crate::reference_stats::{ReferenceStats, ReferenceStatsCache, StatsError};
use crate::sources::{ActivityApi, RetryPolicy};
use crate::wallet_store::{UpsertOutcome, WalletEvaluation, WalletRecord, WalletStore};

/// Failures a caller can see. Everything else degrades or is logged.
#[derive(Debug, Error)]
pub enum EvaluateError {
    #[error("wallet address is required")]
    MissingAddress,
    #[error("invalid wallet address: {0}")]
    InvalidAddress(#[from] AddressError),
    #[error("wallet aggregation timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl EvaluateError {
    /// Bad input rather than a server-side failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::MissingAddress | Self::InvalidAddress(_))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluated {
    #[serde(flatten)]
    pub record: WalletRecord,
    /// `None` when served from the cache or when the write failed.
    pub persisted: Option<UpsertOutcome>,
    pub cached: bool,
}

pub struct Pipeline<P> {
    aggregator: Aggregator<P>,
    store: WalletStore,
    stats: ReferenceStatsCache,
    eval_timeout: Duration,
}

fn parse_address(raw: &str) -> Result<AccountAddress, EvaluateError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(EvaluateError::MissingAddress);
    }
    Ok(AccountAddress::parse(raw)?)
}

impl<P: ActivityApi> Pipeline<P> {
    pub fn new(
        aggregator: Aggregator<P>,
        store: WalletStore,
        stats: ReferenceStatsCache,
        eval_timeout: Duration,
    ) -> Self {
        Self {
            aggregator,
            store,
            stats,
            eval_timeout,
        }
    }

    pub fn from_config(cfg: &common::config::Config, api: P, store: WalletStore) -> Self {
        Self::new(
            Aggregator::new(
                api,
                RetryPolicy::from_config(&cfg.retry),
                cfg.providers.dex_trade_limit,
            ),
            store,
            ReferenceStatsCache::from_config(&cfg.scoring),
            Duration::from_secs(cfg.evaluation.timeout_secs),
        )
    }

    pub fn store(&self) -> &WalletStore {
        &self.store
    }

    pub fn aggregator(&self) -> &Aggregator<P> {
        &self.aggregator
    }

    pub async fn reference_stats(&self) -> Result<ReferenceStats, StatsError> {
        self.stats.get(&self.store).await
    }

    async fn aggregate_within_deadline(
        &self,
        address: &AccountAddress,
        now_epoch: i64,
    ) -> Result<RawActivityBundle, EvaluateError> {
        tokio::time::timeout(
            self.eval_timeout,
            self.aggregator.aggregate_address(address, now_epoch),
        )
        .await
        .map_err(|_elapsed| EvaluateError::Timeout(self.eval_timeout))
    }

    /// Read-only: the raw bundle, nothing stored.
    pub async fn analyze(
        &self,
        raw_address: &str,
        now_epoch: i64,
    ) -> Result<RawActivityBundle, EvaluateError> {
        let address = parse_address(raw_address)?;
        self.aggregate_within_deadline(&address, now_epoch)
            .instrument(tracing::info_span!("analyze", wallet = %address))
            .await
    }

    /// Score `metrics` against the current population. An empty or unreadable
    /// population leaves the account unscored.
    pub async fn score_metrics(
        &self,
        address: &AccountAddress,
        vector: &MetricVector,
    ) -> Option<PersonaScore> {
        match self.stats.get(&self.store).await {
            Ok(stats) => Some(score(vector, &stats)),
            Err(StatsError::EmptyPopulation) => {
                tracing::warn!(wallet = %address, "reference population is empty; persona not scored");
                None
            }
            Err(e) => {
                tracing::error!(wallet = %address, error = %e, "reference statistics unavailable");
                None
            }
        }
    }

    /// Write-through: aggregate, score and persist.
    pub async fn update(&self, raw_address: &str, now_epoch: i64) -> Result<Evaluated, EvaluateError> {
        let address = parse_address(raw_address)?;
        let span = tracing::info_span!("evaluate", wallet = %address);
        self.update_address(address, now_epoch).instrument(span).await
    }

    async fn update_address(
        &self,
        address: AccountAddress,
        now_epoch: i64,
    ) -> Result<Evaluated, EvaluateError> {
        let bundle = self.aggregate_within_deadline(&address, now_epoch).await?;
        let vector = extract(&bundle);
        let persona = self.score_metrics(&address, &vector).await;

        let eval = WalletEvaluation {
            address,
            balance: bundle.balance,
            metrics: vector,
            persona,
        };
        let (record, persisted) = match self.store.upsert(eval.clone()).await {
            Ok((outcome, record)) => {
                self.stats.note_write();
                (record, Some(outcome))
            }
            Err(e) => {
                tracing::error!(wallet = %eval.address, error = %e, "failed to persist wallet evaluation");
                (WalletRecord::unsaved(eval), None)
            }
        };

        if let Some(persona) = &record.persona {
            metrics::counter!("profiler_wallets_scored_total").increment(1);
            if persisted.is_some() {
                if let Err(e) = self
                    .store
                    .replace_persona_contracts(&record.address, persona.position, &bundle.transactions)
                    .await
                {
                    tracing::error!(wallet = %record.address, error = %e, "failed to record persona contracts");
                }
            }
        }

        tracing::info!(
            wallet = %record.address,
            position = ?record.persona.as_ref().map(|p| p.position),
            outcome = ?persisted,
            "wallet evaluated"
        );
        Ok(Evaluated {
            record,
            persisted,
            cached: false,
        })
    }

    /// Read-through: the stored record when it carries a persona, else a fresh
    /// update. Rows written before a population existed are refreshed.
    pub async fn cached_or_update(
        &self,
        raw_address: &str,
        now_epoch: i64,
    ) -> Result<Evaluated, EvaluateError> {
        let address = parse_address(raw_address)?;
        match self.store.get(&address).await {
            Ok(Some(record)) if record.persona.is_some() => {
                tracing::debug!(wallet = %address, "wallet cache hit");
                return Ok(Evaluated {
                    record,
                    persisted: None,
                    cached: true,
                });
            }
            Ok(Some(_)) => {
                tracing::debug!(wallet = %address, "cached wallet is unscored; refreshing");
            }
            Ok(None) => {}
            Err(e) => {
                tracing::error!(wallet = %address, error = %e, "wallet cache read failed; refreshing");
            }
        }
        let span = tracing::info_span!("evaluate", wallet = %address);
        self.update_address(address, now_epoch).instrument(span).await
    }
}
