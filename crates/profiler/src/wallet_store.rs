use anyhow::{Context, Result};
use common::db::AsyncDb;
use common::types::{AccountAddress, Metric, MetricVector, Position};
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row};
use serde::Serialize;

use crate::persona_scoring::{ArchetypeScores, Percentiles, PersonaScore};

/// Stored evaluation of one account.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WalletRecord {
    pub address: AccountAddress,
    /// Wei.
    pub balance: u128,
    #[serde(flatten)]
    pub metrics: MetricVector,
    /// Absent until the account has been scored against a non-empty population.
    #[serde(flatten, skip_serializing_if = "Option::is_none")]
    pub persona: Option<PersonaScore>,
    /// `None` for a record that never reached the store.
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

/// Everything an evaluation writes; timestamps are the store's concern.
#[derive(Debug, Clone, PartialEq)]
pub struct WalletEvaluation {
    pub address: AccountAddress,
    pub balance: u128,
    pub metrics: MetricVector,
    pub persona: Option<PersonaScore>,
}

impl WalletRecord {
    pub fn unsaved(eval: WalletEvaluation) -> Self {
        Self {
            address: eval.address,
            balance: eval.balance,
            metrics: eval.metrics,
            persona: eval.persona,
            created_at: None,
            updated_at: None,
        }
    }

    fn same_content(&self, eval: &WalletEvaluation) -> bool {
        self.balance == eval.balance && self.metrics == eval.metrics && self.persona == eval.persona
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertOutcome {
    Inserted,
    Updated,
    Unchanged,
}

impl UpsertOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inserted => "inserted",
            Self::Updated => "updated",
            Self::Unchanged => "unchanged",
        }
    }
}

const SELECT_WALLET: &str = r"
SELECT address, balance,
       distinct_contract_count, dex_platform_diversity, avg_token_holding_period,
       transaction_frequency, dex_volume_usd, nft_collections_diversity,
       explorer_score, diamond_score, whale_score, degen_score,
       distinct_contract_count_percentile, dex_platform_diversity_percentile,
       avg_token_holding_period_percentile, transaction_frequency_percentile,
       dex_volume_usd_percentile, nft_collections_diversity_percentile,
       position, created_at, updated_at
FROM wallets";

const UPSERT_WALLET: &str = r"
INSERT INTO wallets (
    address, balance,
    distinct_contract_count, dex_platform_diversity, avg_token_holding_period,
    transaction_frequency, dex_volume_usd, nft_collections_diversity,
    explorer_score, diamond_score, whale_score, degen_score,
    distinct_contract_count_percentile, dex_platform_diversity_percentile,
    avg_token_holding_period_percentile, transaction_frequency_percentile,
    dex_volume_usd_percentile, nft_collections_diversity_percentile,
    position, created_at, updated_at
) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?20)
ON CONFLICT(address) DO UPDATE SET
    balance = excluded.balance,
    distinct_contract_count = excluded.distinct_contract_count,
    dex_platform_diversity = excluded.dex_platform_diversity,
    avg_token_holding_period = excluded.avg_token_holding_period,
    transaction_frequency = excluded.transaction_frequency,
    dex_volume_usd = excluded.dex_volume_usd,
    nft_collections_diversity = excluded.nft_collections_diversity,
    explorer_score = excluded.explorer_score,
    diamond_score = excluded.diamond_score,
    whale_score = excluded.whale_score,
    degen_score = excluded.degen_score,
    distinct_contract_count_percentile = excluded.distinct_contract_count_percentile,
    dex_platform_diversity_percentile = excluded.dex_platform_diversity_percentile,
    avg_token_holding_period_percentile = excluded.avg_token_holding_period_percentile,
    transaction_frequency_percentile = excluded.transaction_frequency_percentile,
    dex_volume_usd_percentile = excluded.dex_volume_usd_percentile,
    nft_collections_diversity_percentile = excluded.nft_collections_diversity_percentile,
    position = excluded.position,
    updated_at = excluded.updated_at";

/// Balances predate the TEXT column in some databases, so accept any storage class.
fn balance_from_value(v: Value) -> u128 {
    match v {
        Value::Text(s) => s.trim().parse().unwrap_or(0),
        Value::Integer(i) => u128::try_from(i).unwrap_or(0),
        Value::Real(f) if f.is_finite() && f > 0.0 => f as u128,
        _ => 0,
    }
}

fn real_or_zero(row: &Row<'_>, idx: usize) -> rusqlite::Result<f64> {
    Ok(row
        .get::<_, Option<f64>>(idx)?
        .filter(|v| v.is_finite())
        .unwrap_or(0.0))
}

fn count_or_zero(row: &Row<'_>, idx: usize) -> rusqlite::Result<u32> {
    let v = real_or_zero(row, idx)?;
    Ok(if v > 0.0 { v.round() as u32 } else { 0 })
}

fn persona_from_row(row: &Row<'_>) -> rusqlite::Result<Option<PersonaScore>> {
    let (Some(explorer), Some(diamond), Some(whale), Some(degen)) = (
        row.get::<_, Option<f64>>(8)?,
        row.get::<_, Option<f64>>(9)?,
        row.get::<_, Option<f64>>(10)?,
        row.get::<_, Option<f64>>(11)?,
    ) else {
        return Ok(None);
    };
    let scores = ArchetypeScores {
        explorer,
        diamond,
        whale,
        degen,
    };
    let mut percentiles = Percentiles::default();
    for (i, metric) in Metric::ALL.into_iter().enumerate() {
        percentiles.set(metric, real_or_zero(row, 12 + i)?);
    }
    let position = row
        .get::<_, Option<String>>(18)?
        .and_then(|p| p.parse::<Position>().ok())
        .unwrap_or_else(|| scores.position());
    Ok(Some(PersonaScore {
        scores,
        percentiles,
        position,
    }))
}

fn row_to_record(row: &Row<'_>) -> rusqlite::Result<WalletRecord> {
    let raw_address: String = row.get(0)?;
    let address = AccountAddress::parse(&raw_address).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(WalletRecord {
        address,
        balance: balance_from_value(row.get(1)?),
        metrics: MetricVector {
            distinct_contract_count: count_or_zero(row, 2)?,
            dex_platform_diversity: count_or_zero(row, 3)?,
            avg_token_holding_period: real_or_zero(row, 4)?,
            transaction_frequency: real_or_zero(row, 5)?,
            dex_volume_usd: real_or_zero(row, 6)?,
            nft_collections_diversity: count_or_zero(row, 7)?,
        }
        .sanitized(),
        persona: persona_from_row(row)?,
        created_at: row.get(19)?,
        updated_at: row.get(20)?,
    })
}

fn select_record(
    conn: &rusqlite::Connection,
    address: &AccountAddress,
) -> rusqlite::Result<Option<WalletRecord>> {
    conn.query_row(
        &format!("{SELECT_WALLET} WHERE address = ?1"),
        [address.as_str()],
        row_to_record,
    )
    .optional()
}

fn now_timestamp() -> String {
    chrono::Utc::now()
        .format("%Y-%m-%d %H:%M:%S%.3f")
        .to_string()
}

/// Wallet cache and reference population, backed by the `wallets` table.
#[derive(Clone)]
pub struct WalletStore {
    db: AsyncDb,
}

impl WalletStore {
    pub fn new(db: AsyncDb) -> Self {
        Self { db }
    }

    pub(crate) fn db(&self) -> &AsyncDb {
        &self.db
    }

    pub async fn get(&self, address: &AccountAddress) -> Result<Option<WalletRecord>> {
        let address = address.clone();
        self.db
            .call_named("wallets.get", move |conn| {
                Ok(select_record(conn, &address)?)
            })
            .await
    }

    /// Insert or overwrite every derived field. `created_at` is kept on conflict and
    /// `updated_at` is always refreshed, including for unchanged content.
    pub async fn upsert(&self, eval: WalletEvaluation) -> Result<(UpsertOutcome, WalletRecord)> {
        self.db
            .call_named("wallets.upsert", move |conn| {
                let tx = conn.transaction()?;
                let outcome = match select_record(&tx, &eval.address)? {
                    None => UpsertOutcome::Inserted,
                    Some(existing) if existing.same_content(&eval) => UpsertOutcome::Unchanged,
                    Some(_) => UpsertOutcome::Updated,
                };

                let persona = eval.persona.as_ref();
                let score = |f: fn(&PersonaScore) -> f64| persona.map(f);
                let now = now_timestamp();
                let m = &eval.metrics;
                tx.execute(
                    UPSERT_WALLET,
                    rusqlite::params![
                        eval.address.as_str(),
                        eval.balance.to_string(),
                        m.distinct_contract_count,
                        m.dex_platform_diversity,
                        m.avg_token_holding_period,
                        m.transaction_frequency,
                        m.dex_volume_usd,
                        m.nft_collections_diversity,
                        score(|p| p.scores.explorer),
                        score(|p| p.scores.diamond),
                        score(|p| p.scores.whale),
                        score(|p| p.scores.degen),
                        score(|p| p.percentiles.distinct_contract_count),
                        score(|p| p.percentiles.dex_platform_diversity),
                        score(|p| p.percentiles.avg_token_holding_period),
                        score(|p| p.percentiles.transaction_frequency),
                        score(|p| p.percentiles.dex_volume_usd),
                        score(|p| p.percentiles.nft_collections_diversity),
                        persona.map(|p| p.position.to_string()),
                        now,
                    ],
                )?;

                let record = select_record(&tx, &eval.address)?
                    .context("wallet row missing after upsert")?;
                tx.commit()?;
                Ok((outcome, record))
            })
            .await
    }

    /// Store a metric vector without scores (bulk seeding).
    pub async fn seed_metrics(
        &self,
        address: &str,
        balance: u128,
        metrics: MetricVector,
    ) -> Result<UpsertOutcome> {
        let address = AccountAddress::parse(address)
            .with_context(|| format!("invalid seed address {address}"))?;
        let (outcome, _) = self
            .upsert(WalletEvaluation {
                address,
                balance,
                metrics: metrics.sanitized(),
                persona: None,
            })
            .await?;
        Ok(outcome)
    }

    /// Metric vectors of every stored account; NULL metrics read as 0.
    pub async fn population(&self) -> Result<Vec<MetricVector>> {
        self.db
            .call_named("wallets.population", |conn| {
                let mut stmt = conn.prepare(SELECT_WALLET)?;
                let rows = stmt
                    .query_map([], |row| Ok(row_to_record(row)?.metrics))?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    pub async fn count(&self) -> Result<i64> {
        self.db
            .call_named("wallets.count", |conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM wallets", [], |row| row.get(0))?)
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persona_scoring::score;
    use crate::reference_stats::compute;
    use crate::test_support::{addr, ADDR};

    async fn store() -> WalletStore {
        WalletStore::new(AsyncDb::open(":memory:").await.unwrap())
    }

    fn metrics(contracts: u32, volume: f64) -> MetricVector {
        MetricVector {
            distinct_contract_count: contracts,
            dex_platform_diversity: 1,
            avg_token_holding_period: 12.5,
            transaction_frequency: 1.25,
            dex_volume_usd: volume,
            nft_collections_diversity: 2,
        }
    }

    fn evaluation(contracts: u32, volume: f64) -> WalletEvaluation {
        let m = metrics(contracts, volume);
        let stats = compute(&[metrics(1, 10.0), metrics(5, 1000.0)]).unwrap();
        WalletEvaluation {
            address: addr(),
            balance: 123_456_789_000_000_000_000_000,
            metrics: m,
            persona: Some(score(&m, &stats)),
        }
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        assert!(store().await.get(&addr()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_insert_then_unchanged_then_updated() {
        let store = store().await;
        let (o1, r1) = store.upsert(evaluation(3, 100.0)).await.unwrap();
        assert_eq!(o1, UpsertOutcome::Inserted);
        assert_eq!(r1.address.as_str(), ADDR);
        assert_eq!(r1.balance, 123_456_789_000_000_000_000_000);

        let (o2, r2) = store.upsert(evaluation(3, 100.0)).await.unwrap();
        assert_eq!(o2, UpsertOutcome::Unchanged);
        assert_eq!(r2.created_at, r1.created_at);
        assert!(r2.updated_at >= r1.updated_at);
        assert_eq!(r2.metrics, r1.metrics);
        assert_eq!(r2.persona, r1.persona);

        let (o3, r3) = store.upsert(evaluation(4, 100.0)).await.unwrap();
        assert_eq!(o3, UpsertOutcome::Updated);
        assert_eq!(r3.metrics.distinct_contract_count, 4);
        assert_eq!(r3.created_at, r1.created_at);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_roundtrip_preserves_persona() {
        let store = store().await;
        let eval = evaluation(3, 100.0);
        store.upsert(eval.clone()).await.unwrap();
        let got = store.get(&addr()).await.unwrap().unwrap();
        assert_eq!(got.metrics, eval.metrics);
        assert_eq!(got.persona, eval.persona);
    }

    #[tokio::test]
    async fn test_clearing_persona_is_an_update() {
        let store = store().await;
        store.upsert(evaluation(3, 100.0)).await.unwrap();
        let mut unscored = evaluation(3, 100.0);
        unscored.persona = None;
        let (outcome, record) = store.upsert(unscored).await.unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert!(record.persona.is_none());
    }

    #[tokio::test]
    async fn test_population_reads_bare_rows_as_zero() {
        let store = store().await;
        store.seed_metrics(ADDR, 0, metrics(2, 5.0)).await.unwrap();
        store
            .db()
            .call(|conn| {
                Ok(conn.execute(
                    "INSERT INTO wallets (address, balance, dex_volume_usd) VALUES ('0x1111111111111111111111111111111111111111', 7, 3.5)",
                    [],
                )?)
            })
            .await
            .unwrap();
        let pop = store.population().await.unwrap();
        assert_eq!(pop.len(), 2);
        assert!((pop[1].dex_volume_usd - 3.5).abs() < 1e-12);
        assert_eq!(pop[1].distinct_contract_count, 0);
        assert!(pop[1].avg_token_holding_period.abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_null_position_is_derived_from_scores() {
        let store = store().await;
        store.upsert(evaluation(3, 100.0)).await.unwrap();
        store
            .db()
            .call(|conn| Ok(conn.execute("UPDATE wallets SET position = NULL", [])?))
            .await
            .unwrap();
        let got = store.get(&addr()).await.unwrap().unwrap();
        let persona = got.persona.unwrap();
        assert_eq!(persona.position, persona.scores.position());
    }

    #[tokio::test]
    async fn test_record_json_is_flat() {
        let store = store().await;
        let (_, record) = store.upsert(evaluation(3, 100.0)).await.unwrap();
        // Balance exceeds u64, which to_value rejects.
        let json: serde_json::Value =
            serde_json::from_str(&serde_json::to_string(&record).unwrap()).unwrap();
        assert_eq!(json["address"], ADDR);
        assert_eq!(json["distinct_contract_count"], 3);
        assert!(json["position"].is_string());
        assert!(json["scores"]["Whale"].is_number());

        let (_, unscored) = store
            .upsert(WalletEvaluation {
                persona: None,
                ..evaluation(3, 100.0)
            })
            .await
            .unwrap();
        let text = serde_json::to_string(&unscored).unwrap();
        assert!(!text.contains("position"));
    }
}
