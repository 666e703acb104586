use anyhow::Result;
use common::types::{AccountAddress, Metric, Position};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::rounding::round_to;
use crate::sources::recent::ContractCall;
use crate::wallet_store::WalletStore;

/// ERC-20 `transfer(address,uint256)`.
const TRANSFER_SELECTOR: &str = "0xa9059cbb";

/// USDT, USDC and WETH on mainnet. Everyone touches these.
const IGNORED_CONTRACTS: &[&str] = &[
    "0xdac17f958d2ee523a2206206994597c13d831ec7",
    "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48",
    "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2",
];

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PopularContract {
    pub contract_address: String,
    pub frequency: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct MetricAverages {
    pub distinct_contract_count: f64,
    pub dex_platform_diversity: f64,
    pub avg_token_holding_period: f64,
    pub transaction_frequency: f64,
    pub dex_volume_usd: f64,
    pub nft_collections_diversity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GroupAverages {
    pub from_group: String,
    pub unique_addresses: u64,
    pub average_metrics: MetricAverages,
}

/// Contracts worth associating with a persona: transfers and the ubiquitous
/// tokens are dropped, the rest deduplicated and lowercased.
pub fn associated_contracts(address: &AccountAddress, calls: &[ContractCall]) -> Vec<String> {
    let mut contracts: BTreeSet<String> = calls
        .iter()
        .filter(|c| !c.method.eq_ignore_ascii_case(TRANSFER_SELECTOR))
        .map(|c| c.contract_address.to_ascii_lowercase())
        .filter(|c| !c.is_empty() && !IGNORED_CONTRACTS.contains(&c.as_str()))
        .collect();
    // Membership marker, so accounts without qualifying calls still join their group.
    contracts.insert(address.to_lowercase_hex());
    contracts.into_iter().collect()
}

fn avg_column(metric: Metric) -> String {
    format!("COALESCE(AVG(w.{}), 0.0)", metric.as_str())
}

impl WalletStore {
    /// Replace the account's associations with `group`. Returns the rows written.
    pub async fn replace_persona_contracts(
        &self,
        address: &AccountAddress,
        group: Position,
        calls: &[ContractCall],
    ) -> Result<usize> {
        let contracts = associated_contracts(address, calls);
        let address = address.as_str().to_string();
        let group = group.to_string();
        self.db()
            .call_named("persona_contracts.replace", move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM persona_contracts WHERE address = ?1", [&address])?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO persona_contracts (address, from_group, to_contract) VALUES (?1, ?2, ?3)",
                    )?;
                    for contract in &contracts {
                        stmt.execute(rusqlite::params![address, group, contract])?;
                    }
                }
                tx.commit()?;
                Ok(contracts.len())
            })
            .await
    }

    /// Counterparties most often associated with `group`, excluding the members themselves.
    pub async fn popular_contracts(
        &self,
        group: Position,
        limit: u32,
    ) -> Result<Vec<PopularContract>> {
        let group = group.to_string();
        self.db()
            .call_named("persona_contracts.popular", move |conn| {
                let mut stmt = conn.prepare(
                    r"
                    SELECT to_contract, COUNT(*) AS frequency
                    FROM persona_contracts
                    WHERE from_group = ?1 AND to_contract <> lower(address)
                    GROUP BY to_contract
                    ORDER BY frequency DESC, to_contract ASC
                    LIMIT ?2",
                )?;
                let rows = stmt
                    .query_map(rusqlite::params![group, limit], |row| {
                        Ok(PopularContract {
                            contract_address: row.get(0)?,
                            frequency: u64::try_from(row.get::<_, i64>(1)?).unwrap_or(0),
                        })
                    })?
                    .collect::<rusqlite::Result<Vec<_>>>()?;
                Ok(rows)
            })
            .await
    }

    /// Mean metrics over the wallets associated with `group`, to two decimals.
    /// An unknown group yields zero members and zero averages.
    pub async fn group_averages(&self, group: Position) -> Result<GroupAverages> {
        let label = group.to_string();
        let columns: Vec<String> = Metric::ALL.into_iter().map(avg_column).collect();
        let sql = format!(
            r"
            SELECT COUNT(*), {}
            FROM wallets w
            WHERE w.address IN (
                SELECT DISTINCT address FROM persona_contracts WHERE from_group = ?1
            )",
            columns.join(", ")
        );
        self.db()
            .call_named("persona_contracts.averages", move |conn| {
                let (members, averages) = conn.query_row(&sql, [&label], |row| {
                    let members = u64::try_from(row.get::<_, i64>(0)?).unwrap_or(0);
                    let mut avg = [0.0; 6];
                    for (i, slot) in avg.iter_mut().enumerate() {
                        *slot = round_to(row.get::<_, f64>(i + 1)?, 2);
                    }
                    Ok((members, avg))
                })?;
                Ok(GroupAverages {
                    from_group: label,
                    unique_addresses: members,
                    average_metrics: MetricAverages {
                        distinct_contract_count: averages[0],
                        dex_platform_diversity: averages[1],
                        avg_token_holding_period: averages[2],
                        transaction_frequency: averages[3],
                        dex_volume_usd: averages[4],
                        nft_collections_diversity: averages[5],
                    },
                })
            })
            .await
    }
}
