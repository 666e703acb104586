use common::bitquery::DexTrade;
use common::types::AccountAddress;
use serde::{Deserialize, Serialize};

use super::retry::{degrade, with_retry, RetryPolicy};
use super::{ActivityApi, Analysis};
use crate::rounding::round_to;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DexSummary {
    pub dex_volume_usd: f64,
    pub dex_count: u32,
    /// Distinct exchange names in first-seen order.
    pub dex_list: Vec<String>,
}

pub fn summarize_dex(trades: &[DexTrade]) -> DexSummary {
    let volume: f64 = trades
        .iter()
        .filter_map(|t| t.trade_amount)
        .filter(|v| v.is_finite())
        .sum();
    let mut exchanges: Vec<String> = Vec::new();
    for name in trades.iter().filter_map(DexTrade::exchange_name) {
        if !exchanges.iter().any(|e| e == name) {
            exchanges.push(name.to_string());
        }
    }
    DexSummary {
        dex_volume_usd: round_to(volume, 2),
        dex_count: u32::try_from(exchanges.len()).unwrap_or(u32::MAX),
        dex_list: exchanges,
    }
}

pub async fn fetch_dex_summary<P: ActivityApi>(
    api: &P,
    address: &AccountAddress,
    policy: RetryPolicy,
    limit: u32,
) -> Analysis<DexSummary> {
    let res = with_retry("dex_trades", policy, || api.dex_trades(address, limit))
        .await
        .map(|trades| Analysis::Available(summarize_dex(&trades)));
    degrade("dex_trades", res, |e| Analysis::unavailable(e.to_string()))
}
