use chrono::{DateTime, Months};
use common::etherscan::{RawTransaction, SortOrder};
use common::types::AccountAddress;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use super::retry::{degrade, with_retry, RetryPolicy};
use super::ActivityApi;

/// One distinct `(method selector, counterparty)` pair from recent activity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContractCall {
    pub method: String,
    pub contract_address: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecentActivity {
    pub calls: Vec<ContractCall>,
    pub recent_tx_count: u32,
}

/// Start of the activity window: six calendar months before `now`.
pub fn window_start(now_epoch: i64) -> i64 {
    DateTime::from_timestamp(now_epoch, 0)
        .and_then(|now| now.checked_sub_months(Months::new(6)))
        .map_or(now_epoch - 183 * 86_400, |t| t.timestamp())
}

/// First 4 bytes of calldata as `0x` + 8 hex chars; `None` for plain transfers.
fn method_selector(input: &str) -> Option<String> {
    if input.is_empty() || input == "0x" {
        return None;
    }
    Some(input.chars().take(10).collect::<String>().to_ascii_lowercase())
}

pub fn summarize_recent(txs: &[RawTransaction], now_epoch: i64) -> RecentActivity {
    let cutoff = window_start(now_epoch);
    let mut seen = HashSet::new();
    let mut calls = Vec::new();
    let mut recent_tx_count = 0u32;

    for tx in txs {
        if !tx.timestamp_secs().is_some_and(|ts| ts > cutoff) {
            continue;
        }
        recent_tx_count = recent_tx_count.saturating_add(1);

        let Some(method) = tx.input.as_deref().and_then(method_selector) else {
            continue;
        };
        let Some(to) = tx.to.as_deref().filter(|t| !t.is_empty()) else {
            continue;
        };
        let call = ContractCall {
            method,
            contract_address: to.to_ascii_lowercase(),
        };
        if seen.insert(call.clone()) {
            calls.push(call);
        }
    }

    RecentActivity {
        calls,
        recent_tx_count,
    }
}

pub async fn fetch_recent_activity<P: ActivityApi>(
    api: &P,
    address: &AccountAddress,
    policy: RetryPolicy,
    now_epoch: i64,
) -> RecentActivity {
    let res = with_retry("recent_transactions", policy, || {
        api.transactions(address, SortOrder::Desc)
    })
    .await
    .map(|txs| summarize_recent(&txs, now_epoch));
    degrade("recent_transactions", res, |_| RecentActivity::default())
}
