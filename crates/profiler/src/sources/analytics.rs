use chrono::{DateTime, Timelike};
use common::etherscan::{RawTransaction, SortOrder};
use common::types::AccountAddress;
use serde::{Deserialize, Serialize};

use super::retry::{degrade, with_retry, RetryPolicy};
use super::{ActivityApi, Analysis};
use crate::rounding::{mean, round_to};

const WEI_PER_ETH: f64 = 1e18;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionAnalytics {
    pub total_transactions: u64,
    pub average_gas_fee_eth: f64,
    pub total_gas_fee_eth: f64,
    pub max_gas_fee_eth: f64,
    /// UTC hour (0-23) with the most transactions; ties go to the earliest hour.
    pub most_active_hour: u32,
    pub average_transaction_interval_days: f64,
}

fn gas_fee_eth(tx: &RawTransaction) -> f64 {
    let parse = |v: Option<&str>| v.and_then(|s| s.trim().parse::<u128>().ok()).unwrap_or(0);
    let used = parse(tx.gas_used.as_deref());
    let price = parse(tx.gas_price.as_deref());
    used.checked_mul(price).map_or(0.0, |wei| wei as f64 / WEI_PER_ETH)
}

fn most_active_hour(timestamps: &[i64]) -> u32 {
    let mut counts = [0u32; 24];
    for ts in timestamps {
        if let Some(dt) = DateTime::from_timestamp(*ts, 0) {
            counts[dt.hour() as usize] += 1;
        }
    }
    let mut best = 0usize;
    for (hour, count) in counts.iter().enumerate() {
        if *count > counts[best] {
            best = hour;
        }
    }
    best as u32
}

pub fn summarize_history(txs: &[RawTransaction]) -> Analysis<TransactionAnalytics> {
    if txs.is_empty() {
        return Analysis::unavailable("no transactions");
    }

    let fees: Vec<f64> = txs.iter().map(gas_fee_eth).collect();
    let max_fee = fees.iter().copied().fold(0.0_f64, f64::max);

    let mut timestamps: Vec<i64> = txs.iter().filter_map(RawTransaction::timestamp_secs).collect();
    timestamps.sort_unstable();
    let intervals: Vec<f64> = timestamps
        .windows(2)
        .map(|w| (w[1] - w[0]) as f64)
        .collect();

    Analysis::Available(TransactionAnalytics {
        total_transactions: txs.len() as u64,
        average_gas_fee_eth: round_to(mean(&fees), 6),
        total_gas_fee_eth: round_to(fees.iter().sum(), 6),
        max_gas_fee_eth: round_to(max_fee, 6),
        most_active_hour: most_active_hour(&timestamps),
        average_transaction_interval_days: round_to(mean(&intervals) / 86_400.0, 2),
    })
}

pub async fn fetch_transaction_analytics<P: ActivityApi>(
    api: &P,
    address: &AccountAddress,
    policy: RetryPolicy,
) -> Analysis<TransactionAnalytics> {
    let res = with_retry("transaction_analytics", policy, || {
        api.transactions(address, SortOrder::Asc)
    })
    .await
    .map(|txs| summarize_history(&txs));
    degrade("transaction_analytics", res, |e| Analysis::unavailable(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tx(ts: i64, gas_used: &str, gas_price: &str) -> RawTransaction {
        RawTransaction {
            timestamp: Some(ts.to_string()),
            gas_used: Some(gas_used.to_string()),
            gas_price: Some(gas_price.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_empty_history_is_error_marker() {
        assert_eq!(summarize_history(&[]), Analysis::unavailable("no transactions"));
    }

    #[test]
    fn test_single_transaction_has_no_intervals() {
        // 21000 gas at 50 gwei = 0.00105 ETH
        let Analysis::Available(a) = summarize_history(&[tx(1_700_000_000, "21000", "50000000000")])
        else {
            panic!("expected analytics");
        };
        assert_eq!(a.total_transactions, 1);
        assert!((a.total_gas_fee_eth - 0.00105).abs() < 1e-12);
        assert!((a.max_gas_fee_eth - 0.00105).abs() < 1e-12);
        assert!(a.average_transaction_interval_days.abs() < 1e-12);
        // 1700000000 = 2023-11-14T22:13:20Z
        assert_eq!(a.most_active_hour, 22);
    }

    #[test]
    fn test_intervals_fees_and_hour_ties() {
        let day = 86_400;
        let base = 1_700_006_400; // 2023-11-15T00:00:00Z
        let txs = vec![
            tx(base + 3 * 3600, "100000", "20000000000"),
            tx(base + day + 3 * 3600 + 60, "50000", "20000000000"),
            tx(base + 3 * day + 3600, "10000", "10000000000"),
            tx(base + 4 * day + 3600 + 60, "garbage", "1"),
        ];
        let Analysis::Available(a) = summarize_history(&txs) else {
            panic!("expected analytics");
        };
        assert_eq!(a.total_transactions, 4);
        // fees: 0.002, 0.001, 0.0001, 0
        assert!((a.total_gas_fee_eth - 0.0031).abs() < 1e-12);
        assert!((a.average_gas_fee_eth - 0.000775).abs() < 1e-12);
        assert!((a.max_gas_fee_eth - 0.002).abs() < 1e-12);
        // two txs at hour 1, two at hour 3: earliest hour wins
        assert_eq!(a.most_active_hour, 1);
        // span is 4 days + 3600 - 3*3600 + 60 over 3 gaps
        let span = (4 * day + 3600 + 60 - 3 * 3600) as f64;
        let expected = round_to(span / 3.0 / 86_400.0, 2);
        assert!((a.average_transaction_interval_days - expected).abs() < 1e-12);
    }
}
