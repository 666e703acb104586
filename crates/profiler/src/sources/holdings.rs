use common::etherscan::RawTokenTransfer;
use common::types::AccountAddress;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::retry::{degrade, with_retry, RetryPolicy};
use super::{ActivityApi, Analysis};
use crate::rounding::round_to;

const DEFAULT_DECIMALS: i32 = 18;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenHolding {
    pub token: String,
    pub balance: f64,
    pub holding_period_days: f64,
    pub net_flow: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenHoldings {
    pub token_count: u32,
    /// Longest-held first.
    pub token_details: Vec<TokenHolding>,
}

#[derive(Debug, Default)]
struct Ledger {
    symbol: String,
    first_in: Option<i64>,
    last_in: Option<i64>,
    total_in: f64,
    total_out: f64,
    balance: f64,
}

fn scaled_value(t: &RawTokenTransfer) -> f64 {
    let decimals = t
        .token_decimal
        .as_deref()
        .and_then(|d| d.trim().parse::<i32>().ok())
        .unwrap_or(DEFAULT_DECIMALS);
    let raw = t
        .value
        .as_deref()
        .and_then(|v| v.trim().parse::<f64>().ok())
        .unwrap_or(0.0);
    raw / 10f64.powi(decimals)
}

pub fn summarize_holdings(
    owner: &AccountAddress,
    transfers: &[RawTokenTransfer],
    now_epoch: i64,
) -> Analysis<TokenHoldings> {
    if transfers.is_empty() {
        return Analysis::unavailable("no token transfers");
    }

    // Keyed by (symbol, contract) so same-symbol impostor tokens stay separate.
    let mut ledgers: HashMap<(String, String), Ledger> = HashMap::new();
    for t in transfers {
        let symbol = t.token_symbol.clone().unwrap_or_default();
        let contract = t
            .contract_address
            .as_deref()
            .unwrap_or_default()
            .to_ascii_lowercase();
        let value = scaled_value(t);
        let ts = t.timestamp_secs();
        let entry = ledgers
            .entry((symbol.clone(), contract))
            .or_insert_with(|| Ledger {
                symbol,
                ..Ledger::default()
            });

        if t.to.as_deref().is_some_and(|to| owner.matches(to)) {
            entry.total_in += value;
            entry.balance += value;
            if let Some(ts) = ts {
                entry.first_in = Some(entry.first_in.map_or(ts, |f| f.min(ts)));
                entry.last_in = Some(entry.last_in.map_or(ts, |l| l.max(ts)));
            }
        }
        if t.from.as_deref().is_some_and(|from| owner.matches(from)) {
            entry.total_out += value;
            entry.balance -= value;
        }
    }

    let mut details: Vec<TokenHolding> = ledgers
        .into_values()
        .filter(|l| l.balance > 0.0)
        .map(|l| {
            let held_secs = l.first_in.map_or(0, |f| (now_epoch - f).max(0));
            TokenHolding {
                token: l.symbol,
                balance: round_to(l.balance, 6),
                holding_period_days: round_to(held_secs as f64 / 86_400.0, 2),
                net_flow: round_to(l.total_in - l.total_out, 6),
            }
        })
        .collect();
    details.sort_by(|a, b| {
        b.holding_period_days
            .total_cmp(&a.holding_period_days)
            .then_with(|| a.token.cmp(&b.token))
    });

    Analysis::Available(TokenHoldings {
        token_count: u32::try_from(details.len()).unwrap_or(u32::MAX),
        token_details: details,
    })
}

pub async fn fetch_token_holdings<P: ActivityApi>(
    api: &P,
    address: &AccountAddress,
    policy: RetryPolicy,
    now_epoch: i64,
) -> Analysis<TokenHoldings> {
    let res = with_retry("token_holdings", policy, || api.token_transfers(address))
        .await
        .map(|transfers| summarize_holdings(address, &transfers, now_epoch));
    degrade("token_holdings", res, |e| Analysis::unavailable(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    const OWNER: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
    const OTHER: &str = "0x1111111111111111111111111111111111111111";
    const NOW: i64 = 1_717_200_000;

    fn owner() -> AccountAddress {
        AccountAddress::parse(OWNER).unwrap()
    }

    fn transfer(
        symbol: &str,
        contract: &str,
        from: &str,
        to: &str,
        value: &str,
        ts: i64,
    ) -> RawTokenTransfer {
        RawTokenTransfer {
            timestamp: Some(ts.to_string()),
            from: Some(from.to_string()),
            to: Some(to.to_string()),
            value: Some(value.to_string()),
            token_symbol: Some(symbol.to_string()),
            token_decimal: Some("18".to_string()),
            contract_address: Some(contract.to_string()),
        }
    }

    #[test]
    fn test_in_100_out_30_reports_70() {
        let lower = OWNER.to_ascii_lowercase();
        let txs = vec![
            transfer("UNI", "0xuni", OTHER, &lower, "100000000000000000000", NOW - 10 * 86_400),
            transfer("UNI", "0xuni", &lower, OTHER, "30000000000000000000", NOW - 86_400),
        ];
        let Analysis::Available(h) = summarize_holdings(&owner(), &txs, NOW) else {
            panic!("expected holdings");
        };
        assert_eq!(h.token_count, 1);
        let uni = &h.token_details[0];
        assert_eq!(uni.token, "UNI");
        assert!((uni.balance - 70.0).abs() < 1e-9);
        assert!((uni.net_flow - 70.0).abs() < 1e-9);
        assert!((uni.holding_period_days - 10.0).abs() < 1e-9);
    }

    #[test]
    fn test_fully_exited_tokens_are_dropped_and_sorted_by_holding() {
        let lower = OWNER.to_ascii_lowercase();
        let mut six_dec = transfer("USDC", "0xusdc", OTHER, &lower, "5000000", NOW - 3 * 86_400);
        six_dec.token_decimal = Some("6".to_string());
        let txs = vec![
            transfer("LINK", "0xlink", OTHER, &lower, "1000000000000000000", NOW - 2 * 86_400),
            transfer("LINK", "0xlink", &lower, OTHER, "1000000000000000000", NOW - 86_400),
            transfer("AAVE", "0xaave", OTHER, OWNER, "2000000000000000000", NOW - 30 * 86_400),
            six_dec,
        ];
        let Analysis::Available(h) = summarize_holdings(&owner(), &txs, NOW) else {
            panic!("expected holdings");
        };
        let names: Vec<&str> = h.token_details.iter().map(|d| d.token.as_str()).collect();
        assert_eq!(names, vec!["AAVE", "USDC"]);
        assert!((h.token_details[1].balance - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_same_symbol_different_contracts_are_separate() {
        let lower = OWNER.to_ascii_lowercase();
        let txs = vec![
            transfer("USDT", "0xreal", OTHER, &lower, "1000000000000000000", NOW - 86_400),
            transfer("USDT", "0xfake", OTHER, &lower, "1000000000000000000", NOW - 86_400),
        ];
        let Analysis::Available(h) = summarize_holdings(&owner(), &txs, NOW) else {
            panic!("expected holdings");
        };
        assert_eq!(h.token_count, 2);
    }

    #[test]
    fn test_self_transfer_books_both_sides() {
        let lower = OWNER.to_ascii_lowercase();
        let txs = vec![transfer("UNI", "0xuni", OWNER, &lower, "5000000000000000000", NOW - 86_400)];
        let Analysis::Available(h) = summarize_holdings(&owner(), &txs, NOW) else {
            panic!("expected holdings");
        };
        assert_eq!(h.token_count, 0);
        assert!(h.token_details.is_empty());

        let txs = vec![
            transfer("UNI", "0xuni", OTHER, &lower, "2000000000000000000", NOW - 4 * 86_400),
            transfer("UNI", "0xuni", &lower, OWNER, "5000000000000000000", NOW - 86_400),
        ];
        let Analysis::Available(h) = summarize_holdings(&owner(), &txs, NOW) else {
            panic!("expected holdings");
        };
        let uni = &h.token_details[0];
        assert!((uni.balance - 2.0).abs() < 1e-9);
        assert!((uni.net_flow - 2.0).abs() < 1e-9);
        assert!((uni.holding_period_days - 4.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_transfers_is_error_marker() {
        assert!(summarize_holdings(&owner(), &[], NOW).available().is_none());
    }
}
