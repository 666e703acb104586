use common::types::MetricVector;
use std::collections::HashSet;

use crate::aggregator::RawActivityBundle;
use crate::rounding::mean;

/// Reduce a bundle to the six scoring dimensions. Degraded sub-results count as 0.
pub fn extract(bundle: &RawActivityBundle) -> MetricVector {
    let distinct_contracts: HashSet<String> = bundle
        .transactions
        .iter()
        .map(|c| c.contract_address.to_ascii_lowercase())
        .collect();

    let dex = bundle.dex.available();
    let dex_platform_diversity = dex.map_or(0, |d| {
        let names: HashSet<&str> = d.dex_list.iter().map(String::as_str).collect();
        u32::try_from(names.len()).unwrap_or(u32::MAX)
    });
    let dex_volume_usd = dex.map_or(0.0, |d| d.dex_volume_usd);

    let avg_token_holding_period = bundle.ft.available().map_or(0.0, |ft| {
        let periods: Vec<f64> = ft
            .token_details
            .iter()
            .map(|t| t.holding_period_days)
            .collect();
        mean(&periods)
    });

    let total_transactions = bundle
        .transaction
        .available()
        .map_or(0, |t| t.total_transactions);
    let transaction_frequency = if bundle.recent_transactions_count == 0 {
        0.0
    } else {
        total_transactions as f64 / f64::from(bundle.recent_transactions_count)
    };

    let nft_collections_diversity = bundle.nft.available().map_or(0, |n| {
        let symbols: HashSet<&str> = n.owned_nft_collections.iter().map(String::as_str).collect();
        u32::try_from(symbols.len()).unwrap_or(u32::MAX)
    });

    MetricVector {
        distinct_contract_count: u32::try_from(distinct_contracts.len()).unwrap_or(u32::MAX),
        dex_platform_diversity,
        avg_token_holding_period,
        transaction_frequency,
        dex_volume_usd,
        nft_collections_diversity,
    }
    .sanitized()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregator::Aggregator;
    use crate::sources::analytics::TransactionAnalytics;
    use crate::sources::holdings::{TokenHolding, TokenHoldings};
    use crate::sources::recent::ContractCall;
    use crate::sources::{Analysis, RetryPolicy};
    use crate::test_support::{active_wallet, addr, ADDR, NOW};

    fn empty_bundle() -> RawActivityBundle {
        RawActivityBundle {
            wallet: addr(),
            balance: 0,
            use_stable: false,
            tokens_count: 0,
            recent_transactions_count: 0,
            transactions: vec![],
            transaction: Analysis::unavailable("no transactions"),
            nft: Analysis::unavailable("down"),
            ft: Analysis::unavailable("no token transfers"),
            dex: Analysis::unavailable("down"),
        }
    }

    #[test]
    fn test_all_degraded_is_zero_vector() {
        assert_eq!(extract(&empty_bundle()), MetricVector::default());
    }

    #[test]
    fn test_contracts_distinct_across_methods_and_case() {
        let mut b = empty_bundle();
        b.transactions = vec![
            ContractCall {
                method: "0x1".into(),
                contract_address: "0xAbC".into(),
            },
            ContractCall {
                method: "0x2".into(),
                contract_address: "0xabc".into(),
            },
            ContractCall {
                method: "0x1".into(),
                contract_address: "0xdef".into(),
            },
        ];
        assert_eq!(extract(&b).distinct_contract_count, 2);
    }

    #[test]
    fn test_frequency_and_holding_period() {
        let mut b = empty_bundle();
        b.recent_transactions_count = 4;
        b.transaction = Analysis::Available(TransactionAnalytics {
            total_transactions: 10,
            average_gas_fee_eth: 0.0,
            total_gas_fee_eth: 0.0,
            max_gas_fee_eth: 0.0,
            most_active_hour: 0,
            average_transaction_interval_days: 0.0,
        });
        b.ft = Analysis::Available(TokenHoldings {
            token_count: 2,
            token_details: vec![
                TokenHolding {
                    token: "A".into(),
                    balance: 1.0,
                    holding_period_days: 30.0,
                    net_flow: 1.0,
                },
                TokenHolding {
                    token: "B".into(),
                    balance: 1.0,
                    holding_period_days: 10.0,
                    net_flow: 1.0,
                },
            ],
        });
        let v = extract(&b);
        assert!((v.transaction_frequency - 2.5).abs() < 1e-12);
        assert!((v.avg_token_holding_period - 20.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_recent_with_history_is_zero_frequency() {
        let mut b = empty_bundle();
        b.transaction = Analysis::Available(TransactionAnalytics {
            total_transactions: 1,
            average_gas_fee_eth: 0.0,
            total_gas_fee_eth: 0.0,
            max_gas_fee_eth: 0.0,
            most_active_hour: 0,
            average_transaction_interval_days: 0.0,
        });
        assert!(extract(&b).transaction_frequency.abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_extract_from_aggregated_wallet() {
        let agg = Aggregator::new(active_wallet(), RetryPolicy::default(), 200);
        let bundle = agg.aggregate(ADDR, NOW).await.unwrap();
        let v = extract(&bundle);
        assert_eq!(v.distinct_contract_count, 3);
        assert_eq!(v.dex_platform_diversity, 2);
        assert!((v.dex_volume_usd - 1500.0).abs() < 1e-9);
        assert_eq!(v.nft_collections_diversity, 2);
        assert!((v.transaction_frequency - 1.25).abs() < 1e-12);
        assert!((v.avg_token_holding_period - 15.0).abs() < 1e-9);
    }
}
