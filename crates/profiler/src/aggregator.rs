use common::types::{AccountAddress, AddressError};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::sources::analytics::{fetch_transaction_analytics, TransactionAnalytics};
use crate::sources::balance::fetch_balance;
use crate::sources::dex::{fetch_dex_summary, DexSummary};
use crate::sources::holdings::{fetch_token_holdings, TokenHoldings};
use crate::sources::nft::{fetch_nft_holdings, NftHoldings};
use crate::sources::recent::{fetch_recent_activity, ContractCall};
use crate::sources::tokens::fetch_token_activity;
use crate::sources::{ActivityApi, Analysis, RetryPolicy};

/// Everything one aggregation pass learned about an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawActivityBundle {
    pub wallet: AccountAddress,
    /// Wei.
    pub balance: u128,
    pub use_stable: bool,
    pub tokens_count: u32,
    pub recent_transactions_count: u32,
    pub transactions: Vec<ContractCall>,
    #[serde(rename = "Transaction")]
    pub transaction: Analysis<TransactionAnalytics>,
    #[serde(rename = "NFT")]
    pub nft: Analysis<NftHoldings>,
    #[serde(rename = "FT")]
    pub ft: Analysis<TokenHoldings>,
    #[serde(rename = "DEX")]
    pub dex: Analysis<DexSummary>,
}

pub struct Aggregator<P> {
    api: P,
    policy: RetryPolicy,
    dex_trade_limit: u32,
}

impl<P: ActivityApi> Aggregator<P> {
    pub fn new(api: P, policy: RetryPolicy, dex_trade_limit: u32) -> Self {
        Self {
            api,
            policy,
            dex_trade_limit,
        }
    }

    pub fn api(&self) -> &P {
        &self.api
    }

    /// Validate `raw_address`, then aggregate. Only validation can fail.
    pub async fn aggregate(
        &self,
        raw_address: &str,
        now_epoch: i64,
    ) -> Result<RawActivityBundle, AddressError> {
        let address = AccountAddress::parse(raw_address)?;
        Ok(self.aggregate_address(&address, now_epoch).await)
    }

    /// Balance, recent transactions and token activity run in that order; the
    /// four heavier analyses then run concurrently, each degrading on its own.
    pub async fn aggregate_address(
        &self,
        address: &AccountAddress,
        now_epoch: i64,
    ) -> RawActivityBundle {
        let policy = self.policy;
        let balance = fetch_balance(&self.api, address, policy).await;
        let recent = fetch_recent_activity(&self.api, address, policy, now_epoch).await;
        let tokens = fetch_token_activity(&self.api, address, policy).await;

        let (transaction, nft, ft, dex) = tokio::join!(
            fetch_transaction_analytics(&self.api, address, policy),
            fetch_nft_holdings(&self.api, address, policy),
            fetch_token_holdings(&self.api, address, policy, now_epoch),
            fetch_dex_summary(&self.api, address, policy, self.dex_trade_limit),
        );

        info!(
            wallet = %address,
            recent_tx = recent.recent_tx_count,
            transaction_ok = transaction.available().is_some(),
            nft_ok = nft.available().is_some(),
            ft_ok = ft.available().is_some(),
            dex_ok = dex.available().is_some(),
            "aggregated wallet activity"
        );

        RawActivityBundle {
            wallet: address.clone(),
            balance,
            use_stable: tokens.uses_stablecoins,
            tokens_count: tokens.distinct_symbols,
            recent_transactions_count: recent.recent_tx_count,
            transactions: recent.calls,
            transaction,
            nft,
            ft,
            dex,
        }
    }
}
