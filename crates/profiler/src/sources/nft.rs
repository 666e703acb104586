use common::alchemy::OwnedNft;
use common::types::AccountAddress;
use serde::{Deserialize, Serialize};

use super::retry::{degrade, with_retry, RetryPolicy};
use super::{ActivityApi, Analysis};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NftHoldings {
    pub owned_nfts_count: u64,
    pub owned_nft_collections_count: u32,
    /// Distinct collection symbols in first-seen order.
    pub owned_nft_collections: Vec<String>,
}

pub fn summarize_nfts(nfts: &[OwnedNft]) -> NftHoldings {
    let mut collections: Vec<String> = Vec::new();
    let mut total = 0u64;
    for nft in nfts {
        total = total.saturating_add(nft.balance_count());
        if let Some(symbol) = nft.symbol() {
            if !collections.iter().any(|c| c == symbol) {
                collections.push(symbol.to_string());
            }
        }
    }
    NftHoldings {
        owned_nfts_count: total,
        owned_nft_collections_count: u32::try_from(collections.len()).unwrap_or(u32::MAX),
        owned_nft_collections: collections,
    }
}

/// Every attempt asks the provider for a fresh key, the first one included.
pub async fn fetch_nft_holdings<P: ActivityApi>(
    api: &P,
    address: &AccountAddress,
    policy: RetryPolicy,
) -> Analysis<NftHoldings> {
    let res = with_retry("nft_holdings", policy, || api.owned_nfts(address))
        .await
        .map(|nfts| Analysis::Available(summarize_nfts(&nfts)));
    degrade("nft_holdings", res, |e| Analysis::unavailable(e.to_string()))
}
