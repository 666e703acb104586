use common::etherscan::RawTokenTransfer;
use common::types::AccountAddress;
use std::collections::HashSet;

use super::retry::{degrade, with_retry, RetryPolicy};
use super::ActivityApi;

pub const STABLECOIN_SYMBOLS: [&str; 7] = ["USDT", "USDC", "DAI", "BUSD", "TUSD", "USDP", "GUSD"];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenActivity {
    pub uses_stablecoins: bool,
    pub distinct_symbols: u32,
}

pub fn summarize_token_activity(transfers: &[RawTokenTransfer]) -> TokenActivity {
    let symbols: HashSet<&str> = transfers
        .iter()
        .filter_map(|t| t.token_symbol.as_deref())
        .filter(|s| !s.is_empty())
        .collect();
    let uses_stablecoins = symbols
        .iter()
        .any(|s| STABLECOIN_SYMBOLS.iter().any(|st| st.eq_ignore_ascii_case(s)));
    TokenActivity {
        uses_stablecoins,
        distinct_symbols: u32::try_from(symbols.len()).unwrap_or(u32::MAX),
    }
}

pub async fn fetch_token_activity<P: ActivityApi>(
    api: &P,
    address: &AccountAddress,
    policy: RetryPolicy,
) -> TokenActivity {
    let res = with_retry("token_activity", policy, || api.token_transfers(address))
        .await
        .map(|transfers| summarize_token_activity(&transfers));
    degrade("token_activity", res, |_| TokenActivity::default())
}
