use common::types::AccountAddress;

use super::retry::{degrade, with_retry, RetryPolicy};
use super::ActivityApi;

/// Native balance in wei; 0 once the retry budget is spent.
pub async fn fetch_balance<P: ActivityApi>(
    api: &P,
    address: &AccountAddress,
    policy: RetryPolicy,
) -> u128 {
    let res = with_retry("balance", policy, || api.balance(address)).await;
    degrade("balance", res, |_| 0)
}
