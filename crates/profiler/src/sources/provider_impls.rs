use anyhow::Result;
use common::alchemy::{AlchemyClient, OwnedNft};
use common::bitquery::{BitqueryClient, DexTrade};
use common::etherscan::{EtherscanClient, RawTokenTransfer, RawTransaction, SortOrder};
use common::key_pool::KeyPool;
use common::types::AccountAddress;
use common::upstream::classify_anyhow_api_error;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;

use super::api::ActivityApi;

/// Live upstreams sharing one key pool.
pub struct LiveProviders {
    etherscan: EtherscanClient,
    alchemy: AlchemyClient,
    bitquery: BitqueryClient,
}

impl LiveProviders {
    pub fn from_config(cfg: &common::config::Providers, keys: Arc<KeyPool>) -> Result<Self> {
        let timeout = cfg.request_timeout();
        Ok(Self {
            etherscan: EtherscanClient::new(&cfg.etherscan_api_url, Arc::clone(&keys), timeout)?,
            alchemy: AlchemyClient::new(&cfg.alchemy_api_url, Arc::clone(&keys), timeout)?,
            bitquery: BitqueryClient::new(&cfg.bitquery_api_url, keys, timeout)?,
        })
    }
}

/// Record request count, latency and classified errors for one upstream call.
async fn observed<T>(endpoint: &'static str, fut: impl Future<Output = Result<T>>) -> Result<T> {
    let start = Instant::now();
    let res = fut.await;
    let ms = start.elapsed().as_secs_f64() * 1000.0;
    metrics::histogram!("profiler_upstream_latency_ms", "endpoint" => endpoint).record(ms);
    match &res {
        Ok(_) => {
            metrics::counter!("profiler_upstream_requests_total", "endpoint" => endpoint, "status" => "ok")
                .increment(1);
        }
        Err(e) => {
            metrics::counter!("profiler_upstream_requests_total", "endpoint" => endpoint, "status" => "error")
                .increment(1);
            metrics::counter!(
                "profiler_upstream_errors_total",
                "endpoint" => endpoint,
                "kind" => classify_anyhow_api_error(e).as_str()
            )
            .increment(1);
        }
    }
    res
}

impl ActivityApi for LiveProviders {
    async fn balance(&self, address: &AccountAddress) -> Result<u128> {
        observed("etherscan_balance", self.etherscan.fetch_balance(address)).await
    }

    async fn transactions(
        &self,
        address: &AccountAddress,
        sort: SortOrder,
    ) -> Result<Vec<RawTransaction>> {
        observed(
            "etherscan_txlist",
            self.etherscan.fetch_transactions(address, sort),
        )
        .await
    }

    async fn token_transfers(&self, address: &AccountAddress) -> Result<Vec<RawTokenTransfer>> {
        observed(
            "etherscan_tokentx",
            self.etherscan.fetch_token_transfers(address),
        )
        .await
    }

    async fn owned_nfts(&self, address: &AccountAddress) -> Result<Vec<OwnedNft>> {
        observed("alchemy_nfts", self.alchemy.fetch_owned_nfts(address)).await
    }

    async fn dex_trades(&self, address: &AccountAddress, limit: u32) -> Result<Vec<DexTrade>> {
        observed(
            "bitquery_dex_trades",
            self.bitquery.fetch_dex_trades(address, limit),
        )
        .await
    }
}
