//! Scripted [`ActivityApi`] used by the unit tests in this crate.

use anyhow::Result;
use common::alchemy::OwnedNft;
use common::bitquery::DexTrade;
use common::etherscan::{RawTokenTransfer, RawTransaction, SortOrder};
use common::types::AccountAddress;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use crate::sources::ActivityApi;

pub const ADDR: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";
pub const NOW: i64 = 1_717_200_000; // 2024-06-01T00:00:00Z

pub fn addr() -> AccountAddress {
    AccountAddress::parse(ADDR).unwrap()
}

#[derive(Default)]
pub struct FakeApi {
    pub balance: u128,
    pub txs: Vec<RawTransaction>,
    pub token_transfers: Vec<RawTokenTransfer>,
    pub nfts: Vec<OwnedNft>,
    pub dex: Vec<DexTrade>,
    /// endpoint -> number of leading failures (`u32::MAX` = never succeeds).
    pub fail_first: HashMap<&'static str, u32>,
    /// Sleep applied to the four concurrent endpoints.
    pub concurrent_delay: Duration,
    calls: Mutex<HashMap<&'static str, u32>>,
    log: Mutex<Vec<&'static str>>,
}

impl FakeApi {
    pub fn failing(mut self, endpoint: &'static str, times: u32) -> Self {
        self.fail_first.insert(endpoint, times);
        self
    }

    pub fn calls(&self, endpoint: &str) -> u32 {
        self.calls.lock().unwrap().get(endpoint).copied().unwrap_or(0)
    }

    pub fn call_log(&self) -> Vec<&'static str> {
        self.log.lock().unwrap().clone()
    }

    fn hit(&self, endpoint: &'static str) -> Result<()> {
        self.log.lock().unwrap().push(endpoint);
        let n = {
            let mut calls = self.calls.lock().unwrap();
            let n = calls.entry(endpoint).or_insert(0);
            *n += 1;
            *n
        };
        let fails = self.fail_first.get(endpoint).copied().unwrap_or(0);
        if n <= fails {
            anyhow::bail!("{endpoint} unavailable (call {n})");
        }
        Ok(())
    }

    async fn pause(&self) {
        if !self.concurrent_delay.is_zero() {
            tokio::time::sleep(self.concurrent_delay).await;
        }
    }
}

impl ActivityApi for FakeApi {
    async fn balance(&self, _address: &AccountAddress) -> Result<u128> {
        self.hit("balance")?;
        Ok(self.balance)
    }

    async fn transactions(
        &self,
        _address: &AccountAddress,
        sort: SortOrder,
    ) -> Result<Vec<RawTransaction>> {
        match sort {
            SortOrder::Desc => {
                self.hit("transactions_desc")?;
                let mut txs = self.txs.clone();
                txs.sort_by_key(|t| std::cmp::Reverse(t.timestamp_secs()));
                Ok(txs)
            }
            SortOrder::Asc => {
                self.pause().await;
                self.hit("transactions_asc")?;
                let mut txs = self.txs.clone();
                txs.sort_by_key(RawTransaction::timestamp_secs);
                Ok(txs)
            }
        }
    }

    async fn token_transfers(&self, _address: &AccountAddress) -> Result<Vec<RawTokenTransfer>> {
        self.hit("token_transfers")?;
        Ok(self.token_transfers.clone())
    }

    async fn owned_nfts(&self, _address: &AccountAddress) -> Result<Vec<OwnedNft>> {
        self.pause().await;
        self.hit("owned_nfts")?;
        Ok(self.nfts.clone())
    }

    async fn dex_trades(&self, _address: &AccountAddress, _limit: u32) -> Result<Vec<DexTrade>> {
        self.pause().await;
        self.hit("dex_trades")?;
        Ok(self.dex.clone())
    }
}

pub fn tx(ts: i64, to: &str, input: &str) -> RawTransaction {
    RawTransaction {
        timestamp: Some(ts.to_string()),
        to: Some(to.to_string()),
        input: Some(input.to_string()),
        gas_used: Some("21000".to_string()),
        gas_price: Some("1000000000".to_string()),
        ..Default::default()
    }
}

pub fn token_in(symbol: &str, contract: &str, value: &str, ts: i64) -> RawTokenTransfer {
    RawTokenTransfer {
        timestamp: Some(ts.to_string()),
        from: Some("0x1111111111111111111111111111111111111111".to_string()),
        to: Some(ADDR.to_ascii_lowercase()),
        value: Some(value.to_string()),
        token_symbol: Some(symbol.to_string()),
        token_decimal: Some("18".to_string()),
        contract_address: Some(contract.to_string()),
    }
}

pub fn dex_trade(exchange: &str, usd: f64) -> DexTrade {
    DexTrade {
        exchange: Some(common::bitquery::TradeExchange {
            name: Some(exchange.to_string()),
        }),
        trade_amount: Some(usd),
        ..Default::default()
    }
}

pub fn nft(symbol: &str, balance: &str) -> OwnedNft {
    OwnedNft {
        balance: Some(balance.to_string()),
        contract_metadata: Some(common::alchemy::ContractMetadata {
            symbol: Some(symbol.to_string()),
            name: None,
        }),
    }
}

/// A lively account: recent contract calls, tokens held for 10 days, two DEXes, NFTs.
pub fn active_wallet() -> FakeApi {
    FakeApi {
        balance: 2_000_000_000_000_000_000,
        txs: vec![
            tx(NOW - 86_400, "0xrouter", "0x38ed1739aa"),
            tx(NOW - 2 * 86_400, "0xrouter", "0x38ed1739bb"),
            tx(NOW - 3 * 86_400, "0xnftmarket", "0xab834bab00"),
            tx(NOW - 4 * 86_400, "0xdac17f958d2ee523a2206206994597c13d831ec7", "0xa9059cbb00"),
            tx(NOW - 400 * 86_400, "0xold", "0x12345678"),
        ],
        token_transfers: vec![
            token_in("UNI", "0xuni", "5000000000000000000", NOW - 10 * 86_400),
            token_in("USDC", "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48", "1000000000000000000", NOW - 20 * 86_400),
        ],
        nfts: vec![nft("PUNK", "1"), nft("BAYC", "2")],
        dex: vec![dex_trade("Uniswap", 1000.0), dex_trade("Curve", 500.0)],
        ..Default::default()
    }
}
