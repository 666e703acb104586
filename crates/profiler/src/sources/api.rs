use anyhow::Result;
use common::alchemy::OwnedNft;
use common::bitquery::DexTrade;
use common::etherscan::{RawTokenTransfer, RawTransaction, SortOrder};
use common::types::AccountAddress;

/// Upstream activity data for one account. The live implementation fans out to
/// Etherscan, Alchemy and Bitquery; tests substitute scripted fakes.
pub trait ActivityApi: Send + Sync {
    fn balance(
        &self,
        address: &AccountAddress,
    ) -> impl std::future::Future<Output = Result<u128>> + Send;

    fn transactions(
        &self,
        address: &AccountAddress,
        sort: SortOrder,
    ) -> impl std::future::Future<Output = Result<Vec<RawTransaction>>> + Send;

    fn token_transfers(
        &self,
        address: &AccountAddress,
    ) -> impl std::future::Future<Output = Result<Vec<RawTokenTransfer>>> + Send;

    fn owned_nfts(
        &self,
        address: &AccountAddress,
    ) -> impl std::future::Future<Output = Result<Vec<OwnedNft>>> + Send;

    fn dex_trades(
        &self,
        address: &AccountAddress,
        limit: u32,
    ) -> impl std::future::Future<Output = Result<Vec<DexTrade>>> + Send;
}
