use anyhow::{Context, Result};
use reqwest::Url;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::key_pool::{KeyPool, Provider};
use crate::types::AccountAddress;
use crate::upstream::{build_http_client, check_status, de_opt_string_any};

const API: &str = "alchemy";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ContractMetadata {
    pub symbol: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OwnedNft {
    #[serde(deserialize_with = "de_opt_string_any", default)]
    pub balance: Option<String>,
    #[serde(rename = "contractMetadata", default)]
    pub contract_metadata: Option<ContractMetadata>,
}

impl OwnedNft {
    /// Parsed balance; unparseable or missing is 0.
    pub fn balance_count(&self) -> u64 {
        self.balance
            .as_deref()
            .and_then(|b| b.trim().parse().ok())
            .unwrap_or(0)
    }

    pub fn symbol(&self) -> Option<&str> {
        self.contract_metadata
            .as_ref()?
            .symbol
            .as_deref()
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct NftsResponse {
    #[serde(rename = "ownedNfts", default)]
    pub owned_nfts: Vec<OwnedNft>,
}

/// Alchemy NFT API (v2 `getNFTs`). The API key is part of the path.
pub struct AlchemyClient {
    base_url: String,
    client: reqwest::Client,
    keys: Arc<KeyPool>,
}

impl AlchemyClient {
    pub fn new(base_url: &str, keys: Arc<KeyPool>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: build_http_client(timeout)?,
            keys,
        })
    }

    fn nfts_url(&self, owner: &AccountAddress) -> Result<Url> {
        let key = self.keys.next(Provider::Alchemy)?;
        let path = format!("{}/{}/getNFTs", self.base_url, urlencoding::encode(&key));
        let mut url = Url::parse(&path).context("invalid alchemy base url")?;
        url.query_pairs_mut().append_pair("owner", owner.as_str());
        Ok(url)
    }

    pub async fn fetch_owned_nfts(&self, owner: &AccountAddress) -> Result<Vec<OwnedNft>> {
        let url = self.nfts_url(owner)?;
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to fetch NFTs for {owner}"))?;
        let resp = check_status(API, resp).await?;
        let parsed: NftsResponse = resp
            .json()
            .await
            .context("failed to deserialize getNFTs response")?;
        Ok(parsed.owned_nfts)
    }
}
