use anyhow::{Context, Result};
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::key_pool::{KeyPool, Provider};
use crate::types::AccountAddress;
use crate::upstream::{build_http_client, check_status, de_opt_string_any, UpstreamError};

const API: &str = "etherscan";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asc => "asc",
            Self::Desc => "desc",
        }
    }
}

/// Normal transaction from `module=account&action=txlist`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawTransaction {
    #[serde(rename = "timeStamp", deserialize_with = "de_opt_string_any", default)]
    pub timestamp: Option<String>,
    pub hash: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(deserialize_with = "de_opt_string_any", default)]
    pub value: Option<String>,
    #[serde(default)]
    pub input: Option<String>,
    #[serde(rename = "gasUsed", deserialize_with = "de_opt_string_any", default)]
    pub gas_used: Option<String>,
    #[serde(rename = "gasPrice", deserialize_with = "de_opt_string_any", default)]
    pub gas_price: Option<String>,
}

impl RawTransaction {
    pub fn timestamp_secs(&self) -> Option<i64> {
        self.timestamp.as_deref()?.trim().parse().ok()
    }
}

/// ERC-20 transfer event from `module=account&action=tokentx`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RawTokenTransfer {
    #[serde(rename = "timeStamp", deserialize_with = "de_opt_string_any", default)]
    pub timestamp: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    #[serde(deserialize_with = "de_opt_string_any", default)]
    pub value: Option<String>,
    #[serde(rename = "tokenSymbol")]
    pub token_symbol: Option<String>,
    #[serde(rename = "tokenDecimal", deserialize_with = "de_opt_string_any", default)]
    pub token_decimal: Option<String>,
    #[serde(rename = "contractAddress")]
    pub contract_address: Option<String>,
}

impl RawTokenTransfer {
    pub fn timestamp_secs(&self) -> Option<i64> {
        self.timestamp.as_deref()?.trim().parse().ok()
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    result: serde_json::Value,
}

const NO_TRANSACTIONS: &str = "No transactions found";

/// Etherscan answers list queries with either an array result or a string
/// explanation; an empty history is reported as a string.
fn decode_list<T: DeserializeOwned>(body: &str) -> Result<Vec<T>> {
    let env: Envelope = serde_json::from_str(body).context("failed to decode etherscan envelope")?;
    match env.result {
        serde_json::Value::Array(_) => {
            Ok(serde_json::from_value(env.result).context("failed to decode etherscan result")?)
        }
        serde_json::Value::String(s) => {
            let message = env.message.unwrap_or_default();
            if s.contains(NO_TRANSACTIONS) || message.contains(NO_TRANSACTIONS) {
                Ok(vec![])
            } else {
                Err(UpstreamError::Api {
                    api: API,
                    message: format!("{message}: {s}"),
                }
                .into())
            }
        }
        serde_json::Value::Null => Ok(vec![]),
        other => Err(UpstreamError::Api {
            api: API,
            message: format!("unexpected result shape: {other}"),
        }
        .into()),
    }
}

fn decode_balance(body: &str) -> Result<u128> {
    let env: Envelope = serde_json::from_str(body).context("failed to decode etherscan envelope")?;
    let raw = match env.result {
        serde_json::Value::String(s) => s,
        serde_json::Value::Number(n) => n.to_string(),
        other => {
            return Err(UpstreamError::Api {
                api: API,
                message: format!("unexpected balance result: {other}"),
            }
            .into())
        }
    };
    raw.trim().parse::<u128>().map_err(|_parse_err| {
        UpstreamError::Api {
            api: API,
            message: format!("{}: {raw}", env.message.unwrap_or_default()),
        }
        .into()
    })
}

/// Etherscan-compatible account API client. Each request draws a fresh key.
pub struct EtherscanClient {
    base_url: String,
    client: reqwest::Client,
    keys: Arc<KeyPool>,
}

impl EtherscanClient {
    pub fn new(base_url: &str, keys: Arc<KeyPool>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: build_http_client(timeout)?,
            keys,
        })
    }

    fn account_url(
        &self,
        action: &str,
        address: &AccountAddress,
        extra: &[(&str, &str)],
    ) -> Result<Url> {
        let key = self.keys.next(Provider::Etherscan)?;
        let mut url = Url::parse(&self.base_url).context("invalid etherscan base url")?;
        {
            let mut qp = url.query_pairs_mut();
            qp.append_pair("module", "account");
            qp.append_pair("action", action);
            qp.append_pair("address", address.as_str());
            for (k, v) in extra {
                qp.append_pair(k, v);
            }
            qp.append_pair("apikey", &key);
        }
        Ok(url)
    }

    async fn get_body(&self, url: Url, what: &str) -> Result<String> {
        debug!(action = what, "etherscan request");
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("failed to fetch etherscan {what}"))?;
        let resp = check_status(API, resp).await?;
        resp.text()
            .await
            .with_context(|| format!("failed to read etherscan {what} body"))
    }

    pub async fn fetch_balance(&self, address: &AccountAddress) -> Result<u128> {
        let url = self.account_url("balance", address, &[("tag", "latest")])?;
        let body = self.get_body(url, "balance").await?;
        decode_balance(&body)
    }

    pub async fn fetch_transactions(
        &self,
        address: &AccountAddress,
        sort: SortOrder,
    ) -> Result<Vec<RawTransaction>> {
        let url = self.account_url(
            "txlist",
            address,
            &[
                ("startblock", "0"),
                ("endblock", "99999999"),
                ("sort", sort.as_str()),
            ],
        )?;
        let body = self.get_body(url, "txlist").await?;
        decode_list(&body)
    }

    pub async fn fetch_token_transfers(
        &self,
        address: &AccountAddress,
    ) -> Result<Vec<RawTokenTransfer>> {
        let url = self.account_url(
            "tokentx",
            address,
            &[
                ("startblock", "0"),
                ("endblock", "99999999"),
                ("sort", "asc"),
            ],
        )?;
        let body = self.get_body(url, "tokentx").await?;
        decode_list(&body)
    }
}
