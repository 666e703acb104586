use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

use crate::key_pool::{KeyPool, Provider};
use crate::types::AccountAddress;
use crate::upstream::{build_http_client, check_status, UpstreamError};

const API: &str = "bitquery";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TradeTransaction {
    pub hash: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TradeExchange {
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TradeTimestamp {
    pub time: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TradeBlock {
    pub timestamp: Option<TradeTimestamp>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct DexTrade {
    pub transaction: Option<TradeTransaction>,
    pub exchange: Option<TradeExchange>,
    #[serde(rename = "tradeAmount")]
    pub trade_amount: Option<f64>,
    pub block: Option<TradeBlock>,
}

impl DexTrade {
    pub fn exchange_name(&self) -> Option<&str> {
        self.exchange
            .as_ref()?
            .name
            .as_deref()
            .filter(|n| !n.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

#[derive(Debug, Default, Deserialize)]
struct EthereumData {
    #[serde(rename = "dexTrades", default)]
    dex_trades: Option<Vec<DexTrade>>,
}

#[derive(Debug, Default, Deserialize)]
struct Data {
    ethereum: Option<EthereumData>,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    data: Option<Data>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

pub fn dex_trades_query(sender: &AccountAddress, limit: u32) -> String {
    format!(
        r#"query {{
  ethereum(network: ethereum) {{
    dexTrades(txSender: {{is: "{sender}"}}, options: {{limit: {limit}}}) {{
      transaction {{ hash }}
      exchange {{ name }}
      tradeAmount(in: USD)
      block {{ timestamp {{ time }} }}
    }}
  }}
}}"#,
        sender = sender.to_lowercase_hex(),
    )
}

fn decode_trades(body: &str) -> Result<Vec<DexTrade>> {
    let parsed: GraphQlResponse =
        serde_json::from_str(body).context("failed to decode bitquery response")?;
    if !parsed.errors.is_empty() {
        let message = parsed
            .errors
            .into_iter()
            .map(|e| e.message)
            .collect::<Vec<_>>()
            .join("; ");
        return Err(UpstreamError::Api { api: API, message }.into());
    }
    Ok(parsed
        .data
        .and_then(|d| d.ethereum)
        .and_then(|e| e.dex_trades)
        .unwrap_or_default())
}

/// Bitquery GraphQL client. A fresh bearer key is drawn for every request.
pub struct BitqueryClient {
    url: String,
    client: reqwest::Client,
    keys: Arc<KeyPool>,
}

impl BitqueryClient {
    pub fn new(url: &str, keys: Arc<KeyPool>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            url: url.to_string(),
            client: build_http_client(timeout)?,
            keys,
        })
    }

    pub async fn fetch_dex_trades(
        &self,
        sender: &AccountAddress,
        limit: u32,
    ) -> Result<Vec<DexTrade>> {
        let key = self.keys.next(Provider::Bitquery)?;
        let body = serde_json::json!({ "query": dex_trades_query(sender, limit) });
        let resp = self
            .client
            .post(&self.url)
            .bearer_auth(key)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("failed to fetch dex trades for {sender}"))?;
        let resp = check_status(API, resp).await?;
        let text = resp
            .text()
            .await
            .context("failed to read bitquery response body")?;
        decode_trades(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> AccountAddress {
        AccountAddress::parse("0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed").unwrap()
    }

    #[test]
    fn test_query_embeds_sender_and_limit() {
        let q = dex_trades_query(&addr(), 200);
        assert!(q.contains(r#"txSender: {is: "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed"}"#));
        assert!(q.contains("options: {limit: 200}"));
        assert!(q.contains("tradeAmount(in: USD)"));
    }

    #[test]
    fn test_decode_trades() {
        let body = r#"{"data":{"ethereum":{"dexTrades":[
            {"transaction":{"hash":"0x1"},"exchange":{"name":"Uniswap"},"tradeAmount":120.5,
             "block":{"timestamp":{"time":"2024-01-01 00:00:00"}}},
            {"transaction":{"hash":"0x2"},"exchange":{"name":""},"tradeAmount":null,"block":null}
        ]}}}"#;
        let trades = decode_trades(body).unwrap();
        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].exchange_name(), Some("Uniswap"));
        assert_eq!(trades[1].exchange_name(), None);
        assert!(trades[1].trade_amount.is_none());
    }

    #[test]
    fn test_decode_null_trades_is_empty() {
        let body = r#"{"data":{"ethereum":{"dexTrades":null}}}"#;
        assert!(decode_trades(body).unwrap().is_empty());
    }

    #[test]
    fn test_decode_graphql_errors() {
        let body = r#"{"data":null,"errors":[{"message":"Unauthorized"}]}"#;
        let err = decode_trades(body).unwrap_err();
        assert!(err.to_string().contains("Unauthorized"));
    }
}
