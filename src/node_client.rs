//! Ledger node HTTP client
//!
//! Talks to the node's `/nxt` endpoint with form-encoded `requestType` calls.
//! Implements both [`Ledger`] and [`DepositSource`].

use std::time::Duration;

use async_trait::async_trait;
use eyre::{eyre, Result, WrapErr};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info};

use crate::ledger::{DepositSource, Ledger};
use crate::types::{
    deserialize_string_to_i64, ChainId, EncryptedMessage, InboundTransaction, PropertyEntry,
    Receipt,
};

/// Node client for custodial writes and deposit discovery
pub struct NodeClient {
    /// Node API endpoint (`{NODE_URL}/nxt`)
    endpoint: String,
    /// Credential the node signs custodial transactions with
    signing_secret: Option<String>,
    /// Chain redemption records are written on
    property_chain: ChainId,
    client: Client,
}

#[derive(Debug, Deserialize)]
struct PropertiesResponse {
    #[serde(default)]
    properties: Vec<PropertyEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransactionResponse {
    full_hash: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PublicKeyResponse {
    #[serde(default)]
    public_key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BlockchainStatus {
    #[serde(deserialize_with = "deserialize_string_to_i64")]
    number_of_blocks: i64,
}

#[derive(Debug, Deserialize)]
struct ExecutedTransactions {
    #[serde(default)]
    transactions: Vec<InboundTransaction>,
}

impl NodeClient {
    pub fn new(
        node_url: &str,
        signing_secret: Option<String>,
        property_chain: ChainId,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .wrap_err("Failed to create HTTP client")?;

        let endpoint = format!("{}/nxt", node_url.trim_end_matches('/'));
        info!(
            endpoint = %endpoint,
            property_chain = %property_chain,
            signing = signing_secret.is_some(),
            "Node client initialized"
        );

        Ok(Self {
            endpoint,
            signing_secret,
            property_chain,
            client,
        })
    }

    /// Issue a `requestType` call and decode the JSON answer
    async fn call<T: DeserializeOwned>(
        &self,
        request_type: &str,
        params: &[(&str, String)],
    ) -> Result<T> {
        let mut form: Vec<(&str, String)> = Vec::with_capacity(params.len() + 2);
        form.push(("requestType", request_type.to_string()));
        form.extend(params.iter().cloned());

        debug!(request_type = request_type, "Node request");

        let response = self
            .client
            .post(&self.endpoint)
            .form(&form)
            .send()
            .await
            .wrap_err_with(|| format!("{} request failed", request_type))?;

        if !response.status().is_success() {
            return Err(eyre!(
                "{} failed: {} - {}",
                request_type,
                response.status(),
                response.text().await.unwrap_or_default()
            ));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .wrap_err_with(|| format!("{} returned invalid JSON", request_type))?;

        decode_response(request_type, body)
    }

    /// Form params for a transaction signed on behalf of the custodial account
    fn signed(&self, mut params: Vec<(&'static str, String)>) -> Vec<(&'static str, String)> {
        if let Some(ref secret) = self.signing_secret {
            params.push(("secretPhrase", secret.clone()));
        }
        params.push(("broadcast", "true".to_string()));
        params
    }
}

/// Decode a node answer, turning `errorCode` bodies into errors
fn decode_response<T: DeserializeOwned>(request_type: &str, body: serde_json::Value) -> Result<T> {
    if let Some(code) = body.get("errorCode") {
        let description = body
            .get("errorDescription")
            .and_then(|v| v.as_str())
            .unwrap_or("Unknown error");
        return Err(eyre!(
            "{} rejected by node (code {}): {}",
            request_type,
            code,
            description
        ));
    }
    serde_json::from_value(body).wrap_err_with(|| format!("Unexpected {} response", request_type))
}

#[async_trait]
impl Ledger for NodeClient {
    async fn property_get(
        &self,
        owner: &str,
        setter: &str,
        key: &str,
    ) -> Result<Vec<PropertyEntry>> {
        let response: PropertiesResponse = self
            .call(
                "getAccountProperties",
                &[
                    ("recipient", owner.to_string()),
                    ("setter", setter.to_string()),
                    ("property", key.to_string()),
                ],
            )
            .await?;
        Ok(response.properties)
    }

    async fn property_set(&self, owner: &str, key: &str, value: &str) -> Result<Receipt> {
        let params = self.signed(vec![
            ("chain", self.property_chain.to_string()),
            ("recipient", owner.to_string()),
            ("property", key.to_string()),
            ("value", value.to_string()),
        ]);
        let response: TransactionResponse = self.call("setAccountProperty", &params).await?;
        Ok(Receipt {
            full_hash: response.full_hash,
            chain: self.property_chain,
        })
    }

    async fn transfer(&self, chain: ChainId, recipient: &str, amount: u64) -> Result<Receipt> {
        let params = self.signed(vec![
            ("chain", chain.to_string()),
            ("recipient", recipient.to_string()),
            ("amountNQT", amount.to_string()),
        ]);
        let response: TransactionResponse = self.call("sendMoney", &params).await?;
        info!(
            tx_hash = %response.full_hash,
            chain = %chain,
            recipient = %recipient,
            amount = amount,
            "Transfer submitted"
        );
        Ok(Receipt {
            full_hash: response.full_hash,
            chain,
        })
    }

    async fn send_message(
        &self,
        chain: ChainId,
        recipient: &str,
        message: &EncryptedMessage,
    ) -> Result<Receipt> {
        let params = self.signed(vec![
            ("chain", chain.to_string()),
            ("recipient", recipient.to_string()),
            ("encryptedMessageData", hex::encode(&message.data)),
            ("encryptedMessageNonce", hex::encode(message.nonce)),
            ("encryptedMessageIsPrunable", "true".to_string()),
        ]);
        let response: TransactionResponse = self.call("sendMessage", &params).await?;
        Ok(Receipt {
            full_hash: response.full_hash,
            chain,
        })
    }

    async fn account_public_key(&self, account: &str) -> Result<Option<[u8; 32]>> {
        let response: PublicKeyResponse = self
            .call("getAccountPublicKey", &[("account", account.to_string())])
            .await?;
        parse_public_key(response.public_key.as_deref())
    }
}

#[async_trait]
impl DepositSource for NodeClient {
    async fn current_height(&self) -> Result<u64> {
        let status: BlockchainStatus = self.call("getBlockchainStatus", &[]).await?;
        Ok(u64::try_from(status.number_of_blocks - 1).unwrap_or(0))
    }

    async fn incoming_transactions(
        &self,
        account: &str,
        chain: ChainId,
        height: u64,
    ) -> Result<Vec<InboundTransaction>> {
        let response: ExecutedTransactions = self
            .call(
                "getExecutedTransactions",
                &[
                    ("chain", chain.to_string()),
                    ("height", height.to_string()),
                    ("recipient", account.to_string()),
                ],
            )
            .await?;
        Ok(response.transactions)
    }
}

fn parse_public_key(raw: Option<&str>) -> Result<Option<[u8; 32]>> {
    let Some(raw) = raw.filter(|r| !r.is_empty()) else {
        return Ok(None);
    };
    let bytes = hex::decode(raw.trim_start_matches("0x")).wrap_err("Invalid public key hex")?;
    let key: [u8; 32] = bytes
        .try_into()
        .map_err(|_| eyre!("Public key must be 32 bytes"))?;
    Ok(Some(key))
}
