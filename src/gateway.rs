//! Redemption gateway
//!
//! Validates status and redemption requests, consults the redemption records,
//! and executes the one-time disbursement.
//!
//! # Redemption Flow
//!
//! 1. Reject malformed input before any ledger access
//! 2. Verify the view token against `"{amount}|{type}|view"`; signer must be custodial
//! 3. Look up the record under `fingerprint(view_token)`
//! 4. `view`: answer `valid` / `redeemed`, never mutating anything
//! 5. `redeem`: refuse if a record exists, verify the redeem token against
//!    `"{amount}|{type}"`, write the record (commitment point), then transfer
//!
//! The lookup and the record write are separate remote calls. Two concurrent
//! redemptions of one token can both observe "absent" unless the ledger makes
//! property writes exclusive per key. A transfer failure after the record write
//! is not rolled back; it is reported as [`GatewayError::DisbursementFailed`].

use std::sync::Arc;

use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::GatewayError;
use crate::fingerprint::Fingerprint;
use crate::ledger::{same_account, Ledger, RecordError, RedemptionLedger};
use crate::metrics;
use crate::token::{Binding, TokenCodec};
use crate::types::{ChainId, Receipt, TokenMode, TokenStatus, MAX_CHAIN, MIN_CHAIN};

/// Request body as sent by clients; every field may be missing
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRequest {
    #[serde(default)]
    pub gift_address: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_view: Option<String>,
    #[serde(default)]
    pub recipient: Option<String>,
    #[serde(default, deserialize_with = "optional_i64")]
    pub gift_amount: Option<i64>,
    #[serde(default, deserialize_with = "optional_i64")]
    pub gift_type: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

/// A validated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedemptionRequest {
    pub gift_address: Option<String>,
    pub redeem_token: String,
    pub view_token: String,
    pub recipient: String,
    pub amount: u64,
    pub chain: ChainId,
    pub mode: TokenMode,
}

impl RedemptionRequest {
    /// Parse the `setupParams` JSON string
    pub fn from_setup_params(raw: Option<&str>) -> Result<Self, GatewayError> {
        let raw = raw.ok_or(GatewayError::MissingParams)?;
        let parsed: RawRequest =
            serde_json::from_str(raw).map_err(|_| GatewayError::InvalidJson)?;
        Self::validate(parsed)
    }

    /// Field checks, in the order clients see them reported
    pub fn validate(raw: RawRequest) -> Result<Self, GatewayError> {
        let redeem_token = non_empty(raw.token).ok_or(GatewayError::MissingRedeemToken)?;
        let view_token = non_empty(raw.token_view).ok_or(GatewayError::MissingViewToken)?;
        let recipient = non_empty(raw.recipient).ok_or(GatewayError::MissingRecipient)?;

        let amount = raw
            .gift_amount
            .filter(|a| *a > 0)
            .and_then(|a| u64::try_from(a).ok())
            .ok_or(GatewayError::InvalidAmount)?;

        let chain = raw
            .gift_type
            .filter(|t| (MIN_CHAIN as i64..=MAX_CHAIN as i64).contains(t))
            .map(|t| ChainId(t as u32))
            .ok_or(GatewayError::InvalidType)?;

        let mode_raw = non_empty(raw.token_type).ok_or(GatewayError::MissingMode)?;
        let mode = TokenMode::parse(&mode_raw).ok_or(GatewayError::UnknownMode(mode_raw))?;

        Ok(Self {
            gift_address: non_empty(raw.gift_address),
            redeem_token,
            view_token,
            recipient,
            amount,
            chain,
            mode,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Accepts `123` or `"123"`; anything else reads as absent
fn optional_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = serde_json::Value::deserialize(deserializer)?;
    Ok(match value {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Successful gateway answer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum GatewayResponse {
    Status { token: TokenStatus },
    Disbursed(Receipt),
}

pub struct RedemptionGateway {
    ledger: Arc<dyn Ledger>,
    records: RedemptionLedger,
    custodian: Address,
    custodian_rs: String,
    exclusive_writes: bool,
}

impl RedemptionGateway {
    pub fn new(ledger: Arc<dyn Ledger>, custodian: Address) -> Self {
        let custodian_rs = custodian.to_checksum(None);
        let exclusive_writes = ledger.exclusive_property_writes();
        if !exclusive_writes {
            warn!(
                custodian = %custodian_rs,
                "Ledger does not guarantee exclusive property writes; concurrent redemptions \
                 of the same token can both disburse"
            );
        }
        Self {
            records: RedemptionLedger::new(ledger.clone(), custodian_rs.clone()),
            ledger,
            custodian,
            custodian_rs,
            exclusive_writes,
        }
    }

    /// Whether the ledger closes the lookup/write window between concurrent redemptions
    pub fn exclusive_property_writes(&self) -> bool {
        self.exclusive_writes
    }

    /// Custodial account served by this gateway
    pub fn custodian(&self) -> &str {
        &self.custodian_rs
    }

    /// Handle a validated request
    pub async fn handle(
        &self,
        request: &RedemptionRequest,
    ) -> Result<GatewayResponse, GatewayError> {
        let result = self.process(request).await;
        let outcome = match &result {
            Ok(GatewayResponse::Status { token }) => match token {
                TokenStatus::Valid => "valid",
                TokenStatus::Redeemed => "redeemed",
            },
            Ok(GatewayResponse::Disbursed(_)) => "disbursed",
            Err(e) => e.kind(),
        };
        metrics::record_request(request.mode.as_str(), outcome);
        result
    }

    async fn process(&self, request: &RedemptionRequest) -> Result<GatewayResponse, GatewayError> {
        if let Some(ref gift_address) = request.gift_address {
            if !same_account(gift_address, &self.custodian_rs) {
                return Err(GatewayError::UnknownGiftAccount(gift_address.clone()));
            }
        }

        let view_binding = Binding::view(request.amount, request.chain);
        let view_check = TokenCodec::verify(&request.view_token, &view_binding);
        if !view_check.is_valid() {
            return Err(GatewayError::InvalidViewToken);
        }
        if !view_check.signed_by(&self.custodian) {
            return Err(GatewayError::ViewTokenWrongAccount);
        }

        let fingerprint = Fingerprint::digest(&request.view_token);
        let record = self
            .records
            .get(&self.custodian_rs, &fingerprint)
            .await
            .map_err(|e| collaborator("record lookup", e))?;

        match request.mode {
            TokenMode::View => {
                let token = if record.is_some() {
                    TokenStatus::Redeemed
                } else {
                    TokenStatus::Valid
                };
                debug!(fingerprint = %fingerprint, status = ?token, "Token status query");
                Ok(GatewayResponse::Status { token })
            }
            TokenMode::Redeem => {
                if let Some(previous) = record {
                    info!(
                        fingerprint = %fingerprint,
                        recorded_recipient = %previous,
                        "Redemption refused, token already redeemed"
                    );
                    return Err(GatewayError::AlreadyRedeemed);
                }
                self.redeem(request, fingerprint).await
            }
        }
    }

    async fn redeem(
        &self,
        request: &RedemptionRequest,
        fingerprint: Fingerprint,
    ) -> Result<GatewayResponse, GatewayError> {
        let redeem_binding = Binding::redeem(request.amount, request.chain);
        let check = TokenCodec::verify(&request.redeem_token, &redeem_binding);
        if !check.is_valid() {
            return Err(GatewayError::InvalidRedeemToken);
        }
        if !check.signed_by(&self.custodian) {
            return Err(GatewayError::RedeemTokenWrongAccount);
        }

        // Commitment point: from here on the token counts as redeemed
        let record_receipt = self
            .records
            .set(&self.custodian_rs, &fingerprint, &request.recipient)
            .await
            .map_err(|e| collaborator("record write", e))?;

        info!(
            fingerprint = %fingerprint,
            recipient = %request.recipient,
            amount = request.amount,
            chain = %request.chain,
            record_tx = %record_receipt.full_hash,
            "Redemption recorded, disbursing"
        );

        match self
            .ledger
            .transfer(request.chain, &request.recipient, request.amount)
            .await
        {
            Ok(receipt) => {
                metrics::REDEMPTIONS.inc();
                info!(
                    fingerprint = %fingerprint,
                    transfer_tx = %receipt.full_hash,
                    "Redemption disbursed"
                );
                Ok(GatewayResponse::Disbursed(receipt))
            }
            Err(report) => {
                metrics::UNPAID_REDEMPTIONS.inc();
                error!(
                    fingerprint = %fingerprint,
                    recipient = %request.recipient,
                    amount = request.amount,
                    chain = %request.chain,
                    record_tx = %record_receipt.full_hash,
                    error = %report,
                    "REDEMPTION RECORDED BUT NOT DISBURSED: funds owed, operator action required"
                );
                Err(GatewayError::DisbursementFailed {
                    fingerprint,
                    recipient: request.recipient.clone(),
                    amount: request.amount,
                    chain: request.chain,
                    record_tx_hash: record_receipt.full_hash,
                    report,
                })
            }
        }
    }
}

fn collaborator(stage: &'static str, err: RecordError) -> GatewayError {
    metrics::record_error("gateway", stage);
    let report = match err {
        RecordError::Store(report) => report,
        other => eyre::eyre!(other.to_string()),
    };
    GatewayError::Collaborator { stage, report }
}
