//! Error types for the redemption gateway

use serde::Serialize;
use thiserror::Error;

use crate::fingerprint::Fingerprint;
use crate::types::ChainId;

/// Code for input, token and state errors
pub const ERROR_CODE_REQUEST: u32 = 10001;
/// Code for ledger failures before anything was committed
pub const ERROR_CODE_COLLABORATOR: u32 = 10002;
/// Code for a committed redemption whose transfer failed
pub const ERROR_CODE_UNPAID: u32 = 10003;

#[derive(Error, Debug)]
pub enum GatewayError {
    // ========================================================================
    // Input Errors
    // ========================================================================
    #[error("Please specify a token as the setupParams")]
    MissingParams,

    #[error("Invalid JSON sent")]
    InvalidJson,

    #[error("No token sent")]
    MissingRedeemToken,

    #[error("No view token sent")]
    MissingViewToken,

    #[error("No recipient sent")]
    MissingRecipient,

    #[error("No amount sent or invalid amount")]
    InvalidAmount,

    #[error("No type sent or invalid type")]
    InvalidType,

    #[error("No token type sent")]
    MissingMode,

    #[error("Unknown token type: {0}")]
    UnknownMode(String),

    #[error("Unknown gift account: {0}")]
    UnknownGiftAccount(String),

    // ========================================================================
    // Token Errors
    // ========================================================================
    #[error("Invalid view token")]
    InvalidViewToken,

    #[error("View token from incorrect account")]
    ViewTokenWrongAccount,

    #[error("Invalid token")]
    InvalidRedeemToken,

    #[error("Token from incorrect account")]
    RedeemTokenWrongAccount,

    // ========================================================================
    // State Errors
    // ========================================================================
    #[error("Token is already redeemed")]
    AlreadyRedeemed,

    // ========================================================================
    // Collaborator Errors
    // ========================================================================
    #[error("{stage} failed: {report}")]
    Collaborator {
        stage: &'static str,
        report: eyre::Report,
    },

    /// The redemption record is committed but the funds were not sent
    #[error(
        "Redemption recorded but transfer of {amount} on chain {chain} to {recipient} failed: {report}"
    )]
    DisbursementFailed {
        fingerprint: Fingerprint,
        recipient: String,
        amount: u64,
        chain: ChainId,
        record_tx_hash: String,
        report: eyre::Report,
    },
}

impl GatewayError {
    pub fn code(&self) -> u32 {
        match self {
            GatewayError::Collaborator { .. } => ERROR_CODE_COLLABORATOR,
            GatewayError::DisbursementFailed { .. } => ERROR_CODE_UNPAID,
            _ => ERROR_CODE_REQUEST,
        }
    }

    /// Request, token and state errors: deterministic and side-effect free
    pub fn is_client_error(&self) -> bool {
        self.code() == ERROR_CODE_REQUEST
    }

    /// Short label for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            GatewayError::InvalidViewToken
            | GatewayError::ViewTokenWrongAccount
            | GatewayError::InvalidRedeemToken
            | GatewayError::RedeemTokenWrongAccount => "token",
            GatewayError::AlreadyRedeemed => "redeemed",
            GatewayError::Collaborator { .. } => "collaborator",
            GatewayError::DisbursementFailed { .. } => "unpaid",
            _ => "input",
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error_code: self.code(),
            error_description: self.to_string(),
        }
    }
}

/// Error body returned to callers
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub error_code: u32,
    pub error_description: String,
}
