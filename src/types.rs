//! Common types for the gift protocol
//!
//! Ledger-facing shapes (inbound transactions, receipts, encrypted messages)
//! and the request/response types shared by the listener and the gateway.

use serde::{de, Deserialize, Deserializer, Serialize};
use std::fmt;

/// Lowest valid gift chain
pub const MIN_CHAIN: u32 = 1;
/// Highest valid gift chain
pub const MAX_CHAIN: u32 = 5;

/// Ledger chain identifier (1..=5 on the production ledger)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u32);

impl ChainId {
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// Whether the chain is one gifts can be issued and redeemed on
    pub fn is_gift_chain(&self) -> bool {
        (MIN_CHAIN..=MAX_CHAIN).contains(&self.0)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Transaction kind as reported by the node (`type`/`subtype` pair)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    /// Payment on the parent chain
    ParentPayment,
    /// Payment on a child chain
    ChildPayment,
    Other { tx_type: i8, subtype: i8 },
}

impl TransactionKind {
    pub fn from_type_subtype(tx_type: i8, subtype: i8) -> Self {
        match (tx_type, subtype) {
            (-2, 0) => TransactionKind::ParentPayment,
            (0, 0) => TransactionKind::ChildPayment,
            (tx_type, subtype) => TransactionKind::Other { tx_type, subtype },
        }
    }

    pub fn is_payment(&self) -> bool {
        matches!(
            self,
            TransactionKind::ParentPayment | TransactionKind::ChildPayment
        )
    }
}

/// A transaction observed on the ledger with the custodial account as recipient
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundTransaction {
    pub full_hash: String,
    pub chain: ChainId,
    #[serde(rename = "type")]
    pub tx_type: i8,
    pub subtype: i8,
    #[serde(rename = "senderRS")]
    pub sender: String,
    #[serde(default)]
    pub sender_public_key: Option<String>,
    #[serde(rename = "recipientRS", default)]
    pub recipient: String,
    #[serde(rename = "amountNQT", deserialize_with = "deserialize_string_to_i64")]
    pub amount: i64,
    #[serde(default)]
    pub phased: bool,
    #[serde(default, deserialize_with = "deserialize_string_to_i64")]
    pub height: i64,
    /// Ledger timestamp (seconds since the ledger epoch)
    #[serde(default, deserialize_with = "deserialize_string_to_i64")]
    pub timestamp: i64,
}

impl InboundTransaction {
    pub fn kind(&self) -> TransactionKind {
        TransactionKind::from_type_subtype(self.tx_type, self.subtype)
    }

    /// Sender's 32-byte message public key, if the node reported it
    pub fn sender_key_bytes(&self) -> Option<[u8; 32]> {
        let raw = self.sender_public_key.as_deref()?;
        let bytes = hex::decode(raw.trim_start_matches("0x")).ok()?;
        bytes.try_into().ok()
    }
}

/// A non-conditional deposit that passed every listener guard
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deposit {
    pub tx_hash: String,
    pub amount: u64,
    pub chain: ChainId,
    pub depositor: String,
    pub is_conditional: bool,
    pub timestamp: u32,
}

impl Deposit {
    /// Build a deposit from an inbound payment; `None` when the amount is not positive
    pub fn from_transaction(tx: &InboundTransaction) -> Option<Self> {
        let amount = u64::try_from(tx.amount).ok().filter(|a| *a > 0)?;
        Some(Self {
            tx_hash: tx.full_hash.clone(),
            amount,
            chain: tx.chain,
            depositor: tx.sender.clone(),
            is_conditional: tx.phased,
            timestamp: u32::try_from(tx.timestamp.max(0)).unwrap_or(u32::MAX),
        })
    }
}

/// Receipt for a transaction the ledger accepted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub full_hash: String,
    pub chain: ChainId,
}

/// Single property entry returned by a property lookup
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct PropertyEntry {
    #[serde(default)]
    pub property: String,
    #[serde(default)]
    pub value: String,
}

/// Encrypted payload delivered to a depositor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedMessage {
    pub data: Vec<u8>,
    pub nonce: [u8; 24],
}

/// Status query answer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenStatus {
    Valid,
    Redeemed,
}

/// Requested gateway operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenMode {
    View,
    Redeem,
}

impl TokenMode {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "view" => Some(TokenMode::View),
            "redeem" => Some(TokenMode::Redeem),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TokenMode::View => "view",
            TokenMode::Redeem => "redeem",
        }
    }
}

impl fmt::Display for TokenMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Custom deserializer for node responses that return numbers as strings.
/// Handles both string "123" and numeric 123 formats.
pub(crate) fn deserialize_string_to_i64<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    struct StringOrI64Visitor;

    impl de::Visitor<'_> for StringOrI64Visitor {
        type Value = i64;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            formatter.write_str("a string or integer")
        }

        fn visit_i64<E>(self, value: i64) -> Result<i64, E>
        where
            E: de::Error,
        {
            Ok(value)
        }

        fn visit_u64<E>(self, value: u64) -> Result<i64, E>
        where
            E: de::Error,
        {
            i64::try_from(value)
                .map_err(|_| E::custom(format!("u64 {} out of range for i64", value)))
        }

        fn visit_str<E>(self, value: &str) -> Result<i64, E>
        where
            E: de::Error,
        {
            value.trim().parse().map_err(E::custom)
        }
    }

    deserializer.deserialize_any(StringOrI64Visitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_kind_from_type_subtype() {
        assert_eq!(
            TransactionKind::from_type_subtype(-2, 0),
            TransactionKind::ParentPayment
        );
        assert_eq!(
            TransactionKind::from_type_subtype(0, 0),
            TransactionKind::ChildPayment
        );
        assert!(!TransactionKind::from_type_subtype(1, 0).is_payment());
    }

    #[test]
    fn test_deserialize_inbound_with_string_amount() {
        let json = r#"{
            "fullHash": "ab12",
            "chain": 2,
            "type": 0,
            "subtype": 0,
            "senderRS": "RS-SENDER",
            "recipientRS": "RS-GIFT",
            "amountNQT": "500000000",
            "height": "208",
            "timestamp": 1000
        }"#;

        let tx: InboundTransaction = serde_json::from_str(json).unwrap();
        assert_eq!(tx.amount, 500_000_000);
        assert_eq!(tx.height, 208);
        assert_eq!(tx.chain, ChainId(2));
        assert!(!tx.phased);
        assert!(tx.kind().is_payment());
    }

    #[test]
    fn test_deposit_rejects_non_positive_amount() {
        let json = r#"{"fullHash":"x","chain":2,"type":0,"subtype":0,
            "senderRS":"a","amountNQT":0}"#;
        let tx: InboundTransaction = serde_json::from_str(json).unwrap();
        assert!(Deposit::from_transaction(&tx).is_none());
    }

    #[test]
    fn test_sender_key_bytes() {
        let json = format!(
            r#"{{"fullHash":"x","chain":2,"type":0,"subtype":0,"senderRS":"a",
            "amountNQT":1,"senderPublicKey":"{}"}}"#,
            hex::encode([9u8; 32])
        );
        let tx: InboundTransaction = serde_json::from_str(&json).unwrap();
        assert_eq!(tx.sender_key_bytes(), Some([9u8; 32]));
    }

    #[test]
    fn test_token_mode_parse() {
        assert_eq!(TokenMode::parse("view"), Some(TokenMode::View));
        assert_eq!(TokenMode::parse("redeem"), Some(TokenMode::Redeem));
        assert_eq!(TokenMode::parse("claim"), None);
        assert_eq!(TokenMode::parse(""), None);
    }

    #[test]
    fn test_token_status_serializes_lowercase() {
        assert_eq!(
            serde_json::to_string(&TokenStatus::Redeemed).unwrap(),
            "\"redeemed\""
        );
    }
}
