//! Signed gift tokens
//!
//! A token binds an opaque payload (the *binding*) to the custodial signer.
//! Layout of the decoded token bytes:
//!
//! ```text
//! Bytes 0-19:   signer address
//! Bytes 20-23:  issued_at (u32, big-endian)
//! Bytes 24-88:  signature (65 bytes, r || s || v)
//! ```
//!
//! The signature covers `binding || signer || issued_at` as a personal message,
//! so a token only verifies against the exact binding it was issued for.

use std::fmt;

use alloy::primitives::{Address, PrimitiveSignature};
use alloy::signers::local::PrivateKeySigner;
use alloy::signers::SignerSync;
use eyre::{eyre, Result};

use crate::types::ChainId;

const ADDRESS_LEN: usize = 20;
const TIMESTAMP_LEN: usize = 4;
const SIGNATURE_LEN: usize = 65;
const TOKEN_LEN: usize = ADDRESS_LEN + TIMESTAMP_LEN + SIGNATURE_LEN;

/// floor(n / 2) for the secp256k1 group order n
const SECP256K1_HALF_ORDER: [u8; 32] = [
    0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0xff, 0x5d, 0x57, 0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d, 0xdf, 0xe9, 0x2f, 0x46, 0x68, 0x1b,
    0x20, 0xa0,
];

/// Separator between redeem and view token in the delivered message
pub const PAIR_SEPARATOR: &str = "|||";

/// Payload a token is bound to: `"{amount}|{chain}"` or `"{amount}|{chain}|view"`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub amount: u64,
    pub chain: ChainId,
    pub view: bool,
}

impl Binding {
    pub fn redeem(amount: u64, chain: ChainId) -> Self {
        Self {
            amount,
            chain,
            view: false,
        }
    }

    pub fn view(amount: u64, chain: ChainId) -> Self {
        Self {
            amount,
            chain,
            view: true,
        }
    }
}

impl fmt::Display for Binding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}", self.amount, self.chain)?;
        if self.view {
            f.write_str("|view")?;
        }
        Ok(())
    }
}

/// Outcome of verifying a token against a binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenCheck {
    Invalid,
    Valid { signer: Address, issued_at: u32 },
}

impl TokenCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, TokenCheck::Valid { .. })
    }

    /// True when the token is valid and was signed by `account`
    pub fn signed_by(&self, account: &Address) -> bool {
        matches!(self, TokenCheck::Valid { signer, .. } if signer == account)
    }
}

/// Redeem/view token pair issued for one deposit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub redeem: String,
    pub view: String,
}

impl TokenPair {
    /// Plaintext delivered to the depositor
    pub fn to_message(&self) -> String {
        format!("{}{}{}", self.redeem, PAIR_SEPARATOR, self.view)
    }

    pub fn from_message(message: &str) -> Option<Self> {
        let (redeem, view) = message.split_once(PAIR_SEPARATOR)?;
        if redeem.is_empty() || view.is_empty() {
            return None;
        }
        Some(Self {
            redeem: redeem.to_string(),
            view: view.to_string(),
        })
    }
}

/// Issues and verifies tokens for the custodial account
pub struct TokenCodec {
    signer: PrivateKeySigner,
}

impl TokenCodec {
    pub fn new(signer: PrivateKeySigner) -> Self {
        Self { signer }
    }

    /// Create from a hex private key (with or without 0x prefix)
    pub fn from_private_key(private_key: &str) -> Result<Self> {
        let signer: PrivateKeySigner = private_key
            .parse()
            .map_err(|e| eyre!("Invalid custodian private key: {}", e))?;
        Ok(Self::new(signer))
    }

    /// Address every issued token verifies to
    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Sign `binding`; the same binding and timestamp always produce the same token
    pub fn issue(&self, binding: &Binding, issued_at: u32) -> Result<String> {
        let address = self.signer.address();
        let message = signing_message(binding, &address, issued_at);
        let signature = self
            .signer
            .sign_message_sync(&message)
            .map_err(|e| eyre!("Failed to sign token: {}", e))?;

        let mut raw = Vec::with_capacity(TOKEN_LEN);
        raw.extend_from_slice(address.as_slice());
        raw.extend_from_slice(&issued_at.to_be_bytes());
        raw.extend_from_slice(&signature.as_bytes());
        Ok(hex::encode(raw))
    }

    /// Issue the redeem and view tokens for a deposit
    pub fn issue_pair(&self, amount: u64, chain: ChainId, issued_at: u32) -> Result<TokenPair> {
        Ok(TokenPair {
            redeem: self.issue(&Binding::redeem(amount, chain), issued_at)?,
            view: self.issue(&Binding::view(amount, chain), issued_at)?,
        })
    }

    /// Verify `token` against `binding`. Any malformed or non-canonical token
    /// is `Invalid`: lowercase hex only, v in {27, 28}, low-s.
    ///
    /// The record key is derived from the literal token string, so exactly one
    /// spelling of a token may verify.
    pub fn verify(token: &str, binding: &Binding) -> TokenCheck {
        let Ok(raw) = hex::decode(token) else {
            return TokenCheck::Invalid;
        };
        if raw.len() != TOKEN_LEN || hex::encode(&raw) != token {
            return TokenCheck::Invalid;
        }

        let claimed = Address::from_slice(&raw[..ADDRESS_LEN]);
        let mut ts = [0u8; TIMESTAMP_LEN];
        ts.copy_from_slice(&raw[ADDRESS_LEN..ADDRESS_LEN + TIMESTAMP_LEN]);
        let issued_at = u32::from_be_bytes(ts);

        let sig_bytes = &raw[ADDRESS_LEN + TIMESTAMP_LEN..];
        if !is_canonical_signature(sig_bytes) {
            return TokenCheck::Invalid;
        }
        let Ok(signature) = PrimitiveSignature::try_from(sig_bytes) else {
            return TokenCheck::Invalid;
        };
        if signature.as_bytes()[..] != *sig_bytes {
            return TokenCheck::Invalid;
        }

        let message = signing_message(binding, &claimed, issued_at);
        match signature.recover_address_from_msg(&message) {
            Ok(recovered) if recovered == claimed => TokenCheck::Valid {
                signer: recovered,
                issued_at,
            },
            _ => TokenCheck::Invalid,
        }
    }
}

/// `r || s || v` with v in {27, 28} and s in the lower half of the curve order
fn is_canonical_signature(sig: &[u8]) -> bool {
    if sig.len() != SIGNATURE_LEN {
        return false;
    }
    let v = sig[SIGNATURE_LEN - 1];
    // Big-endian byte order compares like the integer
    let s = &sig[32..64];
    (v == 27 || v == 28) && s <= &SECP256K1_HALF_ORDER[..]
}

fn signing_message(binding: &Binding, signer: &Address, issued_at: u32) -> Vec<u8> {
    let binding = binding.to_string();
    let mut message = Vec::with_capacity(binding.len() + ADDRESS_LEN + TIMESTAMP_LEN);
    message.extend_from_slice(binding.as_bytes());
    message.extend_from_slice(signer.as_slice());
    message.extend_from_slice(&issued_at.to_be_bytes());
    message
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    fn codec() -> TokenCodec {
        TokenCodec::from_private_key(
            "0x0000000000000000000000000000000000000000000000000000000000000001",
        )
        .unwrap()
    }

    #[test]
    fn test_binding_format() {
        assert_eq!(Binding::redeem(500000000, ChainId(2)).to_string(), "500000000|2");
        assert_eq!(
            Binding::view(500000000, ChainId(2)).to_string(),
            "500000000|2|view"
        );
    }

    #[test]
    fn test_issue_then_verify() {
        let codec = codec();
        let binding = Binding::redeem(1000, ChainId(2));
        let token = codec.issue(&binding, 42).unwrap();

        assert_eq!(token.len(), TOKEN_LEN * 2);
        let check = TokenCodec::verify(&token, &binding);
        assert!(check.signed_by(&codec.address()));
        assert_eq!(
            check,
            TokenCheck::Valid {
                signer: codec.address(),
                issued_at: 42
            }
        );
    }

    #[test]
    fn test_token_does_not_verify_against_other_binding() {
        let codec = codec();
        let pair = codec.issue_pair(1000, ChainId(2), 7).unwrap();

        assert!(!TokenCodec::verify(&pair.redeem, &Binding::view(1000, ChainId(2))).is_valid());
        assert!(!TokenCodec::verify(&pair.view, &Binding::redeem(1000, ChainId(2))).is_valid());
        assert!(!TokenCodec::verify(&pair.redeem, &Binding::redeem(1001, ChainId(2))).is_valid());
        assert!(!TokenCodec::verify(&pair.redeem, &Binding::redeem(1000, ChainId(3))).is_valid());
    }

    #[test]
    fn test_issue_is_deterministic_for_same_timestamp() {
        let codec = codec();
        let a = codec.issue_pair(5, ChainId(1), 100).unwrap();
        let b = codec.issue_pair(5, ChainId(1), 100).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_malformed_tokens_fail_closed() {
        let binding = Binding::redeem(1, ChainId(1));
        assert_eq!(TokenCodec::verify("", &binding), TokenCheck::Invalid);
        assert_eq!(TokenCodec::verify("zz", &binding), TokenCheck::Invalid);
        assert_eq!(TokenCodec::verify("abcd", &binding), TokenCheck::Invalid);
        assert_eq!(
            TokenCodec::verify(&"00".repeat(TOKEN_LEN), &binding),
            TokenCheck::Invalid
        );
    }

    #[test]
    fn test_tampered_address_is_invalid() {
        let codec = codec();
        let binding = Binding::view(10, ChainId(2));
        let token = codec.issue(&binding, 1).unwrap();

        let mut raw = hex::decode(&token).unwrap();
        raw[0] ^= 0xff;
        assert_eq!(
            TokenCodec::verify(&hex::encode(raw), &binding),
            TokenCheck::Invalid
        );
    }

    #[test]
    fn test_other_signer_is_valid_but_not_ours() {
        let ours = codec();
        let theirs = TokenCodec::new(PrivateKeySigner::random());
        let binding = Binding::view(10, ChainId(2));
        let token = theirs.issue(&binding, 1).unwrap();

        let check = TokenCodec::verify(&token, &binding);
        assert!(check.is_valid());
        assert!(!check.signed_by(&ours.address()));
    }

    /// secp256k1 group order n
    const SECP256K1_ORDER: [u8; 32] = [
        0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
        0xfe, 0xba, 0xae, 0xdc, 0xe6, 0xaf, 0x48, 0xa0, 0x3b, 0xbf, 0xd2, 0x5e, 0x8c, 0xd0, 0x36,
        0x41, 0x41,
    ];

    const S_RANGE: std::ops::Range<usize> = ADDRESS_LEN + TIMESTAMP_LEN + 32..TOKEN_LEN - 1;

    /// Same signature with s replaced by n - s and the parity flipped
    pub(crate) fn high_s_twin(token: &str) -> String {
        use alloy::primitives::U256;

        let mut raw = hex::decode(token).unwrap();
        let n = U256::from_be_bytes(SECP256K1_ORDER);
        let s = U256::from_be_slice(&raw[S_RANGE]);
        raw[S_RANGE].copy_from_slice(&(n - s).to_be_bytes::<32>());
        raw[TOKEN_LEN - 1] = if raw[TOKEN_LEN - 1] == 27 { 28 } else { 27 };
        hex::encode(raw)
    }

    #[test]
    fn test_half_order_constant() {
        use alloy::primitives::U256;

        let n = U256::from_be_bytes(SECP256K1_ORDER);
        assert_eq!(U256::from_be_bytes(SECP256K1_HALF_ORDER), n >> 1);
    }

    #[test]
    fn test_issued_tokens_are_canonical() {
        let codec = codec();
        let token = codec.issue(&Binding::view(10, ChainId(2)), 1).unwrap();
        let raw = hex::decode(&token).unwrap();

        assert_eq!(token, token.to_lowercase());
        assert!(is_canonical_signature(&raw[ADDRESS_LEN + TIMESTAMP_LEN..]));
    }

    #[test]
    fn test_alternate_spellings_are_invalid() {
        let codec = codec();
        let binding = Binding::view(500_000_000, ChainId(2));
        let token = codec.issue(&binding, 1).unwrap();
        assert!(TokenCodec::verify(&token, &binding).is_valid());

        let mut low_v = hex::decode(&token).unwrap();
        low_v[TOKEN_LEN - 1] -= 27;

        let variants = [
            token.to_uppercase(),
            format!(" {}", token),
            format!("{}\n", token),
            format!("0x{}", token),
            hex::encode(low_v),
            high_s_twin(&token),
        ];
        for variant in variants {
            assert_eq!(
                TokenCodec::verify(&variant, &binding),
                TokenCheck::Invalid,
                "accepted non-canonical token {:?}",
                variant
            );
        }
    }

    #[test]
    fn test_high_s_twin_is_a_real_signature() {
        // The twin recovers to the same signer; only the canonical check rejects it
        let codec = codec();
        let binding = Binding::redeem(7, ChainId(1));
        let token = codec.issue(&binding, 3).unwrap();
        let twin = hex::decode(high_s_twin(&token)).unwrap();

        let sig = &twin[ADDRESS_LEN + TIMESTAMP_LEN..];
        let signature = PrimitiveSignature::try_from(sig).unwrap();
        let message = signing_message(&binding, &codec.address(), 3);
        assert_eq!(
            signature.recover_address_from_msg(&message).unwrap(),
            codec.address()
        );
        assert!(!is_canonical_signature(sig));
    }

    #[test]
    fn test_pair_message_roundtrip() {
        let pair = TokenPair {
            redeem: "aa".to_string(),
            view: "bb".to_string(),
        };
        assert_eq!(pair.to_message(), "aa|||bb");
        assert_eq!(TokenPair::from_message("aa|||bb"), Some(pair));
        assert_eq!(TokenPair::from_message("aa"), None);
        assert_eq!(TokenPair::from_message("|||bb"), None);
    }
}
