//! Maker key and EIP-712 signing.

use alloy_primitives::{keccak256, Address, B256};
use alloy_signer::Signer;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolValue;
use std::str::FromStr;

use super::domain::Eip712Domain;
use super::order::{OrderData, SignedOrder};
use crate::{Error, Result};

/// Signs orders with the maker's private key.
#[derive(Clone)]
pub struct OrderSigner {
    signer: PrivateKeySigner,
    domain: Eip712Domain,
}

impl OrderSigner {
    pub fn new(signer: PrivateKeySigner, domain: Eip712Domain) -> Self {
        Self { signer, domain }
    }

    /// Parse a hex private key, with or without `0x`.
    #[allow(clippy::result_large_err)]
    pub fn from_private_key(key: &str, domain: Eip712Domain) -> Result<Self> {
        let signer = PrivateKeySigner::from_str(key.trim()).map_err(|e| Error::Signing {
            message: format!("Invalid private key: {}", e),
        })?;
        Ok(Self::new(signer, domain))
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    pub fn domain(&self) -> &Eip712Domain {
        &self.domain
    }

    /// Sign `order`; the order's maker must be this key.
    pub async fn sign_order(&self, order: &OrderData) -> Result<SignedOrder> {
        if order.signer != self.address() {
            return Err(Error::Signing {
                message: format!(
                    "order signer {} does not match key {}",
                    order.signer,
                    self.address()
                ),
            });
        }

        let digest = typed_data_digest(self.domain.separator(), order.struct_hash());
        let signature = self
            .signer
            .sign_hash(&digest)
            .await
            .map_err(|e| Error::Signing {
                message: format!("Failed to sign order: {}", e),
            })?;

        Ok(SignedOrder::new(
            order,
            format!("0x{}", hex::encode(signature.as_bytes())),
        ))
    }
}

/// `keccak256("\x19\x01" ‖ domainSeparator ‖ structHash)`.
fn typed_data_digest(domain_separator: B256, struct_hash: B256) -> B256 {
    let encoded = ([0x19u8, 0x01u8], domain_separator, struct_hash).abi_encode_packed();
    keccak256(&encoded)
}

impl std::fmt::Debug for OrderSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderSigner")
            .field("address", &self.address())
            .field("verifying_contract", &self.domain.verifying_contract)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OrderSide;
    use rust_decimal::Decimal;

    // Well-known development key; holds nothing.
    const DEV_KEY: &str = "ac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
    const DEV_ADDRESS: &str = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266";

    fn signer() -> OrderSigner {
        OrderSigner::from_private_key(DEV_KEY, Eip712Domain::ctf_exchange()).unwrap()
    }

    fn order(signer: &OrderSigner) -> OrderData {
        let mut order = OrderData::limit(
            signer.address(),
            "71321045679252212594626385532706912750332728571942532289631379312455583992563",
            OrderSide::Buy,
            Decimal::new(492, 3),
            Decimal::new(20325, 2),
            1_700_003_600,
        )
        .unwrap();
        order.salt = 1234;
        order
    }

    #[test]
    fn test_address_from_key() {
        assert_eq!(signer().address(), DEV_ADDRESS.parse::<Address>().unwrap());
        assert!(OrderSigner::from_private_key("0xnothex", Eip712Domain::ctf_exchange()).is_err());
    }

    #[tokio::test]
    async fn test_signed_payload_shape() {
        let signer = signer();
        let signed = signer.sign_order(&order(&signer)).await.unwrap();

        assert!(signed.signature.starts_with("0x"));
        assert_eq!(signed.signature.len(), 2 + 65 * 2);
        assert_eq!(signed.maker, DEV_ADDRESS);
        assert_eq!(signed.signer, DEV_ADDRESS);
        assert_eq!(signed.side, "BUY");
        assert_eq!(signed.salt, 1234);

        let json = serde_json::to_value(&signed).unwrap();
        for field in [
            "salt", "maker", "signer", "taker", "tokenId", "makerAmount", "takerAmount",
            "expiration", "nonce", "feeRateBps", "side", "signatureType", "signature",
        ] {
            assert!(json.get(field).is_some(), "missing {}", field);
        }
    }

    #[tokio::test]
    async fn test_signature_is_deterministic_and_domain_bound() {
        let signer = signer();
        let order = order(&signer);
        let a = signer.sign_order(&order).await.unwrap();
        let b = signer.sign_order(&order).await.unwrap();
        assert_eq!(a.signature, b.signature);

        let neg_risk = OrderSigner::from_private_key(DEV_KEY, Eip712Domain::neg_risk_ctf_exchange()).unwrap();
        let c = neg_risk.sign_order(&order).await.unwrap();
        assert_ne!(a.signature, c.signature);
    }

    #[tokio::test]
    async fn test_foreign_maker_refused() {
        let signer = signer();
        let mut order = order(&signer);
        order.signer = Address::ZERO;
        assert!(matches!(signer.sign_order(&order).await, Err(Error::Signing { .. })));
    }

    #[test]
    fn test_debug_hides_key() {
        let debug = format!("{:?}", signer());
        assert!(debug.contains("OrderSigner"));
        assert!(!debug.contains(DEV_KEY));
    }
}
