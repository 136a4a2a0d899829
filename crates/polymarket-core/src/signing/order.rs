//! The exchange `Order` struct and its signed wire form.

use alloy_primitives::{keccak256, Address, B256, U256};
use alloy_sol_types::SolValue;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::domain::SignatureType;
use crate::types::OrderSide;
use crate::{Error, Result};

/// USDC and outcome tokens both use six decimals.
const BASE_UNITS: i64 = 1_000_000;

/// Salts are JSON numbers on the wire; keep them inside the f64-exact range.
const SALT_MASK: u64 = (1 << 53) - 1;

/// Fields hashed into the EIP-712 `Order` struct.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderData {
    pub salt: u64,
    pub maker: Address,
    pub signer: Address,
    /// Zero for a public order.
    pub taker: Address,
    pub token_id: U256,
    pub maker_amount: U256,
    pub taker_amount: U256,
    /// Unix seconds; zero for orders that do not expire.
    pub expiration: u64,
    pub nonce: u64,
    pub fee_rate_bps: u64,
    pub side: OrderSide,
    pub signature_type: SignatureType,
}

impl OrderData {
    /// A limit order for `shares` outcome tokens at `price` USDC each.
    ///
    /// A buy gives USDC and receives tokens; a sell gives tokens and
    /// receives USDC.
    #[allow(clippy::result_large_err)]
    pub fn limit(
        maker: Address,
        token_id: &str,
        side: OrderSide,
        price: Decimal,
        shares: Decimal,
        expiration: u64,
    ) -> Result<Self> {
        let token_id = U256::from_str_radix(token_id, 10)
            .map_err(|e| Error::InvalidMarket(format!("token id {:?} is not a uint256: {}", token_id, e)))?;
        if price <= Decimal::ZERO || price >= Decimal::ONE || shares <= Decimal::ZERO {
            return Err(Error::InvalidDecision(format!(
                "cannot sign order for {} shares at {}",
                shares, price
            )));
        }

        let tokens = to_base_units(shares)?;
        let usdc = to_base_units(shares * price)?;
        let (maker_amount, taker_amount) = match side {
            OrderSide::Buy => (usdc, tokens),
            OrderSide::Sell => (tokens, usdc),
        };

        Ok(Self {
            salt: fresh_salt(),
            maker,
            signer: maker,
            taker: Address::ZERO,
            token_id,
            maker_amount,
            taker_amount,
            expiration,
            nonce: 0,
            fee_rate_bps: 0,
            side,
            signature_type: SignatureType::Eoa,
        })
    }

    pub fn with_fee_rate_bps(mut self, fee_rate_bps: u64) -> Self {
        self.fee_rate_bps = fee_rate_bps;
        self
    }

    /// `hashStruct(Order)`.
    pub fn struct_hash(&self) -> B256 {
        let type_hash = keccak256(
            b"Order(uint256 salt,address maker,address signer,address taker,uint256 tokenId,uint256 makerAmount,uint256 takerAmount,uint256 expiration,uint256 nonce,uint256 feeRateBps,uint8 side,uint8 signatureType)",
        );
        let encoded = (
            type_hash,
            U256::from(self.salt),
            B256::left_padding_from(self.maker.as_slice()),
            B256::left_padding_from(self.signer.as_slice()),
            B256::left_padding_from(self.taker.as_slice()),
            self.token_id,
            self.maker_amount,
            self.taker_amount,
            U256::from(self.expiration),
            U256::from(self.nonce),
            U256::from(self.fee_rate_bps),
            U256::from(side_code(self.side)),
            U256::from(self.signature_type.as_u8()),
        )
            .abi_encode_packed();
        keccak256(&encoded)
    }
}

fn side_code(side: OrderSide) -> u8 {
    match side {
        OrderSide::Buy => 0,
        OrderSide::Sell => 1,
    }
}

#[allow(clippy::result_large_err)]
fn to_base_units(amount: Decimal) -> Result<U256> {
    (amount * Decimal::from(BASE_UNITS))
        .round()
        .to_u128()
        .map(U256::from)
        .ok_or_else(|| Error::InvalidDecision(format!("amount {} not representable", amount)))
}

fn fresh_salt() -> u64 {
    (uuid::Uuid::new_v4().as_u128() as u64) & SALT_MASK
}

/// Order body accepted by `POST /order`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedOrder {
    pub salt: u64,
    pub maker: String,
    pub signer: String,
    pub taker: String,
    pub token_id: String,
    pub maker_amount: String,
    pub taker_amount: String,
    pub expiration: String,
    pub nonce: String,
    pub fee_rate_bps: String,
    /// "BUY" or "SELL".
    pub side: String,
    pub signature_type: u8,
    /// 0x-prefixed 65-byte signature.
    pub signature: String,
}

impl SignedOrder {
    pub fn new(order: &OrderData, signature: String) -> Self {
        Self {
            salt: order.salt,
            maker: order.maker.to_checksum(None),
            signer: order.signer.to_checksum(None),
            taker: order.taker.to_checksum(None),
            token_id: order.token_id.to_string(),
            maker_amount: order.maker_amount.to_string(),
            taker_amount: order.taker_amount.to_string(),
            expiration: order.expiration.to_string(),
            nonce: order.nonce.to_string(),
            fee_rate_bps: order.fee_rate_bps.to_string(),
            side: order.side.as_str().to_string(),
            signature_type: order.signature_type.as_u8(),
            signature,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn maker() -> Address {
        "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266".parse().unwrap()
    }

    #[test]
    fn test_buy_gives_usdc_for_tokens() {
        // 203.25 shares at 0.492
        let order =
            OrderData::limit(maker(), "123", OrderSide::Buy, Decimal::new(492, 3), Decimal::new(20325, 2), 0).unwrap();
        assert_eq!(order.maker_amount, U256::from(99_999_000u64));
        assert_eq!(order.taker_amount, U256::from(203_250_000u64));
        assert_eq!(order.signer, order.maker);
        assert_eq!(order.taker, Address::ZERO);
        assert!(order.salt <= SALT_MASK);
    }

    #[test]
    fn test_sell_gives_tokens_for_usdc() {
        let order =
            OrderData::limit(maker(), "123", OrderSide::Sell, Decimal::new(5, 1), Decimal::new(100, 0), 0).unwrap();
        assert_eq!(order.maker_amount, U256::from(100_000_000u64));
        assert_eq!(order.taker_amount, U256::from(50_000_000u64));
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        assert!(matches!(
            OrderData::limit(maker(), "not-a-number", OrderSide::Buy, Decimal::new(5, 1), Decimal::ONE, 0),
            Err(Error::InvalidMarket(_))
        ));
        assert!(OrderData::limit(maker(), "1", OrderSide::Buy, Decimal::ONE, Decimal::ONE, 0).is_err());
        assert!(OrderData::limit(maker(), "1", OrderSide::Buy, Decimal::new(5, 1), Decimal::ZERO, 0).is_err());
    }

    #[test]
    fn test_struct_hash_covers_every_field() {
        let mut order =
            OrderData::limit(maker(), "123", OrderSide::Buy, Decimal::new(5, 1), Decimal::new(10, 0), 0).unwrap();
        order.salt = 7;
        let base = order.struct_hash();

        let mut other = order.clone();
        other.side = OrderSide::Sell;
        assert_ne!(other.struct_hash(), base);

        let mut other = order.clone();
        other.expiration = 1_700_000_000;
        assert_ne!(other.struct_hash(), base);

        assert_eq!(order.clone().struct_hash(), base);
    }

    #[test]
    fn test_signed_order_wire_shape() {
        let mut order = OrderData::limit(
            maker(),
            "123",
            OrderSide::Sell,
            Decimal::new(49, 2),
            Decimal::new(100, 0),
            1_700_000_000,
        )
        .unwrap()
        .with_fee_rate_bps(10);
        order.salt = 42;

        let json = serde_json::to_value(SignedOrder::new(&order, "0xsig".to_string())).unwrap();
        assert_eq!(json["salt"], 42);
        assert_eq!(json["maker"], "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266");
        assert_eq!(json["taker"], "0x0000000000000000000000000000000000000000");
        assert_eq!(json["tokenId"], "123");
        assert_eq!(json["makerAmount"], "100000000");
        assert_eq!(json["takerAmount"], "49000000");
        assert_eq!(json["expiration"], "1700000000");
        assert_eq!(json["feeRateBps"], "10");
        assert_eq!(json["side"], "SELL");
        assert_eq!(json["signatureType"], 0);
        assert_eq!(json["signature"], "0xsig");
    }
}
