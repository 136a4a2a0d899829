//! EIP-712 order signing for the CTF Exchange.
//!
//! The CLOB only accepts orders carrying a maker signature over the
//! exchange's `Order` struct. L2 HMAC headers authenticate the request;
//! the signature authorizes the trade.
//!
//! ```text
//! PlaceOrder ──► OrderData::limit ──► OrderSigner::sign_order ──► SignedOrder ──► POST /order
//! ```

pub mod domain;
pub mod order;
pub mod signer;

pub use domain::{Eip712Domain, SignatureType, CTF_EXCHANGE, NEG_RISK_CTF_EXCHANGE, POLYGON_CHAIN_ID};
pub use order::{OrderData, SignedOrder};
pub use signer::OrderSigner;
