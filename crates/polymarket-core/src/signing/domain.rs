//! EIP-712 domain of the CTF Exchange contracts on Polygon.

use alloy_primitives::{address, keccak256, Address, B256, U256};
use alloy_sol_types::SolValue;

pub const POLYGON_CHAIN_ID: u64 = 137;

/// CTF Exchange, used by the standard up/down markets.
pub const CTF_EXCHANGE: Address = address!("0x4bFb41d5B3570DeFd03C39a9A4D8dE6Bd8B8982E");

/// Neg-risk CTF Exchange.
pub const NEG_RISK_CTF_EXCHANGE: Address = address!("0xC5d563A36AE78145C45a50134d48A1215220f80a");

/// Domain separator inputs for order signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eip712Domain {
    pub name: String,
    pub version: String,
    pub chain_id: u64,
    pub verifying_contract: Address,
}

impl Eip712Domain {
    pub fn ctf_exchange() -> Self {
        Self::for_contract(CTF_EXCHANGE)
    }

    pub fn neg_risk_ctf_exchange() -> Self {
        Self::for_contract(NEG_RISK_CTF_EXCHANGE)
    }

    fn for_contract(verifying_contract: Address) -> Self {
        Self {
            name: "Polymarket CTF Exchange".to_string(),
            version: "1".to_string(),
            chain_id: POLYGON_CHAIN_ID,
            verifying_contract,
        }
    }

    /// `hashStruct(EIP712Domain)`.
    pub fn separator(&self) -> B256 {
        let type_hash = keccak256(
            b"EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)",
        );
        let encoded = (
            type_hash,
            keccak256(self.name.as_bytes()),
            keccak256(self.version.as_bytes()),
            U256::from(self.chain_id),
            B256::left_padding_from(self.verifying_contract.as_slice()),
        )
            .abi_encode_packed();
        keccak256(&encoded)
    }
}

/// How the maker's signature is verified on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignatureType {
    /// Externally owned account; maker and signer coincide.
    #[default]
    Eoa,
    PolyProxy,
    PolyGnosisSafe,
}

impl SignatureType {
    pub fn as_u8(self) -> u8 {
        match self {
            SignatureType::Eoa => 0,
            SignatureType::PolyProxy => 1,
            SignatureType::PolyGnosisSafe => 2,
        }
    }
}
