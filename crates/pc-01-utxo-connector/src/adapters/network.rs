//! Network Registry Adapter
//!
//! Implements the `NetworkPolicy` port with an explicit per-asset table of
//! network parameters, built once and handed to the connector.

use std::collections::HashMap;

use sha2::{Digest, Sha256};
use shared_types::Asset;

use crate::domain::ConnectorError;
use crate::ports::{NetworkParams, NetworkPolicy};

const BASE58_ALPHABET: &[u8; 58] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Version byte, 20 byte hash, 4 byte checksum.
const BASE58_ADDRESS_LEN: usize = 25;

/// Longer strings cannot decode to an address and are rejected unparsed.
const BASE58_MAX_CHARS: usize = 50;

/// Canonical name of a network, accepting the spellings daemons use.
pub fn canonical_network(name: &str) -> &str {
    match name {
        "main" | "mainnet" => "mainnet",
        "test" | "testnet" | "testnet3" => "testnet",
        "regtest" | "simnet" => "regtest",
        other => other,
    }
}

/// Parameters of the networks each asset supports.
#[derive(Clone, Debug, Default)]
pub struct NetworkRegistry {
    networks: HashMap<String, NetworkParams>,
}

impl NetworkRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the mainnet, testnet and regtest parameters of `asset`.
    pub fn for_asset(asset: Asset) -> Self {
        let mut registry = Self::new();
        let table: [(&str, u8, &[u8], Option<&str>); 3] = match asset {
            Asset::Btc => [
                ("mainnet", 0x00, &[0x05], Some("bc")),
                ("testnet", 0x6f, &[0xc4], Some("tb")),
                ("regtest", 0x6f, &[0xc4], Some("bcrt")),
            ],
            Asset::Ltc => [
                ("mainnet", 0x30, &[0x50, 0x05], Some("ltc")),
                ("testnet", 0x6f, &[0xc4], Some("tltc")),
                ("regtest", 0x6f, &[0xc4], Some("rltc")),
            ],
            Asset::Bch => [
                ("mainnet", 0, &[5], None),
                ("testnet", 111, &[196], None),
                ("regtest", 111, &[196], None),
            ],
            Asset::Dash => [
                ("mainnet", 76, &[16], None),
                ("testnet", 140, &[19], None),
                ("regtest", 140, &[19], None),
            ],
        };

        for (name, pubkey_hash, script_hash, hrp) in table {
            registry.register(NetworkParams {
                name: name.to_string(),
                pubkey_hash_addr_id: pubkey_hash,
                script_hash_addr_ids: script_hash.to_vec(),
                bech32_hrp: hrp.map(str::to_string),
            });
        }
        registry
    }

    /// Add or replace the parameters of a network.
    pub fn register(&mut self, params: NetworkParams) {
        self.networks.insert(params.name.clone(), params);
    }
}

impl NetworkPolicy for NetworkRegistry {
    fn params(&self, net: &str) -> Result<NetworkParams, ConnectorError> {
        self.networks
            .get(canonical_network(net))
            .cloned()
            .ok_or_else(|| ConnectorError::UnsupportedNetwork(net.to_string()))
    }

    fn validate_address(&self, address: &str, net: &str) -> Result<(), ConnectorError> {
        let params = self.params(net)?;

        if let Some(hrp) = params.bech32_hrp.as_deref() {
            let prefix = format!("{}1", hrp);
            if address.to_lowercase().starts_with(&prefix) {
                return validate_segwit(address, hrp);
            }
        }

        validate_base58(address, &params)
    }
}

fn validate_segwit(address: &str, hrp: &str) -> Result<(), ConnectorError> {
    let (decoded_hrp, _version, _program) = bech32::segwit::decode(address)
        .map_err(|e| ConnectorError::InvalidAddress(format!("{}: {}", address, e)))?;

    if decoded_hrp.to_string().to_lowercase() != hrp {
        return Err(ConnectorError::InvalidAddress(format!(
            "{}: wrong human readable part",
            address
        )));
    }
    Ok(())
}

fn validate_base58(address: &str, params: &NetworkParams) -> Result<(), ConnectorError> {
    let invalid = |reason: &str| ConnectorError::InvalidAddress(format!("{}: {}", address, reason));

    let decoded = base58_decode(address).ok_or_else(|| invalid("not base58"))?;
    if decoded.len() != BASE58_ADDRESS_LEN {
        return Err(invalid("wrong length"));
    }

    let (payload, checksum) = decoded.split_at(BASE58_ADDRESS_LEN - 4);
    let digest = Sha256::digest(Sha256::digest(payload));
    if &digest[..4] != checksum {
        return Err(invalid("bad checksum"));
    }

    let version = payload[0];
    if version != params.pubkey_hash_addr_id && !params.script_hash_addr_ids.contains(&version) {
        return Err(invalid("address is not for this network"));
    }
    Ok(())
}

fn base58_decode(input: &str) -> Option<Vec<u8>> {
    if input.len() > BASE58_MAX_CHARS {
        return None;
    }

    // Little-endian while accumulating.
    let mut bytes: Vec<u8> = Vec::with_capacity(input.len());
    for c in input.bytes() {
        let mut carry = BASE58_ALPHABET.iter().position(|&a| a == c)? as u32;
        for byte in bytes.iter_mut() {
            carry += u32::from(*byte) * 58;
            *byte = (carry & 0xff) as u8;
            carry >>= 8;
        }
        while carry > 0 {
            bytes.push((carry & 0xff) as u8);
            carry >>= 8;
        }
    }

    let zeros = input.bytes().take_while(|&c| c == b'1').count();
    let mut decoded = vec![0u8; zeros];
    decoded.extend(bytes.iter().rev());
    Some(decoded)
}
