//! # Transaction Weight Estimation
//!
//! BIP-141 weight of a transaction from the classes of its inputs and
//! outputs. Signatures are assumed to be the maximum 73 bytes.
//!
//! ```text
//! weight = 4 * stripped_size + (witness_header + witness_size)   if any witness
//! weight = 4 * stripped_size                                    otherwise
//! size   = weight / 4
//! ```

/// Witness data costs a quarter of base data.
pub const WITNESS_SCALE_FACTOR: u64 = 4;

/// OP_0 + push + 20 byte key hash.
pub const P2WPKH_SCRIPT_SIZE: u64 = 1 + 1 + 20;

/// OP_0 + push + 32 byte script hash.
pub const P2WSH_SCRIPT_SIZE: u64 = 1 + 1 + 32;

/// Value + script length + 25 byte P2PKH script.
pub const P2PKH_OUTPUT_SIZE: u64 = 8 + 1 + 25;

/// Value + script length + P2WPKH script.
pub const P2WKH_OUTPUT_SIZE: u64 = 8 + 1 + P2WPKH_SCRIPT_SIZE;

/// Value + script length + P2WSH script.
pub const P2WSH_OUTPUT_SIZE: u64 = 8 + 1 + P2WSH_SCRIPT_SIZE;

/// Value + script length + 23 byte P2SH script.
pub const P2SH_OUTPUT_SIZE: u64 = 8 + 1 + 23;

/// Signature push + signature + pubkey push + compressed pubkey.
pub const P2PKH_SCRIPT_SIG_SIZE: u64 = 1 + 73 + 1 + 33;

/// Element count + signature length + signature + pubkey length + pubkey.
pub const P2WKH_WITNESS_SIZE: u64 = 1 + 1 + 73 + 1 + 33;

/// Previous outpoint (32 + 4) + script length + sequence.
pub const INPUT_SIZE: u64 = 32 + 4 + 1 + 4;

/// Segwit marker and flag.
pub const WITNESS_HEADER_SIZE: u64 = 1 + 1;

/// Version + lock time.
pub const BASE_TX_SIZE: u64 = 4 + 4;

/// Serialized length of a Bitcoin compact size integer.
pub fn var_int_size(n: u64) -> u64 {
    match n {
        0..=0xfc => 1,
        0xfd..=0xffff => 3,
        0x1_0000..=0xffff_ffff => 5,
        _ => 9,
    }
}

/// Accumulates input and output sizes of a candidate transaction.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TxWeightEstimator {
    has_witness: bool,
    input_count: u64,
    output_count: u64,
    input_size: u64,
    input_witness_size: u64,
    output_size: u64,
}

impl TxWeightEstimator {
    /// Empty estimate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Input spending a P2PKH output.
    pub fn add_p2pkh_input(&mut self) -> &mut Self {
        self.input_size += INPUT_SIZE + P2PKH_SCRIPT_SIG_SIZE;
        // Empty witness stack marker, counted only if the tx has witnesses.
        self.input_witness_size += 1;
        self.input_count += 1;
        self
    }

    /// Input spending a native P2WKH output.
    pub fn add_p2wkh_input(&mut self) -> &mut Self {
        self.add_witness_input(P2WKH_WITNESS_SIZE)
    }

    /// Input spending a native pay-to-witness output with a witness of
    /// `witness_size` bytes.
    pub fn add_witness_input(&mut self, witness_size: u64) -> &mut Self {
        self.input_size += INPUT_SIZE;
        self.input_witness_size += witness_size;
        self.input_count += 1;
        self.has_witness = true;
        self
    }

    /// Input spending a P2SH output wrapping a P2WKH redeem script.
    pub fn add_nested_p2wkh_input(&mut self) -> &mut Self {
        // Redeem script push byte + script.
        self.input_size += INPUT_SIZE + 1 + P2WPKH_SCRIPT_SIZE;
        self.input_witness_size += P2WKH_WITNESS_SIZE;
        self.input_count += 1;
        self.has_witness = true;
        self
    }

    /// Input spending a P2SH output wrapping a P2WSH redeem script.
    pub fn add_nested_p2wsh_input(&mut self, witness_size: u64) -> &mut Self {
        self.input_size += INPUT_SIZE + 1 + P2WSH_SCRIPT_SIZE;
        self.input_witness_size += witness_size;
        self.input_count += 1;
        self.has_witness = true;
        self
    }

    /// P2PKH output.
    pub fn add_p2pkh_output(&mut self) -> &mut Self {
        self.add_output(P2PKH_OUTPUT_SIZE)
    }

    /// Native P2WKH output.
    pub fn add_p2wkh_output(&mut self) -> &mut Self {
        self.add_output(P2WKH_OUTPUT_SIZE)
    }

    /// Native P2WSH output.
    pub fn add_p2wsh_output(&mut self) -> &mut Self {
        self.add_output(P2WSH_OUTPUT_SIZE)
    }

    /// P2SH output.
    pub fn add_p2sh_output(&mut self) -> &mut Self {
        self.add_output(P2SH_OUTPUT_SIZE)
    }

    fn add_output(&mut self, size: u64) -> &mut Self {
        self.output_size += size;
        self.output_count += 1;
        self
    }

    /// Number of inputs added.
    pub fn input_count(&self) -> u64 {
        self.input_count
    }

    /// Number of outputs added.
    pub fn output_count(&self) -> u64 {
        self.output_count
    }

    /// Size without witness data.
    pub fn stripped_size(&self) -> u64 {
        BASE_TX_SIZE
            + var_int_size(self.input_count)
            + self.input_size
            + var_int_size(self.output_count)
            + self.output_size
    }

    /// Estimated weight.
    pub fn weight(&self) -> u64 {
        let mut weight = self.stripped_size() * WITNESS_SCALE_FACTOR;
        if self.has_witness {
            weight += WITNESS_HEADER_SIZE + self.input_witness_size;
        }
        weight
    }

    /// Estimated virtual size, rounded down.
    pub fn size(&self) -> u64 {
        self.weight() / WITNESS_SCALE_FACTOR
    }
}
