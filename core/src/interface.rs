//! JSON (de)serialization of sale parameters, metadata and summaries.

use std::fmt;
use std::fs::File;
use std::path::Path;

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::SaleError;
use crate::identity::Identity;
use crate::record::{SaleRecord, SaleState};
use crate::sale::InitializeArgs;
use crate::Result;

/// Default path to the sale parameters template.
pub const SALE_PARAMS_PATH: &str = concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../templates/sale_params.json"
);

/// Default path to the chain configuration template.
pub const CHAIN_CONFIG_PATH: &str = concat!(
    env!("CARGO_MANIFEST_DIR"),
    "/../templates/chain_config.json"
);

/// Decimals of the native currency.
pub const NATIVE_DECIMALS: u8 = 9;

const MAX_DECIMALS: u8 = 38;

/// Reads a JSON-encoded file from `path` and deserializes it into `T`.
///
/// # Errors
///
/// Returns an `anyhow::Error` if the file cannot be read or parsed.
pub fn load_json<P, T>(path: P) -> anyhow::Result<T>
where
    P: AsRef<Path>,
    T: DeserializeOwned,
{
    let path = path.as_ref();
    let content =
        std::fs::read_to_string(path).with_context(|| format!("loading sale data: {:?}", path))?;
    serde_json::from_str(&content).with_context(|| format!("parsing JSON from {:?}", path))
}

/// Writes `data` as pretty-printed JSON to `path`.
///
/// # Errors
///
/// Returns an `anyhow::Error` if the file cannot be created or written.
pub fn save_json<P, T>(path: P, data: &T) -> anyhow::Result<()>
where
    P: AsRef<Path>,
    T: Serialize,
{
    let path = path.as_ref();
    let file = File::create(path).with_context(|| format!("creating file {:?}", path))?;
    serde_json::to_writer_pretty(file, data)
        .with_context(|| format!("serializing to JSON to {:?}", path))
}

/// Network configuration shared by every command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainConfig {
    /// JSON-RPC endpoint.
    pub rpc_url: String,
    /// Keypair file of the paying signer (the sale authority for `init`).
    pub keypair_path: String,
    /// Deployed token sale program.
    pub program_id: Identity,
}

/// Parameters required to **create** a sale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaleParams {
    #[serde(flatten)]
    pub chain_config: ChainConfig,

    /// The asset being sold.
    pub mint: Identity,

    /// Amounts in the asset's base units; `fee` in lamports.
    #[serde(flatten)]
    pub args: InitializeArgs,
}

/// Metadata **returned** from sale creation, consumed by `claim` and `cancel`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SaleMetadata {
    #[serde(flatten)]
    pub chain_config: ChainConfig,

    pub authority: Identity,
    /// Derived record address.
    pub sale: Identity,
    /// Canonical nonce of `sale`.
    pub nonce: u8,
    pub vault: Identity,
    pub mint: Identity,
    pub funding_account: Identity,

    #[serde(flatten)]
    pub args: InitializeArgs,

    pub state: SaleState,
}

/// Human-readable view of one sale record.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SaleSummary {
    pub sale: Identity,
    pub authority: Identity,
    pub mint: Identity,
    pub vault: Identity,
    pub total_deposited: String,
    pub claim_size: String,
    pub remaining: String,
    pub num_claims: u64,
    pub max_claims: u64,
    /// Fee in whole native coins.
    pub fee: String,
}

impl SaleSummary {
    /// Scales the record's amounts by `decimals` and the fee by lamports per coin.
    pub fn new(sale: Identity, record: &SaleRecord, decimals: u8) -> Result<Self> {
        Ok(Self {
            sale,
            authority: record.authority,
            mint: record.mint,
            vault: record.vault,
            total_deposited: format_amount(record.total_deposited, decimals)?,
            claim_size: format_amount(record.claim_size, decimals)?,
            remaining: format_amount(record.remaining, decimals)?,
            num_claims: record.num_claims,
            max_claims: record.max_claims,
            fee: format_amount(record.fee, NATIVE_DECIMALS)?,
        })
    }
}

impl fmt::Display for SaleSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Token Sale {}", self.sale)?;
        writeln!(f, "  authority:       {}", self.authority)?;
        writeln!(f, "  mint:            {}", self.mint)?;
        writeln!(f, "  vault:           {}", self.vault)?;
        writeln!(f, "  total deposited: {}", self.total_deposited)?;
        writeln!(f, "  claim size:      {}", self.claim_size)?;
        writeln!(f, "  remaining:       {}", self.remaining)?;
        writeln!(f, "  claims:          {}/{}", self.num_claims, self.max_claims)?;
        write!(f, "  fee:             {} SOL", self.fee)
    }
}

/// Renders `amount` base units as a decimal string with `decimals` places.
pub fn format_amount(amount: u64, decimals: u8) -> Result<String> {
    if decimals > MAX_DECIMALS {
        return Err(SaleError::InvalidParameters("decimals exceed 38"));
    }
    if decimals == 0 {
        return Ok(amount.to_string());
    }
    let ten_pow = 10u128.pow(decimals as u32);
    let amount = amount as u128;
    let whole = amount / ten_pow;
    let rem = amount % ten_pow;
    Ok(format!(
        "{}.{:0>width$}",
        whole,
        rem,
        width = decimals as usize
    ))
}
