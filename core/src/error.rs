use thiserror::Error;

use crate::identity::Identity;

/// Errors reported by the token sale operations.
///
/// Every precondition violation maps to exactly one variant; the enclosing
/// transaction is aborted and no state changes.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SaleError {
    /// A sale record (or its vault) already exists at the target address.
    #[error("a token sale already exists at {0}")]
    AddressCollision(Identity),

    /// An amount required to be positive was zero.
    #[error("invalid sale parameters: {0}")]
    InvalidParameters(&'static str),

    /// The authority cannot fund the deposit or the storage cost.
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds { required: u64, available: u64 },

    /// Every allocation has been claimed.
    #[error("all of the tokens have been claimed ({max_claims} claims)")]
    SaleExhausted { max_claims: u64 },

    /// The vault holds less than one claim.
    #[error("vault holds {remaining}, claim size is {claim_size}")]
    InsufficientVaultBalance { remaining: u64, claim_size: u64 },

    /// The taker cannot pay the fee.
    #[error("taker cannot cover fee: required {required}, available {available}")]
    InsufficientTakerFunds { required: u64, available: u64 },

    /// A supplied account does not match the record's stored linkage.
    #[error("account mismatch: {0}")]
    RecordMismatch(&'static str),

    /// The caller is not permitted to perform the operation.
    #[error("unauthorized: {0}")]
    Unauthorized(&'static str),

    /// Fault in the underlying ledger that no precondition covers.
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

/// Errors raised by ledger primitives.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("account {0} not found")]
    AccountNotFound(Identity),

    #[error("account {0} already exists")]
    AccountExists(Identity),

    #[error("account {0} did not sign the transaction")]
    MissingSignature(Identity),

    #[error("account {account} holds {available} lamports, needs {required}")]
    InsufficientLamports {
        account: Identity,
        required: u64,
        available: u64,
    },

    #[error("asset account {account} holds {available}, needs {required}")]
    InsufficientAssetBalance {
        account: Identity,
        required: u64,
        available: u64,
    },

    #[error("account {0} has the wrong type")]
    InvalidAccountData(Identity),

    #[error("asset accounts belong to different mints")]
    MintMismatch,

    #[error("authority does not own asset account {0}")]
    OwnerMismatch(Identity),

    #[error("asset account {0} still holds a balance")]
    NonZeroBalance(Identity),

    #[error("arithmetic overflow")]
    Overflow,

    #[error("record encoding error: {0}")]
    Encoding(String),
}

/// Errors that might occur while parsing into an `Identity`.
#[derive(Debug, Error, PartialEq)]
pub enum IdentityError {
    #[error("invalid hex: {0}")]
    Hex(#[from] hex::FromHexError),

    #[error("invalid base58: {0}")]
    Base58(#[from] bs58::decode::Error),

    #[error("cannot parse identity from empty string")]
    EmptyIdentity,

    #[error("identity must be 32 bytes, got {0}")]
    InvalidLength(usize),
}
