/// Signing capability for a sale's custody vault
pub mod capability;
/// Deterministic, off-curve derived addresses
pub mod derive;
pub mod error;
/// 32-byte ledger identities
pub mod identity;
/// JSON files and human-readable summaries
pub mod interface;
/// Transactional account ledger and its in-memory implementation
pub mod ledger;
/// Persisted sale record and its account layout
pub mod record;
/// Initialize, claim and cancel
pub mod sale;

pub use capability::VaultAuthority;
pub use error::{IdentityError, LedgerError, SaleError};
pub use identity::Identity;
pub use ledger::{Ledger, MemoryLedger};
pub use record::{SaleRecord, SaleState};
pub use sale::{
    CancelAccounts, CancelReceipt, ClaimAccounts, InitializeAccounts, InitializeArgs,
    SaleInstruction, SaleOutcome, TokenSale,
};

pub type Result<T> = std::result::Result<T, SaleError>;
