//! The token sale operations: initialize, claim and cancel.
//!
//! Every operation runs inside one [`Ledger::execute`] call. All
//! preconditions are evaluated against the committed record inside that
//! same execution, so a failing check aborts with no state change and two
//! racing claims are decided by the ledger's serialization.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::capability::VaultAuthority;
use crate::derive::sale_address;
use crate::error::{LedgerError, SaleError};
use crate::identity::Identity;
use crate::ledger::{
    rent_exempt_minimum, AccountData, Authority, Ledger, Transaction, ASSET_ACCOUNT_LEN,
};
use crate::record::{SaleRecord, SaleState};
use crate::Result;

/// Numeric inputs of [`TokenSale::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitializeArgs {
    pub total_deposited: u64,
    pub claim_size: u64,
    pub fee: u64,
    pub max_claims: u64,
}

impl InitializeArgs {
    fn validate(&self) -> Result<()> {
        if self.total_deposited == 0 {
            return Err(SaleError::InvalidParameters("total deposit must be positive"));
        }
        if self.claim_size == 0 {
            return Err(SaleError::InvalidParameters("claim size must be positive"));
        }
        if self.max_claims == 0 {
            return Err(SaleError::InvalidParameters("max claims must be positive"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InitializeAccounts {
    /// The initializer; must sign.
    pub authority: Identity,
    /// Asset being sold.
    pub mint: Identity,
    /// Initializer's asset account the deposit is drawn from.
    pub funding_account: Identity,
    /// Derived sale record address.
    pub record: Identity,
    /// Fresh vault account; must sign its own creation.
    pub vault: Identity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClaimAccounts {
    /// Buyer paying the fee; must sign.
    pub taker: Identity,
    /// Fee receiver; must be the sale authority.
    pub authority: Identity,
    pub record: Identity,
    pub vault: Identity,
    /// Taker's asset account receiving the allocation.
    pub taker_account: Identity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelAccounts {
    /// The sale authority; must sign.
    pub authority: Identity,
    pub record: Identity,
    pub vault: Identity,
    /// Authority's asset account receiving the undistributed deposit.
    pub receiving_account: Identity,
}

/// A sale operation submitted as one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaleInstruction {
    Initialize {
        accounts: InitializeAccounts,
        args: InitializeArgs,
    },
    Claim(ClaimAccounts),
    Cancel(CancelAccounts),
}

/// Result of [`TokenSale::process`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaleOutcome {
    Initialized(SaleRecord),
    Claimed(SaleRecord),
    Cancelled(CancelReceipt),
}

/// What a cancellation paid back to the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CancelReceipt {
    /// Asset units returned from the vault.
    pub returned: u64,
    /// Storage lamports released by retiring the record and the vault.
    pub reclaimed_lamports: u64,
}

/// The token sale program, bound to its program identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSale {
    program_id: Identity,
}

impl TokenSale {
    pub fn new(program_id: Identity) -> Self {
        Self { program_id }
    }

    pub fn program_id(&self) -> &Identity {
        &self.program_id
    }

    /// Record address and canonical nonce for `authority`.
    pub fn sale_address(&self, authority: &Identity) -> Result<(Identity, u8)> {
        sale_address(authority, &self.program_id)
            .ok_or(SaleError::RecordMismatch("no derivable sale address"))
    }

    /// Dispatches one instruction.
    pub fn process<L: Ledger>(
        &self,
        ledger: &L,
        signers: &[Identity],
        instruction: SaleInstruction,
    ) -> Result<SaleOutcome> {
        match instruction {
            SaleInstruction::Initialize { accounts, args } => self
                .initialize(ledger, signers, &accounts, args)
                .map(SaleOutcome::Initialized),
            SaleInstruction::Claim(accounts) => self
                .claim(ledger, signers, &accounts)
                .map(SaleOutcome::Claimed),
            SaleInstruction::Cancel(accounts) => self
                .cancel(ledger, signers, &accounts)
                .map(SaleOutcome::Cancelled),
        }
    }

    /// Creates the sale record and vault and moves the deposit in.
    #[instrument(skip_all, fields(authority = %accounts.authority, sale = %accounts.record))]
    pub fn initialize<L: Ledger>(
        &self,
        ledger: &L,
        signers: &[Identity],
        accounts: &InitializeAccounts,
        args: InitializeArgs,
    ) -> Result<SaleRecord> {
        args.validate()?;
        let (expected, nonce) = self.sale_address(&accounts.authority)?;

        let record = ledger.execute(signers, |tx| {
            if !tx.is_signer(&accounts.authority) {
                return Err(SaleError::Unauthorized("initializer must sign"));
            }
            if !tx.is_signer(&accounts.vault) {
                return Err(SaleError::Unauthorized("vault account must sign its creation"));
            }
            if accounts.record != expected {
                return Err(SaleError::RecordMismatch(
                    "record address is not derived from the initializer",
                ));
            }
            if tx.exists(&accounts.record) {
                return Err(SaleError::AddressCollision(accounts.record));
            }
            if tx.exists(&accounts.vault) {
                return Err(SaleError::AddressCollision(accounts.vault));
            }
            tx.mint_account(&accounts.mint)
                .map_err(|_| SaleError::RecordMismatch("asset id is not a mint"))?;

            let funding = tx
                .asset_account(&accounts.funding_account)
                .map_err(|_| SaleError::RecordMismatch("funding account is not an asset account"))?;
            if funding.owner != accounts.authority {
                return Err(SaleError::Unauthorized(
                    "funding account is not owned by the initializer",
                ));
            }
            if funding.mint != accounts.mint {
                return Err(SaleError::RecordMismatch(
                    "funding account holds a different asset",
                ));
            }
            if funding.amount < args.total_deposited {
                return Err(SaleError::InsufficientFunds {
                    required: args.total_deposited,
                    available: funding.amount,
                });
            }

            let storage = rent_exempt_minimum(SaleRecord::ACCOUNT_LEN)
                + rent_exempt_minimum(ASSET_ACCOUNT_LEN);
            let lamports = tx.lamports(&accounts.authority);
            if lamports < storage {
                return Err(SaleError::InsufficientFunds {
                    required: storage,
                    available: lamports,
                });
            }

            let record = SaleRecord {
                authority: accounts.authority,
                mint: accounts.mint,
                initializer_token_account: accounts.funding_account,
                vault: accounts.vault,
                total_deposited: args.total_deposited,
                claim_size: args.claim_size,
                remaining: args.total_deposited,
                num_claims: 0,
                max_claims: args.max_claims,
                fee: args.fee,
                nonce,
            };

            tx.create_program_account(
                &accounts.authority,
                &accounts.record,
                &self.program_id,
                record.to_account_data()?,
            )?;
            tx.create_asset_account(
                &accounts.authority,
                &accounts.vault,
                &accounts.mint,
                &accounts.record,
            )?;
            tx.transfer_asset(
                &accounts.funding_account,
                &accounts.vault,
                args.total_deposited,
                Authority::Signer(accounts.authority),
            )?;
            Ok(record)
        })?;

        info!(
            total_deposited = record.total_deposited,
            claim_size = record.claim_size,
            max_claims = record.max_claims,
            fee = record.fee,
            state = ?SaleState::Active,
            "token sale initialized"
        );
        Ok(record)
    }

    /// Exchanges the fee for one allocation of `claim_size`.
    #[instrument(skip_all, fields(taker = %accounts.taker, sale = %accounts.record))]
    pub fn claim<L: Ledger>(
        &self,
        ledger: &L,
        signers: &[Identity],
        accounts: &ClaimAccounts,
    ) -> Result<SaleRecord> {
        let record = ledger.execute(signers, |tx| {
            if !tx.is_signer(&accounts.taker) {
                return Err(SaleError::Unauthorized("taker must sign"));
            }
            let mut record = self.load_record(tx, &accounts.record)?;
            let vault_authority =
                VaultAuthority::for_record(&record, &accounts.record, &self.program_id)?;
            if accounts.vault != record.vault {
                return Err(SaleError::RecordMismatch("vault does not belong to this sale"));
            }
            if accounts.authority != record.authority {
                return Err(SaleError::RecordMismatch(
                    "fee receiver is not the sale authority",
                ));
            }
            if accounts.taker_account == record.vault {
                return Err(SaleError::RecordMismatch("receiving account is the sale vault"));
            }
            let receiving = tx.asset_account(&accounts.taker_account).map_err(|_| {
                SaleError::RecordMismatch("receiving account is not an asset account")
            })?;
            if receiving.mint != record.mint {
                return Err(SaleError::RecordMismatch(
                    "receiving account holds a different asset",
                ));
            }

            record.ensure_claimable()?;
            let available = tx.lamports(&accounts.taker);
            if available < record.fee {
                return Err(SaleError::InsufficientTakerFunds {
                    required: record.fee,
                    available,
                });
            }

            if record.fee > 0 {
                tx.transfer_lamports(&accounts.taker, &record.authority, record.fee)?;
            }
            tx.transfer_asset(
                &record.vault,
                &accounts.taker_account,
                record.claim_size,
                Authority::Vault(&vault_authority),
            )?;
            record.record_claim()?;
            debug_assert!(record.invariants_hold());

            tx.write_program_data(&accounts.record, &self.program_id, record.to_account_data()?)?;
            Ok(record)
        })?;

        info!(
            num_claims = record.num_claims,
            remaining = record.remaining,
            "tokens claimed"
        );
        if record.is_exhausted() {
            debug!("all allocations claimed; sale stays open until cancelled");
        }
        Ok(record)
    }

    /// Returns the undistributed deposit and retires the record and vault.
    #[instrument(skip_all, fields(authority = %accounts.authority, sale = %accounts.record))]
    pub fn cancel<L: Ledger>(
        &self,
        ledger: &L,
        signers: &[Identity],
        accounts: &CancelAccounts,
    ) -> Result<CancelReceipt> {
        let receipt = ledger.execute(signers, |tx| {
            let record = self.load_record(tx, &accounts.record)?;
            if !tx.is_signer(&accounts.authority) || accounts.authority != record.authority {
                return Err(SaleError::Unauthorized("only the sale authority may cancel"));
            }
            let vault_authority =
                VaultAuthority::for_record(&record, &accounts.record, &self.program_id)?;
            if accounts.vault != record.vault {
                return Err(SaleError::RecordMismatch("vault does not belong to this sale"));
            }
            let receiving = tx.asset_account(&accounts.receiving_account).map_err(|_| {
                SaleError::RecordMismatch("receiving account is not an asset account")
            })?;
            if receiving.mint != record.mint || receiving.owner != record.authority {
                return Err(SaleError::RecordMismatch(
                    "receiving account is not the authority's account for this asset",
                ));
            }

            let returned = tx.asset_account(&record.vault)?.amount;
            tx.transfer_asset(
                &record.vault,
                &accounts.receiving_account,
                returned,
                Authority::Vault(&vault_authority),
            )?;
            let vault_lamports = tx.close_asset_account(
                &record.vault,
                &record.authority,
                Authority::Vault(&vault_authority),
            )?;
            let record_lamports =
                tx.close_program_account(&accounts.record, &self.program_id, &record.authority)?;

            Ok(CancelReceipt {
                returned,
                reclaimed_lamports: vault_lamports + record_lamports,
            })
        })?;

        info!(
            returned = receipt.returned,
            reclaimed_lamports = receipt.reclaimed_lamports,
            state = ?SaleState::Retired,
            "token sale cancelled"
        );
        Ok(receipt)
    }

    /// The live sale of `authority`, if any.
    pub fn fetch<L: Ledger>(&self, ledger: &L, authority: &Identity) -> Result<Option<SaleRecord>> {
        let (address, _) = self.sale_address(authority)?;
        match ledger.account(&address) {
            Some(account) if account.owner == self.program_id => {
                let AccountData::Program(bytes) = &account.data else {
                    return Err(LedgerError::InvalidAccountData(address).into());
                };
                Ok(Some(SaleRecord::from_account_data(bytes)?))
            }
            _ => Ok(None),
        }
    }

    /// Lifecycle state at `authority`'s sale address.
    ///
    /// A retired record is indistinguishable from one never created, so
    /// this reports `Active` or `Uninitialized`.
    pub fn state<L: Ledger>(&self, ledger: &L, authority: &Identity) -> Result<SaleState> {
        Ok(match self.fetch(ledger, authority)? {
            Some(_) => SaleState::Active,
            None => SaleState::Uninitialized,
        })
    }

    /// Every live sale owned by this program, keyed by record address.
    pub fn all<L: Ledger>(&self, ledger: &L) -> Vec<(Identity, SaleRecord)> {
        ledger
            .program_accounts(&self.program_id)
            .into_iter()
            .filter_map(|(address, account)| match account.data {
                AccountData::Program(bytes) => SaleRecord::from_account_data(&bytes)
                    .ok()
                    .map(|record| (address, record)),
                _ => None,
            })
            .collect()
    }

    fn load_record(&self, tx: &Transaction<'_>, address: &Identity) -> Result<SaleRecord> {
        let data = tx
            .program_data(address, &self.program_id)
            .map_err(|_| SaleError::RecordMismatch("record is not a live token sale"))?;
        SaleRecord::from_account_data(data)
            .map_err(|_| SaleError::RecordMismatch("record is not a live token sale"))
    }
}
