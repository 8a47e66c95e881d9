//! Transactional account ledger.
//!
//! Operations run inside [`Ledger::execute`], which stages every read and
//! write and commits them only when the operation returns `Ok`. A failed
//! operation leaves no trace.

use std::collections::HashMap;

use parking_lot::Mutex;
use tracing::trace;

use crate::capability::VaultAuthority;
use crate::error::{LedgerError, SaleError};
use crate::identity::Identity;

/// Native-currency units per whole coin.
pub const LAMPORTS_PER_SOL: u64 = 1_000_000_000;

/// Owner of wallet accounts.
pub const SYSTEM_PROGRAM: Identity = Identity::new([0; 32]);

/// Owner of mints and asset accounts.
pub const ASSET_PROGRAM: Identity = Identity::new(*b"AssetTransferProgram111111111111");

/// Data size of an asset (token) account.
pub const ASSET_ACCOUNT_LEN: usize = 165;

/// Data size of a mint account.
pub const MINT_ACCOUNT_LEN: usize = 82;

const LAMPORTS_PER_BYTE_YEAR: u64 = 3_480;
const EXEMPTION_THRESHOLD_YEARS: u64 = 2;
const ACCOUNT_STORAGE_OVERHEAD: u64 = 128;

/// Lamports an account of `data_len` bytes must hold to be exempt from rent.
pub fn rent_exempt_minimum(data_len: usize) -> u64 {
    (ACCOUNT_STORAGE_OVERHEAD + data_len as u64)
        * LAMPORTS_PER_BYTE_YEAR
        * EXEMPTION_THRESHOLD_YEARS
}

/// A fungible asset definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MintAccount {
    pub decimals: u8,
    pub supply: u64,
}

/// A balance of one asset held on behalf of `owner`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetAccount {
    pub mint: Identity,
    pub owner: Identity,
    pub amount: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccountData {
    /// Plain wallet.
    System,
    Mint(MintAccount),
    Asset(AssetAccount),
    /// Opaque bytes written by the owning program.
    Program(Vec<u8>),
}

impl AccountData {
    pub fn len(&self) -> usize {
        match self {
            Self::System => 0,
            Self::Mint(_) => MINT_ACCOUNT_LEN,
            Self::Asset(_) => ASSET_ACCOUNT_LEN,
            Self::Program(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    pub lamports: u64,
    /// Program that may modify the account data.
    pub owner: Identity,
    pub data: AccountData,
}

impl Account {
    fn wallet(lamports: u64) -> Self {
        Self {
            lamports,
            owner: SYSTEM_PROGRAM,
            data: AccountData::System,
        }
    }
}

/// Keyed account storage backing a [`Transaction`].
pub trait AccountStore {
    fn get(&self, address: &Identity) -> Option<&Account>;
    fn get_mut(&mut self, address: &Identity) -> Option<&mut Account>;
    fn insert(&mut self, address: Identity, account: Account);
    fn remove(&mut self, address: &Identity) -> Option<Account>;
}

/// A ledger that executes operations atomically.
pub trait Ledger {
    /// Runs `op` with the given transaction signers. All writes commit if
    /// `op` returns `Ok`; none do otherwise. Conflicting executions are
    /// serialized.
    fn execute<T, F>(&self, signers: &[Identity], op: F) -> Result<T, SaleError>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T, SaleError>;

    /// Snapshot of one committed account.
    fn account(&self, address: &Identity) -> Option<Account>;

    /// Committed accounts owned by `program_id`.
    fn program_accounts(&self, program_id: &Identity) -> Vec<(Identity, Account)>;
}

/// Who authorizes a debit from an asset account.
#[derive(Debug, Clone, Copy)]
pub enum Authority<'a> {
    /// An owner that signed the transaction.
    Signer(Identity),
    /// A sale's derived vault capability.
    Vault(&'a VaultAuthority),
}

impl Authority<'_> {
    fn identity(&self) -> Identity {
        match self {
            Self::Signer(id) => *id,
            Self::Vault(cap) => *cap.address(),
        }
    }
}

/// Staged view of the ledger inside one atomic execution.
pub struct Transaction<'a> {
    store: &'a mut dyn AccountStore,
    signers: &'a [Identity],
}

impl<'a> Transaction<'a> {
    pub fn new(store: &'a mut dyn AccountStore, signers: &'a [Identity]) -> Self {
        Self { store, signers }
    }

    pub fn is_signer(&self, id: &Identity) -> bool {
        self.signers.contains(id)
    }

    pub fn require_signer(&self, id: &Identity) -> Result<(), LedgerError> {
        if self.is_signer(id) {
            Ok(())
        } else {
            Err(LedgerError::MissingSignature(*id))
        }
    }

    pub fn account(&self, address: &Identity) -> Option<&Account> {
        self.store.get(address)
    }

    pub fn exists(&self, address: &Identity) -> bool {
        self.store.get(address).is_some()
    }

    /// Native balance; zero for unknown accounts.
    pub fn lamports(&self, address: &Identity) -> u64 {
        self.store.get(address).map_or(0, |a| a.lamports)
    }

    pub fn mint_account(&self, address: &Identity) -> Result<&MintAccount, LedgerError> {
        match self.store.get(address) {
            Some(Account {
                data: AccountData::Mint(mint),
                ..
            }) => Ok(mint),
            Some(_) => Err(LedgerError::InvalidAccountData(*address)),
            None => Err(LedgerError::AccountNotFound(*address)),
        }
    }

    pub fn asset_account(&self, address: &Identity) -> Result<&AssetAccount, LedgerError> {
        match self.store.get(address) {
            Some(Account {
                data: AccountData::Asset(asset),
                ..
            }) => Ok(asset),
            Some(_) => Err(LedgerError::InvalidAccountData(*address)),
            None => Err(LedgerError::AccountNotFound(*address)),
        }
    }

    /// Moves native currency between wallets. The source must sign.
    pub fn transfer_lamports(
        &mut self,
        from: &Identity,
        to: &Identity,
        amount: u64,
    ) -> Result<(), LedgerError> {
        self.require_signer(from)?;
        let available = self.lamports(from);
        if available < amount {
            return Err(LedgerError::InsufficientLamports {
                account: *from,
                required: amount,
                available,
            });
        }
        self.debit(from, amount)?;
        self.credit(to, amount)?;
        trace!(%from, %to, amount, "native transfer");
        Ok(())
    }

    /// Creates an empty asset account at a fresh address. Both the payer
    /// and the new account must sign; the payer funds the storage cost.
    pub fn create_asset_account(
        &mut self,
        payer: &Identity,
        address: &Identity,
        mint: &Identity,
        owner: &Identity,
    ) -> Result<u64, LedgerError> {
        self.require_signer(payer)?;
        self.require_signer(address)?;
        self.mint_account(mint)?;
        let data = AccountData::Asset(AssetAccount {
            mint: *mint,
            owner: *owner,
            amount: 0,
        });
        self.allocate(payer, address, ASSET_PROGRAM, data)
    }

    /// Moves `amount` of an asset between two accounts of the same mint.
    pub fn transfer_asset(
        &mut self,
        from: &Identity,
        to: &Identity,
        amount: u64,
        authority: Authority<'_>,
    ) -> Result<(), LedgerError> {
        let source = self.asset_account(from)?.clone();
        let dest = self.asset_account(to)?;
        if source.mint != dest.mint {
            return Err(LedgerError::MintMismatch);
        }
        self.check_authority(from, &source, authority)?;
        if source.amount < amount {
            return Err(LedgerError::InsufficientAssetBalance {
                account: *from,
                required: amount,
                available: source.amount,
            });
        }
        if from == to {
            return Ok(());
        }
        let credited = dest.amount.checked_add(amount).ok_or(LedgerError::Overflow)?;

        self.asset_account_mut(from)?.amount -= amount;
        self.asset_account_mut(to)?.amount = credited;
        trace!(%from, %to, amount, "asset transfer");
        Ok(())
    }

    /// Closes an empty asset account, returning its lamports to `destination`.
    pub fn close_asset_account(
        &mut self,
        address: &Identity,
        destination: &Identity,
        authority: Authority<'_>,
    ) -> Result<u64, LedgerError> {
        let asset = self.asset_account(address)?.clone();
        self.check_authority(address, &asset, authority)?;
        if asset.amount != 0 {
            return Err(LedgerError::NonZeroBalance(*address));
        }
        self.reclaim(address, destination)
    }

    /// Data of an account owned by `program_id`.
    pub fn program_data(
        &self,
        address: &Identity,
        program_id: &Identity,
    ) -> Result<&[u8], LedgerError> {
        match self.store.get(address) {
            Some(Account {
                owner,
                data: AccountData::Program(bytes),
                ..
            }) if owner == program_id => Ok(bytes),
            Some(_) => Err(LedgerError::InvalidAccountData(*address)),
            None => Err(LedgerError::AccountNotFound(*address)),
        }
    }

    pub(crate) fn create_program_account(
        &mut self,
        payer: &Identity,
        address: &Identity,
        program_id: &Identity,
        data: Vec<u8>,
    ) -> Result<u64, LedgerError> {
        self.require_signer(payer)?;
        self.allocate(payer, address, *program_id, AccountData::Program(data))
    }

    pub(crate) fn write_program_data(
        &mut self,
        address: &Identity,
        program_id: &Identity,
        data: Vec<u8>,
    ) -> Result<(), LedgerError> {
        self.program_data(address, program_id)?;
        let account = self
            .store
            .get_mut(address)
            .ok_or(LedgerError::AccountNotFound(*address))?;
        account.data = AccountData::Program(data);
        Ok(())
    }

    pub(crate) fn close_program_account(
        &mut self,
        address: &Identity,
        program_id: &Identity,
        destination: &Identity,
    ) -> Result<u64, LedgerError> {
        self.program_data(address, program_id)?;
        self.reclaim(address, destination)
    }

    fn check_authority(
        &self,
        address: &Identity,
        asset: &AssetAccount,
        authority: Authority<'_>,
    ) -> Result<(), LedgerError> {
        if let Authority::Signer(id) = authority {
            self.require_signer(&id)?;
        }
        if asset.owner != authority.identity() {
            return Err(LedgerError::OwnerMismatch(*address));
        }
        Ok(())
    }

    fn allocate(
        &mut self,
        payer: &Identity,
        address: &Identity,
        owner: Identity,
        data: AccountData,
    ) -> Result<u64, LedgerError> {
        if self.exists(address) {
            return Err(LedgerError::AccountExists(*address));
        }
        let rent = rent_exempt_minimum(data.len());
        let available = self.lamports(payer);
        if available < rent {
            return Err(LedgerError::InsufficientLamports {
                account: *payer,
                required: rent,
                available,
            });
        }
        self.debit(payer, rent)?;
        self.store.insert(
            *address,
            Account {
                lamports: rent,
                owner,
                data,
            },
        );
        trace!(%address, %owner, rent, "account allocated");
        Ok(rent)
    }

    fn reclaim(&mut self, address: &Identity, destination: &Identity) -> Result<u64, LedgerError> {
        let account = self
            .store
            .remove(address)
            .ok_or(LedgerError::AccountNotFound(*address))?;
        self.credit(destination, account.lamports)?;
        trace!(%address, %destination, lamports = account.lamports, "account closed");
        Ok(account.lamports)
    }

    fn asset_account_mut(&mut self, address: &Identity) -> Result<&mut AssetAccount, LedgerError> {
        match self.store.get_mut(address) {
            Some(Account {
                data: AccountData::Asset(asset),
                ..
            }) => Ok(asset),
            Some(_) => Err(LedgerError::InvalidAccountData(*address)),
            None => Err(LedgerError::AccountNotFound(*address)),
        }
    }

    fn debit(&mut self, address: &Identity, amount: u64) -> Result<(), LedgerError> {
        let account = self
            .store
            .get_mut(address)
            .ok_or(LedgerError::AccountNotFound(*address))?;
        account.lamports = account
            .lamports
            .checked_sub(amount)
            .ok_or(LedgerError::InsufficientLamports {
                account: *address,
                required: amount,
                available: account.lamports,
            })?;
        Ok(())
    }

    fn credit(&mut self, address: &Identity, amount: u64) -> Result<(), LedgerError> {
        match self.store.get_mut(address) {
            Some(account) => {
                account.lamports = account
                    .lamports
                    .checked_add(amount)
                    .ok_or(LedgerError::Overflow)?;
            }
            None => self.store.insert(*address, Account::wallet(amount)),
        }
        Ok(())
    }
}

/// Committed state of a [`MemoryLedger`].
#[derive(Debug, Clone, Default)]
pub struct LedgerState {
    accounts: HashMap<Identity, Account>,
}

impl AccountStore for LedgerState {
    fn get(&self, address: &Identity) -> Option<&Account> {
        self.accounts.get(address)
    }

    fn get_mut(&mut self, address: &Identity) -> Option<&mut Account> {
        self.accounts.get_mut(address)
    }

    fn insert(&mut self, address: Identity, account: Account) {
        self.accounts.insert(address, account);
    }

    fn remove(&mut self, address: &Identity) -> Option<Account> {
        self.accounts.remove(address)
    }
}

/// In-memory ledger.
///
/// Each execution works on a staged copy of the state under the ledger
/// lock and swaps it in on success, so concurrent executions against the
/// same accounts are applied one at a time.
#[derive(Debug, Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Credits native currency to `to`, creating a wallet if needed.
    pub fn airdrop(&self, to: &Identity, lamports: u64) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        Transaction::new(&mut *state, &[]).credit(to, lamports)
    }

    /// Registers a new asset definition.
    pub fn create_mint(&self, mint: &Identity, decimals: u8) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        if state.get(mint).is_some() {
            return Err(LedgerError::AccountExists(*mint));
        }
        state.insert(
            *mint,
            Account {
                lamports: rent_exempt_minimum(MINT_ACCOUNT_LEN),
                owner: ASSET_PROGRAM,
                data: AccountData::Mint(MintAccount {
                    decimals,
                    supply: 0,
                }),
            },
        );
        Ok(())
    }

    /// Opens an empty asset account for `owner` without charging storage.
    pub fn open_asset_account(
        &self,
        address: &Identity,
        mint: &Identity,
        owner: &Identity,
    ) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        Transaction::new(&mut *state, &[]).mint_account(mint)?;
        if state.get(address).is_some() {
            return Err(LedgerError::AccountExists(*address));
        }
        state.insert(
            *address,
            Account {
                lamports: rent_exempt_minimum(ASSET_ACCOUNT_LEN),
                owner: ASSET_PROGRAM,
                data: AccountData::Asset(AssetAccount {
                    mint: *mint,
                    owner: *owner,
                    amount: 0,
                }),
            },
        );
        Ok(())
    }

    /// Issues `amount` new units into an asset account.
    pub fn mint_to(&self, account: &Identity, amount: u64) -> Result<(), LedgerError> {
        let mut state = self.state.lock();
        let mint = Transaction::new(&mut *state, &[]).asset_account(account)?.mint;

        if let Some(Account {
            data: AccountData::Mint(m),
            ..
        }) = state.get_mut(&mint)
        {
            m.supply = m.supply.checked_add(amount).ok_or(LedgerError::Overflow)?;
        }
        if let Some(Account {
            data: AccountData::Asset(asset),
            ..
        }) = state.get_mut(account)
        {
            asset.amount = asset.amount.checked_add(amount).ok_or(LedgerError::Overflow)?;
        }
        Ok(())
    }

    /// Native balance of `address`; zero if unknown.
    pub fn lamports(&self, address: &Identity) -> u64 {
        self.state.lock().get(address).map_or(0, |a| a.lamports)
    }

    /// Asset balance of an asset account.
    pub fn asset_balance(&self, address: &Identity) -> Option<u64> {
        match self.state.lock().get(address) {
            Some(Account {
                data: AccountData::Asset(asset),
                ..
            }) => Some(asset.amount),
            _ => None,
        }
    }

    pub fn account_exists(&self, address: &Identity) -> bool {
        self.state.lock().get(address).is_some()
    }
}

impl Ledger for MemoryLedger {
    fn execute<T, F>(&self, signers: &[Identity], op: F) -> Result<T, SaleError>
    where
        F: FnOnce(&mut Transaction<'_>) -> Result<T, SaleError>,
    {
        let mut committed = self.state.lock();
        let mut staged = committed.clone();
        let out = op(&mut Transaction::new(&mut staged, signers))?;
        *committed = staged;
        Ok(out)
    }

    fn account(&self, address: &Identity) -> Option<Account> {
        self.state.lock().get(address).cloned()
    }

    fn program_accounts(&self, program_id: &Identity) -> Vec<(Identity, Account)> {
        let mut accounts: Vec<_> = self
            .state
            .lock()
            .accounts
            .iter()
            .filter(|(_, account)| account.owner == *program_id)
            .map(|(address, account)| (*address, account.clone()))
            .collect();
        accounts.sort_by_key(|(address, _)| *address);
        accounts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn funded(ledger: &MemoryLedger, label: &str, lamports: u64) -> Identity {
        let id = Identity::hashed(label);
        ledger.airdrop(&id, lamports).unwrap();
        id
    }

    #[test]
    fn rent_matches_cluster_defaults() {
        assert_eq!(rent_exempt_minimum(0), 890_880);
        assert_eq!(rent_exempt_minimum(ASSET_ACCOUNT_LEN), 2_039_280);
    }

    #[test]
    fn failed_execution_leaves_no_trace() {
        let ledger = MemoryLedger::new();
        let alice = funded(&ledger, "alice", 1_000);
        let bob = funded(&ledger, "bob", 0);

        let res: Result<(), SaleError> = ledger.execute(&[alice], |tx| {
            tx.transfer_lamports(&alice, &bob, 600)?;
            tx.transfer_lamports(&alice, &bob, 600)?;
            Ok(())
        });
        assert!(matches!(
            res,
            Err(SaleError::Ledger(LedgerError::InsufficientLamports { .. }))
        ));
        assert_eq!(ledger.lamports(&alice), 1_000);
        assert_eq!(ledger.lamports(&bob), 0);
    }

    #[test]
    fn native_transfer_requires_signature() {
        let ledger = MemoryLedger::new();
        let alice = funded(&ledger, "alice", 1_000);
        let bob = Identity::hashed("bob");

        let res = ledger.execute(&[bob], |tx| Ok(tx.transfer_lamports(&alice, &bob, 1)?));
        assert_eq!(
            res,
            Err(SaleError::Ledger(LedgerError::MissingSignature(alice)))
        );

        ledger
            .execute(&[alice], |tx| Ok(tx.transfer_lamports(&alice, &bob, 250)?))
            .unwrap();
        assert_eq!(ledger.lamports(&bob), 250);
    }

    #[test]
    fn asset_transfer_checks_owner_and_mint() {
        let ledger = MemoryLedger::new();
        let mint = Identity::hashed("mint");
        let other_mint = Identity::hashed("other-mint");
        ledger.create_mint(&mint, 1).unwrap();
        ledger.create_mint(&other_mint, 1).unwrap();

        let alice = Identity::hashed("alice");
        let (a, b, c) = (
            Identity::hashed("a"),
            Identity::hashed("b"),
            Identity::hashed("c"),
        );
        ledger.open_asset_account(&a, &mint, &alice).unwrap();
        ledger.open_asset_account(&b, &mint, &Identity::hashed("bob")).unwrap();
        ledger.open_asset_account(&c, &other_mint, &alice).unwrap();
        ledger.mint_to(&a, 100).unwrap();

        let res = ledger.execute(&[alice], |tx| {
            Ok(tx.transfer_asset(&a, &c, 10, Authority::Signer(alice))?)
        });
        assert_eq!(res, Err(SaleError::Ledger(LedgerError::MintMismatch)));

        let mallory = Identity::hashed("mallory");
        let res = ledger.execute(&[mallory], |tx| {
            Ok(tx.transfer_asset(&a, &b, 10, Authority::Signer(mallory))?)
        });
        assert_eq!(res, Err(SaleError::Ledger(LedgerError::OwnerMismatch(a))));

        ledger
            .execute(&[alice], |tx| {
                Ok(tx.transfer_asset(&a, &b, 40, Authority::Signer(alice))?)
            })
            .unwrap();
        assert_eq!(ledger.asset_balance(&a), Some(60));
        assert_eq!(ledger.asset_balance(&b), Some(40));
    }

    #[test]
    fn asset_account_creation_charges_payer() {
        let ledger = MemoryLedger::new();
        let mint = Identity::hashed("mint");
        ledger.create_mint(&mint, 0).unwrap();
        let payer = funded(&ledger, "payer", 5_000_000);
        let fresh = Identity::hashed("fresh");

        let res = ledger.execute(&[payer], |tx| {
            Ok(tx.create_asset_account(&payer, &fresh, &mint, &payer)?)
        });
        assert_eq!(
            res,
            Err(SaleError::Ledger(LedgerError::MissingSignature(fresh)))
        );

        let rent = ledger
            .execute(&[payer, fresh], |tx| {
                Ok(tx.create_asset_account(&payer, &fresh, &mint, &payer)?)
            })
            .unwrap();
        assert_eq!(rent, rent_exempt_minimum(ASSET_ACCOUNT_LEN));
        assert_eq!(ledger.lamports(&payer), 5_000_000 - rent);
        assert_eq!(ledger.asset_balance(&fresh), Some(0));
    }
}
