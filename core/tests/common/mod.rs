#![allow(dead_code)]

use token_sale_core::ledger::LAMPORTS_PER_SOL;
use token_sale_core::{
    ClaimAccounts, Identity, InitializeAccounts, InitializeArgs, MemoryLedger, SaleRecord,
    TokenSale,
};

pub const SCENARIO: InitializeArgs = InitializeArgs {
    total_deposited: 2_000_000,
    claim_size: 500_000,
    fee: 100_000_000,
    max_claims: 4,
};

/// A ledger with one funded initializer ready to open a sale.
pub struct Fixture {
    pub ledger: MemoryLedger,
    pub program: TokenSale,
    pub authority: Identity,
    pub mint: Identity,
    pub funding: Identity,
    pub record: Identity,
    pub vault: Identity,
}

impl Fixture {
    pub fn new(label: &str, funding_amount: u64) -> Self {
        let ledger = MemoryLedger::new();
        let program = TokenSale::new(Identity::hashed("token-sale-program"));
        let mint = Identity::hashed("mint");
        ledger.create_mint(&mint, 1).unwrap();

        let authority = Identity::hashed(label);
        ledger.airdrop(&authority, 10 * LAMPORTS_PER_SOL).unwrap();
        let funding = Identity::hashed(&format!("{label}-funding"));
        ledger.open_asset_account(&funding, &mint, &authority).unwrap();
        ledger.mint_to(&funding, funding_amount).unwrap();
        let (record, _) = program.sale_address(&authority).unwrap();

        Self {
            ledger,
            program,
            authority,
            mint,
            funding,
            record,
            vault: Identity::hashed(&format!("{label}-vault")),
        }
    }

    pub fn init_accounts(&self) -> InitializeAccounts {
        InitializeAccounts {
            authority: self.authority,
            mint: self.mint,
            funding_account: self.funding,
            record: self.record,
            vault: self.vault,
        }
    }

    pub fn initialize(&self, args: InitializeArgs) -> SaleRecord {
        self.program
            .initialize(
                &self.ledger,
                &[self.authority, self.vault],
                &self.init_accounts(),
                args,
            )
            .unwrap()
    }

    /// Funds a taker wallet and opens its receiving account.
    pub fn taker(&self, label: &str, lamports: u64) -> (Identity, Identity) {
        let taker = Identity::hashed(label);
        if lamports > 0 {
            self.ledger.airdrop(&taker, lamports).unwrap();
        }
        let account = Identity::hashed(&format!("{label}-receiving"));
        self.ledger
            .open_asset_account(&account, &self.mint, &taker)
            .unwrap();
        (taker, account)
    }

    pub fn claim_accounts(&self, taker: Identity, taker_account: Identity) -> ClaimAccounts {
        ClaimAccounts {
            taker,
            authority: self.authority,
            record: self.record,
            vault: self.vault,
            taker_account,
        }
    }

    pub fn record(&self) -> Option<SaleRecord> {
        self.program.fetch(&self.ledger, &self.authority).unwrap()
    }
}
