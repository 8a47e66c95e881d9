mod common;

use common::Fixture;
use proptest::prelude::*;
use token_sale_core::ledger::LAMPORTS_PER_SOL;
use token_sale_core::{CancelAccounts, InitializeArgs, SaleError};

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Counters, vault balance and payouts stay consistent across any
    /// sequence of claims, and cancel returns exactly what is left.
    #[test]
    fn claims_preserve_record_invariants(
        total_deposited in 1u64..=5_000_000,
        claim_size in 1u64..=2_000_000,
        max_claims in 1u64..=8,
        fee in 0u64..=LAMPORTS_PER_SOL,
        attempts in 0usize..=12,
    ) {
        let f = Fixture::new("alice", total_deposited);
        let record = f.initialize(InitializeArgs {
            total_deposited,
            claim_size,
            fee,
            max_claims,
        });
        prop_assert_eq!(record.remaining, total_deposited);
        prop_assert_eq!(record.num_claims, 0);

        let mut successes = 0u64;
        for i in 0..attempts {
            let (taker, account) = f.taker(&format!("taker-{i}"), LAMPORTS_PER_SOL);
            let before = f.record().unwrap();
            match f.program.claim(&f.ledger, &[taker], &f.claim_accounts(taker, account)) {
                Ok(after) => {
                    successes += 1;
                    prop_assert_eq!(after.num_claims, before.num_claims + 1);
                    prop_assert_eq!(after.remaining, before.remaining - claim_size);
                    prop_assert_eq!(f.ledger.asset_balance(&account), Some(claim_size));
                    prop_assert_eq!(f.ledger.lamports(&taker), LAMPORTS_PER_SOL - fee);
                }
                Err(SaleError::SaleExhausted { .. }) => {
                    prop_assert_eq!(before.num_claims, max_claims);
                    prop_assert_eq!(f.record().unwrap(), before);
                }
                Err(SaleError::InsufficientVaultBalance { remaining, .. }) => {
                    prop_assert!(remaining < claim_size);
                    prop_assert_eq!(f.record().unwrap(), before);
                    prop_assert_eq!(f.ledger.lamports(&taker), LAMPORTS_PER_SOL);
                }
                Err(e) => prop_assert!(false, "unexpected claim error: {}", e),
            }

            let now = f.record().unwrap();
            prop_assert!(now.invariants_hold());
            prop_assert!(now.num_claims <= max_claims);
            prop_assert_eq!(f.ledger.asset_balance(&f.vault), Some(now.remaining));
        }

        let expected = (attempts as u64)
            .min(max_claims)
            .min(total_deposited / claim_size);
        prop_assert_eq!(successes, expected);

        let remaining = f.record().unwrap().remaining;
        let receipt = f
            .program
            .cancel(
                &f.ledger,
                &[f.authority],
                &CancelAccounts {
                    authority: f.authority,
                    record: f.record,
                    vault: f.vault,
                    receiving_account: f.funding,
                },
            )
            .unwrap();
        prop_assert_eq!(receipt.returned, remaining);
        prop_assert_eq!(
            f.ledger.asset_balance(&f.funding),
            Some(total_deposited - successes * claim_size)
        );
        prop_assert!(f.record().is_none());
    }
}
