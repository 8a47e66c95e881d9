//! Persisted sale record.
//!
//! Account layout (little-endian, fixed width):
//!
//! | Offset | Size | Field |
//! |---|---|---|
//! | 0   | 8  | discriminator (`sha256("account:TokenSale")[..8]`) |
//! | 8   | 32 | authority |
//! | 40  | 32 | mint |
//! | 72  | 32 | initializer_token_account |
//! | 104 | 32 | vault |
//! | 136 | 8  | total_deposited |
//! | 144 | 8  | claim_size |
//! | 152 | 8  | remaining |
//! | 160 | 8  | num_claims |
//! | 168 | 8  | max_claims |
//! | 176 | 8  | fee |
//! | 184 | 1  | nonce |

use bincode::{Decode, Encode};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{LedgerError, SaleError};
use crate::identity::Identity;

/// Lifecycle of a sale record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum SaleState {
    /// No record at the derived address.
    Uninitialized,
    /// Record and vault exist; claims are accepted while allocations remain.
    Active,
    /// Cancelled; record and vault are gone.
    Retired,
}

/// State of one active token sale.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode, Serialize, Deserialize)]
pub struct SaleRecord {
    /// The initializer; sole party permitted to cancel.
    pub authority: Identity,
    /// The asset being sold.
    pub mint: Identity,
    /// Where cancelled funds are returned.
    pub initializer_token_account: Identity,
    /// Custody vault holding the escrowed asset.
    pub vault: Identity,
    /// Amount deposited at initialize time.
    pub total_deposited: u64,
    /// Fixed amount released per claim.
    pub claim_size: u64,
    /// `total_deposited - num_claims * claim_size`.
    pub remaining: u64,
    /// Claims fulfilled so far.
    pub num_claims: u64,
    /// Ceiling on `num_claims`.
    pub max_claims: u64,
    /// Native-currency fee paid to the authority per claim.
    pub fee: u64,
    /// Canonical nonce of the record's derived address.
    pub nonce: u8,
}

impl SaleRecord {
    /// Encoded record size, without the discriminator.
    pub const LEN: usize = 32 * 4 + 8 * 6 + 1;

    /// Size of the record account data.
    pub const ACCOUNT_LEN: usize = 8 + Self::LEN;

    /// Type tag prefixed to the account data.
    pub fn discriminator() -> [u8; 8] {
        let hash = Sha256::digest(b"account:TokenSale");
        let mut disc = [0u8; 8];
        disc.copy_from_slice(&hash[..8]);
        disc
    }

    /// Encodes the record with its discriminator.
    pub fn to_account_data(&self) -> Result<Vec<u8>, LedgerError> {
        let mut data = Vec::with_capacity(Self::ACCOUNT_LEN);
        data.extend_from_slice(&Self::discriminator());
        let body = bincode::encode_to_vec(self, bincode::config::legacy())
            .map_err(|e| LedgerError::Encoding(e.to_string()))?;
        data.extend_from_slice(&body);
        debug_assert_eq!(data.len(), Self::ACCOUNT_LEN);
        Ok(data)
    }

    /// Decodes account data written by [`Self::to_account_data`].
    pub fn from_account_data(data: &[u8]) -> Result<Self, LedgerError> {
        if data.len() != Self::ACCOUNT_LEN {
            return Err(LedgerError::Encoding(format!(
                "expected {} bytes, got {}",
                Self::ACCOUNT_LEN,
                data.len()
            )));
        }
        let (disc, body) = data.split_at(8);
        if disc != Self::discriminator() {
            return Err(LedgerError::Encoding("discriminator mismatch".to_string()));
        }
        let (record, _) = bincode::decode_from_slice(body, bincode::config::legacy())
            .map_err(|e| LedgerError::Encoding(e.to_string()))?;
        Ok(record)
    }

    /// Whether every allocation has been claimed.
    pub fn is_exhausted(&self) -> bool {
        self.num_claims >= self.max_claims
    }

    /// Checks the counters against the stored parameters.
    pub fn invariants_hold(&self) -> bool {
        let claimed = self.num_claims.checked_mul(self.claim_size);
        let expected = claimed.and_then(|c| self.total_deposited.checked_sub(c));
        expected == Some(self.remaining) && self.num_claims <= self.max_claims
    }

    /// Fails unless one more claim can be served.
    pub fn ensure_claimable(&self) -> Result<(), SaleError> {
        if self.is_exhausted() {
            return Err(SaleError::SaleExhausted {
                max_claims: self.max_claims,
            });
        }
        if self.remaining < self.claim_size {
            return Err(SaleError::InsufficientVaultBalance {
                remaining: self.remaining,
                claim_size: self.claim_size,
            });
        }
        Ok(())
    }

    /// Advances the counters by one claim.
    pub fn record_claim(&mut self) -> Result<(), SaleError> {
        self.ensure_claimable()?;
        self.num_claims = self
            .num_claims
            .checked_add(1)
            .ok_or(LedgerError::Overflow)?;
        self.remaining -= self.claim_size;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SaleRecord {
        SaleRecord {
            authority: Identity::new([1; 32]),
            mint: Identity::new([2; 32]),
            initializer_token_account: Identity::new([3; 32]),
            vault: Identity::new([4; 32]),
            total_deposited: 2_000_000,
            claim_size: 500_000,
            remaining: 2_000_000,
            num_claims: 0,
            max_claims: 4,
            fee: 100_000_000,
            nonce: 254,
        }
    }

    #[test]
    fn layout_matches_field_table() {
        let data = record().to_account_data().unwrap();
        assert_eq!(data.len(), 185);
        assert_eq!(&data[..8], &SaleRecord::discriminator());
        assert_eq!(&data[8..40], &[1; 32]);
        assert_eq!(&data[40..72], &[2; 32]);
        assert_eq!(&data[72..104], &[3; 32]);
        assert_eq!(&data[104..136], &[4; 32]);
        assert_eq!(&data[136..144], &2_000_000u64.to_le_bytes());
        assert_eq!(&data[144..152], &500_000u64.to_le_bytes());
        assert_eq!(&data[152..160], &2_000_000u64.to_le_bytes());
        assert_eq!(&data[160..168], &0u64.to_le_bytes());
        assert_eq!(&data[168..176], &4u64.to_le_bytes());
        assert_eq!(&data[176..184], &100_000_000u64.to_le_bytes());
        assert_eq!(data[184], 254);

        assert_eq!(SaleRecord::from_account_data(&data).unwrap(), record());
    }

    #[test]
    fn rejects_foreign_account_data() {
        let mut data = record().to_account_data().unwrap();
        data[0] ^= 0xff;
        assert!(SaleRecord::from_account_data(&data).is_err());
        assert!(SaleRecord::from_account_data(&data[..100]).is_err());
    }

    #[test]
    fn claims_advance_until_exhausted() {
        let mut sale = record();
        for n in 1..=4 {
            sale.record_claim().unwrap();
            assert_eq!(sale.num_claims, n);
            assert!(sale.invariants_hold());
        }
        assert_eq!(sale.remaining, 0);
        assert!(sale.is_exhausted());

        let before = sale.clone();
        assert_eq!(
            sale.record_claim(),
            Err(SaleError::SaleExhausted { max_claims: 4 })
        );
        assert_eq!(sale, before);
    }

    #[test]
    fn short_vault_is_reported() {
        let mut sale = SaleRecord {
            total_deposited: 700_000,
            remaining: 700_000,
            ..record()
        };
        sale.record_claim().unwrap();
        assert_eq!(
            sale.record_claim(),
            Err(SaleError::InsufficientVaultBalance {
                remaining: 200_000,
                claim_size: 500_000
            })
        );
        assert_eq!(sale.num_claims, 1);
    }
}
