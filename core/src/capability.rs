//! Signing capability for a sale's custody vault.

use crate::derive::verify_sale_address;
use crate::error::SaleError;
use crate::identity::Identity;
use crate::record::SaleRecord;

/// Authority to move funds out of one sale's vault.
///
/// The vault is owned by the record's derived address, which has no private
/// key. A `VaultAuthority` can only be obtained inside this crate by
/// re-deriving that address from the record's stored authority and nonce,
/// so vault funds move exclusively through the sale operations.
#[derive(Debug)]
pub struct VaultAuthority {
    address: Identity,
}

impl VaultAuthority {
    /// Re-derives the record address and binds the capability to it.
    pub(crate) fn for_record(
        record: &SaleRecord,
        record_address: &Identity,
        program_id: &Identity,
    ) -> Result<Self, SaleError> {
        if !verify_sale_address(record_address, &record.authority, record.nonce, program_id) {
            return Err(SaleError::RecordMismatch(
                "record address is not derived from its authority",
            ));
        }
        Ok(Self {
            address: *record_address,
        })
    }

    /// The derived address that owns the vault.
    pub fn address(&self) -> &Identity {
        &self.address
    }
}
