//! Deterministic derived addresses.
//!
//! An address is derived from a list of seeds, a one-byte nonce and the
//! owning program identity. Derivations landing on the ed25519 curve are
//! rejected, so a derived address never has a matching private key and can
//! only be spent through the program that owns it.

use ed25519_dalek::VerifyingKey;
use sha2::{Digest, Sha256};

use crate::identity::Identity;

/// Domain-separation tag for sale record addresses.
pub const SALE_SEED: &[u8] = b"token_sale";

const DERIVED_ADDRESS_MARKER: &[u8] = b"ProgramDerivedAddress";

/// Derives the address for `seeds` and `nonce` under `program_id`.
///
/// Returns `None` when the digest is a valid curve point.
pub fn derive_address(seeds: &[&[u8]], nonce: u8, program_id: &Identity) -> Option<Identity> {
    let mut hasher = Sha256::new();
    for seed in seeds {
        hasher.update(seed);
    }
    hasher.update([nonce]);
    hasher.update(program_id.as_bytes());
    hasher.update(DERIVED_ADDRESS_MARKER);
    let hash: [u8; 32] = hasher.finalize().into();

    if is_on_curve(&hash) {
        return None;
    }
    Some(Identity::new(hash))
}

/// Finds the canonical derived address: the first off-curve result
/// searching the nonce downwards from 255.
pub fn find_address(seeds: &[&[u8]], program_id: &Identity) -> Option<(Identity, u8)> {
    (0..=u8::MAX)
        .rev()
        .find_map(|nonce| derive_address(seeds, nonce, program_id).map(|addr| (addr, nonce)))
}

/// The sale record address for `authority`, with its canonical nonce.
pub fn sale_address(authority: &Identity, program_id: &Identity) -> Option<(Identity, u8)> {
    find_address(&[SALE_SEED, authority.as_ref()], program_id)
}

/// Recomputes the record address from its stored authority and nonce.
pub fn verify_sale_address(
    address: &Identity,
    authority: &Identity,
    nonce: u8,
    program_id: &Identity,
) -> bool {
    derive_address(&[SALE_SEED, authority.as_ref()], nonce, program_id)
        .is_some_and(|derived| derived == *address)
}

fn is_on_curve(bytes: &[u8; 32]) -> bool {
    VerifyingKey::from_bytes(bytes).is_ok()
}

#[cfg(test)]
mod tests {
    use ed25519_dalek::SigningKey;

    use super::*;

    fn program() -> Identity {
        Identity::hashed("token-sale-program")
    }

    #[test]
    fn sale_address_is_deterministic() {
        let authority = Identity::hashed("alice");
        let a = sale_address(&authority, &program()).unwrap();
        let b = sale_address(&authority, &program()).unwrap();
        assert_eq!(a, b);

        let other = sale_address(&Identity::hashed("bob"), &program()).unwrap();
        assert_ne!(a.0, other.0);
    }

    #[test]
    fn canonical_nonce_is_highest_valid() {
        let authority = Identity::hashed("alice");
        let (addr, nonce) = sale_address(&authority, &program()).unwrap();
        for higher in (nonce..=u8::MAX).skip(1) {
            assert!(derive_address(&[SALE_SEED, authority.as_ref()], higher, &program()).is_none());
        }
        assert!(verify_sale_address(&addr, &authority, nonce, &program()));
    }

    #[test]
    fn verification_rejects_foreign_inputs() {
        let authority = Identity::hashed("alice");
        let (addr, nonce) = sale_address(&authority, &program()).unwrap();
        assert!(!verify_sale_address(
            &addr,
            &Identity::hashed("mallory"),
            nonce,
            &program()
        ));
        assert!(!verify_sale_address(
            &addr,
            &authority,
            nonce,
            &Identity::hashed("other-program")
        ));
    }

    #[test]
    fn derived_addresses_are_off_curve() {
        let key = SigningKey::from_bytes(&[7u8; 32]);
        assert!(is_on_curve(key.verifying_key().as_bytes()));

        let (addr, _) = sale_address(&Identity::hashed("alice"), &program()).unwrap();
        assert!(!is_on_curve(addr.as_bytes()));
    }
}
