/*
    Copyright © 2026, The pbft_rs Authors
    Licensed under the Apache License, Version 2.0: http://www.apache.org/licenses/LICENSE-2.0
*/

//! Cryptographic primitives.

use sha2::{Digest, Sha256};

use super::data_types::{CryptoHash, SignatureBytes};

// re-exports below.
pub use sha2::Sha256 as CryptoHasher;

pub use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};

/// A wrapper around [`SigningKey`](ed25519_dalek::SigningKey) that implements a
/// [convenience method](Self::sign) for creating signatures as well as a [getter](Self::public)
/// for the public key.
#[derive(Clone)]
pub(crate) struct Keypair(pub(crate) SigningKey);

impl Keypair {
    pub(crate) fn new(signing_key: SigningKey) -> Keypair {
        Keypair(signing_key)
    }

    /// Convenience method for creating signatures over values or messages represented as vectors
    /// of bytes.
    pub(crate) fn sign(&self, message: &[u8]) -> SignatureBytes {
        SignatureBytes::new(self.0.sign(message).to_bytes())
    }

    pub(crate) fn public(&self) -> VerifyingKey {
        self.0.verifying_key()
    }
}

/// Compute the SHA256 digest of `bytes`.
pub fn sha256(bytes: &[u8]) -> CryptoHash {
    CryptoHash::new(Sha256::digest(bytes).into())
}

/// The well-known digest that distinguishes empty proposals: the SHA256 digest of the empty byte
/// string.
///
/// A pre-prepare reconstructed during a view change carries this hash when no prepared evidence
/// exists for its sequence number, telling replicas to fill the gap with an empty proposal.
pub fn empty_hash() -> CryptoHash {
    sha256(&[])
}
