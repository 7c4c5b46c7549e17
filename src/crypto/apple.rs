//! Apple Remote Desktop authentication (security type 30): a
//! Diffie-Hellman key agreement followed by MD5-derived AES-128-ECB
//! encryption of the credentials (spec §4.2).
//!
//! The exact byte layout here is not part of any public RFB extension
//! document; it matches the observed wire behavior described in spec §4.2
//! and §9's Open Questions.

use aes::Aes128;
use cipher::{block_padding::NoPadding, BlockEncryptMut, KeyInit};
use ecb::Encryptor as EcbEncryptor;
use md5::{Digest, Md5};
use num_bigint::BigUint;
use rand::RngCore;

use crate::error::{Error, Result};

/// Fixed width (bytes) of the DH modulus, generator-derived public keys,
/// and shared secret on the wire.
pub const KEY_LENGTH: usize = 256;

const USERNAME_FIELD_LEN: usize = 64;
const PASSWORD_FIELD_LEN: usize = 64;
const CREDENTIALS_LEN: usize = USERNAME_FIELD_LEN + PASSWORD_FIELD_LEN;

/// The client's half of the Diffie-Hellman exchange: a private exponent
/// and its corresponding public key, `generator^private mod prime`.
pub struct KeyPair {
    private: BigUint,
    pub public: [u8; KEY_LENGTH],
}

impl KeyPair {
    /// Generates a fresh 2048-bit private exponent and derives the public
    /// key against the server-supplied `generator`/`prime`.
    pub fn generate(generator: u16, prime: &[u8]) -> Result<KeyPair> {
        let prime = BigUint::from_bytes_be(prime);
        let generator = BigUint::from(generator);

        let mut private_bytes = [0u8; KEY_LENGTH];
        rand::rng().fill_bytes(&mut private_bytes);
        let private = BigUint::from_bytes_be(&private_bytes);

        let public = generator.modpow(&private, &prime);
        let public = to_fixed_be(&public, KEY_LENGTH)
            .ok_or(Error::CryptoError("DH public key does not fit in 256 bytes"))?;

        Ok(KeyPair { private, public })
    }

    /// Computes the shared secret `peer_public^private mod prime` and
    /// derives the AES-128 key `MD5(shared_secret)` from it.
    pub fn shared_key(&self, prime: &[u8], peer_public: &[u8]) -> Result<[u8; 16]> {
        if peer_public.is_empty() || peer_public.len() > KEY_LENGTH {
            return Err(Error::CryptoError("peer DH public key out of range"));
        }
        let prime = BigUint::from_bytes_be(prime);
        let peer_public = BigUint::from_bytes_be(peer_public);
        if peer_public >= prime {
            return Err(Error::CryptoError("peer DH public key out of range"));
        }

        let shared = peer_public.modpow(&self.private, &prime);
        let shared = to_fixed_be(&shared, KEY_LENGTH)
            .ok_or(Error::CryptoError("DH shared secret does not fit in 256 bytes"))?;

        let mut hasher = Md5::new();
        hasher.update(shared);
        Ok(hasher.finalize().into())
    }
}

/// Encodes `username`/`password` into the null-padded credentials block
/// and encrypts it with AES-128-ECB under `key`.
pub fn encrypt_credentials(key: &[u8; 16], username: &str, password: &str) -> [u8; CREDENTIALS_LEN] {
    let mut plaintext = [0u8; CREDENTIALS_LEN];
    copy_null_padded(&mut plaintext[..USERNAME_FIELD_LEN], username.as_bytes());
    copy_null_padded(&mut plaintext[USERNAME_FIELD_LEN..], password.as_bytes());

    let mut buf = plaintext;
    EcbEncryptor::<Aes128>::new(key.into())
        .encrypt_padded_mut::<NoPadding>(&mut buf, CREDENTIALS_LEN)
        .expect("credentials block is already block-aligned");
    buf
}

fn copy_null_padded(dst: &mut [u8], src: &[u8]) {
    let n = src.len().min(dst.len());
    dst[..n].copy_from_slice(&src[..n]);
}

/// Big-endian-encodes `value` into exactly `len` bytes, left-padding with
/// zeros. `BigUint::to_bytes_be` drops leading zero bytes, so the wire
/// format (which is fixed-width) needs them put back.
fn to_fixed_be(value: &BigUint, len: usize) -> Option<[u8; KEY_LENGTH]> {
    let bytes = value.to_bytes_be();
    if bytes.len() > len {
        return None;
    }
    let mut out = [0u8; KEY_LENGTH];
    out[len - bytes.len()..len].copy_from_slice(&bytes);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A small prime stands in for the real 2048-bit modulus so the test
    /// exercises the modexp plumbing without 256-byte arithmetic.
    fn toy_prime() -> Vec<u8> {
        vec![0xff; 32]
    }

    #[test]
    fn dh_exchange_agrees_on_shared_secret() {
        let prime = toy_prime();
        let alice = KeyPair::generate(2, &prime).unwrap();
        let bob = KeyPair::generate(2, &prime).unwrap();

        let alice_secret = alice.shared_key(&prime, &bob.public).unwrap();
        let bob_secret = bob.shared_key(&prime, &alice.public).unwrap();
        assert_eq!(alice_secret, bob_secret);
    }

    #[test]
    fn peer_public_key_out_of_range_is_rejected() {
        let prime = toy_prime();
        let keypair = KeyPair::generate(2, &prime).unwrap();
        // A "public key" equal to the prime itself is out of range (must be < prime).
        assert!(keypair.shared_key(&prime, &prime).is_err());
    }

    #[test]
    fn credentials_block_is_128_bytes_and_deterministic() {
        let key = [0x11u8; 16];
        let block_a = encrypt_credentials(&key, "alice", "hunter2");
        let block_b = encrypt_credentials(&key, "alice", "hunter2");
        assert_eq!(block_a.len(), CREDENTIALS_LEN);
        assert_eq!(block_a, block_b);

        let block_c = encrypt_credentials(&key, "alice", "different");
        assert_ne!(block_a, block_c);
    }
}
