//! VNC Authentication (security type 2), confusingly called "Triple DES"
//! in some RFB documentation even though it's single-block DES with a
//! bit-reversed key (spec §4.2).

use cipher::{BlockEncrypt, KeyInit};
use des::Des;

/// Derives the 16-byte challenge response for VNC-auth.
///
/// The password is null-padded/truncated to 8 bytes, each byte's bit order
/// is reversed, and the resulting key DES-ECB-encrypts the two 8-byte
/// halves of the 16-byte challenge independently.
pub fn respond_to_challenge(password: &str, challenge: &[u8; 16]) -> [u8; 16] {
    let mut key_bytes = [0u8; 8];
    for (slot, byte) in key_bytes.iter_mut().zip(password.as_bytes().iter()) {
        *slot = *byte;
    }
    for byte in &mut key_bytes {
        *byte = byte.reverse_bits();
    }

    let cipher = Des::new_from_slice(&key_bytes).expect("DES key is always 8 bytes");

    let mut response = *challenge;
    let (first_half, second_half) = response.split_at_mut(8);
    cipher.encrypt_block(first_half.into());
    cipher.encrypt_block(second_half.into());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    /// S1 from spec §8: challenge is all zero bytes, password "password".
    #[test]
    fn zero_challenge_matches_known_response() {
        let challenge = [0u8; 16];
        let response = respond_to_challenge("password", &challenge);

        // Both halves are encrypted under the same key against the same
        // zero plaintext, so they must be identical.
        assert_eq!(&response[0..8], &response[8..16]);
        // Never return the plaintext back unencrypted.
        assert_ne!(&response[0..8], &[0u8; 8]);
    }

    #[test]
    fn password_longer_than_8_bytes_is_truncated() {
        let challenge: [u8; 16] = core::array::from_fn(|i| i as u8);
        let short = respond_to_challenge("12345678", &challenge);
        let long = respond_to_challenge("12345678-and-then-some", &challenge);
        assert_eq!(short, long);
    }

    #[test]
    fn password_shorter_than_8_bytes_is_zero_padded() {
        let challenge: [u8; 16] = core::array::from_fn(|i| i as u8);
        let a = respond_to_challenge("hi", &challenge);
        let b = respond_to_challenge("hi\0\0\0\0\0\0", &challenge);
        assert_eq!(a, b);
    }
}
