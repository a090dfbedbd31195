//! Ed25519 signature verification.
//!
//! Verification never fails loudly: a malformed key, a malformed signature and
//! a wrong signature all come back as `false`.

use ed25519_dalek::{Signature, Verifier, VerifyingKey};

/// Verify an Ed25519 signature over raw bytes.
pub fn verify_signature(data: &[u8], signature_bytes: &[u8], public_key_bytes: &[u8; 32]) -> bool {
    let Ok(verifying_key) = VerifyingKey::from_bytes(public_key_bytes) else {
        return false;
    };

    let Ok(sig_arr) = <[u8; 64]>::try_from(signature_bytes) else {
        return false;
    };
    let signature = Signature::from_bytes(&sig_arr);

    verifying_key.verify(data, &signature).is_ok()
}

/// Verify a hex-encoded signature over a UTF-8 message with a hex-encoded key.
pub fn verify_hex(message: &str, signature_hex: &str, public_key_hex: &str) -> bool {
    let Ok(key_bytes) = hex::decode(public_key_hex) else {
        return false;
    };
    let Ok(key) = <[u8; 32]>::try_from(key_bytes.as_slice()) else {
        return false;
    };
    let Ok(signature) = hex::decode(signature_hex) else {
        return false;
    };

    verify_signature(message.as_bytes(), &signature, &key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::keys::generate_keypair;
    use crate::crypto::signing::{sign_bytes, RegistrationClaim};

    fn signed_claim() -> (String, Vec<u8>, [u8; 32]) {
        let keypair = generate_keypair();
        let message = RegistrationClaim::now(keypair.public_key()).message();
        let signature = sign_bytes(message.as_bytes(), &keypair);
        (message, signature, keypair.public_key_bytes())
    }

    #[test]
    fn test_claim_signature_verifies() {
        let (message, signature, key) = signed_claim();
        assert!(verify_signature(message.as_bytes(), &signature, &key));
    }

    #[test]
    fn test_any_flipped_byte_is_rejected() {
        let (message, signature, key) = signed_claim();

        for index in [0, 31, 32, 63] {
            let mut tampered = signature.clone();
            tampered[index] ^= 0x01;
            assert!(!verify_signature(message.as_bytes(), &tampered, &key), "byte {index}");
        }

        let mut altered = message.into_bytes();
        altered[0] = b'r';
        assert!(!verify_signature(&altered, &signature, &key));
    }

    #[test]
    fn test_malformed_inputs_fail_closed() {
        let (message, signature, key) = signed_claim();

        assert!(!verify_signature(message.as_bytes(), &[0u8; 64], &key));
        assert!(!verify_signature(message.as_bytes(), &signature[..32], &key));
        assert!(!verify_signature(message.as_bytes(), &[], &key));

        let (_, _, stranger) = signed_claim();
        assert!(!verify_signature(message.as_bytes(), &signature, &stranger));
    }

    #[test]
    fn test_hex_inputs_fail_closed() {
        let keypair = generate_keypair();
        let sig = hex::encode(sign_bytes(b"msg", &keypair));
        let key = keypair.public_key_hex();

        assert!(verify_hex("msg", &sig, &key));
        assert!(!verify_hex("msg", "not-hex", &key));
        assert!(!verify_hex("msg", &sig, "not-hex"));
        assert!(!verify_hex("msg", &sig, "abcd"));
        assert!(!verify_hex("msg", &sig[..10], &key));
        assert!(!verify_hex("other", &sig, &key));
    }
}
