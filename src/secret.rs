//! Reversible credential obfuscation.
//!
//! Stored device secrets are base64-wrapped so they do not sit in the
//! inventory as bare text. This is obfuscation, not confidentiality: anyone
//! with the stored token can recover the secret. The weakness is documented
//! and accepted — proper secret storage is the deployment's problem.
//!
//! Decoding is tolerant by design. Historical inventories hold secrets both
//! encoded and as plaintext, so a token that fails strict decoding (invalid
//! base64, or a payload that is not UTF-8) is used as-is rather than
//! rejected.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use secrecy::SecretString;

/// Encode a plaintext secret into its stored form.
pub fn encode_secret(secret: &str) -> String {
    STANDARD.encode(secret.as_bytes())
}

/// Recover the plaintext secret from a stored token.
///
/// Falls back to treating the token itself as the secret when it is not a
/// valid encoding. Never fails.
pub fn reveal_secret(stored: &str) -> SecretString {
    match STANDARD.decode(stored) {
        Ok(bytes) => match String::from_utf8(bytes) {
            Ok(plain) => SecretString::from(plain),
            Err(_) => SecretString::from(stored.to_owned()),
        },
        Err(_) => SecretString::from(stored.to_owned()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    #[test]
    fn round_trip() {
        for secret in ["hunter2", "", "påssword with späces", "a"] {
            let token = encode_secret(secret);
            assert_eq!(reveal_secret(&token).expose_secret(), secret);
        }
    }

    #[test]
    fn invalid_base64_falls_back_to_plaintext() {
        // '!' is outside the base64 alphabet, so decoding fails and the
        // stored value is used verbatim.
        let stored = "not-encoded!";
        assert_eq!(reveal_secret(stored).expose_secret(), stored);
    }

    #[test]
    fn bad_padding_falls_back_to_plaintext() {
        // Plain ASCII whose length is not a multiple of four fails strict
        // decoding and must be passed through unchanged.
        let stored = "plainpass";
        assert_eq!(reveal_secret(stored).expose_secret(), stored);
    }

    #[test]
    fn non_utf8_payload_falls_back_to_plaintext() {
        // Valid base64, but the decoded bytes are not UTF-8.
        let stored = STANDARD.encode([0xff, 0xfe, 0x00, 0x01]);
        assert_eq!(reveal_secret(&stored).expose_secret(), stored);
    }
}
