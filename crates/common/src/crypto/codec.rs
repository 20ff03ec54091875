//! Binary transcoding for the ciphertext wire format

use base64::engine::general_purpose::STANDARD;
use base64::Engine;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("invalid base64: {0}")]
    Encoding(#[from] base64::DecodeError),
}

/// Encode raw bytes as padded standard base64.
pub fn encode_binary(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode padded standard base64 back into raw bytes.
pub fn decode_binary(encoded: &str) -> Result<Vec<u8>, CodecError> {
    Ok(STANDARD.decode(encoded)?)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_binary_roundtrip() {
        let bytes: Vec<u8> = (0..=255).collect();
        let encoded = encode_binary(&bytes);
        assert_eq!(decode_binary(&encoded).unwrap(), bytes);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(encode_binary(&[]), "");
        assert!(decode_binary("").unwrap().is_empty());
    }

    #[test]
    fn test_invalid_base64_rejected() {
        let result = decode_binary("not base64!!");
        assert!(matches!(result, Err(CodecError::Encoding(_))));
    }

    #[test]
    fn test_url_safe_alphabet_rejected() {
        // '-' and '_' only appear in the url-safe alphabet
        let result = decode_binary("ab-_");
        assert!(result.is_err());
    }
}
