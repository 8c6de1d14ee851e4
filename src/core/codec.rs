/*!
 * Binary Snapshot Codec
 * bincode helpers for the persistence file format
 */

use serde::{de::DeserializeOwned, Serialize};

/// Result type for codec operations
pub type CodecResult<T> = Result<T, CodecError>;

/// Binary serialization errors
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Encoding error: {0}")]
    Encode(String),
    #[error("Decoding error: {0}")]
    Decode(String),
}

/// Serialize to binary bytes using bincode
#[inline]
pub fn to_vec<T: Serialize + ?Sized>(value: &T) -> CodecResult<Vec<u8>> {
    bincode::serialize(value).map_err(|e| CodecError::Encode(e.to_string()))
}

/// Deserialize from binary bytes using bincode
///
/// Matches the output of `to_vec`.
#[inline]
pub fn from_slice<T: DeserializeOwned>(bytes: &[u8]) -> CodecResult<T> {
    bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Sample {
        name: String,
        values: Vec<u64>,
    }

    #[test]
    fn test_round_trip() {
        let sample = Sample {
            name: "totals".to_string(),
            values: vec![1, 2, 3],
        };
        let bytes = to_vec(&sample).unwrap();
        let back: Sample = from_slice(&bytes).unwrap();
        assert_eq!(sample, back);
    }

    #[test]
    fn test_decode_error() {
        let result: CodecResult<Sample> = from_slice(&[0xFF, 0xFF, 0xFF]);
        assert!(result.is_err());
    }
}
