use super::{CompressionMethod, MethodId};
use crate::analyzer::ChunkStats;
use crate::error::{AmbcError, Result};

/// Identity method. Always shortlisted; the fallback when nothing shrinks a chunk.
pub struct StoreMethod;

impl CompressionMethod for StoreMethod {
    fn id(&self) -> MethodId {
        MethodId::Store
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }

    fn decompress(&self, payload: &[u8], original_len: usize) -> Result<Vec<u8>> {
        if payload.len() != original_len {
            return Err(AmbcError::corrupt(format!(
                "stored payload is {} bytes, expected {}",
                payload.len(),
                original_len
            )));
        }
        Ok(payload.to_vec())
    }

    fn quick_score(&self, _stats: &ChunkStats) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_is_identity() {
        let data = b"stored verbatim".to_vec();
        let payload = StoreMethod.compress(&data).unwrap();
        assert_eq!(payload, data);
        assert_eq!(StoreMethod.decompress(&payload, data.len()).unwrap(), data);
    }

    #[test]
    fn test_store_length_mismatch() {
        assert!(StoreMethod.decompress(b"abc", 4).is_err());
    }
}
