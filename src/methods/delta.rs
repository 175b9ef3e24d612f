//! Delta coding: each byte becomes its difference from the previous byte,
//! then the differences are Huffman coded.

use super::huffman;
use super::{check_length, CompressionMethod, MethodId};
use crate::analyzer::{ChunkStats, DELTA_MIN_FRIENDLINESS};
use crate::error::Result;

pub struct DeltaMethod;

impl DeltaMethod {
    pub fn new() -> Self {
        Self
    }
}

impl Default for DeltaMethod {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressionMethod for DeltaMethod {
    fn id(&self) -> MethodId {
        MethodId::Delta
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(huffman::encode(&encode(data)))
    }

    fn decompress(&self, payload: &[u8], original_len: usize) -> Result<Vec<u8>> {
        let deltas = huffman::decode(payload, original_len)?;
        let decoded = decode(&deltas);
        check_length(MethodId::Delta, &decoded, original_len)?;
        Ok(decoded)
    }

    fn quick_score(&self, stats: &ChunkStats) -> bool {
        stats.delta_friendliness > DELTA_MIN_FRIENDLINESS
    }
}

pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut previous = 0u8;
    data.iter()
        .map(|&byte| {
            let delta = byte.wrapping_sub(previous);
            previous = byte;
            delta
        })
        .collect()
}

pub fn decode(data: &[u8]) -> Vec<u8> {
    let mut previous = 0u8;
    data.iter()
        .map(|&delta| {
            previous = previous.wrapping_add(delta);
            previous
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delta_transform() {
        let data = vec![10, 12, 11, 11, 255, 0];
        let encoded = encode(&data);
        assert_eq!(encoded, vec![10, 2, 255, 0, 244, 1]);
        assert_eq!(decode(&encoded), data);
    }

    #[test]
    fn test_delta_method_on_ramp() {
        let ramp: Vec<u8> = (0..4096u32).map(|i| (i / 3) as u8).collect();
        let method = DeltaMethod::new();
        let payload = method.compress(&ramp).unwrap();
        assert!(payload.len() < ramp.len() / 2);
        assert_eq!(method.decompress(&payload, ramp.len()).unwrap(), ramp);
    }

    #[test]
    fn test_delta_method_empty() {
        let method = DeltaMethod::new();
        let payload = method.compress(&[]).unwrap();
        assert!(method.decompress(&payload, 0).unwrap().is_empty());
    }
}
