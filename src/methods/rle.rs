//! Run-length coding with literal and repeat runs
//!
//! Control byte `0..=127`: the next `c + 1` bytes are literals.
//! Control byte `128..=254`: the next byte repeats `c - 125` times (3..=129).
//! Control byte `255`: a LEB128 count `n` and a byte follow; the byte repeats `n + 130` times.

use super::{check_length, decode_capacity, CompressionMethod, MethodId};
use crate::analyzer::{ChunkStats, RLE_MIN_REPETITION};
use crate::error::{AmbcError, Result};

const MAX_LITERAL_RUN: usize = 128;
const MIN_REPEAT_RUN: usize = 3;
const MAX_SHORT_RUN: usize = 129;
const LONG_RUN: u8 = 255;
const LONG_RUN_BASE: usize = 130;

pub struct RleMethod;

impl RleMethod {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RleMethod {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressionMethod for RleMethod {
    fn id(&self) -> MethodId {
        MethodId::Rle
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(encode(data))
    }

    fn decompress(&self, payload: &[u8], original_len: usize) -> Result<Vec<u8>> {
        let decoded = decode(payload, original_len)?;
        check_length(MethodId::Rle, &decoded, original_len)?;
        Ok(decoded)
    }

    fn quick_score(&self, stats: &ChunkStats) -> bool {
        stats.repetition_ratio > RLE_MIN_REPETITION
    }
}

pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(data.len() / 2 + 2);
    let mut literal_start = 0;
    let mut i = 0;

    while i < data.len() {
        let run = data[i..].iter().take_while(|&&b| b == data[i]).count();
        if run >= MIN_REPEAT_RUN {
            flush_literals(&mut encoded, &data[literal_start..i]);
            if run <= MAX_SHORT_RUN {
                encoded.push((run + 125) as u8);
            } else {
                encoded.push(LONG_RUN);
                write_count(&mut encoded, run - LONG_RUN_BASE);
            }
            encoded.push(data[i]);
            literal_start = i + run;
        }
        i += run;
    }
    flush_literals(&mut encoded, &data[literal_start..]);

    encoded
}

fn flush_literals(encoded: &mut Vec<u8>, literals: &[u8]) {
    for block in literals.chunks(MAX_LITERAL_RUN) {
        encoded.push((block.len() - 1) as u8);
        encoded.extend_from_slice(block);
    }
}

fn write_count(encoded: &mut Vec<u8>, mut count: usize) {
    while count >= 0x80 {
        encoded.push((count as u8 & 0x7F) | 0x80);
        count >>= 7;
    }
    encoded.push(count as u8);
}

fn read_count(data: &[u8], i: &mut usize) -> Result<usize> {
    let mut count = 0usize;
    for shift in (0..usize::BITS).step_by(7) {
        let byte = *data
            .get(*i)
            .ok_or_else(|| AmbcError::corrupt("rle run count past end of payload"))?;
        *i += 1;
        count |= ((byte & 0x7F) as usize)
            .checked_shl(shift)
            .ok_or_else(|| AmbcError::corrupt("rle run count overflows"))?;
        if byte & 0x80 == 0 {
            return Ok(count);
        }
    }
    Err(AmbcError::corrupt("rle run count overflows"))
}

pub fn decode(data: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut decoded = Vec::with_capacity(decode_capacity(expected_len, data.len(), 130));
    let mut i = 0;

    while i < data.len() {
        let control = data[i];
        i += 1;
        if control < 128 {
            let count = control as usize + 1;
            let literals = data
                .get(i..i + count)
                .ok_or_else(|| AmbcError::corrupt("rle literal run past end of payload"))?;
            decoded.extend_from_slice(literals);
            i += count;
        } else {
            let run = if control == LONG_RUN {
                read_count(data, &mut i)?.saturating_add(LONG_RUN_BASE)
            } else {
                control as usize - 125
            };
            let value = *data
                .get(i)
                .ok_or_else(|| AmbcError::corrupt("rle repeat run without a value byte"))?;
            i += 1;
            if run > expected_len - decoded.len().min(expected_len) {
                return Err(AmbcError::corrupt("rle payload expands past the declared length"));
            }
            decoded.resize(decoded.len() + run, value);
        }
        if decoded.len() > expected_len {
            return Err(AmbcError::corrupt("rle payload expands past the declared length"));
        }
    }

    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rle_empty() {
        let encoded = encode(&[]);
        assert!(encoded.is_empty());
        assert!(decode(&encoded, 0).unwrap().is_empty());
    }

    #[test]
    fn test_rle_literals_only() {
        let data = vec![1, 2, 3, 4, 5];
        let encoded = encode(&data);
        assert_eq!(encoded, vec![4, 1, 2, 3, 4, 5]);
        assert_eq!(decode(&encoded, data.len()).unwrap(), data);
    }

    #[test]
    fn test_rle_mixed_runs() {
        let data = vec![1, 0, 0, 0, 2, 2, 3];
        let encoded = encode(&data);
        // literal [1], repeat 0 x3, literal [2, 2, 3]
        assert_eq!(encoded, vec![0, 1, 128, 0, 2, 2, 2, 3]);
        assert_eq!(decode(&encoded, data.len()).unwrap(), data);
    }

    #[test]
    fn test_rle_long_run() {
        let data = vec![0u8; 4096];
        let encoded = encode(&data);
        // 3966 extra repeats fit in a two-byte count
        assert_eq!(encoded, vec![LONG_RUN, 0xFE, 0x1E, 0]);
        assert_eq!(decode(&encoded, data.len()).unwrap(), data);
    }

    #[test]
    fn test_rle_short_and_long_run_boundary() {
        for run in [MAX_SHORT_RUN - 1, MAX_SHORT_RUN, MAX_SHORT_RUN + 1, LONG_RUN_BASE + 1] {
            let mut data = vec![9u8; run];
            data.push(1);
            let encoded = encode(&data);
            assert_eq!(decode(&encoded, data.len()).unwrap(), data);
        }
    }

    #[test]
    fn test_rle_long_literal_block() {
        let data: Vec<u8> = (0..300u32).map(|i| (i % 2) as u8).collect();
        let encoded = encode(&data);
        assert_eq!(decode(&encoded, data.len()).unwrap(), data);
    }

    #[test]
    fn test_rle_malformed_payload() {
        assert!(decode(&[5, 1, 2], 6).is_err());
        assert!(decode(&[200], 75).is_err());
        assert!(decode(&[255, 9], 200).is_err());
        assert!(decode(&[255, 0x80], 200).is_err());
        assert!(decode(&[255, 0, 7], 10).is_err());
    }
}
