//! LZ77 dictionary coding with hash chains
//!
//! Tokens are grouped in eights behind a flag byte; bit `i` (least
//! significant first) marks token `i` as a match. A literal is one byte, a
//! match is a little-endian `u16` distance followed by `length - 3`.

use super::{check_length, decode_capacity, CompressionMethod, MethodId};
use crate::analyzer::{ChunkStats, DICTIONARY_MAX_UNIQUE, DICTIONARY_MIN_WINDOW_MATCH};
use crate::error::{AmbcError, Result};
use byteorder::{ByteOrder, LittleEndian};

/// Maximum distance to look back for matches.
pub const MAX_DISTANCE: usize = 32768;
pub const MIN_MATCH_LENGTH: usize = 3;
pub const MAX_MATCH_LENGTH: usize = 258;

const HASH_BITS: u32 = 15;
const HASH_SIZE: usize = 1 << HASH_BITS;
const MAX_CHAIN_LENGTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Token {
    Literal(u8),
    Match { length: usize, distance: usize },
}

pub struct DictionaryMethod {
    max_chain_length: usize,
}

impl DictionaryMethod {
    pub fn new() -> Self {
        Self {
            max_chain_length: MAX_CHAIN_LENGTH,
        }
    }

    pub fn with_chain_length(max_chain_length: usize) -> Self {
        Self {
            max_chain_length: max_chain_length.max(1),
        }
    }
}

impl Default for DictionaryMethod {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressionMethod for DictionaryMethod {
    fn id(&self) -> MethodId {
        MethodId::Dictionary
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let tokens = HashChain::new(self.max_chain_length).tokenize(data);
        Ok(serialize(&tokens))
    }

    fn decompress(&self, payload: &[u8], original_len: usize) -> Result<Vec<u8>> {
        let decoded = decode(payload, original_len)?;
        check_length(MethodId::Dictionary, &decoded, original_len)?;
        Ok(decoded)
    }

    fn quick_score(&self, stats: &ChunkStats) -> bool {
        stats.unique_ratio < DICTIONARY_MAX_UNIQUE || stats.window_match_ratio > DICTIONARY_MIN_WINDOW_MATCH
    }
}

#[inline]
fn hash3(data: &[u8], pos: usize) -> usize {
    let h = (data[pos] as u32) | ((data[pos + 1] as u32) << 8) | ((data[pos + 2] as u32) << 16);
    (h.wrapping_mul(2654435769) >> (32 - HASH_BITS)) as usize
}

struct HashChain {
    head: Vec<Option<usize>>,
    prev: Vec<Option<usize>>,
    max_chain_length: usize,
}

impl HashChain {
    fn new(max_chain_length: usize) -> Self {
        Self {
            head: vec![None; HASH_SIZE],
            prev: vec![None; MAX_DISTANCE],
            max_chain_length,
        }
    }

    fn insert(&mut self, data: &[u8], pos: usize) {
        if pos + MIN_MATCH_LENGTH > data.len() {
            return;
        }
        let h = hash3(data, pos);
        self.prev[pos % MAX_DISTANCE] = self.head[h];
        self.head[h] = Some(pos);
    }

    fn longest_match(&self, data: &[u8], pos: usize) -> Option<(usize, usize)> {
        if pos + MIN_MATCH_LENGTH > data.len() {
            return None;
        }
        let max_len = MAX_MATCH_LENGTH.min(data.len() - pos);
        let mut best: Option<(usize, usize)> = None;
        let mut candidate = self.head[hash3(data, pos)];
        let mut steps = 0;

        while let Some(start) = candidate {
            let distance = pos - start;
            if distance == 0 || distance > MAX_DISTANCE || steps >= self.max_chain_length {
                break;
            }
            let length = data[start..]
                .iter()
                .zip(&data[pos..pos + max_len])
                .take_while(|(a, b)| a == b)
                .count();
            if length >= MIN_MATCH_LENGTH && best.map_or(true, |(best_len, _)| length > best_len) {
                best = Some((length, distance));
                if length == max_len {
                    break;
                }
            }
            let next = self.prev[start % MAX_DISTANCE];
            // Slots are reused once the window wraps; stop at stale links.
            candidate = next.filter(|&n| n < start);
            steps += 1;
        }
        best
    }

    fn tokenize(&mut self, data: &[u8]) -> Vec<Token> {
        let mut tokens = Vec::with_capacity(data.len() / 2);
        let mut pos = 0;
        while pos < data.len() {
            match self.longest_match(data, pos) {
                Some((length, distance)) => {
                    tokens.push(Token::Match { length, distance });
                    for p in pos..pos + length {
                        self.insert(data, p);
                    }
                    pos += length;
                }
                None => {
                    tokens.push(Token::Literal(data[pos]));
                    self.insert(data, pos);
                    pos += 1;
                }
            }
        }
        tokens
    }
}

fn serialize(tokens: &[Token]) -> Vec<u8> {
    let mut out = Vec::with_capacity(tokens.len() * 2);
    for group in tokens.chunks(8) {
        let flag_index = out.len();
        out.push(0u8);
        for (i, token) in group.iter().enumerate() {
            match *token {
                Token::Literal(byte) => out.push(byte),
                Token::Match { length, distance } => {
                    out[flag_index] |= 1 << i;
                    let mut buf = [0u8; 2];
                    LittleEndian::write_u16(&mut buf, distance as u16);
                    out.extend_from_slice(&buf);
                    out.push((length - MIN_MATCH_LENGTH) as u8);
                }
            }
        }
    }
    out
}

pub fn decode(payload: &[u8], expected_len: usize) -> Result<Vec<u8>> {
    let mut decoded: Vec<u8> = Vec::with_capacity(decode_capacity(expected_len, payload.len(), 86));
    let mut i = 0;

    while i < payload.len() {
        let flags = payload[i];
        i += 1;
        for bit in 0..8 {
            if i >= payload.len() {
                break;
            }
            if flags & (1 << bit) == 0 {
                decoded.push(payload[i]);
                i += 1;
            } else {
                let token = payload
                    .get(i..i + 3)
                    .ok_or_else(|| AmbcError::corrupt("dictionary match past end of payload"))?;
                let distance = LittleEndian::read_u16(&token[..2]) as usize;
                let length = token[2] as usize + MIN_MATCH_LENGTH;
                i += 3;
                if distance == 0 || distance > decoded.len() {
                    return Err(AmbcError::corrupt(format!(
                        "dictionary match distance {} exceeds {} decoded bytes",
                        distance,
                        decoded.len()
                    )));
                }
                let start = decoded.len() - distance;
                for k in 0..length {
                    let byte = decoded[start + k];
                    decoded.push(byte);
                }
            }
            if decoded.len() > expected_len {
                return Err(AmbcError::corrupt("dictionary payload expands past the declared length"));
            }
        }
    }

    Ok(decoded)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(data: &[u8]) -> Vec<u8> {
        let method = DictionaryMethod::new();
        let payload = method.compress(data).unwrap();
        let decoded = method.decompress(&payload, data.len()).unwrap();
        assert_eq!(decoded, data);
        payload
    }

    #[test]
    fn test_quick_score_uses_both_ratios() {
        let method = DictionaryMethod::new();
        let repetitive = ChunkStats {
            unique_ratio: 0.5,
            ..Default::default()
        };
        let near_repeats = ChunkStats {
            unique_ratio: 0.95,
            window_match_ratio: 0.7,
            ..Default::default()
        };
        let noise = ChunkStats {
            unique_ratio: 0.95,
            window_match_ratio: 0.03,
            ..Default::default()
        };
        assert!(method.quick_score(&repetitive));
        assert!(method.quick_score(&near_repeats));
        assert!(!method.quick_score(&noise));
    }

    #[test]
    fn test_dictionary_empty() {
        assert!(round_trip(&[]).is_empty());
    }

    #[test]
    fn test_dictionary_no_matches() {
        let payload = round_trip(b"abcdefg");
        // one flag byte plus seven literals
        assert_eq!(payload.len(), 8);
    }

    #[test]
    fn test_dictionary_repeated_phrase() {
        let data = b"the cat sat on the mat, the cat sat on the hat. ".repeat(40);
        let payload = round_trip(&data);
        assert!(payload.len() < data.len() / 5);
    }

    #[test]
    fn test_dictionary_overlapping_match() {
        let data = vec![b'z'; 1000];
        let payload = round_trip(&data);
        assert!(payload.len() < 40);
    }

    #[test]
    fn test_dictionary_long_input_wraps_window() {
        let data: Vec<u8> = (0..100_000u32).map(|i| ((i / 5) % 97) as u8).collect();
        round_trip(&data);
    }

    #[test]
    fn test_dictionary_rejects_bad_distance() {
        // flag marks the first token as a match with no history
        let payload = [0b0000_0001, 1, 0, 0];
        assert!(decode(&payload, 3).is_err());
    }

    #[test]
    fn test_dictionary_rejects_truncated_match() {
        let payload = [0b0000_0010, b'a', 1];
        assert!(decode(&payload, 4).is_err());
    }
}
