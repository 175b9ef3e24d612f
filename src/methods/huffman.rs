//! Canonical Huffman coding
//!
//! Payload layout: a 32-byte bitmap of the symbols present, one code length
//! byte per present symbol in ascending symbol order, then the codes packed
//! most significant bit first. An empty input encodes to an empty payload.

use super::{check_length, decode_capacity, CompressionMethod, MethodId};
use crate::analyzer::{ChunkStats, HUFFMAN_MAX_ENTROPY};
use crate::error::{AmbcError, Result};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Longest code the format allows.
pub const MAX_CODE_LEN: usize = 24;

const BITMAP_LEN: usize = 32;

pub struct HuffmanMethod;

impl HuffmanMethod {
    pub fn new() -> Self {
        Self
    }
}

impl Default for HuffmanMethod {
    fn default() -> Self {
        Self::new()
    }
}

impl CompressionMethod for HuffmanMethod {
    fn id(&self) -> MethodId {
        MethodId::Huffman
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(encode(data))
    }

    fn decompress(&self, payload: &[u8], original_len: usize) -> Result<Vec<u8>> {
        let decoded = decode(payload, original_len)?;
        check_length(MethodId::Huffman, &decoded, original_len)?;
        Ok(decoded)
    }

    fn quick_score(&self, stats: &ChunkStats) -> bool {
        stats.entropy < HUFFMAN_MAX_ENTROPY
    }
}

pub fn encode(data: &[u8]) -> Vec<u8> {
    if data.is_empty() {
        return Vec::new();
    }

    let mut freqs = [0u64; 256];
    for &byte in data {
        freqs[byte as usize] += 1;
    }
    let lengths = limited_code_lengths(&freqs);
    let codes = canonical_codes(&lengths);

    let mut out = vec![0u8; BITMAP_LEN];
    for symbol in 0..256 {
        if lengths[symbol] > 0 {
            out[symbol / 8] |= 1 << (symbol % 8);
        }
    }
    out.extend(lengths.iter().filter(|&&len| len > 0));

    let mut writer = BitWriter::new(out);
    for &byte in data {
        writer.write(codes[byte as usize], lengths[byte as usize]);
    }
    writer.finish()
}

pub fn decode(payload: &[u8], original_len: usize) -> Result<Vec<u8>> {
    if original_len == 0 {
        if !payload.is_empty() {
            return Err(AmbcError::corrupt("huffman payload for an empty chunk is not empty"));
        }
        return Ok(Vec::new());
    }
    if payload.len() < BITMAP_LEN {
        return Err(AmbcError::corrupt("huffman payload too short for its symbol table"));
    }

    let symbols_present: Vec<u8> = (0..256usize)
        .filter(|&s| payload[s / 8] & (1 << (s % 8)) != 0)
        .map(|s| s as u8)
        .collect();
    if symbols_present.is_empty() {
        return Err(AmbcError::corrupt("huffman symbol table is empty"));
    }
    let table_end = BITMAP_LEN + symbols_present.len();
    let length_bytes = payload
        .get(BITMAP_LEN..table_end)
        .ok_or_else(|| AmbcError::corrupt("huffman code lengths past end of payload"))?;

    let mut counts = [0u32; MAX_CODE_LEN + 1];
    let mut ordered: Vec<(u8, u8)> = Vec::with_capacity(symbols_present.len());
    for (&symbol, &len) in symbols_present.iter().zip(length_bytes) {
        if len == 0 || len as usize > MAX_CODE_LEN {
            return Err(AmbcError::corrupt(format!("invalid huffman code length {}", len)));
        }
        counts[len as usize] += 1;
        ordered.push((len, symbol));
    }
    check_kraft(&counts)?;
    ordered.sort_unstable();
    let sorted_symbols: Vec<u8> = ordered.into_iter().map(|(_, symbol)| symbol).collect();

    let mut reader = BitReader::new(&payload[table_end..]);
    let mut decoded = Vec::with_capacity(decode_capacity(original_len, payload.len(), 8));
    while decoded.len() < original_len {
        decoded.push(decode_symbol(&mut reader, &counts, &sorted_symbols)?);
    }
    Ok(decoded)
}

fn decode_symbol(reader: &mut BitReader, counts: &[u32], symbols: &[u8]) -> Result<u8> {
    let mut code = 0u32;
    let mut first = 0u32;
    let mut index = 0usize;
    for &count in counts.iter().skip(1) {
        code |= reader.bit()?;
        if code < first + count {
            return Ok(symbols[index + (code - first) as usize]);
        }
        index += count as usize;
        first = (first + count) << 1;
        code <<= 1;
    }
    Err(AmbcError::corrupt("invalid huffman code in bitstream"))
}

fn check_kraft(counts: &[u32]) -> Result<()> {
    let mut left = 1i64;
    for &count in counts.iter().skip(1) {
        left = (left << 1) - count as i64;
        if left < 0 {
            return Err(AmbcError::corrupt("huffman code lengths are oversubscribed"));
        }
    }
    Ok(())
}

/// Huffman code lengths no longer than [`MAX_CODE_LEN`].
///
/// Frequencies are halved until the tree is shallow enough.
fn limited_code_lengths(freqs: &[u64; 256]) -> [u8; 256] {
    let mut weights = *freqs;
    loop {
        let lengths = code_lengths(&weights);
        if lengths.iter().all(|&len| len as usize <= MAX_CODE_LEN) {
            return lengths;
        }
        for weight in weights.iter_mut().filter(|w| **w > 0) {
            *weight = (*weight / 2).max(1);
        }
    }
}

fn code_lengths(weights: &[u64; 256]) -> [u8; 256] {
    let mut lengths = [0u8; 256];
    let leaves: Vec<usize> = (0..256).filter(|&s| weights[s] > 0).collect();
    if leaves.len() == 1 {
        lengths[leaves[0]] = 1;
        return lengths;
    }

    let mut parent: Vec<usize> = vec![usize::MAX; leaves.len()];
    let mut heap: BinaryHeap<Reverse<(u64, usize)>> = leaves
        .iter()
        .enumerate()
        .map(|(node, &symbol)| Reverse((weights[symbol], node)))
        .collect();

    while heap.len() > 1 {
        let (Some(Reverse((wa, a))), Some(Reverse((wb, b)))) = (heap.pop(), heap.pop()) else {
            break;
        };
        let node = parent.len();
        parent.push(usize::MAX);
        parent[a] = node;
        parent[b] = node;
        heap.push(Reverse((wa + wb, node)));
    }

    for (leaf, &symbol) in leaves.iter().enumerate() {
        let mut depth = 0usize;
        let mut node = leaf;
        while parent[node] != usize::MAX {
            node = parent[node];
            depth += 1;
        }
        lengths[symbol] = depth.min(u8::MAX as usize) as u8;
    }
    lengths
}

/// Canonical codes: shorter codes first, ties broken by symbol value.
fn canonical_codes(lengths: &[u8; 256]) -> [u32; 256] {
    let mut codes = [0u32; 256];
    let mut code = 0u32;
    for len in 1..=MAX_CODE_LEN as u8 {
        for symbol in 0..256 {
            if lengths[symbol] == len {
                codes[symbol] = code;
                code += 1;
            }
        }
        code <<= 1;
    }
    codes
}

struct BitWriter {
    out: Vec<u8>,
    acc: u64,
    pending: u32,
}

impl BitWriter {
    fn new(out: Vec<u8>) -> Self {
        Self { out, acc: 0, pending: 0 }
    }

    fn write(&mut self, code: u32, len: u8) {
        self.acc = (self.acc << len) | code as u64;
        self.pending += len as u32;
        while self.pending >= 8 {
            self.pending -= 8;
            self.out.push((self.acc >> self.pending) as u8);
        }
        self.acc &= (1u64 << self.pending) - 1;
    }

    fn finish(mut self) -> Vec<u8> {
        if self.pending > 0 {
            self.out.push((self.acc << (8 - self.pending)) as u8);
        }
        self.out
    }
}

struct BitReader<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, position: 0 }
    }

    fn bit(&mut self) -> Result<u32> {
        let byte = self
            .data
            .get(self.position / 8)
            .ok_or_else(|| AmbcError::corrupt("huffman bitstream ended early"))?;
        let bit = (byte >> (7 - self.position % 8)) & 1;
        self.position += 1;
        Ok(bit as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_huffman_empty() {
        assert!(encode(&[]).is_empty());
        assert!(decode(&[], 0).unwrap().is_empty());
        assert!(decode(&[1], 0).is_err());
    }

    #[test]
    fn test_huffman_single_symbol() {
        let data = vec![b'x'; 1000];
        let encoded = encode(&data);
        // bitmap + one length + 1000 one-bit codes
        assert_eq!(encoded.len(), BITMAP_LEN + 1 + 125);
        assert_eq!(decode(&encoded, data.len()).unwrap(), data);
    }

    #[test]
    fn test_huffman_skewed_text() {
        let data = b"aaaaaaaabbbbccd".repeat(100);
        let encoded = encode(&data);
        assert!(encoded.len() < data.len() / 3);
        assert_eq!(decode(&encoded, data.len()).unwrap(), data);
    }

    #[test]
    fn test_huffman_all_symbols() {
        let data: Vec<u8> = (0..=255u8).cycle().take(4096).collect();
        let encoded = encode(&data);
        assert_eq!(decode(&encoded, data.len()).unwrap(), data);
    }

    #[test]
    fn test_code_lengths_are_limited() {
        // Fibonacci weights produce a maximally deep tree.
        let mut freqs = [0u64; 256];
        let (mut a, mut b) = (1u64, 1u64);
        for freq in freqs.iter_mut().take(40) {
            *freq = a;
            let next = a + b;
            a = b;
            b = next;
        }
        let lengths = limited_code_lengths(&freqs);
        assert!(lengths.iter().all(|&len| len as usize <= MAX_CODE_LEN));
        assert!(lengths.iter().take(40).all(|&len| len > 0));

        let mut counts = [0u32; MAX_CODE_LEN + 1];
        for &len in lengths.iter().filter(|&&len| len > 0) {
            counts[len as usize] += 1;
        }
        assert!(check_kraft(&counts).is_ok());
    }

    #[test]
    fn test_huffman_truncated_bitstream() {
        let data = b"hello huffman".to_vec();
        let encoded = encode(&data);
        assert!(decode(&encoded[..encoded.len() - 1], data.len()).is_err());
        assert!(decode(&encoded[..10], data.len()).is_err());
    }

    #[test]
    fn test_huffman_forged_length_fails_without_reserving_it() {
        let encoded = encode(b"hello huffman");
        assert!(matches!(decode(&encoded, 1 << 46), Err(AmbcError::CorruptContainer(_))));
    }

    #[test]
    fn test_huffman_rejects_bad_lengths() {
        let mut payload = vec![0u8; BITMAP_LEN];
        payload[0] = 0b0000_0111;
        // three symbols all claiming one-bit codes
        payload.extend_from_slice(&[1, 1, 1, 0]);
        assert!(decode(&payload, 1).is_err());
    }
}
