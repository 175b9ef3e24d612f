//! Shortest absent bit pattern search
//!
//! The marker is the numerically smallest bit string of minimal length that
//! does not occur at any bit offset of the input. Bits are read most
//! significant first within each byte.

use crate::config::MarkerSearch;
use crate::error::{AmbcError, Result};
use log::debug;

/// Longest marker the container format accepts.
pub const MAX_MARKER_BITS: u32 = 63;

/// Number of evenly spaced blocks read by a sampled search.
const SAMPLE_BLOCKS: usize = 16;

/// A bit pattern of `bits` length, stored right-aligned in `pattern`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Marker {
    bits: u32,
    pattern: u64,
}

impl Marker {
    pub fn new(bits: u32, pattern: u64) -> Result<Self> {
        if bits == 0 || bits > MAX_MARKER_BITS {
            return Err(AmbcError::corrupt(format!("invalid marker length of {} bits", bits)));
        }
        if pattern >> bits != 0 {
            return Err(AmbcError::corrupt(format!(
                "marker pattern {:#x} does not fit in {} bits",
                pattern, bits
            )));
        }
        Ok(Self { bits, pattern })
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn pattern(&self) -> u64 {
        self.pattern
    }

    /// Number of bytes the marker occupies on the wire.
    pub fn byte_len(&self) -> usize {
        self.bits.div_ceil(8) as usize
    }

    /// Left-aligned, zero-padded byte form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let len = self.byte_len();
        let aligned = self.pattern << (len as u32 * 8 - self.bits);
        aligned.to_be_bytes()[8 - len..].to_vec()
    }

    /// Inverse of [`Marker::to_bytes`]. Non-zero padding bits are rejected.
    pub fn from_bytes(bits: u32, bytes: &[u8]) -> Result<Self> {
        if bits == 0 || bits > MAX_MARKER_BITS {
            return Err(AmbcError::corrupt(format!("invalid marker length of {} bits", bits)));
        }
        let len = bits.div_ceil(8) as usize;
        if bytes.len() != len {
            return Err(AmbcError::corrupt("marker byte length does not match its bit length"));
        }
        let aligned = bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
        let padding = len as u32 * 8 - bits;
        if aligned & ((1u64 << padding) - 1) != 0 {
            return Err(AmbcError::corrupt("marker padding bits are not zero"));
        }
        Self::new(bits, aligned >> padding)
    }

    /// Binary string form, e.g. `0110`.
    pub fn to_bit_string(&self) -> String {
        (0..self.bits)
            .rev()
            .map(|i| if (self.pattern >> i) & 1 == 1 { '1' } else { '0' })
            .collect()
    }
}

pub struct MarkerFinder {
    search: MarkerSearch,
}

impl MarkerFinder {
    pub fn new(search: MarkerSearch) -> Self {
        Self { search }
    }

    /// Find the shortest absent bit pattern of `data`.
    ///
    /// Never fails: once `2^L` exceeds the number of `L`-bit windows some
    /// pattern of length `L` must be missing.
    pub fn find(&self, data: &[u8]) -> Marker {
        let blocks = self.blocks(data);
        let total_bits: u64 = blocks.iter().map(|b| b.len() as u64 * 8).sum();

        // An absent pattern of length L extends to absent patterns of
        // length L + 1, so the smallest working length can be bisected.
        let mut hi = 1u32;
        while hi < MAX_MARKER_BITS && (1u64 << hi) <= window_count(&blocks, hi) {
            hi += 1;
        }
        let mut lo = 1u32;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if smallest_absent(&blocks, mid).is_some() {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }

        let pattern = smallest_absent(&blocks, lo).unwrap_or(0);
        debug!(
            "marker search over {} bits found {}-bit pattern {:#x}",
            total_bits, lo, pattern
        );
        Marker { bits: lo, pattern }
    }

    fn blocks<'a>(&self, data: &'a [u8]) -> Vec<&'a [u8]> {
        match self.search {
            MarkerSearch::Sampled { sample_size } if sample_size > 0 && data.len() > sample_size => {
                let block_len = (sample_size / SAMPLE_BLOCKS).max(1);
                let stride = data.len() / SAMPLE_BLOCKS;
                (0..SAMPLE_BLOCKS)
                    .map(|i| {
                        let start = i * stride;
                        &data[start..(start + block_len).min(data.len())]
                    })
                    .collect()
            }
            _ => vec![data],
        }
    }
}

impl Default for MarkerFinder {
    fn default() -> Self {
        Self::new(MarkerSearch::Full)
    }
}

fn window_count(blocks: &[&[u8]], len: u32) -> u64 {
    blocks
        .iter()
        .map(|b| (b.len() as u64 * 8).saturating_sub(len as u64 - 1))
        .sum()
}

/// Smallest `len`-bit value that never appears in `blocks`, if any.
///
/// Windows do not span block boundaries.
fn smallest_absent(blocks: &[&[u8]], len: u32) -> Option<u64> {
    let space = 1u64 << len;
    let mut seen = vec![0u64; space.div_ceil(64) as usize];
    let mask = space - 1;

    for block in blocks {
        let mut window = 0u64;
        let mut filled = 0u32;
        for &byte in block.iter() {
            for shift in (0..8).rev() {
                window = ((window << 1) | ((byte >> shift) & 1) as u64) & mask;
                if filled < len {
                    filled += 1;
                }
                if filled == len {
                    seen[(window >> 6) as usize] |= 1u64 << (window & 63);
                }
            }
        }
    }

    seen.iter().enumerate().find_map(|(word_index, &word)| {
        let free = !word;
        if free == 0 {
            return None;
        }
        let value = word_index as u64 * 64 + free.trailing_zeros() as u64;
        (value < space).then_some(value)
    })
}
