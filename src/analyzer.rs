//! Chunk splitting and content scoring
//!
//! Scores are cheap single-pass statistics. They only decide which methods
//! are worth a trial compression; the final choice is always made on
//! actual compressed sizes.

use crate::methods::{MethodId, MethodRegistry};
use std::collections::HashSet;

/// Run-length is tried above this repetition ratio.
pub const RLE_MIN_REPETITION: f64 = 0.30;
/// Dictionary coding is tried below this unique 3-gram ratio.
pub const DICTIONARY_MAX_UNIQUE: f64 = 0.80;
/// Dictionary coding is also tried above this fraction of near repeats.
pub const DICTIONARY_MIN_WINDOW_MATCH: f64 = 0.50;
/// Huffman coding is tried below this entropy (bits per byte).
pub const HUFFMAN_MAX_ENTROPY: f64 = 7.0;
/// Delta coding is tried above this fraction of small deltas.
pub const DELTA_MIN_FRIENDLINESS: f64 = 0.50;

/// Deltas smaller than this count as delta-friendly.
const SMALL_DELTA: i16 = 32;
/// How far back a byte may match for the window-match ratio.
const MATCH_WINDOW: usize = 8;

/// A contiguous view of the input handled as one compression unit.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    pub index: usize,
    pub offset: usize,
    pub data: &'a [u8],
}

impl<'a> Chunk<'a> {
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ChunkStats {
    pub len: usize,
    /// Shannon entropy in bits per byte.
    pub entropy: f64,
    /// Fraction of bytes inside runs of two or more equal bytes.
    pub repetition_ratio: f64,
    /// Distinct 3-byte subsequences over all 3-byte subsequences.
    pub unique_ratio: f64,
    /// Fraction of bytes equal to one of the previous few bytes.
    pub window_match_ratio: f64,
    /// Fraction of consecutive deltas smaller than 32 in magnitude.
    pub delta_friendliness: f64,
    pub mean_abs_delta: f64,
}

pub struct ChunkAnalyzer;

impl ChunkAnalyzer {
    /// Split `data` into chunks of `chunk_size` bytes; the last may be shorter.
    pub fn split(data: &[u8], chunk_size: usize) -> Vec<Chunk<'_>> {
        let chunk_size = chunk_size.max(1);
        data.chunks(chunk_size)
            .enumerate()
            .map(|(index, data)| Chunk {
                index,
                offset: index * chunk_size,
                data,
            })
            .collect()
    }

    pub fn score(data: &[u8]) -> ChunkStats {
        let len = data.len();
        if len == 0 {
            return ChunkStats {
                unique_ratio: 1.0,
                ..Default::default()
            };
        }

        ChunkStats {
            len,
            entropy: entropy(data),
            repetition_ratio: repetition_ratio(data),
            unique_ratio: unique_ratio(data),
            window_match_ratio: window_match_ratio(data),
            delta_friendliness: delta_friendliness(data),
            mean_abs_delta: mean_abs_delta(data),
        }
    }

    /// Methods worth a trial compression, in ascending id order.
    ///
    /// Store is always included and therefore comes last.
    pub fn shortlist(stats: &ChunkStats, registry: &MethodRegistry) -> Vec<MethodId> {
        registry
            .methods()
            .filter(|method| method.id() == MethodId::Store || method.quick_score(stats))
            .map(|method| method.id())
            .collect()
    }
}

fn entropy(data: &[u8]) -> f64 {
    let mut counts = [0usize; 256];
    for &byte in data {
        counts[byte as usize] += 1;
    }

    let len = data.len() as f64;
    counts
        .iter()
        .filter(|&&c| c > 0)
        .map(|&c| {
            let p = c as f64 / len;
            -p * p.log2()
        })
        .sum()
}

fn repetition_ratio(data: &[u8]) -> f64 {
    let mut in_runs = 0usize;
    let mut run = 1usize;
    for i in 1..=data.len() {
        if i < data.len() && data[i] == data[i - 1] {
            run += 1;
        } else {
            if run >= 2 {
                in_runs += run;
            }
            run = 1;
        }
    }
    in_runs as f64 / data.len() as f64
}

fn unique_ratio(data: &[u8]) -> f64 {
    if data.len() < 3 {
        return 1.0;
    }
    let grams: HashSet<[u8; 3]> = data.windows(3).map(|w| [w[0], w[1], w[2]]).collect();
    grams.len() as f64 / (data.len() - 2) as f64
}

fn window_match_ratio(data: &[u8]) -> f64 {
    let matches = (1..data.len())
        .filter(|&i| {
            let start = i.saturating_sub(MATCH_WINDOW);
            data[start..i].contains(&data[i])
        })
        .count();
    matches as f64 / data.len() as f64
}

fn deltas(data: &[u8]) -> impl Iterator<Item = i16> + '_ {
    data.windows(2).map(|w| (w[1] as i16 - w[0] as i16).abs())
}

fn delta_friendliness(data: &[u8]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let small = deltas(data).filter(|&d| d < SMALL_DELTA).count();
    small as f64 / (data.len() - 1) as f64
}

fn mean_abs_delta(data: &[u8]) -> f64 {
    if data.len() < 2 {
        return 0.0;
    }
    let total: u64 = deltas(data).map(|d| d as u64).sum();
    total as f64 / (data.len() - 1) as f64
}
