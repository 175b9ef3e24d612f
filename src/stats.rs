//! Per-run statistics handed to callers after compression and decompression.

use crate::methods::MethodId;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CompressionStats {
    pub original_size: u64,
    pub compressed_size: u64,
    pub chunk_count: usize,
    /// Number of chunks each method won.
    pub method_usage: BTreeMap<MethodId, usize>,
    pub header_bytes: usize,
    /// Marker, method id and length fields across all packages.
    pub package_overhead_bytes: usize,
    pub marker_bits: u32,
    pub elapsed: Duration,
}

impl CompressionStats {
    pub fn ratio(&self) -> f64 {
        if self.compressed_size > 0 {
            self.original_size as f64 / self.compressed_size as f64
        } else {
            0.0
        }
    }

    pub fn space_saved(&self) -> i64 {
        self.original_size as i64 - self.compressed_size as i64
    }

    pub fn space_saved_percentage(&self) -> f64 {
        if self.original_size > 0 {
            self.space_saved() as f64 / self.original_size as f64 * 100.0
        } else {
            0.0
        }
    }

    pub fn stored_chunks(&self) -> usize {
        self.method_usage.get(&MethodId::Store).copied().unwrap_or(0)
    }

    pub fn throughput_mib_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.original_size as f64 / (1024.0 * 1024.0) / secs
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DecompressionStats {
    pub compressed_size: u64,
    pub decompressed_size: u64,
    pub elapsed: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_and_savings() {
        let mut stats = CompressionStats {
            original_size: 10_000,
            compressed_size: 2_500,
            ..Default::default()
        };
        assert_eq!(stats.ratio(), 4.0);
        assert_eq!(stats.space_saved(), 7_500);
        assert_eq!(stats.space_saved_percentage(), 75.0);

        stats.compressed_size = 0;
        assert_eq!(stats.ratio(), 0.0);
    }

    #[test]
    fn test_stored_chunks() {
        let mut stats = CompressionStats::default();
        assert_eq!(stats.stored_chunks(), 0);
        stats.method_usage.insert(MethodId::Store, 3);
        stats.method_usage.insert(MethodId::Rle, 1);
        assert_eq!(stats.stored_chunks(), 3);
    }

    #[test]
    fn test_stats_serialize_method_names() {
        let mut stats = CompressionStats::default();
        stats.method_usage.insert(MethodId::Huffman, 2);
        let json = serde_json::to_string(&stats).unwrap();
        assert!(json.contains("\"huffman\":2"));
    }
}
