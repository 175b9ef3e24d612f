//! # AMBC (Adaptive Marker-Based Chunk) Compressor
//!
//! A lossless compression library that splits input into fixed-size chunks
//! and stores each chunk with whichever method makes it smallest.
//!
//! ## Features
//!
//! - **Per-chunk method selection**: run-length, LZ77 dictionary, Huffman and
//!   delta coding are built in; DEFLATE, BZIP2, LZMA, Zstd, LZ4 and Brotli are
//!   added when their cargo features are enabled
//! - **Never inflates a chunk**: a chunk that no method shrinks is stored as is
//! - **Marker-delimited container**: every package starts with the shortest bit
//!   pattern absent from the input
//! - **Parallel encoding**: chunks are trial-compressed on a worker pool with
//!   output identical for any thread count
//! - **Data Integrity**: header CRC32 and an optional SHA-256 of the input
//!
//! ## Quick Start
//!
//! ### Basic Compression/Decompression
//!
//! ```rust
//! use ambc::{AmbcConfig, compress_data, decompress_data};
//!
//! let original_data = b"Hello, world! Hello, world! Hello, world!";
//! let config = AmbcConfig::default();
//! let compressed = compress_data(original_data, &config).unwrap();
//!
//! let decompressed = decompress_data(&compressed).unwrap();
//! assert_eq!(original_data.to_vec(), decompressed);
//! ```
//!
//! ### Choosing Methods Explicitly
//!
//! ```rust
//! use ambc::{AdaptiveCompressor, AmbcConfig, MethodRegistry};
//!
//! let config = AmbcConfig::default().with_chunk_size(1024).with_threads(2);
//! let compressor = AdaptiveCompressor::new(config, MethodRegistry::builtin_only()).unwrap();
//!
//! let (container, stats) = compressor.compress(&[0u8; 10_000]).unwrap();
//! println!("ratio {:.2}x, methods {:?}", stats.ratio(), stats.method_usage);
//! assert_eq!(compressor.decompress(&container).unwrap(), vec![0u8; 10_000]);
//! ```
//!
//! ### Working with Files
//!
//! ```rust
//! use ambc::{AdaptiveCompressor, AmbcConfig};
//! use std::path::Path;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let compressor = AdaptiveCompressor::with_detected_methods(AmbcConfig::default())?;
//!
//! // The output only appears once the whole file has been compressed.
//! let stats = compressor.compress_file(Path::new("input.txt"), Path::new("output.ambc"))?;
//! println!("Compression ratio: {:.2}x", stats.ratio());
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod cli;
pub mod compressor;
pub mod config;
pub mod container;
pub mod error;
pub mod marker;
pub mod methods;
pub mod progress;
pub mod stats;
pub mod workers;

// Re-export commonly used types for convenience
pub use analyzer::{Chunk, ChunkAnalyzer, ChunkStats};
pub use compressor::{AdaptiveCompressor, EncodedChunk};
pub use config::{AmbcConfig, MarkerSearch};
pub use container::{inspect, ContainerInfo};
pub use error::{AmbcError, Result};
pub use marker::{Marker, MarkerFinder};
pub use methods::{detect_available_backends, CompressionMethod, MethodId, MethodRegistry};
pub use progress::{NoProgress, Progress};
pub use stats::{CompressionStats, DecompressionStats};

/// Compress data in memory
///
/// Backends are detected for this call. To reuse detection across calls,
/// build an [`AdaptiveCompressor`] once instead.
///
/// # Arguments
///
/// * `data` - The data to compress
/// * `config` - Compression configuration
///
/// # Returns
///
/// Returns the compressed data as a `Vec<u8>` in AMBC container format.
///
/// # Example
///
/// ```rust
/// use ambc::{compress_data, AmbcConfig};
///
/// let data = b"Hello, world!";
/// let config = AmbcConfig::default();
/// let compressed = compress_data(data, &config).unwrap();
/// ```
pub fn compress_data(data: &[u8], config: &AmbcConfig) -> Result<Vec<u8>> {
    let compressor = AdaptiveCompressor::with_detected_methods(config.clone())?;
    let (container, _) = compressor.compress(data)?;
    Ok(container)
}

/// Decompress an AMBC container in memory
///
/// # Arguments
///
/// * `compressed_data` - The compressed data in AMBC format
///
/// # Returns
///
/// Returns the original uncompressed data, or an error if the container is
/// corrupt, truncated, fails its checksum, or uses a method this build lacks.
///
/// # Example
///
/// ```rust
/// use ambc::{compress_data, decompress_data, AmbcConfig};
///
/// let original = b"Hello, world!";
/// let config = AmbcConfig::default();
/// let compressed = compress_data(original, &config).unwrap();
/// let decompressed = decompress_data(&compressed).unwrap();
/// assert_eq!(original.to_vec(), decompressed);
/// ```
pub fn decompress_data(compressed_data: &[u8]) -> Result<Vec<u8>> {
    let compressor = AdaptiveCompressor::with_detected_methods(AmbcConfig::default())?;
    compressor.decompress(compressed_data)
}

/// Get information about an AMBC container without decoding it
///
/// # Example
///
/// ```rust
/// use ambc::{compress_data, get_compression_info, AmbcConfig};
///
/// let data = vec![0u8; 1000];
/// let compressed = compress_data(&data, &AmbcConfig::default()).unwrap();
/// let info = get_compression_info(&compressed).unwrap();
///
/// assert_eq!(info.original_size, 1000);
/// println!("Compression ratio: {:.2}x", info.compression_ratio);
/// ```
pub fn get_compression_info(compressed_data: &[u8]) -> Result<ContainerInfo> {
    container::inspect(compressed_data)
}

/// Validate an AMBC container
///
/// Fully decodes the container and checks every length and the stored
/// digest, discarding the output.
///
/// # Example
///
/// ```rust
/// use ambc::{compress_data, validate_data, AmbcConfig};
///
/// let data = b"Test data for validation";
/// let compressed = compress_data(data, &AmbcConfig::default()).unwrap();
///
/// assert!(validate_data(&compressed).unwrap());
/// ```
pub fn validate_data(compressed_data: &[u8]) -> Result<bool> {
    decompress_data(compressed_data).map(|_| true)
}
