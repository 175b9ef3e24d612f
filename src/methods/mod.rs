//! Compression methods
//!
//! Every method is a pure compress/decompress pair behind the
//! [`CompressionMethod`] trait, identified on the wire by a [`MethodId`].
//! Built-in methods are always present; backend codecs depend on cargo
//! features and a startup self-probe.

pub mod backends;
pub mod delta;
pub mod dictionary;
pub mod huffman;
pub mod rle;
pub mod store;

use crate::analyzer::ChunkStats;
use crate::error::{AmbcError, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

pub use backends::detect_available_backends;

/// Stable method identifiers stored in every package.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum MethodId {
    Rle = 1,
    Dictionary = 2,
    Huffman = 3,
    Delta = 4,
    Deflate = 5,
    Bzip2 = 6,
    Lzma = 7,
    Zstd = 8,
    Lz4 = 9,
    Brotli = 10,
    /// Reserved; no backend exists for it in this crate.
    Lzham = 11,
    Store = 255,
}

impl MethodId {
    pub const ALL: [MethodId; 12] = [
        MethodId::Rle,
        MethodId::Dictionary,
        MethodId::Huffman,
        MethodId::Delta,
        MethodId::Deflate,
        MethodId::Bzip2,
        MethodId::Lzma,
        MethodId::Zstd,
        MethodId::Lz4,
        MethodId::Brotli,
        MethodId::Lzham,
        MethodId::Store,
    ];

    pub const BUILTIN: [MethodId; 5] = [
        MethodId::Rle,
        MethodId::Dictionary,
        MethodId::Huffman,
        MethodId::Delta,
        MethodId::Store,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MethodId::Rle => "rle",
            MethodId::Dictionary => "dictionary",
            MethodId::Huffman => "huffman",
            MethodId::Delta => "delta",
            MethodId::Deflate => "deflate",
            MethodId::Bzip2 => "bzip2",
            MethodId::Lzma => "lzma",
            MethodId::Zstd => "zstd",
            MethodId::Lz4 => "lz4",
            MethodId::Brotli => "brotli",
            MethodId::Lzham => "lzham",
            MethodId::Store => "store",
        }
    }

    pub fn is_builtin(&self) -> bool {
        Self::BUILTIN.contains(self)
    }
}

impl TryFrom<u8> for MethodId {
    type Error = AmbcError;

    fn try_from(value: u8) -> Result<Self> {
        MethodId::ALL
            .iter()
            .copied()
            .find(|id| *id as u8 == value)
            .ok_or_else(|| AmbcError::corrupt(format!("unknown method id {}", value)))
    }
}

impl fmt::Display for MethodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A lossless codec usable for a single chunk.
///
/// `decompress(compress(x), x.len()) == x` must hold for every input.
pub trait CompressionMethod: Send + Sync {
    fn id(&self) -> MethodId;

    fn name(&self) -> &'static str {
        self.id().name()
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>>;

    /// Decode `payload` into exactly `original_len` bytes.
    fn decompress(&self, payload: &[u8], original_len: usize) -> Result<Vec<u8>>;

    /// Cheap applicability check used to build the trial shortlist.
    fn quick_score(&self, stats: &ChunkStats) -> bool;
}

/// Immutable set of methods available to one compressor.
pub struct MethodRegistry {
    methods: Vec<Box<dyn CompressionMethod>>,
}

impl MethodRegistry {
    /// Built-in methods plus every backend that passes its startup probe.
    pub fn detect() -> Self {
        Self::with_backends(&detect_available_backends())
    }

    pub fn builtin_only() -> Self {
        Self::with_backends(&BTreeSet::new())
    }

    /// Built-in methods plus the given backends.
    ///
    /// Backends that are not compiled in are skipped.
    pub fn with_backends(backends: &BTreeSet<MethodId>) -> Self {
        let mut methods: Vec<Box<dyn CompressionMethod>> = vec![
            Box::new(rle::RleMethod::new()),
            Box::new(dictionary::DictionaryMethod::new()),
            Box::new(huffman::HuffmanMethod::new()),
            Box::new(delta::DeltaMethod::new()),
            Box::new(store::StoreMethod),
        ];
        methods.extend(backends.iter().filter_map(|id| backends::create(*id)));
        methods.sort_by_key(|method| method.id());
        Self { methods }
    }

    /// Look up the method for a package.
    pub fn get(&self, id: MethodId) -> Result<&dyn CompressionMethod> {
        self.methods
            .iter()
            .find(|method| method.id() == id)
            .map(|method| method.as_ref())
            .ok_or(AmbcError::MethodUnavailable(id))
    }

    pub fn contains(&self, id: MethodId) -> bool {
        self.methods.iter().any(|method| method.id() == id)
    }

    /// Methods in ascending id order.
    pub fn methods(&self) -> impl Iterator<Item = &dyn CompressionMethod> {
        self.methods.iter().map(|method| method.as_ref())
    }

    pub fn ids(&self) -> Vec<MethodId> {
        self.methods.iter().map(|method| method.id()).collect()
    }
}

impl fmt::Debug for MethodRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodRegistry").field("methods", &self.ids()).finish()
    }
}

/// Fail with `CorruptContainer` unless `decoded` has the declared length.
pub(crate) fn check_length(method: MethodId, decoded: &[u8], original_len: usize) -> Result<()> {
    if decoded.len() != original_len {
        return Err(AmbcError::corrupt(format!(
            "{} payload decoded to {} bytes, expected {}",
            method,
            decoded.len(),
            original_len
        )));
    }
    Ok(())
}

/// Output capacity to reserve before decoding: `original_len`, capped at what
/// `payload_len` bytes can expand to under a ratio of `max_expansion`.
pub(crate) fn decode_capacity(original_len: usize, payload_len: usize, max_expansion: usize) -> usize {
    original_len.min(payload_len.saturating_mul(max_expansion))
}
