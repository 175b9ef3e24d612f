//! Wrapped third-party codecs
//!
//! Each backend is compiled in through its cargo feature and self-probed
//! once by [`detect_available_backends`]. A backend missing from the build
//! or failing the probe is left out of the registry; it never fails a
//! compression run.

#[cfg(any(
    feature = "deflate",
    feature = "bzip2",
    feature = "lzma",
    feature = "zstd",
    feature = "lz4",
    feature = "brotli"
))]
use super::check_length;
use super::{CompressionMethod, MethodId};
#[cfg(any(
    feature = "deflate",
    feature = "bzip2",
    feature = "lzma",
    feature = "zstd",
    feature = "lz4",
    feature = "brotli"
))]
use crate::analyzer::ChunkStats;
use crate::error::{AmbcError, Result};
use log::{debug, warn};
use std::collections::BTreeSet;
#[cfg(any(feature = "deflate", feature = "bzip2", feature = "lzma", feature = "brotli"))]
use std::io::{Read, Write};

/// Backend ids in registry order.
pub const BACKENDS: [MethodId; 7] = [
    MethodId::Deflate,
    MethodId::Bzip2,
    MethodId::Lzma,
    MethodId::Zstd,
    MethodId::Lz4,
    MethodId::Brotli,
    MethodId::Lzham,
];

const PROBE_SAMPLE: &[u8] = b"ambc backend probe: aaaaaaaaaaaaaaaa 0123456789 0123456789";

/// Whether the backend for `id` is part of this build.
pub fn is_compiled(id: MethodId) -> bool {
    match id {
        MethodId::Deflate => cfg!(feature = "deflate"),
        MethodId::Bzip2 => cfg!(feature = "bzip2"),
        MethodId::Lzma => cfg!(feature = "lzma"),
        MethodId::Zstd => cfg!(feature = "zstd"),
        MethodId::Lz4 => cfg!(feature = "lz4"),
        MethodId::Brotli => cfg!(feature = "brotli"),
        _ => false,
    }
}

/// Cargo feature that enables a backend, if one exists.
pub fn required_feature(id: MethodId) -> Option<&'static str> {
    match id {
        MethodId::Deflate => Some("deflate"),
        MethodId::Bzip2 => Some("bzip2"),
        MethodId::Lzma => Some("lzma"),
        MethodId::Zstd => Some("zstd"),
        MethodId::Lz4 => Some("lz4"),
        MethodId::Brotli => Some("brotli"),
        _ => None,
    }
}

/// Instantiate the backend for `id`, or `None` if it is not compiled in.
pub fn create(id: MethodId) -> Option<Box<dyn CompressionMethod>> {
    match id {
        #[cfg(feature = "deflate")]
        MethodId::Deflate => Some(Box::new(DeflateMethod::new())),
        #[cfg(feature = "bzip2")]
        MethodId::Bzip2 => Some(Box::new(Bzip2Method::new())),
        #[cfg(feature = "lzma")]
        MethodId::Lzma => Some(Box::new(LzmaMethod::new())),
        #[cfg(feature = "zstd")]
        MethodId::Zstd => Some(Box::new(ZstdMethod::new())),
        #[cfg(feature = "lz4")]
        MethodId::Lz4 => Some(Box::new(Lz4Method::new())),
        #[cfg(feature = "brotli")]
        MethodId::Brotli => Some(Box::new(BrotliMethod::new())),
        _ => None,
    }
}

/// Compiled-in backends that survive a round-trip self-probe.
pub fn detect_available_backends() -> BTreeSet<MethodId> {
    let mut available = BTreeSet::new();
    for id in BACKENDS {
        let Some(method) = create(id) else {
            debug!("backend {} not compiled in", id);
            continue;
        };
        match probe(method.as_ref()) {
            Ok(()) => {
                available.insert(id);
            }
            Err(e) => warn!("backend {} failed its self-probe and is disabled: {}", id, e),
        }
    }
    debug!("available backends: {:?}", available);
    available
}

fn probe(method: &dyn CompressionMethod) -> Result<()> {
    let payload = method.compress(PROBE_SAMPLE)?;
    let decoded = method.decompress(&payload, PROBE_SAMPLE.len())?;
    if decoded != PROBE_SAMPLE {
        return Err(AmbcError::CompressionError {
            method: method.id(),
            reason: "probe round trip returned different bytes".to_string(),
        });
    }
    Ok(())
}

#[cfg(any(
    feature = "deflate",
    feature = "bzip2",
    feature = "lzma",
    feature = "zstd",
    feature = "brotli"
))]
fn compress_failed(method: MethodId, e: impl std::fmt::Display) -> AmbcError {
    AmbcError::CompressionError {
        method,
        reason: e.to_string(),
    }
}

#[cfg(any(
    feature = "deflate",
    feature = "bzip2",
    feature = "lzma",
    feature = "zstd",
    feature = "lz4",
    feature = "brotli"
))]
fn decode_failed(method: MethodId, e: impl std::fmt::Display) -> AmbcError {
    AmbcError::corrupt(format!("{} payload failed to decode: {}", method, e))
}

/// Read a stream decoder to the end, refusing to grow past `original_len`.
#[cfg(any(feature = "deflate", feature = "bzip2", feature = "lzma", feature = "brotli"))]
fn read_bounded<R: Read>(method: MethodId, decoder: R, original_len: usize) -> Result<Vec<u8>> {
    let mut decoded = Vec::new();
    decoder
        .take(original_len as u64 + 1)
        .read_to_end(&mut decoded)
        .map_err(|e| decode_failed(method, e))?;
    check_length(method, &decoded, original_len)?;
    Ok(decoded)
}

#[cfg(feature = "deflate")]
pub struct DeflateMethod {
    level: flate2::Compression,
}

#[cfg(feature = "deflate")]
impl DeflateMethod {
    pub fn new() -> Self {
        Self {
            level: flate2::Compression::best(),
        }
    }
}

#[cfg(feature = "deflate")]
impl CompressionMethod for DeflateMethod {
    fn id(&self) -> MethodId {
        MethodId::Deflate
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = flate2::write::DeflateEncoder::new(Vec::new(), self.level);
        encoder
            .write_all(data)
            .and_then(|_| encoder.finish())
            .map_err(|e| compress_failed(MethodId::Deflate, e))
    }

    fn decompress(&self, payload: &[u8], original_len: usize) -> Result<Vec<u8>> {
        read_bounded(MethodId::Deflate, flate2::read::DeflateDecoder::new(payload), original_len)
    }

    fn quick_score(&self, _stats: &ChunkStats) -> bool {
        true
    }
}

#[cfg(feature = "bzip2")]
pub struct Bzip2Method;

#[cfg(feature = "bzip2")]
impl Bzip2Method {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "bzip2")]
impl CompressionMethod for Bzip2Method {
    fn id(&self) -> MethodId {
        MethodId::Bzip2
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut encoder = bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::best());
        encoder
            .write_all(data)
            .and_then(|_| encoder.finish())
            .map_err(|e| compress_failed(MethodId::Bzip2, e))
    }

    fn decompress(&self, payload: &[u8], original_len: usize) -> Result<Vec<u8>> {
        read_bounded(MethodId::Bzip2, bzip2::read::BzDecoder::new(payload), original_len)
    }

    fn quick_score(&self, _stats: &ChunkStats) -> bool {
        true
    }
}

#[cfg(feature = "lzma")]
pub struct LzmaMethod {
    preset: u32,
}

#[cfg(feature = "lzma")]
impl LzmaMethod {
    pub fn new() -> Self {
        Self { preset: 6 }
    }

    /// The dictionary never needs to exceed the chunk, so it is sized to it.
    fn encoder_stream(&self, len: usize) -> std::io::Result<xz2::stream::Stream> {
        use xz2::stream::{Check, Filters, LzmaOptions, Stream};

        let dict_size = len.next_power_of_two().clamp(4096, 1 << 26) as u32;
        let mut options = LzmaOptions::new_preset(self.preset)?;
        options.dict_size(dict_size);
        let mut filters = Filters::new();
        filters.lzma2(&options);
        Ok(Stream::new_stream_encoder(&filters, Check::Crc32)?)
    }
}

#[cfg(feature = "lzma")]
impl CompressionMethod for LzmaMethod {
    fn id(&self) -> MethodId {
        MethodId::Lzma
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let stream = self
            .encoder_stream(data.len())
            .map_err(|e| compress_failed(MethodId::Lzma, e))?;
        let mut encoder = xz2::write::XzEncoder::new_stream(Vec::new(), stream);
        encoder
            .write_all(data)
            .and_then(|_| encoder.finish())
            .map_err(|e| compress_failed(MethodId::Lzma, e))
    }

    fn decompress(&self, payload: &[u8], original_len: usize) -> Result<Vec<u8>> {
        read_bounded(MethodId::Lzma, xz2::read::XzDecoder::new(payload), original_len)
    }

    fn quick_score(&self, _stats: &ChunkStats) -> bool {
        true
    }
}

#[cfg(feature = "zstd")]
pub struct ZstdMethod {
    level: i32,
}

#[cfg(feature = "zstd")]
impl ZstdMethod {
    pub fn new() -> Self {
        Self { level: 19 }
    }
}

#[cfg(feature = "zstd")]
impl CompressionMethod for ZstdMethod {
    fn id(&self) -> MethodId {
        MethodId::Zstd
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        zstd::bulk::compress(data, self.level).map_err(|e| compress_failed(MethodId::Zstd, e))
    }

    fn decompress(&self, payload: &[u8], original_len: usize) -> Result<Vec<u8>> {
        let decoded =
            zstd::bulk::decompress(payload, original_len).map_err(|e| decode_failed(MethodId::Zstd, e))?;
        check_length(MethodId::Zstd, &decoded, original_len)?;
        Ok(decoded)
    }

    fn quick_score(&self, _stats: &ChunkStats) -> bool {
        true
    }
}

#[cfg(feature = "lz4")]
pub struct Lz4Method;

#[cfg(feature = "lz4")]
impl Lz4Method {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(feature = "lz4")]
impl CompressionMethod for Lz4Method {
    fn id(&self) -> MethodId {
        MethodId::Lz4
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(lz4_flex::compress(data))
    }

    fn decompress(&self, payload: &[u8], original_len: usize) -> Result<Vec<u8>> {
        let decoded = lz4_flex::decompress(payload, original_len).map_err(|e| decode_failed(MethodId::Lz4, e))?;
        check_length(MethodId::Lz4, &decoded, original_len)?;
        Ok(decoded)
    }

    fn quick_score(&self, _stats: &ChunkStats) -> bool {
        true
    }
}

#[cfg(feature = "brotli")]
pub struct BrotliMethod {
    quality: u32,
    lgwin: u32,
}

#[cfg(feature = "brotli")]
impl BrotliMethod {
    const BUFFER_SIZE: usize = 4096;

    pub fn new() -> Self {
        Self { quality: 9, lgwin: 22 }
    }
}

#[cfg(feature = "brotli")]
impl CompressionMethod for BrotliMethod {
    fn id(&self) -> MethodId {
        MethodId::Brotli
    }

    fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        let mut writer = brotli::CompressorWriter::new(Vec::new(), Self::BUFFER_SIZE, self.quality, self.lgwin);
        writer
            .write_all(data)
            .and_then(|_| writer.flush())
            .map_err(|e| compress_failed(MethodId::Brotli, e))?;
        Ok(writer.into_inner())
    }

    fn decompress(&self, payload: &[u8], original_len: usize) -> Result<Vec<u8>> {
        read_bounded(
            MethodId::Brotli,
            brotli::Decompressor::new(payload, Self::BUFFER_SIZE),
            original_len,
        )
    }

    fn quick_score(&self, _stats: &ChunkStats) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lzham_is_reserved() {
        assert!(!is_compiled(MethodId::Lzham));
        assert!(create(MethodId::Lzham).is_none());
        assert_eq!(required_feature(MethodId::Lzham), None);
    }

    #[test]
    fn test_builtins_are_not_backends() {
        for id in MethodId::BUILTIN {
            assert!(create(id).is_none());
        }
    }

    #[test]
    fn test_detected_backends_match_build() {
        let available = detect_available_backends();
        for id in BACKENDS {
            assert_eq!(available.contains(&id), is_compiled(id), "backend {}", id);
        }
    }

    #[test]
    fn test_backends_round_trip_text() {
        let data = b"backend round trip, backend round trip, backend round trip".repeat(50);
        for id in detect_available_backends() {
            let method = create(id).unwrap();
            let payload = method.compress(&data).unwrap();
            assert!(payload.len() < data.len(), "{} did not shrink text", id);
            assert_eq!(method.decompress(&payload, data.len()).unwrap(), data);
        }
    }

    #[test]
    fn test_backends_reject_wrong_length() {
        let data = b"length check length check length check".to_vec();
        for id in detect_available_backends() {
            let method = create(id).unwrap();
            let payload = method.compress(&data).unwrap();
            assert!(method.decompress(&payload, data.len() - 1).is_err(), "{}", id);
        }
    }

    #[test]
    fn test_backends_reject_overstated_length() {
        let payload_source = b"short".to_vec();
        for id in detect_available_backends() {
            let method = create(id).unwrap();
            let payload = method.compress(&payload_source).unwrap();
            assert!(
                matches!(
                    method.decompress(&payload, crate::config::MAX_CHUNK_SIZE),
                    Err(AmbcError::CorruptContainer(_))
                ),
                "{}",
                id
            );
        }
    }

    #[cfg(feature = "deflate")]
    #[test]
    fn test_read_bounded_stops_past_expected_length() {
        let data = vec![b'z'; 1000];
        let payload = DeflateMethod::new().compress(&data).unwrap();
        let decoder = flate2::read::DeflateDecoder::new(&payload[..]);
        assert!(matches!(
            read_bounded(MethodId::Deflate, decoder, 10),
            Err(AmbcError::CorruptContainer(_))
        ));
    }

    #[test]
    fn test_backends_reject_garbage() {
        let garbage = [0xFFu8; 64];
        for id in detect_available_backends() {
            let method = create(id).unwrap();
            assert!(method.decompress(&garbage, 100).is_err(), "{}", id);
        }
    }
}
