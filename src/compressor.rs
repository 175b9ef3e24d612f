use crate::analyzer::{Chunk, ChunkAnalyzer};
use crate::config::AmbcConfig;
use crate::container::{self, read_package, write_package, ContainerHeader, ContainerReader, PackageHeader};
use crate::error::{AmbcError, Result};
use crate::marker::MarkerFinder;
use crate::methods::{MethodId, MethodRegistry};
use crate::progress::{NoProgress, Progress};
use crate::stats::{CompressionStats, DecompressionStats};
use crate::workers::WorkerPool;
use log::{debug, info};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Instant;
use tempfile::NamedTempFile;

/// The winning encoding of one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedChunk {
	pub method: MethodId,
	pub original_len: usize,
	pub payload: Vec<u8>,
}

/// Chunked compressor that picks the smallest method per chunk.
///
/// The method registry is fixed at construction; compressing the same input
/// with the same configuration and registry always yields the same bytes.
#[derive(Debug)]
pub struct AdaptiveCompressor {
	config: AmbcConfig,
	registry: MethodRegistry,
}

impl AdaptiveCompressor {
	pub fn new(config: AmbcConfig, registry: MethodRegistry) -> Result<Self> {
		config.validate()?;
		Ok(Self { config, registry })
	}

	/// Compressor with every available backend detected once up front.
	pub fn with_detected_methods(config: AmbcConfig) -> Result<Self> {
		Self::new(config, MethodRegistry::detect())
	}

	pub fn config(&self) -> &AmbcConfig {
		&self.config
	}

	pub fn registry(&self) -> &MethodRegistry {
		&self.registry
	}

	pub fn compress(&self, input: &[u8]) -> Result<(Vec<u8>, CompressionStats)> {
		self.compress_with_progress(input, &NoProgress)
	}

	pub fn compress_with_progress(&self, input: &[u8], progress: &dyn Progress) -> Result<(Vec<u8>, CompressionStats)> {
		let start = Instant::now();
		progress.start(input.len() as u64);

		let marker = MarkerFinder::new(self.config.marker_search).find(input);
		let marker_bytes = marker.to_bytes();
		let chunks = ChunkAnalyzer::split(input, self.config.chunk_size);
		debug!(
			"compressing {} bytes as {} chunks with a {}-bit marker",
			input.len(),
			chunks.len(),
			marker.bits()
		);

		let pool = WorkerPool::new(self.config.threads);
		let encoded = pool.map_ordered(
			&chunks,
			|chunk| self.encode_chunk(chunk),
			|encoded| progress.chunk_done(encoded.original_len),
		)?;

		let header = ContainerHeader {
			marker,
			chunk_size: self.config.chunk_size,
			total_len: input.len() as u64,
			chunk_count: encoded.len() as u64,
			digest: self.config.digest.then(|| Sha256::digest(input).into()),
		};

		let payload_total: usize = encoded.iter().map(|e| e.payload.len()).sum();
		let mut output = Vec::with_capacity(header.encoded_len() + payload_total + encoded.len() * 16);
		header.write(&mut output)?;
		let header_bytes = output.len();

		let mut stats = CompressionStats {
			original_size: input.len() as u64,
			chunk_count: encoded.len(),
			header_bytes,
			marker_bits: marker.bits(),
			..Default::default()
		};
		for chunk in &encoded {
			write_package(&mut output, &marker_bytes, chunk.method, chunk.original_len, &chunk.payload);
			*stats.method_usage.entry(chunk.method).or_insert(0) += 1;
		}
		stats.package_overhead_bytes = output.len() - header_bytes - payload_total;
		stats.compressed_size = output.len() as u64;
		stats.elapsed = start.elapsed();
		progress.finish();

		info!(
			"compressed {} -> {} bytes ({:.2}x) in {:.2?}",
			stats.original_size,
			stats.compressed_size,
			stats.ratio(),
			stats.elapsed
		);
		Ok((output, stats))
	}

	/// Trial-compress a chunk with every shortlisted method and keep the smallest.
	///
	/// Ties go to the earlier method in shortlist order. Store wins whenever
	/// nothing is strictly smaller than the chunk itself.
	pub fn encode_chunk(&self, chunk: &Chunk<'_>) -> Result<EncodedChunk> {
		let stats = ChunkAnalyzer::score(chunk.data);
		let shortlist = ChunkAnalyzer::shortlist(&stats, &self.registry);

		let mut best: Option<(MethodId, Vec<u8>)> = None;
		for id in shortlist.into_iter().filter(|&id| id != MethodId::Store) {
			let payload = self.registry.get(id)?.compress(chunk.data)?;
			if best.as_ref().map_or(true, |(_, current)| payload.len() < current.len()) {
				best = Some((id, payload));
			}
		}

		let (method, payload) = match best {
			Some((id, payload)) if payload.len() < chunk.len() => (id, payload),
			_ => (MethodId::Store, chunk.data.to_vec()),
		};
		debug!(
			"chunk {}: {} bytes -> {} via {}",
			chunk.index,
			chunk.len(),
			payload.len(),
			method
		);

		Ok(EncodedChunk {
			method,
			original_len: chunk.len(),
			payload,
		})
	}

	/// Decode a container. Any defect fails the whole call; no partial output.
	pub fn decompress(&self, container: &[u8]) -> Result<Vec<u8>> {
		let mut reader = ContainerReader::new(container);
		let header = ContainerHeader::read(&mut reader)?;
		let marker_bytes = header.marker.to_bytes();

		let capacity = usize::try_from(header.total_len).unwrap_or(usize::MAX).min(container.len().saturating_mul(4));
		let mut output = Vec::with_capacity(capacity);
		let mut packages = 0u64;

		while !reader.is_empty() {
			if packages == header.chunk_count {
				return Err(container::package_count_error(packages + 1, header.chunk_count));
			}
			let (package, payload) = read_package(&mut reader, &header, &marker_bytes)?;
			let decoded = self.decode_package(&package, payload)?;
			output.extend_from_slice(&decoded);
			packages += 1;
		}

		if packages != header.chunk_count {
			return Err(container::package_count_error(packages, header.chunk_count));
		}
		if output.len() as u64 != header.total_len {
			return Err(AmbcError::corrupt(format!(
				"decoded {} bytes, header declares {}",
				output.len(),
				header.total_len
			)));
		}
		if let Some(expected) = header.digest {
			let actual: [u8; container::DIGEST_LEN] = Sha256::digest(&output).into();
			if actual != expected {
				return Err(AmbcError::ChecksumMismatch);
			}
		}

		debug!("decompressed {} packages into {} bytes", packages, output.len());
		Ok(output)
	}

	fn decode_package(&self, package: &PackageHeader, payload: &[u8]) -> Result<Vec<u8>> {
		let method = self.registry.get(package.method)?;
		let decoded = method.decompress(payload, package.original_len)?;
		if decoded.len() != package.original_len {
			return Err(AmbcError::corrupt(format!(
				"{} package decoded to {} bytes, expected {}",
				package.method,
				decoded.len(),
				package.original_len
			)));
		}
		Ok(decoded)
	}

	pub fn compress_file(&self, input: &Path, output: &Path) -> Result<CompressionStats> {
		self.compress_file_with_progress(input, output, &NoProgress)
	}

	pub fn compress_file_with_progress(
		&self,
		input: &Path,
		output: &Path,
		progress: &dyn Progress,
	) -> Result<CompressionStats> {
		let data = read_input(input)?;
		let (container, stats) = self.compress_with_progress(&data, progress)?;
		publish(output, &container)?;
		Ok(stats)
	}

	pub fn decompress_file(&self, input: &Path, output: &Path) -> Result<DecompressionStats> {
		let start = Instant::now();
		let container = read_input(input)?;
		let data = self.decompress(&container)?;
		publish(output, &data)?;
		Ok(DecompressionStats {
			compressed_size: container.len() as u64,
			decompressed_size: data.len() as u64,
			elapsed: start.elapsed(),
		})
	}
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
	fs::read(path).map_err(|source| AmbcError::InputUnavailable {
		path: path.to_path_buf(),
		source,
	})
}

/// Write `bytes` next to `path` and atomically move them into place.
fn publish(path: &Path, bytes: &[u8]) -> Result<()> {
	let dir = match path.parent() {
		Some(parent) if !parent.as_os_str().is_empty() => parent,
		_ => Path::new("."),
	};
	let mut tmp = NamedTempFile::new_in(dir)?;
	tmp.write_all(bytes)?;
	tmp.as_file().sync_all()?;
	tmp.persist(path).map_err(|e| AmbcError::Io(e.error))?;
	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn compressor(chunk_size: usize) -> AdaptiveCompressor {
		let config = AmbcConfig::default().with_chunk_size(chunk_size).with_threads(2);
		AdaptiveCompressor::new(config, MethodRegistry::builtin_only()).unwrap()
	}

	#[test]
	fn test_rejects_invalid_config() {
		let config = AmbcConfig::default().with_chunk_size(0);
		assert!(AdaptiveCompressor::new(config, MethodRegistry::builtin_only()).is_err());
	}

	#[test]
	fn test_round_trip_builtin_methods() {
		let c = compressor(512);
		let data = b"adaptive adaptive adaptive chunk chunk chunk 0000000000".repeat(30);
		let (container, stats) = c.compress(&data).unwrap();
		assert_eq!(stats.chunk_count, data.len().div_ceil(512));
		assert_eq!(c.decompress(&container).unwrap(), data);
	}

	#[test]
	fn test_zero_chunks_choose_rle() {
		let c = compressor(4096);
		let chunk = Chunk {
			index: 0,
			offset: 0,
			data: &[0u8; 4096],
		};
		let encoded = c.encode_chunk(&chunk).unwrap();
		assert_eq!(encoded.method, MethodId::Rle);
		assert!(encoded.payload.len() < 100);
	}

	fn noise(len: usize, mut state: u64) -> Vec<u8> {
		(0..len)
			.map(|_| {
				state ^= state << 13;
				state ^= state >> 7;
				state ^= state << 17;
				(state >> 32) as u8
			})
			.collect()
	}

	#[test]
	fn test_incompressible_chunk_is_stored() {
		let c = compressor(4096);
		let data = noise(4096, 0x9E37_79B9_7F4A_7C15);
		let chunk = Chunk {
			index: 0,
			offset: 0,
			data: &data,
		};
		let encoded = c.encode_chunk(&chunk).unwrap();
		assert_eq!(encoded.method, MethodId::Store);
		assert_eq!(encoded.payload, data);
	}

	#[test]
	fn test_stats_account_for_every_byte() {
		let c = compressor(100);
		let data: Vec<u8> = (0..1000u32).map(|i| (i % 10) as u8).collect();
		let (container, stats) = c.compress(&data).unwrap();
		let payload_bytes = container.len() - stats.header_bytes - stats.package_overhead_bytes;
		assert!(payload_bytes > 0);
		assert_eq!(stats.compressed_size, container.len() as u64);
		assert_eq!(stats.method_usage.values().sum::<usize>(), 10);
	}

	#[test]
	fn test_missing_backend_is_method_unavailable() {
		let c = compressor(64);
		let (mut container, stats) = c.compress(&[5u8; 10]).unwrap();
		assert_eq!(stats.chunk_count, 1);
		let header = ContainerHeader::read(&mut ContainerReader::new(&container)).unwrap();
		let method_pos = header.encoded_len() + header.marker.byte_len();
		container[method_pos] = MethodId::Zstd as u8;
		assert!(matches!(
			c.decompress(&container),
			Err(AmbcError::MethodUnavailable(MethodId::Zstd))
		));
	}

	#[test]
	fn test_publish_replaces_existing_file() {
		let dir = tempfile::tempdir().unwrap();
		let path = dir.path().join("out.bin");
		fs::write(&path, b"old contents").unwrap();
		publish(&path, b"new").unwrap();
		assert_eq!(fs::read(&path).unwrap(), b"new");
	}
}
