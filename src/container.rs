//! Container wire format
//!
//! Header: `AMBC` magic, version byte, flags byte, marker bit length
//! (varint), marker bytes, chunk size (varint), total original length
//! (varint), chunk count (varint), optional SHA-256 of the input, and a
//! little-endian CRC32 over everything before it.
//!
//! Each package: marker bytes, method id byte, original length (varint),
//! payload length (varint), payload. Packages follow the header back to
//! back until the end of the input.

use crate::config::MAX_CHUNK_SIZE;
use crate::error::{AmbcError, Result};
use crate::marker::Marker;
use crate::methods::MethodId;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::Cursor;

pub const MAGIC_NUMBER: &[u8; 4] = b"AMBC";
pub const VERSION: u8 = 1;
pub const DIGEST_LEN: usize = 32;

const MAX_VARINT_LEN: usize = 10;

bitflags::bitflags! {
	#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
	pub struct HeaderFlags: u8 {
		const DIGEST = 0b00000001;
	}
}

/// LEB128: seven bits per byte, high bit set on every byte but the last.
pub fn write_varint(out: &mut Vec<u8>, mut value: u64) {
	loop {
		let byte = (value & 0x7F) as u8;
		value >>= 7;
		if value == 0 {
			out.push(byte);
			return;
		}
		out.push(byte | 0x80);
	}
}

pub fn varint_len(value: u64) -> usize {
	let bits = 64 - value.leading_zeros() as usize;
	bits.div_ceil(7).max(1)
}

/// Bounds-checked reader over a container buffer.
///
/// Running out of bytes is a truncation; anything structurally wrong is
/// corruption.
pub struct ContainerReader<'a> {
	cursor: Cursor<&'a [u8]>,
}

impl<'a> ContainerReader<'a> {
	pub fn new(data: &'a [u8]) -> Self {
		Self { cursor: Cursor::new(data) }
	}

	pub fn position(&self) -> usize {
		self.cursor.position() as usize
	}

	pub fn remaining(&self) -> usize {
		self.cursor.get_ref().len().saturating_sub(self.position())
	}

	pub fn is_empty(&self) -> bool {
		self.remaining() == 0
	}

	pub fn read_u8(&mut self, what: &str) -> Result<u8> {
		self.cursor.read_u8().map_err(|_| AmbcError::truncated(format!("missing {}", what)))
	}

	pub fn read_u32(&mut self, what: &str) -> Result<u32> {
		self.cursor
			.read_u32::<LittleEndian>()
			.map_err(|_| AmbcError::truncated(format!("missing {}", what)))
	}

	pub fn read_bytes(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
		if self.remaining() < len {
			return Err(AmbcError::truncated(format!(
				"{} needs {} bytes but only {} remain",
				what,
				len,
				self.remaining()
			)));
		}
		let start = self.position();
		let data: &'a [u8] = *self.cursor.get_ref();
		self.cursor.set_position((start + len) as u64);
		Ok(&data[start..start + len])
	}

	pub fn read_varint(&mut self, what: &str) -> Result<u64> {
		let mut value = 0u64;
		for i in 0..MAX_VARINT_LEN {
			let byte = self.read_u8(what)?;
			let bits = (byte & 0x7F) as u64;
			if i == MAX_VARINT_LEN - 1 && (byte & 0x80 != 0 || bits > 1) {
				break;
			}
			value |= bits << (7 * i);
			if byte & 0x80 == 0 {
				return Ok(value);
			}
		}
		Err(AmbcError::corrupt(format!("malformed varint for {}", what)))
	}

	/// Read a varint that must fit in `usize`.
	pub fn read_len(&mut self, what: &str) -> Result<usize> {
		let value = self.read_varint(what)?;
		usize::try_from(value).map_err(|_| AmbcError::corrupt(format!("{} of {} does not fit in memory", what, value)))
	}
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
	pub marker: Marker,
	pub chunk_size: usize,
	pub total_len: u64,
	pub chunk_count: u64,
	pub digest: Option<[u8; DIGEST_LEN]>,
}

impl ContainerHeader {
	pub fn flags(&self) -> HeaderFlags {
		let mut flags = HeaderFlags::empty();
		if self.digest.is_some() {
			flags |= HeaderFlags::DIGEST;
		}
		flags
	}

	pub fn write(&self, out: &mut Vec<u8>) -> Result<()> {
		let start = out.len();
		out.extend_from_slice(MAGIC_NUMBER);
		out.push(VERSION);
		out.push(self.flags().bits());
		write_varint(out, self.marker.bits() as u64);
		out.extend_from_slice(&self.marker.to_bytes());
		write_varint(out, self.chunk_size as u64);
		write_varint(out, self.total_len);
		write_varint(out, self.chunk_count);
		if let Some(digest) = &self.digest {
			out.extend_from_slice(digest);
		}
		let crc = crc32fast::hash(&out[start..]);
		out.write_u32::<LittleEndian>(crc)?;
		Ok(())
	}

	pub fn read(reader: &mut ContainerReader<'_>) -> Result<Self> {
		let start = reader.position();
		let magic = reader.read_bytes(MAGIC_NUMBER.len(), "magic number")?;
		if magic != MAGIC_NUMBER {
			return Err(AmbcError::corrupt("invalid magic number"));
		}
		let version = reader.read_u8("format version")?;
		if version != VERSION {
			return Err(AmbcError::corrupt(format!("unsupported version: {}", version)));
		}
		let flags_byte = reader.read_u8("header flags")?;
		let flags = HeaderFlags::from_bits(flags_byte)
			.ok_or_else(|| AmbcError::corrupt(format!("unknown header flags {:#04x}", flags_byte)))?;

		let marker_bits = reader.read_varint("marker length")?;
		let marker_bits = u32::try_from(marker_bits)
			.map_err(|_| AmbcError::corrupt(format!("invalid marker length of {} bits", marker_bits)))?;
		if marker_bits == 0 || marker_bits > crate::marker::MAX_MARKER_BITS {
			return Err(AmbcError::corrupt(format!("invalid marker length of {} bits", marker_bits)));
		}
		let marker_bytes = reader.read_bytes(marker_bits.div_ceil(8) as usize, "marker")?;
		let marker = Marker::from_bytes(marker_bits, marker_bytes)?;

		let chunk_size = reader.read_len("chunk size")?;
		let total_len = reader.read_varint("total length")?;
		let chunk_count = reader.read_varint("chunk count")?;
		let digest = if flags.contains(HeaderFlags::DIGEST) {
			let bytes = reader.read_bytes(DIGEST_LEN, "digest")?;
			let mut digest = [0u8; DIGEST_LEN];
			digest.copy_from_slice(bytes);
			Some(digest)
		} else {
			None
		};

		let end = reader.position();
		let expected_crc = reader.read_u32("header checksum")?;
		let header_bytes = &reader.cursor.get_ref()[start..end];
		if crc32fast::hash(header_bytes) != expected_crc {
			return Err(AmbcError::corrupt("header checksum mismatch"));
		}

		if chunk_size == 0 {
			return Err(AmbcError::corrupt("chunk size of zero"));
		}
		if chunk_size > MAX_CHUNK_SIZE {
			return Err(AmbcError::corrupt(format!(
				"chunk size {} exceeds the limit of {}",
				chunk_size, MAX_CHUNK_SIZE
			)));
		}
		if total_len.div_ceil(chunk_size as u64) != chunk_count {
			return Err(AmbcError::corrupt(format!(
				"{} chunks cannot hold {} bytes at chunk size {}",
				chunk_count, total_len, chunk_size
			)));
		}

		Ok(Self {
			marker,
			chunk_size,
			total_len,
			chunk_count,
			digest,
		})
	}

	pub fn encoded_len(&self) -> usize {
		MAGIC_NUMBER.len()
			+ 2 + varint_len(self.marker.bits() as u64)
			+ self.marker.byte_len()
			+ varint_len(self.chunk_size as u64)
			+ varint_len(self.total_len)
			+ varint_len(self.chunk_count)
			+ self.digest.map_or(0, |_| DIGEST_LEN)
			+ 4
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackageHeader {
	pub method: MethodId,
	pub original_len: usize,
	pub payload_len: usize,
}

impl PackageHeader {
	/// Bytes in front of the payload, marker included.
	pub fn overhead(&self, marker: &Marker) -> usize {
		marker.byte_len() + 1 + varint_len(self.original_len as u64) + varint_len(self.payload_len as u64)
	}
}

pub fn write_package(out: &mut Vec<u8>, marker_bytes: &[u8], method: MethodId, original_len: usize, payload: &[u8]) {
	out.extend_from_slice(marker_bytes);
	out.push(method as u8);
	write_varint(out, original_len as u64);
	write_varint(out, payload.len() as u64);
	out.extend_from_slice(payload);
}

/// Read the next package, checking it against the header.
pub fn read_package<'a>(
	reader: &mut ContainerReader<'a>,
	header: &ContainerHeader,
	marker_bytes: &[u8],
) -> Result<(PackageHeader, &'a [u8])> {
	let found = reader.read_bytes(marker_bytes.len(), "package marker")?;
	if found != marker_bytes {
		return Err(AmbcError::corrupt(format!(
			"marker mismatch at offset {}",
			reader.position() - marker_bytes.len()
		)));
	}
	let method = MethodId::try_from(reader.read_u8("method id")?)?;
	let original_len = reader.read_len("original length")?;
	let payload_len = reader.read_len("payload length")?;

	if original_len == 0 || original_len > header.chunk_size {
		return Err(AmbcError::corrupt(format!(
			"package original length {} outside 1..={}",
			original_len, header.chunk_size
		)));
	}
	if method == MethodId::Store && payload_len != original_len {
		return Err(AmbcError::corrupt("stored package length differs from its original length"));
	}

	let payload = reader.read_bytes(payload_len, "package payload")?;
	Ok((
		PackageHeader {
			method,
			original_len,
			payload_len,
		},
		payload,
	))
}

/// Summary of a container, read without decoding any payload.
#[derive(Debug, Clone, Serialize)]
pub struct ContainerInfo {
	pub version: u8,
	pub marker_bits: u32,
	pub marker: String,
	pub chunk_size: usize,
	pub original_size: u64,
	pub compressed_size: u64,
	pub chunk_count: u64,
	pub has_digest: bool,
	pub method_usage: BTreeMap<MethodId, usize>,
	pub compression_ratio: f64,
}

pub fn inspect(container: &[u8]) -> Result<ContainerInfo> {
	let mut reader = ContainerReader::new(container);
	let header = ContainerHeader::read(&mut reader)?;
	let marker_bytes = header.marker.to_bytes();

	let mut method_usage = BTreeMap::new();
	let mut packages = 0u64;
	while !reader.is_empty() {
		let (package, _) = read_package(&mut reader, &header, &marker_bytes)?;
		*method_usage.entry(package.method).or_insert(0) += 1;
		packages += 1;
	}
	if packages != header.chunk_count {
		return Err(package_count_error(packages, header.chunk_count));
	}

	let compressed_size = container.len() as u64;
	Ok(ContainerInfo {
		version: VERSION,
		marker_bits: header.marker.bits(),
		marker: header.marker.to_bit_string(),
		chunk_size: header.chunk_size,
		original_size: header.total_len,
		compressed_size,
		chunk_count: header.chunk_count,
		has_digest: header.digest.is_some(),
		method_usage,
		compression_ratio: if compressed_size > 0 {
			header.total_len as f64 / compressed_size as f64
		} else {
			0.0
		},
	})
}

/// Fewer packages than declared means the tail is missing; more is corruption.
pub fn package_count_error(found: u64, declared: u64) -> AmbcError {
	if found < declared {
		AmbcError::truncated(format!("found {} of {} packages", found, declared))
	} else {
		AmbcError::corrupt(format!("found {} packages, header declares {}", found, declared))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn sample_header(digest: bool) -> ContainerHeader {
		ContainerHeader {
			marker: Marker::new(5, 0b10110).unwrap(),
			chunk_size: 4096,
			total_len: 10_000,
			chunk_count: 3,
			digest: digest.then_some([7u8; DIGEST_LEN]),
		}
	}

	#[test]
	fn test_varint_encoding() {
		let mut out = Vec::new();
		write_varint(&mut out, 0);
		write_varint(&mut out, 127);
		write_varint(&mut out, 128);
		write_varint(&mut out, 300);
		assert_eq!(out, vec![0x00, 0x7F, 0x80, 0x01, 0xAC, 0x02]);

		let mut reader = ContainerReader::new(&out);
		assert_eq!(reader.read_varint("a").unwrap(), 0);
		assert_eq!(reader.read_varint("b").unwrap(), 127);
		assert_eq!(reader.read_varint("c").unwrap(), 128);
		assert_eq!(reader.read_varint("d").unwrap(), 300);
		assert!(reader.is_empty());
	}

	#[test]
	fn test_varint_extremes() {
		let mut out = Vec::new();
		write_varint(&mut out, u64::MAX);
		assert_eq!(out.len(), MAX_VARINT_LEN);
		assert_eq!(varint_len(u64::MAX), MAX_VARINT_LEN);
		assert_eq!(varint_len(0), 1);
		assert_eq!(ContainerReader::new(&out).read_varint("max").unwrap(), u64::MAX);
	}

	#[test]
	fn test_varint_errors() {
		let truncated = [0x80, 0x80];
		assert!(matches!(
			ContainerReader::new(&truncated).read_varint("x"),
			Err(AmbcError::TruncatedContainer(_))
		));

		let overlong = [0xFFu8; 11];
		assert!(matches!(
			ContainerReader::new(&overlong).read_varint("x"),
			Err(AmbcError::CorruptContainer(_))
		));
	}

	#[test]
	fn test_header_round_trip() {
		for digest in [false, true] {
			let header = sample_header(digest);
			let mut out = Vec::new();
			header.write(&mut out).unwrap();
			assert_eq!(out.len(), header.encoded_len());
			assert_eq!(&out[..4], MAGIC_NUMBER);

			let mut reader = ContainerReader::new(&out);
			assert_eq!(ContainerHeader::read(&mut reader).unwrap(), header);
			assert!(reader.is_empty());
		}
	}

	#[test]
	fn test_header_rejects_bad_magic_and_crc() {
		let mut out = Vec::new();
		sample_header(true).write(&mut out).unwrap();

		let mut bad_magic = out.clone();
		bad_magic[0] = b'X';
		assert!(matches!(
			ContainerHeader::read(&mut ContainerReader::new(&bad_magic)),
			Err(AmbcError::CorruptContainer(_))
		));

		let mut bad_body = out.clone();
		bad_body[12] ^= 0x01;
		assert!(ContainerHeader::read(&mut ContainerReader::new(&bad_body)).is_err());

		let short = &out[..out.len() - 2];
		assert!(matches!(
			ContainerHeader::read(&mut ContainerReader::new(short)),
			Err(AmbcError::TruncatedContainer(_))
		));
	}

	#[test]
	fn test_package_round_trip() {
		let header = sample_header(false);
		let marker_bytes = header.marker.to_bytes();
		let mut out = Vec::new();
		write_package(&mut out, &marker_bytes, MethodId::Rle, 4096, &[128, 0]);

		let mut reader = ContainerReader::new(&out);
		let (package, payload) = read_package(&mut reader, &header, &marker_bytes).unwrap();
		assert_eq!(package.method, MethodId::Rle);
		assert_eq!(package.original_len, 4096);
		assert_eq!(payload, &[128, 0]);
		assert_eq!(package.overhead(&header.marker) + payload.len(), out.len());
	}

	#[test]
	fn test_header_rejects_oversized_chunk_size() {
		let mut header = sample_header(false);
		header.chunk_size = 1 << 46;
		header.total_len = 1 << 46;
		header.chunk_count = 1;
		let mut out = Vec::new();
		header.write(&mut out).unwrap();
		assert!(matches!(
			ContainerHeader::read(&mut ContainerReader::new(&out)),
			Err(AmbcError::CorruptContainer(_))
		));

		header.chunk_size = MAX_CHUNK_SIZE;
		header.total_len = MAX_CHUNK_SIZE as u64;
		let mut out = Vec::new();
		header.write(&mut out).unwrap();
		assert_eq!(ContainerHeader::read(&mut ContainerReader::new(&out)).unwrap(), header);
	}

	#[test]
	fn test_package_errors() {
		let header = sample_header(false);
		let marker_bytes = header.marker.to_bytes();

		let mut wrong_marker = Vec::new();
		write_package(&mut wrong_marker, &[0x00], MethodId::Store, 2, b"ab");
		assert!(matches!(
			read_package(&mut ContainerReader::new(&wrong_marker), &header, &marker_bytes),
			Err(AmbcError::CorruptContainer(_))
		));

		let mut unknown = Vec::new();
		unknown.extend_from_slice(&marker_bytes);
		unknown.extend_from_slice(&[42, 2, 2, b'a', b'b']);
		assert!(matches!(
			read_package(&mut ContainerReader::new(&unknown), &header, &marker_bytes),
			Err(AmbcError::CorruptContainer(_))
		));

		let mut short = Vec::new();
		write_package(&mut short, &marker_bytes, MethodId::Huffman, 100, &[1, 2, 3, 4]);
		short.truncate(short.len() - 1);
		assert!(matches!(
			read_package(&mut ContainerReader::new(&short), &header, &marker_bytes),
			Err(AmbcError::TruncatedContainer(_))
		));

		let mut oversized = Vec::new();
		write_package(&mut oversized, &marker_bytes, MethodId::Rle, 5000, &[1]);
		assert!(matches!(
			read_package(&mut ContainerReader::new(&oversized), &header, &marker_bytes),
			Err(AmbcError::CorruptContainer(_))
		));
	}
}
