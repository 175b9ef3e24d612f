use crate::error::AmbcError;
use std::str::FromStr;

/// Default chunk size in bytes.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Largest accepted chunk size (64 MiB).
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// How much of the input the marker search looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerSearch {
    /// Scan every bit offset of the input. Always yields a truly absent marker.
    Full,
    /// Scan about `sample_size` bytes taken as evenly spaced blocks.
    ///
    /// Inputs no larger than `sample_size` are still scanned in full. For
    /// larger inputs the marker is only guaranteed absent from the sampled
    /// blocks and may occur elsewhere; containers stay decodable because
    /// packages are length-prefixed.
    Sampled { sample_size: usize },
}

impl Default for MarkerSearch {
    fn default() -> Self {
        MarkerSearch::Full
    }
}

#[derive(Debug, Clone)]
pub struct AmbcConfig {
    pub chunk_size: usize,
    pub threads: usize,
    pub marker_search: MarkerSearch,
    /// Store a SHA-256 digest of the input and verify it on decompression.
    pub digest: bool,
}

impl Default for AmbcConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            threads: num_cpus::get(),
            marker_search: MarkerSearch::Full,
            digest: true,
        }
    }
}

impl AmbcConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn with_marker_search(mut self, marker_search: MarkerSearch) -> Self {
        self.marker_search = marker_search;
        self
    }

    pub fn with_digest(mut self, digest: bool) -> Self {
        self.digest = digest;
        self
    }

    pub fn validate(&self) -> Result<(), AmbcError> {
        if self.chunk_size == 0 {
            return Err(AmbcError::ConfigError("chunk size must be greater than zero".to_string()));
        }
        if self.chunk_size > MAX_CHUNK_SIZE {
            return Err(AmbcError::ConfigError(format!(
                "chunk size {} exceeds the maximum of {} bytes",
                self.chunk_size, MAX_CHUNK_SIZE
            )));
        }
        if self.threads == 0 {
            return Err(AmbcError::ConfigError("thread count must be at least 1".to_string()));
        }
        if let MarkerSearch::Sampled { sample_size } = self.marker_search {
            if sample_size == 0 {
                return Err(AmbcError::ConfigError("marker sample size must be greater than zero".to_string()));
            }
        }
        Ok(())
    }
}

impl FromStr for MarkerSearch {
    type Err = AmbcError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.to_lowercase();
        if lower == "full" {
            return Ok(MarkerSearch::Full);
        }
        match lower.strip_prefix("sampled:") {
            Some(size) => size
                .parse::<usize>()
                .map(|sample_size| MarkerSearch::Sampled { sample_size })
                .map_err(|_| AmbcError::ConfigError(format!("Invalid marker sample size: {}", size))),
            None => Err(AmbcError::ConfigError(format!("Invalid marker search: {}", s))),
        }
    }
}
