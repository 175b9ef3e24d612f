use crate::config::{AmbcConfig, MarkerSearch};
use crate::container;
use crate::error::AmbcError;
use crate::methods::{backends, MethodId, MethodRegistry};
use crate::progress::{byte_progress_bar, NoProgress, Progress};
use crate::AdaptiveCompressor;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fs;
use std::path::PathBuf;

#[derive(Parser)]
#[command(author, version, about, long_about = "Adaptive marker-based chunk compressor")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compresses a file
    Compress {
        /// Input file to compress
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Output file name
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Chunk size in bytes
        #[arg(short, long, default_value_t = crate::config::DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Number of threads to use (default: all available cores)
        #[arg(short, long)]
        threads: Option<usize>,

        /// Marker search [full, sampled:<bytes>]
        #[arg(short, long, default_value = "full")]
        marker_search: MarkerSearch,

        /// Do not store a SHA-256 digest of the input
        #[arg(long)]
        no_digest: bool,

        /// Print statistics as JSON
        #[arg(long)]
        json: bool,

        /// Show a progress bar
        #[arg(long)]
        progress: bool,
    },
    /// Decompresses a file
    Decompress {
        /// Input file to decompress
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Output file name
        #[arg(short, long, value_name = "FILE")]
        output: PathBuf,

        /// Print statistics as JSON
        #[arg(long)]
        json: bool,
    },
    /// Shows the header and method usage of a compressed file
    Info {
        /// Compressed file to inspect
        #[arg(short, long, value_name = "FILE")]
        input: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Lists compression methods and whether this build can use them
    Methods,
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AmbcError> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| AmbcError::ConfigError(format!("cannot render JSON: {}", e)))?;
    println!("{}", json);
    Ok(())
}

pub fn run() -> Result<(), AmbcError> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Compress {
            input,
            output,
            chunk_size,
            threads,
            marker_search,
            no_digest,
            json,
            progress,
        } => {
            let config = AmbcConfig {
                chunk_size: *chunk_size,
                threads: threads.unwrap_or_else(num_cpus::get),
                marker_search: *marker_search,
                digest: !*no_digest,
            };
            let compressor = AdaptiveCompressor::with_detected_methods(config)?;

            let stats = if *progress {
                let pb = byte_progress_bar();
                compressor.compress_file_with_progress(input, output, &pb as &dyn Progress)?
            } else {
                compressor.compress_file_with_progress(input, output, &NoProgress)?
            };

            if *json {
                return print_json(&stats);
            }
            println!("Compressed {} to {}", input.display(), output.display());
            println!("  Original Size:    {} bytes", stats.original_size);
            println!("  Compressed Size:  {} bytes", stats.compressed_size);
            println!("  Ratio:            {:.2}x", stats.ratio());
            println!("  Space Saved:      {:.1}%", stats.space_saved_percentage());
            println!("  Chunks:           {}", stats.chunk_count);
            println!("  Marker Bits:      {}", stats.marker_bits);
            println!("  Overhead:         {} bytes", stats.header_bytes + stats.package_overhead_bytes);
            for (method, count) in &stats.method_usage {
                println!("    {:<12} {} chunks", method.name(), count);
            }
            println!("  Elapsed Time:     {:.2?}", stats.elapsed);
        }
        Commands::Decompress { input, output, json } => {
            let compressor = AdaptiveCompressor::with_detected_methods(AmbcConfig::default())?;
            let stats = compressor.decompress_file(input, output)?;

            if *json {
                return print_json(&stats);
            }
            println!("Decompressed {} to {}", input.display(), output.display());
            println!("  Decompressed Size: {} bytes", stats.decompressed_size);
            println!("  Elapsed Time:      {:.2?}", stats.elapsed);
        }
        Commands::Info { input, json } => {
            let data = fs::read(input).map_err(|source| AmbcError::InputUnavailable {
                path: input.clone(),
                source,
            })?;
            let info = container::inspect(&data)?;

            if *json {
                return print_json(&info);
            }
            println!("File: {}", input.display());
            println!("  Format Version:   {}", info.version);
            println!("  Marker:           {} ({} bits)", info.marker, info.marker_bits);
            println!("  Chunk Size:       {} bytes", info.chunk_size);
            println!("  Original Size:    {} bytes", info.original_size);
            println!("  Compressed Size:  {} bytes", info.compressed_size);
            println!("  Ratio:            {:.2}x", info.compression_ratio);
            println!("  Digest:           {}", if info.has_digest { "sha256" } else { "none" });
            for (method, count) in &info.method_usage {
                println!("    {:<12} {} chunks", method.name(), count);
            }
        }
        Commands::Methods => {
            let registry = MethodRegistry::detect();
            for id in MethodId::ALL {
                let state = if registry.contains(id) { "available" } else { "unavailable" };
                let source = match backends::required_feature(id) {
                    Some(feature) => format!("feature \"{}\"", feature),
                    None if id.is_builtin() => "built in".to_string(),
                    None => "no backend".to_string(),
                };
                println!("{:>3}  {:<12} {:<12} {}", id as u8, id.name(), state, source);
            }
        }
    }

    Ok(())
}
