use ambc::{AdaptiveCompressor, AmbcConfig, MethodRegistry};

fn main() -> Result<(), Box<dyn std::error::Error>> {
	env_logger::init();

	let mut data = b"hello hello hello hello ".repeat(100);
	data.extend(std::iter::repeat(0u8).take(8192));

	let config = AmbcConfig::default().with_chunk_size(1024);
	let compressor = AdaptiveCompressor::new(config, MethodRegistry::detect())?;
	println!("methods: {:?}", compressor.registry().ids());

	let (container, stats) = compressor.compress(&data)?;
	println!(
		"compressed {} -> {} ({:.2}x, {}-bit marker)",
		stats.original_size,
		stats.compressed_size,
		stats.ratio(),
		stats.marker_bits
	);
	for (method, chunks) in &stats.method_usage {
		println!("  {:<12} {} chunks", method, chunks);
	}

	let restored = compressor.decompress(&container)?;
	println!("restored {} bytes", restored.len());
	assert_eq!(restored, data);
	Ok(())
}
