use indicatif::{ProgressBar, ProgressStyle};

/// Receives progress while chunks are encoded.
pub trait Progress: Sync {
    fn start(&self, _total_bytes: u64) {}
    fn chunk_done(&self, bytes: usize);
    fn finish(&self) {}
}

/// Discards all progress updates.
pub struct NoProgress;

impl Progress for NoProgress {
    fn chunk_done(&self, _bytes: usize) {}
}

impl Progress for ProgressBar {
    fn start(&self, total_bytes: u64) {
        self.set_length(total_bytes);
        self.set_position(0);
    }

    fn chunk_done(&self, bytes: usize) {
        self.inc(bytes as u64);
    }

    fn finish(&self) {
        self.finish_with_message("done");
    }
}

/// Byte-count progress bar in the style used by the command line tool.
pub fn byte_progress_bar() -> ProgressBar {
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({eta})")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_bar_counts_bytes() {
        let pb = ProgressBar::hidden();
        pb.start(100);
        pb.chunk_done(40);
        pb.chunk_done(60);
        assert_eq!(pb.position(), 100);
        assert_eq!(pb.length(), Some(100));
        Progress::finish(&pb);
        assert!(pb.is_finished());
    }
}
