//! Capture integrity verification
//!
//! A capture is only worth uploading if it decompresses cleanly under the
//! dictionary it was produced with. The whole file is streamed through a
//! dictionary-bound zstd decoder into a discard sink; any decoder error
//! marks the capture as corrupt. The one-retry policy for corrupt captures
//! lives in the orchestrator, not here.

use std::io::{BufReader, Read};
use std::path::Path;

use tracing::debug;

use crate::dictionary::Dictionary;
use crate::error::{BatchError, Error, Result};

/// Verify that `capture_path` decompresses cleanly under `dictionary`
///
/// Decompression runs on a blocking thread; the decompressed bytes are
/// discarded. An empty capture passes, since it contains no frames to be
/// damaged.
pub async fn verify(capture_path: &Path, dictionary: &Dictionary) -> Result<()> {
    let path = capture_path.to_path_buf();
    let dict_bytes = dictionary.bytes.clone();

    let outcome = tokio::task::spawn_blocking(move || decompress_to_sink(&path, &dict_bytes))
        .await
        .map_err(|e| Error::Io(std::io::Error::other(format!("verification task failed: {e}"))))?;

    match outcome {
        Ok(bytes) => {
            debug!(capture = %capture_path.display(), bytes, "Capture decompressed cleanly");
            Ok(())
        }
        Err(reason) => Err(BatchError::CorruptCapture {
            path: capture_path.to_path_buf(),
            reason,
        }
        .into()),
    }
}

/// Stream the file through a dictionary-bound decoder, returning the
/// decompressed byte count
fn decompress_to_sink(path: &Path, dictionary: &[u8]) -> std::result::Result<u64, String> {
    let file = std::fs::File::open(path).map_err(|e| format!("cannot open capture: {e}"))?;
    let mut decoder =
        zstd::stream::read::Decoder::with_dictionary(BufReader::new(file), dictionary)
            .map_err(|e| format!("decoder setup failed: {e}"))?;

    let mut sink = [0u8; 16 * 1024];
    let mut total: u64 = 0;
    loop {
        match decoder.read(&mut sink) {
            Ok(0) => return Ok(total),
            Ok(n) => total += n as u64,
            Err(e) => return Err(format!("decompression failed: {e}")),
        }
    }
}
