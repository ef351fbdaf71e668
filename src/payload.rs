//! Payload construction for upload operations.
//!
//! The benchmark measures transport and storage cost, not content entropy,
//! so the payload is deterministic pseudo-random filler. It is built once
//! per run and shared read-only across all workers; cloning the returned
//! [`Bytes`] is a refcount bump.

use std::io::Write;

use anyhow::{Context, Result};
use bytes::Bytes;
use flate2::Compression;
use flate2::write::GzEncoder;
use rand::rngs::SmallRng;
use rand::{RngCore, SeedableRng};

/// Fixed seed so repeated runs upload identical bytes.
const PAYLOAD_SEED: u64 = 0x5337_7074;

/// Builds the payload for a run.
///
/// `size` is the *uncompressed* logical size in bytes. With `gzip` set, the
/// returned buffer is the gzip encoding of those `size` bytes, which is what
/// goes on the wire together with a `Content-Encoding: gzip` header.
pub fn build_payload(size: u64, gzip: bool) -> Result<Bytes> {
    let mut rng = SmallRng::seed_from_u64(PAYLOAD_SEED);
    let mut content = vec![0u8; size as usize];
    rng.fill_bytes(&mut content);

    if !gzip {
        return Ok(Bytes::from(content));
    }

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(&content)
        .context("failed to gzip payload")?;
    let compressed = encoder.finish().context("failed to gzip payload")?;

    Ok(Bytes::from(compressed))
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::read::GzDecoder;

    use super::*;

    #[test]
    fn payload_has_requested_size() {
        let payload = build_payload(1024, false).unwrap();
        assert_eq!(payload.len(), 1024);
    }

    #[test]
    fn payload_is_deterministic() {
        let a = build_payload(4096, false).unwrap();
        let b = build_payload(4096, false).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn gzip_payload_decompresses_to_requested_size() {
        let payload = build_payload(65536, true).unwrap();

        let mut decoded = Vec::new();
        GzDecoder::new(payload.as_ref())
            .read_to_end(&mut decoded)
            .unwrap();

        assert_eq!(decoded.len(), 65536);
        assert_eq!(decoded, build_payload(65536, false).unwrap());
    }
}
