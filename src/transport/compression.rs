//! Optional GZIP frame compression (§4.6), level 1-9.

use flate2::read::{GzDecoder, GzEncoder};
use flate2::Compression;
use std::io::Read;

pub fn compress(data: &[u8], level: u32) -> Vec<u8> {
    let mut encoder = GzEncoder::new(data, Compression::new(level.clamp(1, 9)));
    let mut out = Vec::new();
    encoder
        .read_to_end(&mut out)
        .expect("in-memory gzip encoding cannot fail");
    out
}

pub fn decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}
