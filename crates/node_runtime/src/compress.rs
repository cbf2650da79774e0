use std::io::{Read, Write};

use flate2::{Compression, read::GzDecoder, write::GzEncoder};

use crate::error::{Error, Result};

/// Gzip framing for request/response bodies, switched by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Codec {
    enabled: bool,
}

impl Codec {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        if !self.enabled {
            return Ok(data.to_vec());
        }
        let mut encoder =
            GzEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
        encoder
            .write_all(data)
            .map_err(|e| Error::Compression(e.to_string()))?;
        encoder.finish().map_err(|e| Error::Compression(e.to_string()))
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        if !self.enabled {
            return Ok(data.to_vec());
        }
        let mut out = Vec::with_capacity(data.len() * 2);
        GzDecoder::new(data)
            .read_to_end(&mut out)
            .map_err(|e| Error::Compression(e.to_string()))?;
        Ok(out)
    }
}

impl Default for Codec {
    fn default() -> Self {
        Self::new(true)
    }
}
