//! Upload checksum digesters.
//!
//! Upload handlers feed each received chunk to a [`Digester`] and store the
//! final digest as the bundle checksum. [`NoopDigester`] is used when
//! checksums are disabled.

use sha2::{Digest, Sha256};

/// Incremental digest over a byte stream.
pub trait Digester: Send {
    fn update(&mut self, bytes: &[u8]);

    /// Consume the digester. `None` when no digest is computed.
    fn finalize(self: Box<Self>) -> Option<Vec<u8>>;
}

/// Digester that computes nothing.
#[derive(Debug, Default)]
pub struct NoopDigester;

impl Digester for NoopDigester {
    fn update(&mut self, _bytes: &[u8]) {}

    fn finalize(self: Box<Self>) -> Option<Vec<u8>> {
        None
    }
}

/// SHA-256 digester.
#[derive(Debug, Default)]
pub struct Sha256Digester {
    hasher: Sha256,
}

impl Sha256Digester {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Digester for Sha256Digester {
    fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    fn finalize(self: Box<Self>) -> Option<Vec<u8>> {
        Some(self.hasher.finalize().to_vec())
    }
}

/// Pick a digester for an upload.
pub fn digester(checksum: bool) -> Box<dyn Digester> {
    if checksum {
        Box::new(Sha256Digester::new())
    } else {
        Box::new(NoopDigester)
    }
}

/// Run `chunks` through `digester` and hex-encode the result.
pub fn checksum_hex<'a>(
    mut digester: Box<dyn Digester>,
    chunks: impl IntoIterator<Item = &'a [u8]>,
) -> Option<String> {
    for chunk in chunks {
        digester.update(chunk);
    }
    digester.finalize().map(hex::encode)
}
