//! Content fingerprints.
//!
//! A [`Fingerprint`] identifies a file independent of any manifest:
//!
//! - `sha1` - SHA-1 over the raw bytes
//! - `cross_platform` - SHA-1 after converting line endings to the other OS
//!   convention; only present for text files whose line endings are all the same
//! - `header` / `footer` - SHA-1 over the first and last window of bytes; only
//!   present for files larger than the window
//!
//! [`FingerprintCache`] memoizes these by canonical path so that a file
//! referenced from many nodes is read once.

mod cache;

pub use cache::FingerprintCache;

use crate::error::{Result, ScanError};
use crate::model::Fingerprint;
use sha1::{Digest, Sha1};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;
use tracing::warn;

const BUFFER_SIZE: usize = 64 * 1024;

/// Which way line endings are rewritten for the cross-platform hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Normalization {
    CrlfToLf,
    LfToCrlf,
}

#[derive(Debug, Default)]
struct LineEndings {
    crlf: usize,
    lf: usize,
    cr: usize,
    binary: bool,
    pending_cr: bool,
}

impl LineEndings {
    fn feed(&mut self, chunk: &[u8]) {
        for &b in chunk {
            if self.pending_cr {
                self.pending_cr = false;
                if b == b'\n' {
                    self.crlf += 1;
                    continue;
                }
                self.cr += 1;
            }
            match b {
                b'\r' => self.pending_cr = true,
                b'\n' => self.lf += 1,
                0 => self.binary = true,
                _ => {}
            }
        }
    }

    fn finish(mut self) -> Option<Normalization> {
        if self.pending_cr {
            self.cr += 1;
        }
        if self.binary || self.cr > 0 {
            return None;
        }
        match (self.crlf, self.lf) {
            (0, 0) => None,
            (_, 0) => Some(Normalization::CrlfToLf),
            (0, _) => Some(Normalization::LfToCrlf),
            _ => None,
        }
    }
}

/// Computes fingerprints with a fixed header/footer window.
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    window: usize,
}

impl Fingerprinter {
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    /// Fingerprints `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::FingerprintIo`] if the file cannot be opened or read.
    pub fn fingerprint(&self, path: &Path) -> Result<Fingerprint> {
        let io_err = |source| ScanError::FingerprintIo {
            path: path.to_path_buf(),
            source,
        };

        let mut file = File::open(path).map_err(io_err)?;
        let len = file.metadata().map_err(io_err)?.len();
        self.fingerprint_reader(path, &mut file, len)
    }

    /// Fingerprints `len` bytes of `reader`. Only the primary hash is
    /// required; a variant whose pass fails is logged and left unset.
    fn fingerprint_reader<R: Read + Seek>(&self, path: &Path, reader: &mut R, len: u64) -> Result<Fingerprint> {
        let mut hasher = Sha1::new();
        let mut endings = LineEndings::default();
        let mut buf = vec![0u8; BUFFER_SIZE];
        loop {
            let n = reader.read(&mut buf).map_err(|source| ScanError::FingerprintIo {
                path: path.to_path_buf(),
                source,
            })?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            endings.feed(&buf[..n]);
        }

        let mut fingerprint = Fingerprint::primary(hex::encode(hasher.finalize()));

        if let Some(normalization) = endings.finish() {
            let hashed = reader
                .seek(SeekFrom::Start(0))
                .and_then(|_| normalized_hash(reader, normalization));
            match hashed {
                Ok(hash) => fingerprint.cross_platform = Some(hash),
                Err(e) => warn!(path = %path.display(), error = %e, "no cross-platform hash"),
            }
        }

        if len > self.window as u64 {
            match self.partial_hashes(reader, len) {
                Ok((header, footer)) => {
                    fingerprint.header = Some(header);
                    fingerprint.footer = Some(footer);
                }
                Err(e) => warn!(path = %path.display(), error = %e, "no header/footer hashes"),
            }
        }

        Ok(fingerprint)
    }

    /// Like [`fingerprint`](Self::fingerprint) but logs failures and returns `None`.
    pub fn fingerprint_logged(&self, path: &Path) -> Option<Fingerprint> {
        match self.fingerprint(path) {
            Ok(fp) => Some(fp),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping fingerprint");
                None
            }
        }
    }

    fn partial_hashes<R: Read + Seek>(&self, file: &mut R, len: u64) -> std::io::Result<(String, String)> {
        let mut window = vec![0u8; self.window];

        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut window)?;
        let header = hex::encode(Sha1::digest(&window));

        file.seek(SeekFrom::Start(len - self.window as u64))?;
        file.read_exact(&mut window)?;
        let footer = hex::encode(Sha1::digest(&window));

        Ok((header, footer))
    }
}

impl Default for Fingerprinter {
    fn default() -> Self {
        Self::new(1024)
    }
}

fn normalized_hash<R: Read>(file: &mut R, normalization: Normalization) -> std::io::Result<String> {
    let mut hasher = Sha1::new();
    let mut buf = vec![0u8; BUFFER_SIZE];
    let mut out = Vec::with_capacity(BUFFER_SIZE * 2);
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        out.clear();
        for &b in &buf[..n] {
            match (normalization, b) {
                // Homogeneous CRLF input: every CR precedes an LF.
                (Normalization::CrlfToLf, b'\r') => {}
                (Normalization::LfToCrlf, b'\n') => out.extend_from_slice(b"\r\n"),
                _ => out.push(b),
            }
        }
        hasher.update(&out);
    }
    Ok(hex::encode(hasher.finalize()))
}

/// SHA-1 of an in-memory buffer, lowercase hex.
pub fn sha1_hex(bytes: &[u8]) -> String {
    hex::encode(Sha1::digest(bytes))
}
