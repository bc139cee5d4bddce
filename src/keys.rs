//! Key hashing for list owners
//!
//! Both parties turn each record's key into a salted, truncated hash before
//! anything leaves their machine:
//!
//! 1. Keep the first column (cut at CR, LF, tab, space or comma)
//! 2. Trim single and double quotes from both ends
//! 3. Uppercase, one character to one character (UTF-8 aware)
//! 4. SHA-256 over `salt || key`, keep the first 8 bytes as a big-endian u64
//!
//! The salt never goes to the server. The uploader generates it and hands it
//! to the matcher together with the match link.

use std::fmt;

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine as _;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

/// Salt length in bytes
pub const SALT_LEN: usize = 32;

/// Random bytes in a generated upload name
pub const NAME_LEN: usize = 16;

const DELIMITERS: &[u8] = b"\r\n\t ,";

#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    #[error("salt is not valid base64: {0}")]
    SaltEncoding(#[from] base64::DecodeError),

    #[error("salt must be 32 bytes, got {0}")]
    SaltLength(usize),
}

/// Secret shared by uploader and matcher
#[derive(Clone, PartialEq, Eq)]
pub struct Salt([u8; SALT_LEN]);

impl Salt {
    /// Draw a fresh salt from the operating system's CSPRNG
    pub fn generate() -> Self {
        let mut bytes = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; SALT_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse the base64 form handed to the matcher
    pub fn from_base64(encoded: &str) -> Result<Self, KeyError> {
        let decoded = STANDARD.decode(encoded.trim())?;
        let bytes: [u8; SALT_LEN] = decoded
            .as_slice()
            .try_into()
            .map_err(|_| KeyError::SaltLength(decoded.len()))?;
        Ok(Self(bytes))
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// Salted hash of an already-normalized key
    pub fn hash_key(&self, key: &[u8]) -> u64 {
        let digest = Sha256::new().chain_update(self.0).chain_update(key).finalize();
        let mut truncated = [0u8; 8];
        truncated.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(truncated)
    }

    /// Normalize and hash each record, in order
    pub fn hash_records<'a, I>(&self, records: I) -> Vec<u64>
    where
        I: IntoIterator<Item = &'a [u8]>,
    {
        records
            .into_iter()
            .map(|record| self.hash_key(&normalize_key(record)))
            .collect()
    }
}

impl fmt::Debug for Salt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Salt(..)")
    }
}

/// Extract the matching key from one input line
pub fn normalize_key(line: &[u8]) -> Vec<u8> {
    let end = line
        .iter()
        .position(|b| DELIMITERS.contains(b))
        .unwrap_or(line.len());
    let key = &line[..end];

    let is_quote = |b: &u8| matches!(b, b'\'' | b'"');
    let start = key.iter().position(|b| !is_quote(b)).unwrap_or(key.len());
    let stop = key.iter().rposition(|b| !is_quote(b)).map_or(start, |i| i + 1);

    uppercase(&key[start..stop])
}

/// Uppercase UTF-8 text one character at a time
///
/// Characters whose uppercase form is more than one character (`ß`) are kept
/// as they are. Each byte of an invalid sequence becomes U+FFFD, so every
/// client derives the same bytes from the same input.
fn uppercase(key: &[u8]) -> Vec<u8> {
    if key.is_ascii() {
        return key.to_ascii_uppercase();
    }

    let mut out = String::with_capacity(key.len());
    for chunk in key.utf8_chunks() {
        for c in chunk.valid().chars() {
            let mut upper = c.to_uppercase();
            match (upper.next(), upper.next()) {
                (Some(u), None) => out.push(u),
                _ => out.push(c),
            }
        }
        for _ in chunk.invalid() {
            out.push(char::REPLACEMENT_CHARACTER);
        }
    }
    out.into_bytes()
}

/// Generate an unguessable upload name
pub fn generate_upload_name() -> String {
    let mut bytes = [0u8; NAME_LEN];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Deposit URL for `name` on a server whose prefix URL is `base`
pub fn upload_url(base: &str, name: &str) -> String {
    let separator = if base.ends_with('/') { "" } else { "/" };
    format!("{}{}upload?name={}", base, separator, urlencoding::encode(name))
}
