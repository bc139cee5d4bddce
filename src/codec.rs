//! Hash stream codec
//!
//! The wire format is a bare concatenation of 8-byte big-endian `u64` values.
//! There is no length prefix and no separator; the stream ends where the
//! request body ends.

use thiserror::Error;

/// Width of one encoded hash
pub const RECORD_SIZE: usize = 8;

/// Default ceiling on records decoded from a single request body
pub const MAX_REQUEST_HASHES: usize = 100_000_000;

/// Hash stream decoding errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("truncated record: stream ended {trailing} byte(s) into an 8-byte hash")]
    TruncatedRecord { trailing: usize },

    #[error("too many hashes (max: {max})")]
    TooManyRecords { max: usize },

    #[error("failed reading request body: {0}")]
    Body(String),
}

/// Incremental decoder for the hash stream
///
/// Bytes may arrive in chunks of any size; a record split across two chunks
/// is carried over until its remaining bytes show up.
#[derive(Debug)]
pub struct HashDecoder {
    hashes: Vec<u64>,
    pending: [u8; RECORD_SIZE],
    pending_len: usize,
    max_records: usize,
}

impl HashDecoder {
    /// Create a decoder that rejects streams with more than `max_records` hashes
    pub fn new(max_records: usize) -> Self {
        Self {
            hashes: Vec::new(),
            pending: [0; RECORD_SIZE],
            pending_len: 0,
            max_records,
        }
    }

    /// Number of complete records decoded so far
    pub fn len(&self) -> usize {
        self.hashes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hashes.is_empty()
    }

    /// Feed the next chunk of the stream
    pub fn feed(&mut self, mut chunk: &[u8]) -> Result<(), CodecError> {
        // Complete a record left over from the previous chunk
        if self.pending_len > 0 {
            let take = (RECORD_SIZE - self.pending_len).min(chunk.len());
            self.pending[self.pending_len..self.pending_len + take].copy_from_slice(&chunk[..take]);
            self.pending_len += take;
            chunk = &chunk[take..];

            if self.pending_len < RECORD_SIZE {
                return Ok(());
            }
            self.pending_len = 0;
            let value = u64::from_be_bytes(self.pending);
            self.push(value)?;
        }

        let mut records = chunk.chunks_exact(RECORD_SIZE);
        for record in records.by_ref() {
            let mut bytes = [0u8; RECORD_SIZE];
            bytes.copy_from_slice(record);
            self.push(u64::from_be_bytes(bytes))?;
        }

        let rest = records.remainder();
        self.pending[..rest.len()].copy_from_slice(rest);
        self.pending_len = rest.len();

        Ok(())
    }

    /// Signal end of stream and return the decoded hashes
    pub fn finish(self) -> Result<Vec<u64>, CodecError> {
        if self.pending_len != 0 {
            return Err(CodecError::TruncatedRecord {
                trailing: self.pending_len,
            });
        }
        Ok(self.hashes)
    }

    fn push(&mut self, value: u64) -> Result<(), CodecError> {
        if self.hashes.len() >= self.max_records {
            return Err(CodecError::TooManyRecords {
                max: self.max_records,
            });
        }
        self.hashes.push(value);
        Ok(())
    }
}

/// Decode a complete hash stream held in memory
pub fn decode_hashes(bytes: &[u8], max_records: usize) -> Result<Vec<u64>, CodecError> {
    let mut decoder = HashDecoder::new(max_records);
    decoder.feed(bytes)?;
    decoder.finish()
}

/// Encode hashes in the wire format
pub fn encode_hashes(hashes: &[u64]) -> Vec<u8> {
    let mut out = Vec::with_capacity(hashes.len() * RECORD_SIZE);
    for hash in hashes {
        out.extend_from_slice(&hash.to_be_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_big_endian() {
        let bytes = [0, 0, 0, 0, 0, 0, 1, 2, 0xff, 0, 0, 0, 0, 0, 0, 0];
        let hashes = decode_hashes(&bytes, 10).unwrap();
        assert_eq!(hashes, vec![0x0102, 0xff00_0000_0000_0000]);
    }

    #[test]
    fn test_empty_stream() {
        assert_eq!(decode_hashes(&[], 10).unwrap(), Vec::<u64>::new());
    }

    #[test]
    fn test_round_trip() {
        let hashes = vec![u64::MAX, 0, 42, 7, 42];
        let encoded = encode_hashes(&hashes);
        assert_eq!(encoded.len(), hashes.len() * RECORD_SIZE);
        assert_eq!(decode_hashes(&encoded, 100).unwrap(), hashes);
    }

    #[test]
    fn test_truncated_record() {
        let mut encoded = encode_hashes(&[1, 2]);
        encoded.truncate(13);
        assert_eq!(
            decode_hashes(&encoded, 100),
            Err(CodecError::TruncatedRecord { trailing: 5 })
        );
    }

    #[test]
    fn test_too_many_records() {
        let encoded = encode_hashes(&[1, 2, 3, 4]);
        assert_eq!(decode_hashes(&encoded, 4).unwrap().len(), 4);
        assert_eq!(
            decode_hashes(&encoded, 3),
            Err(CodecError::TooManyRecords { max: 3 })
        );
    }

    #[test]
    fn test_chunk_boundaries() {
        let hashes: Vec<u64> = (0..20).map(|i| i * 0x0101_0101_0101).collect();
        let encoded = encode_hashes(&hashes);

        for chunk_size in [1, 3, 7, 8, 9, 17, 64] {
            let mut decoder = HashDecoder::new(100);
            for chunk in encoded.chunks(chunk_size) {
                decoder.feed(chunk).unwrap();
            }
            assert_eq!(decoder.len(), hashes.len());
            assert_eq!(decoder.finish().unwrap(), hashes, "chunk size {}", chunk_size);
        }
    }

    #[test]
    fn test_split_record_then_truncated() {
        let mut decoder = HashDecoder::new(100);
        decoder.feed(&[0, 0, 0]).unwrap();
        decoder.feed(&[0, 0, 0, 0, 9, 1]).unwrap();
        assert_eq!(decoder.len(), 1);
        assert_eq!(
            decoder.finish(),
            Err(CodecError::TruncatedRecord { trailing: 1 })
        );
    }
}
