//! Envelope encoding and decoding.

use super::{varint, Envelope, EnvelopeHeader};
use crate::config::{ENVELOPE_MAGIC, ENVELOPE_VERSION, MAX_FILENAME_HINT, NONCE_SIZE, TAG_SIZE};
use crate::error::{Error, Result};
use crate::keys::Algorithm;

/// Serialize an envelope. The output depends only on the inputs.
pub fn encode(
    header: &EnvelopeHeader,
    ciphertext: &[u8],
    tag: &[u8; TAG_SIZE],
) -> Result<Vec<u8>> {
    let mut out = header.to_bytes()?;
    out.reserve(NONCE_SIZE + ciphertext.len() + TAG_SIZE);
    out.extend_from_slice(&header.nonce);
    out.extend_from_slice(ciphertext);
    out.extend_from_slice(tag);
    Ok(out)
}

/// Parse an envelope. Structural problems are `MalformedEnvelope`; nothing
/// here checks the tag.
pub fn decode(bytes: &[u8]) -> Result<Envelope> {
    let mut reader = Reader::new(bytes);

    if reader.take(ENVELOPE_MAGIC.len(), "magic")? != ENVELOPE_MAGIC {
        return Err(Error::malformed("bad magic"));
    }

    let version = reader.byte("version")?;
    if version != ENVELOPE_VERSION {
        return Err(Error::malformed(format!(
            "unsupported envelope version {}",
            version
        )));
    }

    let tag_byte = reader.byte("algorithm tag")?;
    let algorithm = Algorithm::from_tag(tag_byte)
        .ok_or_else(|| Error::malformed(format!("unknown algorithm tag {}", tag_byte)))?;

    let kem_len = reader.varint()?;
    if kem_len != algorithm.kem_ciphertext_len() as u64 {
        return Err(Error::malformed(format!(
            "{} KEM ciphertext must be {} bytes, header says {}",
            algorithm,
            algorithm.kem_ciphertext_len(),
            kem_len
        )));
    }
    let kem_ciphertext = reader
        .take(algorithm.kem_ciphertext_len(), "KEM ciphertext")?
        .to_vec();

    let filename_hint = match reader.byte("hint flag")? {
        0 => None,
        1 => {
            let hint_len = reader.varint()?;
            if hint_len > MAX_FILENAME_HINT as u64 {
                return Err(Error::malformed(format!(
                    "filename hint is {} bytes, limit is {}",
                    hint_len, MAX_FILENAME_HINT
                )));
            }
            let raw = reader.take(hint_len as usize, "filename hint")?;
            let hint = std::str::from_utf8(raw)
                .map_err(|_| Error::malformed("filename hint is not UTF-8"))?;
            Some(hint.to_string())
        }
        other => {
            return Err(Error::malformed(format!("invalid hint flag {}", other)));
        }
    };

    let mut nonce = [0u8; NONCE_SIZE];
    nonce.copy_from_slice(reader.take(NONCE_SIZE, "nonce")?);

    let rest = reader.rest();
    if rest.len() < TAG_SIZE {
        return Err(Error::malformed("missing authentication tag"));
    }
    let (ciphertext, tag_bytes) = rest.split_at(rest.len() - TAG_SIZE);
    let mut tag = [0u8; TAG_SIZE];
    tag.copy_from_slice(tag_bytes);

    Ok(Envelope {
        header: EnvelopeHeader {
            algorithm,
            kem_ciphertext,
            nonce,
            filename_hint,
        },
        ciphertext: ciphertext.to_vec(),
        tag,
    })
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let remaining = self.bytes.len() - self.pos;
        if remaining < len {
            return Err(Error::malformed(format!(
                "truncated {}: need {} bytes, have {}",
                what, len, remaining
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn byte(&mut self, what: &str) -> Result<u8> {
        Ok(self.take(1, what)?[0])
    }

    fn varint(&mut self) -> Result<u64> {
        let (value, used) = varint::read(&self.bytes[self.pos..])?;
        self.pos += used;
        Ok(value)
    }

    fn rest(&mut self) -> &'a [u8] {
        let rest = &self.bytes[self.pos..];
        self.pos = self.bytes.len();
        rest
    }
}
