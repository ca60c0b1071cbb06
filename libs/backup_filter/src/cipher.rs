//! AES-256-CBC with a PBKDF2-derived key, block-aligned with PKCS7 padding
//! applied at `finish`. The writer holds back at most one 16-byte block so
//! it never encrypts a block it might still need to pad.

use std::io::{self, Read, Write};

use aes::Aes256;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use cbc::cipher::generic_array::GenericArray;
use pbkdf2::pbkdf2_hmac;
use rand::RngCore;
use sha2::Sha256;

const BLOCK_SIZE: usize = 16;
const KEY_SIZE: usize = 32;
pub const SALT_SIZE: usize = 16;
pub const PBKDF2_ROUNDS: u32 = 200_000;

type Aes256CbcEnc = cbc::Encryptor<Aes256>;
type Aes256CbcDec = cbc::Decryptor<Aes256>;

#[derive(Clone)]
pub struct CipherKey {
    key: [u8; KEY_SIZE],
}

impl CipherKey {
    /// Derives a 256-bit key from a passphrase and a per-file salt. The
    /// salt is not secret; it's stored alongside the ciphertext (the cipher
    /// writer prepends it, see [`CipherWriter::new`]).
    pub fn derive(passphrase: &[u8], salt: &[u8; SALT_SIZE]) -> Self {
        let mut key = [0u8; KEY_SIZE];
        pbkdf2_hmac::<Sha256>(passphrase, salt, PBKDF2_ROUNDS, &mut key);
        CipherKey { key }
    }
}

pub struct CipherWriter<W: Write> {
    enc: Aes256CbcEnc,
    pending: Vec<u8>,
    inner: W,
}

impl<W: Write> CipherWriter<W> {
    /// Generates a random salt and IV, writes them as a header
    /// (`salt || iv`) to `inner`, and derives the encryption key from
    /// `passphrase` and that salt.
    pub fn new(passphrase: &[u8], mut inner: W) -> io::Result<Self> {
        let mut salt = [0u8; SALT_SIZE];
        let mut iv = [0u8; BLOCK_SIZE];
        rand::thread_rng().fill_bytes(&mut salt);
        rand::thread_rng().fill_bytes(&mut iv);

        inner.write_all(&salt)?;
        inner.write_all(&iv)?;

        let key = CipherKey::derive(passphrase, &salt);
        let enc = Aes256CbcEnc::new(&key.key.into(), &iv.into());
        Ok(CipherWriter {
            enc,
            pending: Vec::with_capacity(2 * BLOCK_SIZE),
            inner,
        })
    }

    /// Pads the final partial block with PKCS7 and returns the inner sink.
    pub fn finish(mut self) -> io::Result<W> {
        let pad_len = BLOCK_SIZE - (self.pending.len() % BLOCK_SIZE);
        self.pending.extend(std::iter::repeat(pad_len as u8).take(pad_len));
        encrypt_and_flush(&mut self.enc, &mut self.pending, &mut self.inner)?;
        Ok(self.inner)
    }
}

fn encrypt_and_flush<W: Write>(enc: &mut Aes256CbcEnc, buf: &mut Vec<u8>, inner: &mut W) -> io::Result<()> {
    for chunk in buf.chunks_exact_mut(BLOCK_SIZE) {
        let block = GenericArray::from_mut_slice(chunk);
        enc.encrypt_block_mut(block);
    }
    inner.write_all(buf)?;
    buf.clear();
    Ok(())
}

impl<W: Write> Write for CipherWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        // Always hold back one full block: it might be the last one, which
        // needs PKCS7 padding decided at `finish`, not here.
        if self.pending.len() > BLOCK_SIZE {
            let keep = BLOCK_SIZE;
            let drain_to = self.pending.len() - keep;
            let whole_blocks = drain_to - (drain_to % BLOCK_SIZE);
            let mut ready: Vec<u8> = self.pending.drain(0..whole_blocks).collect();
            encrypt_and_flush(&mut self.enc, &mut ready, &mut self.inner)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// The read-back side of [`CipherWriter`]. Unlike the writer, which must
/// hold back a block at a time not knowing where the stream ends, the
/// reader needs the PKCS7 pad length before it can hand back the final
/// block, so it buffers the whole ciphertext rather than streaming it —
/// read-back call sites (checksum verification, resume) already read a
/// complete repo file into memory.
pub struct CipherReader {
    buf: io::Cursor<Vec<u8>>,
}

impl CipherReader {
    pub fn new<R: Read>(passphrase: &[u8], mut inner: R) -> io::Result<Self> {
        let mut salt = [0u8; SALT_SIZE];
        let mut iv = [0u8; BLOCK_SIZE];
        inner.read_exact(&mut salt)?;
        inner.read_exact(&mut iv)?;

        let key = CipherKey::derive(passphrase, &salt);
        let mut dec = Aes256CbcDec::new(&key.key.into(), &iv.into());

        let mut ciphertext = Vec::new();
        inner.read_to_end(&mut ciphertext)?;
        if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "ciphered repo file is not block-aligned",
            ));
        }

        for chunk in ciphertext.chunks_exact_mut(BLOCK_SIZE) {
            let block = GenericArray::from_mut_slice(chunk);
            dec.decrypt_block_mut(block);
        }

        let pad_len = *ciphertext.last().expect("checked non-empty above") as usize;
        if pad_len == 0 || pad_len > BLOCK_SIZE || pad_len > ciphertext.len() {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "invalid PKCS7 padding"));
        }
        ciphertext.truncate(ciphertext.len() - pad_len);

        Ok(CipherReader { buf: io::Cursor::new(ciphertext) })
    }
}

impl Read for CipherReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.buf.read(buf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_is_block_aligned_and_includes_salt_iv_header() {
        let mut writer = CipherWriter::new(b"correct horse battery staple", Vec::new()).unwrap();
        writer.write_all(b"some plaintext that isn't block aligned").unwrap();
        let out = writer.finish().unwrap();
        assert_eq!((out.len() - SALT_SIZE - BLOCK_SIZE) % BLOCK_SIZE, 0);
    }

    #[test]
    fn empty_input_still_emits_one_padded_block() {
        let writer = CipherWriter::new(b"pw", Vec::new()).unwrap();
        let out = writer.finish().unwrap();
        assert_eq!(out.len(), SALT_SIZE + BLOCK_SIZE);
    }

    #[test]
    fn same_passphrase_and_salt_derive_same_key() {
        let salt = [7u8; SALT_SIZE];
        let a = CipherKey::derive(b"pw", &salt);
        let b = CipherKey::derive(b"pw", &salt);
        assert_eq!(a.key, b.key);
    }

    #[test]
    fn reader_reverses_writer() {
        let plaintext = b"some plaintext that isn't block aligned at all, really";
        let mut writer = CipherWriter::new(b"correct horse battery staple", Vec::new()).unwrap();
        writer.write_all(plaintext).unwrap();
        let ciphertext = writer.finish().unwrap();

        let mut reader = CipherReader::new(b"correct horse battery staple", ciphertext.as_slice()).unwrap();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, plaintext);
    }

    #[test]
    fn wrong_passphrase_does_not_reproduce_plaintext() {
        let plaintext = b"top secret relation bytes";
        let mut writer = CipherWriter::new(b"right passphrase", Vec::new()).unwrap();
        writer.write_all(plaintext).unwrap();
        let ciphertext = writer.finish().unwrap();

        // Garbage padding under the wrong key is either rejected outright or
        // produces bytes that don't match the original; either is acceptable,
        // but silently returning the right plaintext would not be.
        match CipherReader::new(b"wrong passphrase", ciphertext.as_slice()) {
            Ok(mut reader) => {
                let mut out = Vec::new();
                let _ = reader.read_to_end(&mut out);
                assert_ne!(out, plaintext);
            }
            Err(_) => {}
        }
    }
}
