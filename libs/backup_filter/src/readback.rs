//! Reverses the write-side pipeline far enough to recompute a checksum
//! over a repo file's plaintext: decrypt, then decompress, in the opposite
//! order the write pipeline applied them. Used by the file copy worker's
//! `Checksum` decision (§4.H) and by the resume engine's "keep checksum"
//! path (§4.J), neither of which re-reads the source file.

use std::io::{self, Read};

use sha1::{Digest, Sha1};

use crate::cipher::CipherReader;
use crate::compress::{CompressKind, DecompressReader};

pub fn read_back_sha1<R: Read>(
    reader: R,
    compress: Option<CompressKind>,
    cipher_passphrase: Option<&[u8]>,
) -> io::Result<String> {
    match (cipher_passphrase, compress) {
        (None, None) => hash_all(reader),
        (Some(pw), None) => hash_all(CipherReader::new(pw, reader)?),
        (None, Some(kind)) => hash_all(DecompressReader::new(kind, reader)?),
        (Some(pw), Some(kind)) => {
            let deciphered = CipherReader::new(pw, reader)?;
            hash_all(DecompressReader::new(kind, deciphered)?)
        }
    }
}

fn hash_all<R: Read>(mut r: R) -> io::Result<String> {
    let mut hasher = Sha1::new();
    let mut buf = [0u8; 64 * 1024];
    loop {
        let n = r.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{CompressConfig, Pipeline, PipelineConfig};
    use std::cell::RefCell;
    use std::io::Write;
    use std::rc::Rc;

    /// `Pipeline` takes ownership of its sink and only hands back byte
    /// counts and a digest, not the sink itself (it may be a file, not a
    /// buffer). Share a buffer behind an `Rc` so the test can inspect the
    /// written bytes after the pipeline is done with them.
    struct SharedSink(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn matches_original_sha1_through_compress_and_cipher() {
        let data = b"relation bytes worth hashing, repeated a bit".repeat(8);
        let written = Rc::new(RefCell::new(Vec::new()));

        let config = PipelineConfig {
            compress: Some(CompressConfig { kind: CompressKind::Zstd, level: 3 }),
            cipher_passphrase: Some(b"pw".to_vec()),
            ..Default::default()
        };
        let mut pipeline = Pipeline::new(&config, SharedSink(written.clone())).unwrap();
        pipeline.write(&data).unwrap();
        pipeline.finish().unwrap();

        let repo_bytes = written.borrow().clone();
        let recomputed = read_back_sha1(repo_bytes.as_slice(), Some(CompressKind::Zstd), Some(b"pw")).unwrap();

        let mut expected = Sha1::new();
        expected.update(&data);
        assert_eq!(recomputed, hex::encode(expected.finalize()));
    }

    #[test]
    fn matches_original_sha1_with_no_stages() {
        let data = b"plain bytes, no compression or cipher";
        let recomputed = read_back_sha1(data.as_slice(), None, None).unwrap();
        let mut expected = Sha1::new();
        expected.update(data);
        assert_eq!(recomputed, hex::encode(expected.finalize()));
    }
}
