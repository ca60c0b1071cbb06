//! The optional compression stage. One enum variant per supported codec;
//! dispatch is a match, not a trait object, so the pipeline stays a single
//! monomorphised type per sink `W` (§9 design note: avoid a dynamic chain
//! of filters where a fixed composite will do).

use std::io::{self, Read, Write};

use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression as GzCompression;
use lz4_flex::frame::FrameDecoder as Lz4Decoder;
use lz4_flex::frame::FrameEncoder as Lz4Encoder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressKind {
    Gzip,
    Lz4,
    Zstd,
    Bz2,
}

impl CompressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompressKind::Gzip => "gz",
            CompressKind::Lz4 => "lz4",
            CompressKind::Zstd => "zst",
            CompressKind::Bz2 => "bz2",
        }
    }
}

pub enum CompressWriter<W: Write> {
    Gzip(GzEncoder<W>),
    Lz4(Box<Lz4Encoder<W>>),
    Zstd(Box<zstd::stream::write::Encoder<'static, W>>),
    Bz2(BzEncoder<W>),
}

impl<W: Write> CompressWriter<W> {
    pub fn new(kind: CompressKind, level: i32, inner: W) -> io::Result<Self> {
        Ok(match kind {
            CompressKind::Gzip => {
                CompressWriter::Gzip(GzEncoder::new(inner, GzCompression::new(level.clamp(0, 9) as u32)))
            }
            CompressKind::Lz4 => CompressWriter::Lz4(Box::new(Lz4Encoder::new(inner))),
            CompressKind::Zstd => {
                CompressWriter::Zstd(Box::new(zstd::stream::write::Encoder::new(inner, level)?))
            }
            CompressKind::Bz2 => CompressWriter::Bz2(BzEncoder::new(
                inner,
                bzip2::Compression::new(level.clamp(1, 9) as u32),
            )),
        })
    }

    /// Flushes and finalizes the codec, handing the underlying sink back so
    /// the next pipeline stage (or the caller) can keep writing to it.
    pub fn finish(self) -> io::Result<W> {
        match self {
            CompressWriter::Gzip(enc) => enc.finish(),
            CompressWriter::Lz4(enc) => enc
                .finish()
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e)),
            CompressWriter::Zstd(enc) => enc.finish(),
            CompressWriter::Bz2(enc) => enc.finish(),
        }
    }
}

impl<W: Write> Write for CompressWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            CompressWriter::Gzip(enc) => enc.write(buf),
            CompressWriter::Lz4(enc) => enc.write(buf),
            CompressWriter::Zstd(enc) => enc.write(buf),
            CompressWriter::Bz2(enc) => enc.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            CompressWriter::Gzip(enc) => enc.flush(),
            CompressWriter::Lz4(enc) => enc.flush(),
            CompressWriter::Zstd(enc) => enc.flush(),
            CompressWriter::Bz2(enc) => enc.flush(),
        }
    }
}

impl CompressKind {
    /// Inverse of [`Self::as_str`]: the suffix a repo file carries back to
    /// the codec that (de)compresses it (§6 repo layout, `.gz`/`.lz4`/`.zst`/`.bz2`).
    pub fn from_suffix(suffix: &str) -> Option<Self> {
        match suffix {
            "gz" => Some(CompressKind::Gzip),
            "lz4" => Some(CompressKind::Lz4),
            "zst" => Some(CompressKind::Zstd),
            "bz2" => Some(CompressKind::Bz2),
            _ => None,
        }
    }
}

/// The read-back side of [`CompressWriter`], used by the file copy worker
/// to recompute a checksum over an already-compressed repo file (the
/// `Checksum` result) and by resume to re-derive a prior file's plaintext
/// size.
pub enum DecompressReader<R: Read> {
    Gzip(GzDecoder<R>),
    Lz4(Box<Lz4Decoder<R>>),
    Zstd(Box<zstd::stream::read::Decoder<'static, io::BufReader<R>>>),
    Bz2(BzDecoder<R>),
}

impl<R: Read> DecompressReader<R> {
    pub fn new(kind: CompressKind, inner: R) -> io::Result<Self> {
        Ok(match kind {
            CompressKind::Gzip => DecompressReader::Gzip(GzDecoder::new(inner)),
            CompressKind::Lz4 => DecompressReader::Lz4(Box::new(Lz4Decoder::new(inner))),
            CompressKind::Zstd => DecompressReader::Zstd(Box::new(zstd::stream::read::Decoder::new(inner)?)),
            CompressKind::Bz2 => DecompressReader::Bz2(BzDecoder::new(inner)),
        })
    }
}

impl<R: Read> Read for DecompressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            DecompressReader::Gzip(d) => d.read(buf),
            DecompressReader::Lz4(d) => d.read(buf),
            DecompressReader::Zstd(d) => d.read(buf),
            DecompressReader::Bz2(d) => d.read(buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip_gzip(data: &[u8]) -> Vec<u8> {
        let mut out = CompressWriter::new(CompressKind::Gzip, 6, Vec::new()).unwrap();
        out.write_all(data).unwrap();
        out.finish().unwrap()
    }

    #[test]
    fn gzip_output_differs_from_input_and_is_nonempty() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(16);
        let compressed = round_trip_gzip(&data);
        assert!(!compressed.is_empty());
        assert_ne!(compressed, data);
    }

    #[test]
    fn zstd_finish_produces_valid_frame_magic() {
        let mut out = CompressWriter::new(CompressKind::Zstd, 3, Vec::new()).unwrap();
        out.write_all(b"hello world").unwrap();
        let bytes = out.finish().unwrap();
        assert_eq!(&bytes[0..4], &[0x28, 0xB5, 0x2F, 0xFD]);
    }

    #[test]
    fn decompress_reverses_compress_for_every_codec() {
        let data = b"round trip me through every supported codec please".repeat(4);
        for kind in [CompressKind::Gzip, CompressKind::Lz4, CompressKind::Zstd, CompressKind::Bz2] {
            let mut enc = CompressWriter::new(kind, 3, Vec::new()).unwrap();
            enc.write_all(&data).unwrap();
            let compressed = enc.finish().unwrap();

            let mut dec = DecompressReader::new(kind, compressed.as_slice()).unwrap();
            let mut out = Vec::new();
            dec.read_to_end(&mut out).unwrap();
            assert_eq!(out, data, "{kind:?} round-trip mismatch");
        }
    }

    #[test]
    fn from_suffix_matches_as_str() {
        for kind in [CompressKind::Gzip, CompressKind::Lz4, CompressKind::Zstd, CompressKind::Bz2] {
            assert_eq!(CompressKind::from_suffix(kind.as_str()), Some(kind));
        }
        assert_eq!(CompressKind::from_suffix("txt"), None);
    }
}
