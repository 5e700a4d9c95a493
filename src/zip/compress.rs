//! Payload compression for single entries.
//!
//! Small payloads are transformed in memory. Large ones are streamed in
//! [`BLOCK_SIZE`] chunks: deflate output is spooled through an anonymous
//! gzip temporary file whose header and trailer give back the CRC-32 and
//! the compressed length, and extraction inflates straight into the sink.

use byteorder::{LittleEndian, ReadBytesExt};
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::{DeflateEncoder, GzEncoder};
use std::fs::File;
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};

use super::structures::CompressionMethod;
use crate::io::BLOCK_SIZE;

const GZIP_HEADER_LEN: u64 = 10;
const GZIP_TRAILER_LEN: u64 = 8;
const MAX_PREALLOC: u64 = 1 << 20;

fn unsupported(method: CompressionMethod) -> io::Error {
    io::Error::new(
        io::ErrorKind::Unsupported,
        format!("unsupported compression method: {}", method.as_u16()),
    )
}

/// Compress a whole payload. The CRC-32 always covers the uncompressed bytes.
pub fn compress(data: &[u8], method: CompressionMethod) -> io::Result<(Vec<u8>, u32)> {
    let crc32 = crc32fast::hash(data);
    match method {
        CompressionMethod::Stored => Ok((data.to_vec(), crc32)),
        CompressionMethod::Deflate => {
            let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
            encoder.write_all(data)?;
            Ok((encoder.finish()?, crc32))
        }
        CompressionMethod::Unknown(_) => Err(unsupported(method)),
    }
}

/// Decompress a whole payload, checking it inflates to `expected_size` bytes.
pub fn decompress(data: &[u8], method: CompressionMethod, expected_size: u64) -> io::Result<Vec<u8>> {
    let out = match method {
        CompressionMethod::Stored => data.to_vec(),
        CompressionMethod::Deflate => {
            let mut out = Vec::with_capacity(expected_size.min(MAX_PREALLOC) as usize);
            DeflateDecoder::new(data).read_to_end(&mut out)?;
            out
        }
        CompressionMethod::Unknown(_) => return Err(unsupported(method)),
    };
    if out.len() as u64 != expected_size {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("expected {} bytes, got {}", expected_size, out.len()),
        ));
    }
    Ok(out)
}

/// Writer adapter that hashes and counts everything written through it.
struct CrcWriter<W: Write> {
    inner: W,
    hasher: crc32fast::Hasher,
    count: u64,
}

impl<W: Write> Write for CrcWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.count += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Copy `reader` into `writer` in fixed-size blocks, returning the CRC-32
/// and byte count of what was copied.
pub fn copy_with_crc<R: Read + ?Sized, W: Write + ?Sized>(
    reader: &mut R,
    writer: &mut W,
) -> io::Result<(u32, u64)> {
    let mut hasher = crc32fast::Hasher::new();
    let mut count = 0u64;
    let mut buf = [0u8; BLOCK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        };
        hasher.update(&buf[..n]);
        writer.write_all(&buf[..n])?;
        count += n as u64;
    }
    Ok((hasher.finalize(), count))
}

/// Decode one entry's payload from `reader` into `writer`.
///
/// Returns the CRC-32 and length of the uncompressed output.
pub fn inflate_stream<R: Read, W: Write>(
    reader: R,
    method: CompressionMethod,
    writer: W,
) -> io::Result<(u32, u64)> {
    let mut sink = CrcWriter {
        inner: writer,
        hasher: crc32fast::Hasher::new(),
        count: 0,
    };
    match method {
        CompressionMethod::Stored => {
            let mut reader = reader;
            io::copy(&mut reader, &mut sink)?;
        }
        CompressionMethod::Deflate => {
            io::copy(&mut DeflateDecoder::new(reader), &mut sink)?;
        }
        CompressionMethod::Unknown(_) => return Err(unsupported(method)),
    }
    sink.flush()?;
    Ok((sink.hasher.finalize(), sink.count))
}

/// Raw deflate payload spooled through an anonymous temporary gzip file.
///
/// The file is unlinked by the OS when the spool is dropped, on success
/// and error paths alike.
pub struct DeflateSpool {
    file: File,
    pub crc32: u32,
    pub uncompressed_size: u64,
    pub compressed_size: u64,
}

impl DeflateSpool {
    /// Compress everything `reader` yields into a fresh spool.
    pub fn new<R: Read + ?Sized>(reader: &mut R) -> io::Result<Self> {
        let mut encoder = GzEncoder::new(BufWriter::new(tempfile::tempfile()?), Compression::default());
        let (_, uncompressed_size) = copy_with_crc(reader, &mut encoder)?;
        let mut file = encoder
            .finish()?
            .into_inner()
            .map_err(|e| e.into_error())?;

        let len = file.metadata()?.len();
        if len < GZIP_HEADER_LEN + GZIP_TRAILER_LEN {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "gzip spool truncated"));
        }

        let mut header = [0u8; GZIP_HEADER_LEN as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header)?;
        // magic, deflate, no optional fields
        if header[..4] != [0x1f, 0x8b, 0x08, 0x00] {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "unexpected gzip header"));
        }

        file.seek(SeekFrom::End(-(GZIP_TRAILER_LEN as i64)))?;
        let crc32 = file.read_u32::<LittleEndian>()?;
        let isize = file.read_u32::<LittleEndian>()?;
        if isize != uncompressed_size as u32 {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "gzip spool size mismatch"));
        }

        Ok(Self {
            file,
            crc32,
            uncompressed_size,
            compressed_size: len - GZIP_HEADER_LEN - GZIP_TRAILER_LEN,
        })
    }

    /// Copy the raw deflate stream, without gzip framing, into `writer`.
    pub fn copy_to<W: Write + ?Sized>(&mut self, writer: &mut W) -> io::Result<u64> {
        self.file.seek(SeekFrom::Start(GZIP_HEADER_LEN))?;
        let mut payload = (&mut self.file).take(self.compressed_size);
        io::copy(&mut payload, writer)
    }
}
