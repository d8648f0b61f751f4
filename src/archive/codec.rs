//! Compression pipeline
//!
//! Entry payloads are encoded one at a time: GZIP entries hold a raw
//! DEFLATE stream, BZIP2 entries a bzip2 stream. Whole-archive
//! compression wraps the serialized container image in a real gzip
//! (or bzip2) stream, which the reader recognises by its magic bytes.
//! Unwrapping decodes the image header first and stops at the size it
//! declares.

use crate::archive::format::Compression;
#[cfg(any(feature = "gzip", feature = "bzip2"))]
use crate::archive::{end_record::END_RECORD_SIZE, format::FileHeader, format::HEADER_SIZE};
use crate::error::{PharError, Result};
use std::io::Read;

/// gzip member magic
const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// bzip2 stream magic ("BZh")
const BZIP2_MAGIC: [u8; 3] = [b'B', b'Z', b'h'];

/// Upper bound on the buffer reserved up front while decoding
const MAX_PREALLOC: u64 = 16 * 1024 * 1024;

/// Encode an entry payload
pub fn encode(data: &[u8], codec: Compression, level: u32) -> Result<Vec<u8>> {
    match codec {
        Compression::None => Ok(data.to_vec()),
        Compression::Gzip => deflate_encode(data, level),
        Compression::Bzip2 => bzip2_encode(data, level),
    }
}

/// Decode an entry payload
///
/// Output is bounded by `expected_size`: a stream that inflates past it,
/// or stops short of it, fails with `DecodeError`.
pub fn decode(data: &[u8], codec: Compression, expected_size: u64) -> Result<Vec<u8>> {
    match codec {
        Compression::None => {
            if data.len() as u64 != expected_size {
                return Err(PharError::DecodeError(format!(
                    "stored size {} does not match expected {}",
                    data.len(),
                    expected_size
                )));
            }
            Ok(data.to_vec())
        }
        Compression::Gzip => deflate_decode(data, expected_size),
        Compression::Bzip2 => bzip2_decode(data, expected_size),
    }
}

/// Wrap a complete container image with a whole-archive codec
pub fn wrap(image: Vec<u8>, codec: Compression, level: u32) -> Result<Vec<u8>> {
    match codec {
        Compression::None => Ok(image),
        Compression::Gzip => gzip_wrap(&image, level),
        Compression::Bzip2 => bzip2_encode(&image, level),
    }
}

/// Detect the whole-archive codec from the leading bytes
pub fn detect(bytes: &[u8]) -> Compression {
    if bytes.starts_with(&GZIP_MAGIC) {
        Compression::Gzip
    } else if bytes.starts_with(&BZIP2_MAGIC) {
        Compression::Bzip2
    } else {
        Compression::None
    }
}

/// Strip a whole-archive wrapper, returning the inner image and the codec found
pub fn unwrap(bytes: Vec<u8>) -> Result<(Vec<u8>, Compression)> {
    let codec = detect(&bytes);
    let image = match codec {
        Compression::None => bytes,
        Compression::Gzip => gzip_unwrap(&bytes)?,
        Compression::Bzip2 => bzip2_unwrap(&bytes)?,
    };
    Ok((image, codec))
}

fn unavailable(codec: Compression) -> PharError {
    PharError::UnsupportedCompression(format!("{} support is not compiled in", codec))
}

fn read_bounded<R: Read>(reader: R, codec: Compression, expected_size: u64) -> Result<Vec<u8>> {
    let mut output = Vec::with_capacity(expected_size.min(MAX_PREALLOC) as usize);

    // One byte of headroom tells an exact fit apart from an oversized stream
    reader
        .take(expected_size.saturating_add(1))
        .read_to_end(&mut output)
        .map_err(|e| PharError::DecodeError(format!("{} decode failed: {}", codec, e)))?;

    if output.len() as u64 != expected_size {
        return Err(PharError::DecodeError(format!(
            "{} decode size mismatch: expected {}, got {}{}",
            codec,
            expected_size,
            output.len(),
            if output.len() as u64 > expected_size { "+" } else { "" }
        )));
    }

    Ok(output)
}

/// Decode a wrapped container image without inflating past its declared size
#[cfg(any(feature = "gzip", feature = "bzip2"))]
fn read_container<R: Read>(mut reader: R, codec: Compression) -> Result<Vec<u8>> {
    let mut head = [0u8; HEADER_SIZE];
    reader.read_exact(&mut head).map_err(|e| {
        PharError::DecodeError(format!("{} container header decode failed: {}", codec, e))
    })?;

    let header = FileHeader::read_from(&head[..])?;
    let image_size = header
        .manifest_offset
        .checked_add(header.manifest_size)
        .and_then(|n| n.checked_add(header.payload_size))
        .and_then(|n| n.checked_add(END_RECORD_SIZE as u64))
        .filter(|n| *n >= HEADER_SIZE as u64)
        .ok_or_else(|| {
            PharError::CorruptArchive("container header declares an impossible size".to_string())
        })?;

    let rest = read_bounded(reader, codec, image_size - HEADER_SIZE as u64)?;

    let mut image = Vec::with_capacity(HEADER_SIZE + rest.len());
    image.extend_from_slice(&head);
    image.extend_from_slice(&rest);
    Ok(image)
}

#[cfg(feature = "gzip")]
fn deflate_encode(data: &[u8], level: u32) -> Result<Vec<u8>> {
    use std::io::Write;

    let mut encoder =
        flate2::write::DeflateEncoder::new(Vec::new(), flate2::Compression::new(level.min(9)));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

#[cfg(feature = "gzip")]
fn deflate_decode(data: &[u8], expected_size: u64) -> Result<Vec<u8>> {
    read_bounded(
        flate2::read::DeflateDecoder::new(data),
        Compression::Gzip,
        expected_size,
    )
}

#[cfg(feature = "gzip")]
fn gzip_wrap(image: &[u8], level: u32) -> Result<Vec<u8>> {
    use std::io::Write;

    let mut encoder =
        flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::new(level.min(9)));
    encoder.write_all(image)?;
    Ok(encoder.finish()?)
}

#[cfg(feature = "gzip")]
fn gzip_unwrap(bytes: &[u8]) -> Result<Vec<u8>> {
    read_container(flate2::read::GzDecoder::new(bytes), Compression::Gzip)
}

#[cfg(not(feature = "gzip"))]
fn deflate_encode(_data: &[u8], _level: u32) -> Result<Vec<u8>> {
    Err(unavailable(Compression::Gzip))
}

#[cfg(not(feature = "gzip"))]
fn deflate_decode(_data: &[u8], _expected_size: u64) -> Result<Vec<u8>> {
    Err(unavailable(Compression::Gzip))
}

#[cfg(not(feature = "gzip"))]
fn gzip_wrap(_image: &[u8], _level: u32) -> Result<Vec<u8>> {
    Err(unavailable(Compression::Gzip))
}

#[cfg(not(feature = "gzip"))]
fn gzip_unwrap(_bytes: &[u8]) -> Result<Vec<u8>> {
    Err(unavailable(Compression::Gzip))
}

#[cfg(feature = "bzip2")]
fn bzip2_encode(data: &[u8], level: u32) -> Result<Vec<u8>> {
    use std::io::Write;

    let mut encoder =
        bzip2::write::BzEncoder::new(Vec::new(), bzip2::Compression::new(level.clamp(1, 9)));
    encoder.write_all(data)?;
    Ok(encoder.finish()?)
}

#[cfg(feature = "bzip2")]
fn bzip2_decode(data: &[u8], expected_size: u64) -> Result<Vec<u8>> {
    read_bounded(
        bzip2::read::BzDecoder::new(data),
        Compression::Bzip2,
        expected_size,
    )
}

#[cfg(feature = "bzip2")]
fn bzip2_unwrap(bytes: &[u8]) -> Result<Vec<u8>> {
    read_container(bzip2::read::BzDecoder::new(bytes), Compression::Bzip2)
}

#[cfg(not(feature = "bzip2"))]
fn bzip2_encode(_data: &[u8], _level: u32) -> Result<Vec<u8>> {
    Err(unavailable(Compression::Bzip2))
}

#[cfg(not(feature = "bzip2"))]
fn bzip2_decode(_data: &[u8], _expected_size: u64) -> Result<Vec<u8>> {
    Err(unavailable(Compression::Bzip2))
}

#[cfg(not(feature = "bzip2"))]
fn bzip2_unwrap(_bytes: &[u8]) -> Result<Vec<u8>> {
    Err(unavailable(Compression::Bzip2))
}

#[cfg(all(test, feature = "gzip", feature = "bzip2"))]
mod tests {
    use super::*;
    use crate::archive::entry::Entry;
    use crate::archive::format::ArchiveFormat;
    use crate::archive::writer::ArchiveWriter;

    fn sample() -> Vec<u8> {
        b"This is test data that should compress well. ".repeat(50)
    }

    #[test]
    fn test_none_is_identity() {
        let data = sample();
        let encoded = encode(&data, Compression::None, 6).unwrap();
        assert_eq!(encoded, data);
        assert_eq!(
            decode(&encoded, Compression::None, data.len() as u64).unwrap(),
            data
        );
    }

    #[test]
    fn test_gzip_entry_payload() {
        let data = sample();
        let encoded = encode(&data, Compression::Gzip, 6).unwrap();
        assert!(encoded.len() < data.len());
        // Entry payloads are raw DEFLATE, not gzip members
        assert_eq!(detect(&encoded), Compression::None);

        let decoded = decode(&encoded, Compression::Gzip, data.len() as u64).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_bzip2_entry_payload() {
        let data = sample();
        let encoded = encode(&data, Compression::Bzip2, 9).unwrap();
        assert!(encoded.len() < data.len());

        let decoded = decode(&encoded, Compression::Bzip2, data.len() as u64).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn test_malformed_input_fails_decode() {
        let garbage = vec![0xFFu8; 64];
        assert!(matches!(
            decode(&garbage, Compression::Bzip2, 100),
            Err(PharError::DecodeError(_))
        ));
        assert!(matches!(
            decode(&garbage, Compression::Gzip, 100),
            Err(PharError::DecodeError(_))
        ));
    }

    #[test]
    fn test_decode_is_bounded_by_expected_size() {
        let data = vec![0u8; 1024 * 1024];
        let encoded = encode(&data, Compression::Gzip, 6).unwrap();

        let result = decode(&encoded, Compression::Gzip, 1024);
        assert!(matches!(result, Err(PharError::DecodeError(_))));
    }

    fn sample_image() -> Vec<u8> {
        let mut writer = ArchiveWriter::new(ArchiveFormat::Phar);
        writer.add_entry(&Entry::file("a.txt", sample())).unwrap();
        writer.finish().unwrap()
    }

    #[test]
    fn test_container_wrap_detection() {
        let image = sample_image();

        let gz = wrap(image.clone(), Compression::Gzip, 6).unwrap();
        assert_eq!(detect(&gz), Compression::Gzip);
        let (inner, codec) = unwrap(gz).unwrap();
        assert_eq!(codec, Compression::Gzip);
        assert_eq!(inner, image);

        let bz = wrap(image.clone(), Compression::Bzip2, 9).unwrap();
        assert_eq!(detect(&bz), Compression::Bzip2);
        let (inner, codec) = unwrap(bz).unwrap();
        assert_eq!(codec, Compression::Bzip2);
        assert_eq!(inner, image);

        let (inner, codec) = unwrap(image.clone()).unwrap();
        assert_eq!(codec, Compression::None);
        assert_eq!(inner, image);
    }

    #[test]
    fn test_container_without_image_header_is_rejected() {
        let zeros = wrap(vec![0u8; 4 * 1024 * 1024], Compression::Gzip, 6).unwrap();
        assert!(matches!(unwrap(zeros), Err(PharError::CorruptArchive(_))));

        let text = wrap(sample(), Compression::Bzip2, 9).unwrap();
        assert!(matches!(unwrap(text), Err(PharError::CorruptArchive(_))));
    }

    #[test]
    fn test_container_stops_at_declared_size() {
        let mut padded = sample_image();
        padded.extend_from_slice(&[0u8; 4096]);

        for codec in [Compression::Gzip, Compression::Bzip2] {
            let wrapped = wrap(padded.clone(), codec, 6).unwrap();
            assert!(matches!(unwrap(wrapped), Err(PharError::DecodeError(_))));

            let short = wrap(sample_image()[..HEADER_SIZE + 8].to_vec(), codec, 6).unwrap();
            assert!(matches!(unwrap(short), Err(PharError::DecodeError(_))));
        }
    }
}
