//! zlib framing for the segment table, via miniz_oxide.

use miniz_oxide::{
    deflate::compress_to_vec_zlib,
    inflate::stream::{self as mz_stream, InflateState},
    DataFormat, MZFlush, MZStatus,
};

use crate::errors::PayloadError;

/// Best compression.
const LEVEL: u8 = 9;

/// Size of the scratch buffer inflated output goes through.
const OUT_CHUNK_SIZE: usize = 4 * 1024;

pub fn compress(data: &[u8]) -> Vec<u8> {
    compress_to_vec_zlib(data, LEVEL)
}

/// Inflate the zlib stream at the front of `input`, which may be followed by
/// other data.
///
/// Returns the inflated bytes and how many bytes of `input` the stream took.
pub fn decompress_prefix(input: &[u8]) -> Result<(Vec<u8>, usize), PayloadError> {
    let mut mz_state = InflateState::new_boxed(DataFormat::Zlib);
    let mut chunk = vec![0; OUT_CHUNK_SIZE];
    let mut out = vec![];
    let mut consumed = 0;

    loop {
        let info = mz_stream::inflate(&mut mz_state, &input[consumed..], &mut chunk, MZFlush::None);
        let status = info
            .status
            .map_err(|e| PayloadError::Inflate(format!("{e:?}")))?;

        consumed += info.bytes_consumed;
        out.extend_from_slice(&chunk[..info.bytes_written]);

        match status {
            MZStatus::Ok => {
                if info.bytes_consumed == 0 && info.bytes_written == 0 {
                    return Err(PayloadError::UnexpectedEnd("segment table"));
                }
            }
            MZStatus::StreamEnd => return Ok((out, consumed)),
            // We never compress with a preset dictionary.
            MZStatus::NeedDict => {
                return Err(PayloadError::Inflate("preset dictionary requested".into()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read;

    use flate2::bufread::ZlibDecoder;
    use rand_chacha::{
        rand_core::{RngCore, SeedableRng},
        ChaCha8Rng,
    };

    use super::*;

    #[test]
    fn stops_at_end_of_stream() -> anyhow::Result<()> {
        let data = b"content\0dist\0rhel\0server\0os\0".repeat(50);
        let mut input = compress(&data);
        let stream_len = input.len();
        input.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);

        let (inflated, consumed) = decompress_prefix(&input)?;
        assert_eq!(inflated, data);
        assert_eq!(consumed, stream_len);

        Ok(())
    }

    /// An independent zlib implementation agrees on both the contents and
    /// where the stream ends.
    #[test]
    fn agrees_with_flate2() -> anyhow::Result<()> {
        let mut data = vec![0; 20_000];
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        rng.fill_bytes(&mut data);
        // Half random, half repetitive, so there's something to compress.
        data.extend(b"abcabcabc".repeat(2_000));

        let mut input = compress(&data);
        input.extend_from_slice(b"trailer");

        let mut decoder = ZlibDecoder::new(&input[..]);
        let mut theirs = vec![];
        decoder.read_to_end(&mut theirs)?;

        let (ours, consumed) = decompress_prefix(&input)?;
        assert_eq!(ours, theirs);
        assert_eq!(consumed as u64, decoder.total_in());

        Ok(())
    }

    #[test]
    fn truncated_stream() {
        let input = compress(b"content\0dist\0");
        let err = decompress_prefix(&input[..input.len() - 3]).unwrap_err();
        assert!(matches!(
            err,
            PayloadError::Inflate(_) | PayloadError::UnexpectedEnd(_)
        ));
    }

    #[test]
    fn garbage() {
        assert!(decompress_prefix(&[0x12, 0x34, 0x56, 0x78]).is_err());
    }
}
