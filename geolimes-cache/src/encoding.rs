//! Transparent payload decompression.

use crate::error::{CacheError, Result};
use crate::source::ContentEncoding;
use bytes::Bytes;
use flate2::read::GzDecoder;
use std::io::Read;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Decode `body` according to the announced encoding.
///
/// A body announced as gzip that does not start with the gzip magic is
/// returned unchanged: some proxies strip the encoding but keep the header.
pub fn decode_body(body: Bytes, encoding: ContentEncoding) -> Result<Bytes> {
    match encoding {
        ContentEncoding::Identity => Ok(body),
        ContentEncoding::Gzip if !body.starts_with(&GZIP_MAGIC) => {
            tracing::debug!(len = body.len(), "gzip announced but body is not compressed");
            Ok(body)
        }
        ContentEncoding::Gzip => {
            let mut out = Vec::with_capacity(body.len() * 4);
            GzDecoder::new(body.as_ref())
                .read_to_end(&mut out)
                .map_err(|e| CacheError::Decode(format!("gzip: {e}")))?;
            Ok(Bytes::from(out))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    fn gzip(data: &[u8]) -> Bytes {
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(data).unwrap();
        Bytes::from(enc.finish().unwrap())
    }

    #[test]
    fn test_gzip_body_is_inflated() {
        let body = gzip(b"{\"results\":{\"bindings\":[]}}");
        let out = decode_body(body, ContentEncoding::Gzip).unwrap();
        assert_eq!(&out[..], b"{\"results\":{\"bindings\":[]}}");
    }

    #[test]
    fn test_identity_passthrough() {
        let out = decode_body(Bytes::from_static(b"plain"), ContentEncoding::Identity).unwrap();
        assert_eq!(&out[..], b"plain");
    }

    #[test]
    fn test_uncompressed_body_with_gzip_header() {
        let out = decode_body(Bytes::from_static(b"plain"), ContentEncoding::Gzip).unwrap();
        assert_eq!(&out[..], b"plain");
    }

    #[test]
    fn test_truncated_gzip_is_decode_error() {
        let full = gzip(&[7u8; 4096]);
        let truncated = full.slice(..full.len() / 2);
        let err = decode_body(truncated, ContentEncoding::Gzip).unwrap_err();
        assert!(matches!(err, CacheError::Decode(_)));
    }
}
