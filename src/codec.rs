use bytes::{Buf, BytesMut};
use std::io;
use tokio_util::codec::Decoder;

/// Frame decoder that re-encodes a legacy charset (windows-1252, Shift_JIS, ...)
/// into UTF-8 chunks for the CSV reader. Malformed sequences become U+FFFD.
pub struct Utf8Transcoder {
    decoder: encoding_rs::Decoder,
}

impl Utf8Transcoder {
    pub fn new(encoding: &'static encoding_rs::Encoding) -> Self {
        Self {
            // BOM sniffing would let a UTF-8 BOM override the declared charset
            decoder: encoding.new_decoder_without_bom_handling(),
        }
    }

    fn transcode(&mut self, src: &mut BytesMut, last: bool) -> Option<BytesMut> {
        let capacity = self
            .decoder
            .max_utf8_buffer_length(src.len())
            .unwrap_or_else(|| src.len() * 3 + 16);
        let mut out = vec![0u8; capacity];

        let (_result, read, written, _replaced) = self.decoder.decode_to_utf8(&src[..], &mut out, last);
        src.advance(read);

        if written == 0 {
            return None;
        }
        out.truncate(written);
        Some(BytesMut::from(&out[..]))
    }
}

impl Decoder for Utf8Transcoder {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        // Partial multi-byte sequences are buffered inside the decoder, so all
        // of `src` is consumed even when nothing is emitted yet.
        match self.transcode(src, false) {
            Some(chunk) => Ok(Some(chunk)),
            None if src.is_empty() => Ok(None),
            None => Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "charset decoder made no progress",
            )),
        }
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        let chunk = self.transcode(buf, true);
        buf.clear();
        Ok(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_1252_to_utf8() {
        let mut codec = Utf8Transcoder::new(encoding_rs::WINDOWS_1252);
        // "Jos\xe9" is "José" in windows-1252
        let mut src = BytesMut::from(&b"Jos\xe9,700\n"[..]);
        let chunk = codec.decode(&mut src).unwrap().unwrap();
        assert_eq!(&chunk[..], "José,700\n".as_bytes());
        assert!(src.is_empty());
    }

    #[test]
    fn split_multibyte_sequence_is_carried_over() {
        let mut codec = Utf8Transcoder::new(encoding_rs::SHIFT_JIS);
        // "あ" is 0x82 0xA0 in Shift_JIS; feed it in two frames
        let mut first = BytesMut::from(&b"a\x82"[..]);
        let head = codec.decode(&mut first).unwrap().unwrap();
        assert_eq!(&head[..], b"a");
        let mut second = BytesMut::from(&b"\xa0"[..]);
        let tail = codec.decode(&mut second).unwrap().unwrap();
        assert_eq!(&tail[..], "あ".as_bytes());
        let mut rest = BytesMut::new();
        assert!(codec.decode_eof(&mut rest).unwrap().is_none());
    }
}
