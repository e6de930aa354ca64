//! Length-prefixed text framing.
//!
//! Every message travels as one frame:
//!
//! ```text
//! ┌───────────────────────────┬──────────────────────────────┐
//! │ length: i32 little-endian │ payload: `length` UTF-8 bytes │
//! └───────────────────────────┴──────────────────────────────┘
//! ```
//!
//! The length counts UTF-8 bytes, not characters. Frames follow each other
//! back-to-back with no tag, checksum or version byte.

use crate::error::FrameError;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Size of the length prefix in bytes
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// Default upper bound on a single message payload (1 MiB)
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 1024 * 1024;

/// Encode one message as a complete frame.
///
/// # Errors
///
/// Returns `FrameError::MessageTooLarge` if the payload does not fit the
/// signed 32-bit length prefix.
pub fn encode_frame(text: &str) -> Result<Vec<u8>, FrameError> {
    let len = i32::try_from(text.len()).map_err(|_| FrameError::MessageTooLarge {
        size: text.len(),
        max: i32::MAX as usize,
    })?;

    let mut frame = Vec::with_capacity(LENGTH_PREFIX_SIZE + text.len());
    frame.extend_from_slice(&len.to_le_bytes());
    frame.extend_from_slice(text.as_bytes());
    Ok(frame)
}

/// Decode one frame from the front of `buf`.
///
/// Returns `Ok(None)` while the buffer holds less than a whole frame, and
/// otherwise the decoded text together with the number of bytes consumed.
///
/// # Errors
///
/// Returns `FrameError` for a negative or oversized length prefix, or for a
/// payload that is not valid UTF-8.
pub fn decode_frame(buf: &[u8], max_size: usize) -> Result<Option<(String, usize)>, FrameError> {
    let Some(prefix) = buf.first_chunk::<LENGTH_PREFIX_SIZE>() else {
        return Ok(None);
    };
    let len = checked_length(*prefix, max_size)?;

    let total = LENGTH_PREFIX_SIZE + len;
    if buf.len() < total {
        return Ok(None);
    }

    let text = String::from_utf8(buf[LENGTH_PREFIX_SIZE..total].to_vec())?;
    Ok(Some((text, total)))
}

fn checked_length(prefix: [u8; LENGTH_PREFIX_SIZE], max_size: usize) -> Result<usize, FrameError> {
    let raw = i32::from_le_bytes(prefix);
    let len = usize::try_from(raw).map_err(|_| FrameError::NegativeLength(raw))?;
    if len > max_size {
        return Err(FrameError::MessageTooLarge {
            size: len,
            max: max_size,
        });
    }
    Ok(len)
}

/// Reading cursor over the receive half of a stream.
///
/// Reads are strictly sequential: one frame is fully consumed before the next
/// prefix is read.
#[derive(Debug)]
pub struct MessageReader<R> {
    inner: R,
    max_message_size: usize,
    messages_read: u64,
    bytes_read: u64,
}

impl<R: AsyncRead + Unpin> MessageReader<R> {
    /// Create a reader with the default size limit
    pub fn new(inner: R) -> Self {
        Self::with_max_message_size(inner, DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Create a reader that rejects payloads above `max_message_size`
    pub fn with_max_message_size(inner: R, max_message_size: usize) -> Self {
        Self {
            inner,
            max_message_size,
            messages_read: 0,
            bytes_read: 0,
        }
    }

    /// Read exactly one message.
    ///
    /// # Errors
    ///
    /// Returns `FrameError::Io` when the stream fails or ends mid-frame,
    /// `NegativeLength` or `MessageTooLarge` for a bad prefix, and
    /// `InvalidUtf8` for a payload that is not text.
    pub async fn read_message(&mut self) -> Result<String, FrameError> {
        let mut prefix = [0u8; LENGTH_PREFIX_SIZE];
        self.inner.read_exact(&mut prefix).await?;
        let len = checked_length(prefix, self.max_message_size)?;

        let mut payload = vec![0u8; len];
        self.inner.read_exact(&mut payload).await?;

        self.messages_read += 1;
        self.bytes_read += (LENGTH_PREFIX_SIZE + len) as u64;
        tracing::trace!("Read frame {} ({} bytes)", hex::encode(prefix), len);

        Ok(String::from_utf8(payload)?)
    }

    /// Messages read so far
    #[must_use]
    pub fn messages_read(&self) -> u64 {
        self.messages_read
    }

    /// Frame bytes read so far, prefixes included
    #[must_use]
    pub fn bytes_read(&self) -> u64 {
        self.bytes_read
    }

    /// Release the underlying stream half
    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Writing cursor over the send half of a stream.
#[derive(Debug)]
pub struct MessageWriter<W> {
    inner: W,
    max_message_size: usize,
    messages_written: u64,
    bytes_written: u64,
}

impl<W: AsyncWrite + Unpin> MessageWriter<W> {
    /// Create a writer with the default size limit
    pub fn new(inner: W) -> Self {
        Self::with_max_message_size(inner, DEFAULT_MAX_MESSAGE_SIZE)
    }

    /// Create a writer that rejects payloads above `max_message_size`
    pub fn with_max_message_size(inner: W, max_message_size: usize) -> Self {
        Self {
            inner,
            max_message_size,
            messages_written: 0,
            bytes_written: 0,
        }
    }

    /// Write one message and flush it.
    ///
    /// Prefix and payload go out in a single write so a failure never leaves
    /// a prefix on the wire without its payload from this call.
    ///
    /// # Errors
    ///
    /// Returns `FrameError::MessageTooLarge` before any I/O for an oversized
    /// payload, and `FrameError::Io` if the write or flush fails.
    pub async fn write_message(&mut self, text: &str) -> Result<usize, FrameError> {
        if text.len() > self.max_message_size {
            return Err(FrameError::MessageTooLarge {
                size: text.len(),
                max: self.max_message_size,
            });
        }

        let frame = encode_frame(text)?;
        self.inner.write_all(&frame).await?;
        self.inner.flush().await?;

        self.messages_written += 1;
        self.bytes_written += frame.len() as u64;
        tracing::trace!(
            "Wrote frame {} ({} bytes)",
            hex::encode(&frame[..LENGTH_PREFIX_SIZE]),
            text.len()
        );

        Ok(frame.len())
    }

    /// Flush buffered bytes
    ///
    /// # Errors
    ///
    /// Returns `FrameError::Io` if the flush fails
    pub async fn flush(&mut self) -> Result<(), FrameError> {
        self.inner.flush().await?;
        Ok(())
    }

    /// Flush and shut down the send half
    ///
    /// # Errors
    ///
    /// Returns `FrameError::Io` if the flush or shutdown fails
    pub async fn shutdown(&mut self) -> Result<(), FrameError> {
        self.inner.flush().await?;
        self.inner.shutdown().await?;
        Ok(())
    }

    /// Messages written so far
    #[must_use]
    pub fn messages_written(&self) -> u64 {
        self.messages_written
    }

    /// Frame bytes written so far, prefixes included
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    /// Release the underlying stream half
    pub fn into_inner(self) -> W {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_encode_ascii() {
        assert_eq!(
            encode_frame("hi").unwrap(),
            vec![0x02, 0x00, 0x00, 0x00, 0x68, 0x69]
        );
    }

    #[test]
    fn test_encode_counts_utf8_bytes() {
        // Two characters, six bytes
        let frame = encode_frame("é😀").unwrap();
        assert_eq!(&frame[..4], &[6, 0, 0, 0]);
        assert_eq!(frame.len(), 10);
    }

    #[test]
    fn test_encode_empty() {
        assert_eq!(encode_frame("").unwrap(), vec![0, 0, 0, 0]);
    }

    #[test]
    fn test_decode_partial_buffers() {
        let frame = encode_frame("hello").unwrap();

        assert!(decode_frame(&frame[..3], 64).unwrap().is_none());
        assert!(decode_frame(&frame[..7], 64).unwrap().is_none());

        let (text, used) = decode_frame(&frame, 64).unwrap().unwrap();
        assert_eq!(text, "hello");
        assert_eq!(used, frame.len());
    }

    #[test]
    fn test_decode_back_to_back() {
        let mut buf = encode_frame("one").unwrap();
        buf.extend(encode_frame("two").unwrap());

        let (first, used) = decode_frame(&buf, 64).unwrap().unwrap();
        let (second, _) = decode_frame(&buf[used..], 64).unwrap().unwrap();
        assert_eq!(first, "one");
        assert_eq!(second, "two");
    }

    #[test]
    fn test_decode_rejects_negative_length() {
        let buf = (-1i32).to_le_bytes();
        assert!(matches!(
            decode_frame(&buf, 64),
            Err(FrameError::NegativeLength(-1))
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_length() {
        let buf = 65i32.to_le_bytes();
        assert!(matches!(
            decode_frame(&buf, 64),
            Err(FrameError::MessageTooLarge { size: 65, max: 64 })
        ));
    }

    #[test]
    fn test_decode_rejects_invalid_utf8() {
        let buf = [2, 0, 0, 0, 0xC3, 0x28];
        assert!(matches!(
            decode_frame(&buf, 64),
            Err(FrameError::InvalidUtf8(_))
        ));
    }

    #[tokio::test]
    async fn test_writer_wire_bytes() {
        let mut writer = MessageWriter::new(Vec::new());
        let written = writer.write_message("hi").await.unwrap();

        assert_eq!(written, 6);
        assert_eq!(writer.messages_written(), 1);
        assert_eq!(writer.into_inner(), vec![0x02, 0x00, 0x00, 0x00, 0x68, 0x69]);
    }

    #[tokio::test]
    async fn test_writer_rejects_oversized_before_io() {
        let mut writer = MessageWriter::with_max_message_size(Vec::new(), 3);
        let err = writer.write_message("four").await.unwrap_err();

        assert!(matches!(err, FrameError::MessageTooLarge { size: 4, max: 3 }));
        assert!(writer.into_inner().is_empty());
    }

    #[tokio::test]
    async fn test_reader_sequence() {
        let mut wire = encode_frame("first").unwrap();
        wire.extend(encode_frame("").unwrap());
        wire.extend(encode_frame("ünïcødé").unwrap());

        let mut reader = MessageReader::new(wire.as_slice());
        assert_eq!(reader.read_message().await.unwrap(), "first");
        assert_eq!(reader.read_message().await.unwrap(), "");
        assert_eq!(reader.read_message().await.unwrap(), "ünïcødé");
        assert_eq!(reader.messages_read(), 3);
        assert_eq!(reader.bytes_read(), wire.len() as u64);

        let err = reader.read_message().await.unwrap_err();
        assert!(err.is_eof());
    }

    #[tokio::test]
    async fn test_reader_truncated_payload() {
        let wire = [5u8, 0, 0, 0, b'a', b'b'];
        let mut reader = MessageReader::new(&wire[..]);

        let err = reader.read_message().await.unwrap_err();
        assert!(matches!(err, FrameError::Io(_)));
    }

    #[tokio::test]
    async fn test_reader_respects_limit() {
        let wire = encode_frame("too long").unwrap();
        let mut reader = MessageReader::with_max_message_size(wire.as_slice(), 4);

        let err = reader.read_message().await.unwrap_err();
        assert!(matches!(err, FrameError::MessageTooLarge { size: 8, max: 4 }));
    }

    #[tokio::test]
    async fn test_over_duplex_pipe() {
        let (a, b) = tokio::io::duplex(64);
        let mut writer = MessageWriter::new(a);
        let mut reader = MessageReader::new(b);

        writer.write_message("over the pipe").await.unwrap();
        assert_eq!(reader.read_message().await.unwrap(), "over the pipe");

        writer.shutdown().await.unwrap();
        assert!(reader.read_message().await.unwrap_err().is_eof());
    }

    proptest! {
        #[test]
        fn prop_prefix_is_utf8_byte_length(text in ".{0,256}") {
            let frame = encode_frame(&text).unwrap();
            let prefix = i32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
            prop_assert_eq!(prefix as usize, text.len());

            let (decoded, used) = decode_frame(&frame, DEFAULT_MAX_MESSAGE_SIZE).unwrap().unwrap();
            prop_assert_eq!(decoded, text);
            prop_assert_eq!(used, frame.len());
        }
    }
}
