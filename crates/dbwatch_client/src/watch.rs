//! Watch stream framing.
//!
//! The server sends one JSON frame per line. Transports hand over arbitrary
//! chunks, so frames are reassembled here before decoding.

use crate::error::ClientResult;
use crate::transport::ByteStream;
use async_stream::stream;
use dbwatch_api::{decode_event, CodecError, Database, WatchEvent};
use futures::{Stream, StreamExt};
use std::pin::Pin;
use tracing::warn;

/// Stream of typed watch events.
///
/// Ends when the server closes the connection. A transport or decode
/// failure is yielded once as `Err` and the stream ends after it.
pub type WatchStream = Pin<Box<dyn Stream<Item = ClientResult<WatchEvent<Database>>> + Send>>;

/// Largest frame accepted by [`decode_frames`].
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Turns a newline-delimited byte stream into typed watch events.
pub fn decode_frames(body: ByteStream) -> WatchStream {
    decode_frames_with_limit(body, MAX_FRAME_LEN)
}

/// Like [`decode_frames`], but fails with [`CodecError::FrameTooLarge`]
/// once an unterminated frame exceeds `max_frame` bytes.
pub fn decode_frames_with_limit(mut body: ByteStream, max_frame: usize) -> WatchStream {
    Box::pin(stream! {
        let mut buffer: Vec<u8> = Vec::new();
        // Bytes before this offset hold no newline.
        let mut scanned = 0;

        while let Some(chunk) = body.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(e) => {
                    yield Err(e);
                    return;
                }
            };
            buffer.extend_from_slice(&chunk);

            let mut start = 0;
            while let Some(offset) = buffer[scanned..].iter().position(|b| *b == b'\n') {
                let end = scanned + offset;
                let frame = buffer[start..end].trim_ascii();
                let decoded = if frame.is_empty() {
                    None
                } else {
                    Some(decode_event(frame))
                };
                start = end + 1;
                scanned = start;

                match decoded {
                    None => {}
                    Some(Ok(event)) => yield Ok(event),
                    Some(Err(e)) => {
                        warn!(error = %e, "undecodable watch frame");
                        yield Err(e.into());
                        return;
                    }
                }
            }
            buffer.drain(..start);
            scanned = buffer.len();

            if buffer.len() > max_frame {
                warn!(len = buffer.len(), limit = max_frame, "watch frame too large");
                yield Err(CodecError::FrameTooLarge { limit: max_frame }.into());
                return;
            }
        }

        // Last frame may arrive without a trailing newline.
        let frame = buffer.trim_ascii();
        if !frame.is_empty() {
            match decode_event(frame) {
                Ok(event) => yield Ok(event),
                Err(e) => {
                    warn!(error = %e, "undecodable trailing watch frame");
                    yield Err(e.into());
                }
            }
        }
    })
}
