//! Wire format of the remote-sensor protocol.
//!
//! Every message is a frame: a 4-byte big-endian length followed by that many
//! bytes of text. The text is a sequence of words separated by whitespace;
//! words containing spaces are double-quoted, with `""` standing for a
//! literal quote inside a quoted word.

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::SessionError;
use crate::message::{Message, SensorReport};

/// Maximum frame payload size (1MB).
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

const HEADER_LEN: usize = 4;

/// Prefixes `payload` with its length.
pub fn encode_frame(payload: &[u8]) -> Result<Bytes, SessionError> {
    if payload.len() > MAX_FRAME_SIZE {
        return Err(SessionError::Protocol(format!(
            "frame of {} bytes exceeds limit",
            payload.len()
        )));
    }
    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len());
    buf.extend_from_slice(&(payload.len() as u32).to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf.freeze())
}

/// Reads one frame payload from `reader`. Bytes past the frame stay in `buf`
/// for the next call.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
    buf: &mut BytesMut,
    max_size: usize,
) -> Result<Bytes, SessionError> {
    loop {
        if buf.len() >= HEADER_LEN {
            let len = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
            if len > max_size {
                return Err(SessionError::Protocol(format!(
                    "frame of {} bytes exceeds limit of {}",
                    len, max_size
                )));
            }
            if buf.len() >= HEADER_LEN + len {
                buf.advance(HEADER_LEN);
                return Ok(buf.split_to(len).freeze());
            }
        }

        let n = reader.read_buf(buf).await?;
        if n == 0 {
            return Err(SessionError::Closed);
        }
    }
}

/// Writes one framed payload to `writer`.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), SessionError> {
    let frame = encode_frame(payload)?;
    writer.write_all(&frame).await?;
    writer.flush().await?;
    Ok(())
}

/// Splits message text into words, honouring double quotes. An unterminated
/// quote runs to the end of the text.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut chars = text.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        let Some(&first) = chars.peek() else {
            break;
        };

        let mut word = String::new();
        if first == '"' {
            chars.next();
            while let Some(c) = chars.next() {
                if c == '"' {
                    if chars.next_if_eq(&'"').is_some() {
                        word.push('"');
                        continue;
                    }
                    break;
                }
                word.push(c);
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                word.push(c);
            }
        }
        words.push(word);
    }

    words
}

/// Decodes a frame payload into a [`Message`]. Payloads that are not valid
/// UTF-8 are decoded lossily; unrecognised kinds become [`Message::Unknown`].
pub fn decode_message(payload: &[u8]) -> Message {
    let text = String::from_utf8_lossy(payload);
    let mut words = tokenize(&text).into_iter();
    let kind = words.next().unwrap_or_default();

    match kind.as_str() {
        "broadcast" => Message::Broadcast(words.collect()),
        "sensor-update" => {
            let mut pairs = Vec::new();
            while let Some(key) = words.next() {
                // A dangling key carries an empty value.
                let value = words.next().unwrap_or_default();
                pairs.push((key, value));
            }
            Message::SensorUpdate(pairs)
        }
        _ => Message::Unknown(kind),
    }
}

fn quote(word: &str) -> String {
    format!("\"{}\"", word.replace('"', "\"\""))
}

fn is_number(word: &str) -> bool {
    !word.is_empty() && word.parse::<f64>().is_ok()
}

/// Encodes a [`Message`] as message text.
pub fn encode_message(msg: &Message) -> String {
    match msg {
        Message::Broadcast(tokens) => {
            let mut out = String::from("broadcast");
            for t in tokens {
                out.push(' ');
                out.push_str(&quote(t));
            }
            out
        }
        Message::SensorUpdate(pairs) => encode_pairs(pairs),
        Message::Unknown(kind) => kind.clone(),
    }
}

/// Encodes a report as `sensor-update` message text. Numeric values are
/// written bare, everything else quoted.
pub fn encode_report(report: &SensorReport) -> String {
    encode_pairs(report.pairs())
}

fn encode_pairs(pairs: &[(String, String)]) -> String {
    let mut out = String::from("sensor-update");
    for (k, v) in pairs {
        out.push(' ');
        out.push_str(&quote(k));
        out.push(' ');
        if is_number(v) {
            out.push_str(v);
        } else {
            out.push_str(&quote(v));
        }
    }
    out
}
