//! CODA message framing over a byte stream.
//!
//! Every field is terminated by a NUL byte and every message by the
//! end-of-message marker `03 01`:
//!
//! ```text
//! C \0 <token> \0 <service> \0 <name> \0 <json arg> \0 ... 03 01
//! R \0 <token> \0 <json error> \0 <json result> \0 ... 03 01
//! E \0 <service> \0 <name> \0 <json arg> \0 ... 03 01
//! ```

use bytes::{Buf, BufMut, BytesMut};
use serde_json::{Value, json};
use tokio_util::codec::{Decoder, Encoder};
use tracing::debug;

use crate::error::CodecError;
use crate::message::{Message, Token};

const END_OF_MESSAGE: &[u8] = &[0x03, 0x01];

const DEFAULT_MAX_MESSAGE_SIZE: usize = 4 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct CodaCodec {
    max_message_size: usize,
}

impl CodaCodec {
    pub fn new() -> Self {
        Self {
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
        }
    }

    pub fn with_max_size(max_message_size: usize) -> Self {
        Self { max_message_size }
    }
}

impl Default for CodaCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for CodaCodec {
    type Item = Message;
    type Error = CodecError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            let Some(end) = src.windows(2).position(|w| w == END_OF_MESSAGE) else {
                if src.len() > self.max_message_size {
                    return Err(CodecError::MessageTooLarge {
                        size: src.len(),
                        max: self.max_message_size,
                    });
                }
                return Ok(None);
            };

            let frame = src.split_to(end);
            src.advance(END_OF_MESSAGE.len());

            if let Some(message) = parse_frame(&frame)? {
                return Ok(Some(message));
            }
        }
    }
}

impl Encoder<Message> for CodaCodec {
    type Error = CodecError;

    fn encode(&mut self, item: Message, dst: &mut BytesMut) -> Result<(), Self::Error> {
        let (kind, head, args) = match item {
            Message::Command {
                token,
                service,
                name,
                args,
            } => ("C", vec![token.to_string(), service, name], args),
            Message::Reply {
                token,
                error,
                results,
            } => {
                let mut args = vec![error];
                args.extend(results);
                ("R", vec![token.to_string()], args)
            }
            Message::Event {
                service,
                name,
                args,
            } => ("E", vec![service, name], args),
        };

        put_field(dst, kind.as_bytes());
        for field in head {
            put_field(dst, field.as_bytes());
        }
        for arg in args {
            let json = serde_json::to_vec(&arg).map_err(CodecError::Json)?;
            put_field(dst, &json);
        }
        dst.put_slice(END_OF_MESSAGE);
        Ok(())
    }
}

fn put_field(dst: &mut BytesMut, field: &[u8]) {
    dst.reserve(field.len() + 1);
    dst.put_slice(field);
    dst.put_u8(0);
}

/// Returns `None` for frames that carry nothing the bridge acts on.
fn parse_frame(frame: &[u8]) -> Result<Option<Message>, CodecError> {
    let body = frame.strip_suffix(&[0]).unwrap_or(frame);
    let mut fields = body.split(|b| *b == 0);

    let kind = fields.next().unwrap_or_default();
    match kind {
        b"C" => {
            let token = parse_token(fields.next())?;
            let service = parse_str(fields.next(), "service")?;
            let name = parse_str(fields.next(), "command name")?;
            let args = fields.map(parse_json).collect::<Result<_, _>>()?;
            Ok(Some(Message::Command {
                token,
                service,
                name,
                args,
            }))
        }
        b"R" => {
            let token = parse_token(fields.next())?;
            let error = fields.next().map(parse_json).transpose()?.unwrap_or_default();
            let results = fields.map(parse_json).collect::<Result<_, _>>()?;
            Ok(Some(Message::Reply {
                token,
                error,
                results,
            }))
        }
        b"N" => {
            let token = parse_token(fields.next())?;
            Ok(Some(Message::Reply {
                token,
                error: json!({"Code": -1, "Format": "unknown command"}),
                results: Vec::new(),
            }))
        }
        b"E" => {
            let service = parse_str(fields.next(), "service")?;
            let name = parse_str(fields.next(), "event name")?;
            let args = fields.map(parse_json).collect::<Result<_, _>>()?;
            Ok(Some(Message::Event {
                service,
                name,
                args,
            }))
        }
        b"P" => {
            debug!("ignoring progress message");
            Ok(None)
        }
        other => Err(CodecError::Malformed(format!(
            "unknown message kind {:?}",
            String::from_utf8_lossy(other)
        ))),
    }
}

fn parse_str(field: Option<&[u8]>, what: &str) -> Result<String, CodecError> {
    let field = field.ok_or_else(|| CodecError::Malformed(format!("missing {what}")))?;
    String::from_utf8(field.to_vec())
        .map_err(|_| CodecError::Malformed(format!("{what} is not valid UTF-8")))
}

fn parse_token(field: Option<&[u8]>) -> Result<Token, CodecError> {
    let token = parse_str(field, "token")?;
    token
        .parse()
        .map_err(|_| CodecError::Malformed(format!("invalid token {token:?}")))
}

fn parse_json(field: &[u8]) -> Result<Value, CodecError> {
    if field.is_empty() {
        return Ok(Value::Null);
    }
    serde_json::from_slice(field).map_err(CodecError::Json)
}
