//! Classification of the response envelope that opens every exchange.

use crate::errors::{DecodeError, UNSPECIFIED_ERROR};
use crate::pb;
use prost::Message;

/// The first frame of every exchange, classified.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// The daemon accepted the request. The response carries the operation-specific payload.
    Ok(pb::Response),
    /// The daemon refused the request with this message.
    Error(String),
}

/// Decode `frame` as a response envelope and decide whether it is OK or ERROR.
///
/// Bytes that are not a valid envelope produce a [`DecodeError`]; that is a protocol violation and never confused
/// with an ERROR reported by the daemon.
pub fn classify(frame: &[u8]) -> Result<Envelope, DecodeError> {
    let response = pb::Response::decode(frame)?;
    match pb::response::Type::try_from(response.r#type) {
        Ok(pb::response::Type::Ok) => Ok(Envelope::Ok(response)),
        Ok(pb::response::Type::Error) => {
            let message = response.error.map(|e| e.msg).filter(|msg| !msg.is_empty());
            Ok(Envelope::Error(message.unwrap_or_else(|| UNSPECIFIED_ERROR.to_string())))
        }
        Err(_) => Err(DecodeError::UnknownType { kind: "response", value: response.r#type }),
    }
}
