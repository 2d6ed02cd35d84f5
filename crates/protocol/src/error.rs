//! Protocol error types.

use thiserror::Error;

/// Errors that can occur while parsing a frame.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("Empty frame")]
    Empty,

    #[error("Invalid packet opcode: {0:#04x}")]
    InvalidOpcode(u8),

    #[error("Unexpected end of data")]
    UnexpectedEof,

    #[error("Unterminated string")]
    UnterminatedString,

    #[error("Invalid {field} code: {value}")]
    InvalidCode { field: &'static str, value: u8 },

    #[error("Non-finite coordinate")]
    NonFiniteCoordinate,
}
