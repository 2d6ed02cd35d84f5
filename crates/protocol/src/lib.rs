//! Shared protocol crate for the blob arena.
//!
//! This crate contains:
//! - Binary reading/writing utilities
//! - Packet definitions for both directions
//! - Text sanitization for names and chat
//! - Shared types (Color)

mod binary;
mod error;
pub mod packets;
pub mod text;

pub use binary::{BinaryReader, BinaryWriter};
pub use error::ProtocolError;

/// RGB color used for blobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}
