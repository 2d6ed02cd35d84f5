//! Client -> Server packet parsing and building.

use super::ClientOpcode;
use crate::{BinaryReader, BinaryWriter, Color, ProtocolError};

/// Parsed client packet.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientPacket {
    /// Join (0x00) with display name and optional preferred color.
    Join { name: String, color: Option<Color> },
    /// Leave (0x01).
    Leave,
    /// Movement target (0x10), world coordinates.
    Move { x: f32, y: f32 },
    /// Food consumption claim (0x20).
    EatClaim { food_id: u32 },
    /// Chat message (0x63).
    Chat { text: String },
    /// Keepalive acknowledgment (0xF1).
    Pong { nonce: u32 },
}

impl ClientPacket {
    /// Parse a client packet from raw bytes.
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.is_empty() {
            return Err(ProtocolError::Empty);
        }

        let mut reader = BinaryReader::new(data.to_vec());
        let opcode = reader.get_u8()?;

        match opcode {
            0x00 => {
                let name = reader.get_string_utf8()?;
                let color = if reader.get_u8()? != 0 {
                    Some(Color::new(reader.get_u8()?, reader.get_u8()?, reader.get_u8()?))
                } else {
                    None
                };
                Ok(ClientPacket::Join { name, color })
            }
            0x01 => Ok(ClientPacket::Leave),
            0x10 => {
                let x = reader.get_finite_f32()?;
                let y = reader.get_finite_f32()?;
                Ok(ClientPacket::Move { x, y })
            }
            0x20 => Ok(ClientPacket::EatClaim {
                food_id: reader.get_u32()?,
            }),
            0x63 => Ok(ClientPacket::Chat {
                text: reader.get_string_utf8()?,
            }),
            0xF1 => Ok(ClientPacket::Pong {
                nonce: reader.get_u32()?,
            }),
            _ => Err(ProtocolError::InvalidOpcode(opcode)),
        }
    }

    /// The opcode this packet is sent with.
    pub fn opcode(&self) -> ClientOpcode {
        match self {
            ClientPacket::Join { .. } => ClientOpcode::Join,
            ClientPacket::Leave => ClientOpcode::Leave,
            ClientPacket::Move { .. } => ClientOpcode::Move,
            ClientPacket::EatClaim { .. } => ClientOpcode::EatClaim,
            ClientPacket::Chat { .. } => ClientOpcode::Chat,
            ClientPacket::Pong { .. } => ClientOpcode::Pong,
        }
    }

    /// Serialize the packet (used by clients and tests).
    pub fn build(&self) -> BinaryWriter {
        let mut w = BinaryWriter::with_capacity(16);
        w.put_u8(self.opcode() as u8);
        match self {
            ClientPacket::Join { name, color } => {
                w.put_string_utf8(name);
                match color {
                    Some(c) => {
                        w.put_u8(1);
                        w.put_u8(c.r);
                        w.put_u8(c.g);
                        w.put_u8(c.b);
                    }
                    None => w.put_u8(0),
                }
            }
            ClientPacket::Leave => {}
            ClientPacket::Move { x, y } => {
                w.put_f32(*x);
                w.put_f32(*y);
            }
            ClientPacket::EatClaim { food_id } => w.put_u32(*food_id),
            ClientPacket::Chat { text } => w.put_string_utf8(text),
            ClientPacket::Pong { nonce } => w.put_u32(*nonce),
        }
        w
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_with_color() {
        let packet = ClientPacket::Join {
            name: "blobby".to_string(),
            color: Some(Color::new(10, 20, 30)),
        };
        let data = packet.build().finish();
        assert_eq!(data[0], 0x00);
        assert_eq!(ClientPacket::parse(&data), Ok(packet));
    }

    #[test]
    fn test_join_without_color() {
        let data = [0x00, b'a', 0, 0];
        assert_eq!(
            ClientPacket::parse(&data),
            Ok(ClientPacket::Join { name: "a".to_string(), color: None })
        );
    }

    #[test]
    fn test_move_rejects_nan() {
        let mut w = BinaryWriter::new();
        w.put_u8(0x10);
        w.put_f32(f32::NAN);
        w.put_f32(1.0);
        assert_eq!(
            ClientPacket::parse(w.as_slice()),
            Err(ProtocolError::NonFiniteCoordinate)
        );
    }

    #[test]
    fn test_truncated_move() {
        assert_eq!(
            ClientPacket::parse(&[0x10, 0, 0]),
            Err(ProtocolError::UnexpectedEof)
        );
    }

    #[test]
    fn test_unknown_opcode_and_empty() {
        assert_eq!(ClientPacket::parse(&[0x42]), Err(ProtocolError::InvalidOpcode(0x42)));
        assert_eq!(ClientPacket::parse(&[]), Err(ProtocolError::Empty));
    }

    #[test]
    fn test_eat_claim_and_pong() {
        let claim = ClientPacket::EatClaim { food_id: 77 };
        assert_eq!(ClientPacket::parse(&claim.build().finish()), Ok(claim));
        let pong = ClientPacket::Pong { nonce: 9 };
        assert_eq!(ClientPacket::parse(&pong.build().finish()), Ok(pong));
    }
}
