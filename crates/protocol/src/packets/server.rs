//! Server -> Client packet building and parsing.

use super::ServerOpcode;
use crate::{BinaryReader, BinaryWriter, Color, ProtocolError};

/// Food variant as it appears on the wire.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FoodCode {
    Small = 0,
    Medium = 1,
    Bonus = 2,
    Virus = 3,
}

impl FoodCode {
    fn from_u8(v: u8) -> Result<Self, ProtocolError> {
        Ok(match v {
            0 => Self::Small,
            1 => Self::Medium,
            2 => Self::Bonus,
            3 => Self::Virus,
            value => return Err(ProtocolError::InvalidCode { field: "food", value }),
        })
    }
}

/// Full description of a player (snapshot, join notice).
#[derive(Debug, Clone, PartialEq)]
pub struct PlayerInfo {
    pub id: u32,
    pub name: String,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub score: u32,
    pub color: Color,
    pub is_ai: bool,
}

/// Per-tick player state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerPosition {
    pub id: u32,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub score: u32,
}

/// Stats of the player that consumed something.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConsumerStats {
    pub id: u32,
    pub score: u32,
    pub radius: f32,
}

/// Full description of a food item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FoodInfo {
    pub id: u32,
    pub kind: FoodCode,
    pub x: f32,
    pub y: f32,
    pub radius: f32,
    pub value: i32,
}

/// Why a player left the arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LeaveReason {
    /// Explicit leave or closed socket.
    Left,
    /// Inactivity timeout.
    Timeout,
    /// Absorbed by another player.
    Absorbed { by: u32 },
}

/// Rejection reasons carried by the `Error` packet.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorReason {
    CapacityFull = 1,
    AlreadyJoined = 2,
}

impl ErrorReason {
    /// Stable machine-readable name.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorReason::CapacityFull => "capacity_full",
            ErrorReason::AlreadyJoined => "already_joined",
        }
    }

    fn from_u8(v: u8) -> Result<Self, ProtocolError> {
        match v {
            1 => Ok(ErrorReason::CapacityFull),
            2 => Ok(ErrorReason::AlreadyJoined),
            value => Err(ProtocolError::InvalidCode { field: "error", value }),
        }
    }
}

/// Server packet.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerPacket {
    Welcome {
        connection_id: u32,
        width: f32,
        height: f32,
        humans: u16,
        bots: u16,
        food: u16,
        max_players: u16,
        tick_rate: u8,
    },
    Snapshot {
        your_id: u32,
        width: f32,
        height: f32,
        players: Vec<PlayerInfo>,
        food: Vec<FoodInfo>,
    },
    Update {
        tick: u64,
        players: Vec<PlayerPosition>,
        spawned: Vec<FoodInfo>,
        removed: Vec<u32>,
    },
    PlayerMoved {
        id: u32,
        x: f32,
        y: f32,
        target_x: f32,
        target_y: f32,
    },
    FoodUpdated {
        consumed_id: u32,
        consumer: ConsumerStats,
        replacement: Option<FoodInfo>,
    },
    PlayerJoined(PlayerInfo),
    PlayerLeft {
        id: u32,
        reason: LeaveReason,
    },
    Eliminated {
        by: u32,
        final_score: u32,
        rank: u16,
        survived_ms: u64,
    },
    Chat {
        sender_id: u32,
        sender_name: String,
        text: String,
        timestamp_ms: u64,
    },
    Error(ErrorReason),
    Ping {
        nonce: u32,
    },
}

impl ServerPacket {
    /// The opcode this packet is sent with.
    pub fn opcode(&self) -> ServerOpcode {
        match self {
            ServerPacket::Welcome { .. } => ServerOpcode::Welcome,
            ServerPacket::Snapshot { .. } => ServerOpcode::Snapshot,
            ServerPacket::Update { .. } => ServerOpcode::Update,
            ServerPacket::PlayerMoved { .. } => ServerOpcode::PlayerMoved,
            ServerPacket::FoodUpdated { .. } => ServerOpcode::FoodUpdated,
            ServerPacket::PlayerJoined(_) => ServerOpcode::PlayerJoined,
            ServerPacket::PlayerLeft { .. } => ServerOpcode::PlayerLeft,
            ServerPacket::Eliminated { .. } => ServerOpcode::Eliminated,
            ServerPacket::Chat { .. } => ServerOpcode::Chat,
            ServerPacket::Error(_) => ServerOpcode::Error,
            ServerPacket::Ping { .. } => ServerOpcode::Ping,
        }
    }

    /// Serialize the packet.
    pub fn build(&self) -> BinaryWriter {
        let mut w = BinaryWriter::new();
        w.put_u8(self.opcode() as u8);
        match self {
            ServerPacket::Welcome {
                connection_id,
                width,
                height,
                humans,
                bots,
                food,
                max_players,
                tick_rate,
            } => {
                w.put_u32(*connection_id);
                w.put_f32(*width);
                w.put_f32(*height);
                w.put_u16(*humans);
                w.put_u16(*bots);
                w.put_u16(*food);
                w.put_u16(*max_players);
                w.put_u8(*tick_rate);
            }
            ServerPacket::Snapshot {
                your_id,
                width,
                height,
                players,
                food,
            } => {
                w.put_u32(*your_id);
                w.put_f32(*width);
                w.put_f32(*height);
                w.put_u16(players.len() as u16);
                for p in players {
                    put_player_info(&mut w, p);
                }
                w.put_u16(food.len() as u16);
                for f in food {
                    put_food_info(&mut w, f);
                }
            }
            ServerPacket::Update {
                tick,
                players,
                spawned,
                removed,
            } => {
                w.put_u64(*tick);
                w.put_u16(players.len() as u16);
                for p in players {
                    w.put_u32(p.id);
                    w.put_f32(p.x);
                    w.put_f32(p.y);
                    w.put_f32(p.radius);
                    w.put_u32(p.score);
                }
                w.put_u16(spawned.len() as u16);
                for f in spawned {
                    put_food_info(&mut w, f);
                }
                w.put_u16(removed.len() as u16);
                for id in removed {
                    w.put_u32(*id);
                }
            }
            ServerPacket::PlayerMoved {
                id,
                x,
                y,
                target_x,
                target_y,
            } => {
                w.put_u32(*id);
                w.put_f32(*x);
                w.put_f32(*y);
                w.put_f32(*target_x);
                w.put_f32(*target_y);
            }
            ServerPacket::FoodUpdated {
                consumed_id,
                consumer,
                replacement,
            } => {
                w.put_u32(*consumed_id);
                w.put_u32(consumer.id);
                w.put_u32(consumer.score);
                w.put_f32(consumer.radius);
                match replacement {
                    Some(f) => {
                        w.put_bool(true);
                        put_food_info(&mut w, f);
                    }
                    None => w.put_bool(false),
                }
            }
            ServerPacket::PlayerJoined(p) => put_player_info(&mut w, p),
            ServerPacket::PlayerLeft { id, reason } => {
                w.put_u32(*id);
                match reason {
                    LeaveReason::Left => w.put_u8(0),
                    LeaveReason::Timeout => w.put_u8(1),
                    LeaveReason::Absorbed { by } => {
                        w.put_u8(2);
                        w.put_u32(*by);
                    }
                }
            }
            ServerPacket::Eliminated {
                by,
                final_score,
                rank,
                survived_ms,
            } => {
                w.put_u32(*by);
                w.put_u32(*final_score);
                w.put_u16(*rank);
                w.put_u64(*survived_ms);
            }
            ServerPacket::Chat {
                sender_id,
                sender_name,
                text,
                timestamp_ms,
            } => {
                w.put_u32(*sender_id);
                w.put_string_utf8(sender_name);
                w.put_string_utf8(text);
                w.put_u64(*timestamp_ms);
            }
            ServerPacket::Error(reason) => w.put_u8(*reason as u8),
            ServerPacket::Ping { nonce } => w.put_u32(*nonce),
        }
        w
    }

    /// Parse a server packet (used by clients and tests).
    pub fn parse(data: &[u8]) -> Result<Self, ProtocolError> {
        if data.is_empty() {
            return Err(ProtocolError::Empty);
        }
        let mut r = BinaryReader::new(data.to_vec());
        let opcode = r.get_u8()?;
        let op = ServerOpcode::from_u8(opcode).ok_or(ProtocolError::InvalidOpcode(opcode))?;

        Ok(match op {
            ServerOpcode::Welcome => ServerPacket::Welcome {
                connection_id: r.get_u32()?,
                width: r.get_f32()?,
                height: r.get_f32()?,
                humans: r.get_u16()?,
                bots: r.get_u16()?,
                food: r.get_u16()?,
                max_players: r.get_u16()?,
                tick_rate: r.get_u8()?,
            },
            ServerOpcode::Snapshot => {
                let your_id = r.get_u32()?;
                let width = r.get_f32()?;
                let height = r.get_f32()?;
                let player_count = r.get_u16()?;
                let mut players = Vec::with_capacity(player_count as usize);
                for _ in 0..player_count {
                    players.push(get_player_info(&mut r)?);
                }
                let food_count = r.get_u16()?;
                let mut food = Vec::with_capacity(food_count as usize);
                for _ in 0..food_count {
                    food.push(get_food_info(&mut r)?);
                }
                ServerPacket::Snapshot {
                    your_id,
                    width,
                    height,
                    players,
                    food,
                }
            }
            ServerOpcode::Update => {
                let tick = r.get_u64()?;
                let player_count = r.get_u16()?;
                let mut players = Vec::with_capacity(player_count as usize);
                for _ in 0..player_count {
                    players.push(PlayerPosition {
                        id: r.get_u32()?,
                        x: r.get_f32()?,
                        y: r.get_f32()?,
                        radius: r.get_f32()?,
                        score: r.get_u32()?,
                    });
                }
                let spawned_count = r.get_u16()?;
                let mut spawned = Vec::with_capacity(spawned_count as usize);
                for _ in 0..spawned_count {
                    spawned.push(get_food_info(&mut r)?);
                }
                let removed_count = r.get_u16()?;
                let mut removed = Vec::with_capacity(removed_count as usize);
                for _ in 0..removed_count {
                    removed.push(r.get_u32()?);
                }
                ServerPacket::Update {
                    tick,
                    players,
                    spawned,
                    removed,
                }
            }
            ServerOpcode::PlayerMoved => ServerPacket::PlayerMoved {
                id: r.get_u32()?,
                x: r.get_f32()?,
                y: r.get_f32()?,
                target_x: r.get_f32()?,
                target_y: r.get_f32()?,
            },
            ServerOpcode::FoodUpdated => {
                let consumed_id = r.get_u32()?;
                let consumer = ConsumerStats {
                    id: r.get_u32()?,
                    score: r.get_u32()?,
                    radius: r.get_f32()?,
                };
                let replacement = if r.get_u8()? != 0 {
                    Some(get_food_info(&mut r)?)
                } else {
                    None
                };
                ServerPacket::FoodUpdated {
                    consumed_id,
                    consumer,
                    replacement,
                }
            }
            ServerOpcode::PlayerJoined => ServerPacket::PlayerJoined(get_player_info(&mut r)?),
            ServerOpcode::PlayerLeft => {
                let id = r.get_u32()?;
                let reason = match r.get_u8()? {
                    0 => LeaveReason::Left,
                    1 => LeaveReason::Timeout,
                    2 => LeaveReason::Absorbed { by: r.get_u32()? },
                    value => return Err(ProtocolError::InvalidCode { field: "leave", value }),
                };
                ServerPacket::PlayerLeft { id, reason }
            }
            ServerOpcode::Eliminated => ServerPacket::Eliminated {
                by: r.get_u32()?,
                final_score: r.get_u32()?,
                rank: r.get_u16()?,
                survived_ms: r.get_u64()?,
            },
            ServerOpcode::Chat => ServerPacket::Chat {
                sender_id: r.get_u32()?,
                sender_name: r.get_string_utf8()?,
                text: r.get_string_utf8()?,
                timestamp_ms: r.get_u64()?,
            },
            ServerOpcode::Error => ServerPacket::Error(ErrorReason::from_u8(r.get_u8()?)?),
            ServerOpcode::Ping => ServerPacket::Ping { nonce: r.get_u32()? },
        })
    }
}

fn put_player_info(w: &mut BinaryWriter, p: &PlayerInfo) {
    w.put_u32(p.id);
    w.put_string_utf8(&p.name);
    w.put_f32(p.x);
    w.put_f32(p.y);
    w.put_f32(p.radius);
    w.put_u32(p.score);
    w.put_u8(p.color.r);
    w.put_u8(p.color.g);
    w.put_u8(p.color.b);
    w.put_bool(p.is_ai);
}

fn get_player_info(r: &mut BinaryReader) -> Result<PlayerInfo, ProtocolError> {
    Ok(PlayerInfo {
        id: r.get_u32()?,
        name: r.get_string_utf8()?,
        x: r.get_f32()?,
        y: r.get_f32()?,
        radius: r.get_f32()?,
        score: r.get_u32()?,
        color: Color::new(r.get_u8()?, r.get_u8()?, r.get_u8()?),
        is_ai: r.get_u8()? != 0,
    })
}

fn put_food_info(w: &mut BinaryWriter, f: &FoodInfo) {
    w.put_u32(f.id);
    w.put_u8(f.kind as u8);
    w.put_f32(f.x);
    w.put_f32(f.y);
    w.put_f32(f.radius);
    w.put_i32(f.value);
}

fn get_food_info(r: &mut BinaryReader) -> Result<FoodInfo, ProtocolError> {
    Ok(FoodInfo {
        id: r.get_u32()?,
        kind: FoodCode::from_u8(r.get_u8()?)?,
        x: r.get_f32()?,
        y: r.get_f32()?,
        radius: r.get_f32()?,
        value: r.get_i32()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_player() -> PlayerInfo {
        PlayerInfo {
            id: 3,
            name: "Hunter".to_string(),
            x: 10.5,
            y: 20.0,
            radius: 21.2,
            score: 45,
            color: Color::new(1, 2, 3),
            is_ai: true,
        }
    }

    fn sample_food(id: u32) -> FoodInfo {
        FoodInfo {
            id,
            kind: FoodCode::Medium,
            x: 1.0,
            y: 2.0,
            radius: 5.0,
            value: 3,
        }
    }

    #[test]
    fn test_snapshot_parses_back() {
        let packet = ServerPacket::Snapshot {
            your_id: 3,
            width: 3000.0,
            height: 2000.0,
            players: vec![sample_player()],
            food: vec![sample_food(8), sample_food(9)],
        };
        let data = packet.build().finish();
        assert_eq!(data[0], ServerOpcode::Snapshot as u8);
        assert_eq!(ServerPacket::parse(&data), Ok(packet));
    }

    #[test]
    fn test_update_layout() {
        let packet = ServerPacket::Update {
            tick: 42,
            players: vec![PlayerPosition { id: 1, x: 0.0, y: 0.0, radius: 20.0, score: 0 }],
            spawned: vec![],
            removed: vec![5, 6],
        };
        let data = packet.build().finish();
        // opcode + tick + count + one player (20 bytes) + spawned count + removed count + 2 ids
        assert_eq!(data.len(), 1 + 8 + 2 + 20 + 2 + 2 + 8);
        assert_eq!(ServerPacket::parse(&data), Ok(packet));
    }

    #[test]
    fn test_player_left_reasons() {
        for reason in [LeaveReason::Left, LeaveReason::Timeout, LeaveReason::Absorbed { by: 12 }] {
            let packet = ServerPacket::PlayerLeft { id: 4, reason };
            assert_eq!(ServerPacket::parse(&packet.build().finish()), Ok(packet));
        }
    }

    #[test]
    fn test_food_updated_with_and_without_replacement() {
        let consumer = ConsumerStats { id: 1, score: 45, radius: 21.21 };
        let with = ServerPacket::FoodUpdated {
            consumed_id: 7,
            consumer,
            replacement: Some(sample_food(11)),
        };
        let without = ServerPacket::FoodUpdated {
            consumed_id: 7,
            consumer,
            replacement: None,
        };
        assert_eq!(ServerPacket::parse(&with.build().finish()), Ok(with));
        assert_eq!(ServerPacket::parse(&without.build().finish()), Ok(without));
    }

    #[test]
    fn test_error_reason_names() {
        assert_eq!(ErrorReason::CapacityFull.as_str(), "capacity_full");
        let data = ServerPacket::Error(ErrorReason::CapacityFull).build().finish();
        assert_eq!(&data[..], &[0xE0, 1]);
        assert_eq!(
            ServerPacket::parse(&[0xE0, 9]),
            Err(ProtocolError::InvalidCode { field: "error", value: 9 })
        );
    }

    #[test]
    fn test_truncated_player_info() {
        let mut w = BinaryWriter::new();
        w.put_u8(0x30);
        put_player_info(&mut w, &sample_player());
        let mut data = w.as_slice().to_vec();
        data.truncate(data.len() - 1);
        assert_eq!(ServerPacket::parse(&data), Err(ProtocolError::UnexpectedEof));
    }
}
