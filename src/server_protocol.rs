use serde_json::{Map, Value};

use crate::types::{Difficulty, GameMode};

#[derive(Debug, PartialEq)]
pub enum ParsedClientMessage {
    Join {
        name: Option<String>,
    },
    CreateRoom {
        name: Option<String>,
        duration_ms: Option<i64>,
        difficulty: Option<Difficulty>,
        mode: Option<GameMode>,
    },
    JoinRoom {
        name: Option<String>,
        room_id: String,
    },
    ListRooms,
    Ready,
    Move {
        x: f32,
        y: f32,
    },
    LightLamp {
        lamp_id: usize,
    },
    RefuelAura {
        lamp_id: usize,
    },
    PickupItem,
    DropItem,
    Flicker {
        lamp_id: usize,
    },
    Extinguish {
        lamp_id: usize,
    },
    SealDoor {
        door_id: usize,
    },
    Push {
        target_id: String,
    },
    PickupSalt {
        salt_id: Option<usize>,
    },
    UseSalt,
    Ping {
        t: f64,
    },
}

pub fn parse_client_message(raw: &str) -> Option<ParsedClientMessage> {
    let value: Value = serde_json::from_str(raw).ok()?;
    let object = value.as_object()?;
    let message_type = object.get("type")?.as_str()?;

    match message_type {
        "join" => Some(ParsedClientMessage::Join {
            name: parse_name(object)?,
        }),
        "create-room" => {
            let name = parse_name(object)?;
            let duration_ms = parse_optional_i64(object.get("duration"))?;
            let difficulty = match object.get("difficulty") {
                None | Some(Value::Null) => None,
                Some(value) => Some(Difficulty::parse(value.as_str()?)?),
            };
            let mode = match object.get("mode") {
                None | Some(Value::Null) => None,
                Some(value) => Some(GameMode::parse(value.as_str()?)?),
            };
            Some(ParsedClientMessage::CreateRoom {
                name,
                duration_ms,
                difficulty,
                mode,
            })
        }
        "join-room" => {
            let name = parse_name(object)?;
            let room_id = object.get("roomId")?.as_str()?.to_string();
            Some(ParsedClientMessage::JoinRoom { name, room_id })
        }
        "list-rooms" => Some(ParsedClientMessage::ListRooms),
        "ready" => Some(ParsedClientMessage::Ready),
        "move" => {
            let x = object.get("x")?.as_f64()?;
            let y = object.get("y")?.as_f64()?;
            if !x.is_finite() || !y.is_finite() {
                return None;
            }
            Some(ParsedClientMessage::Move {
                x: x as f32,
                y: y as f32,
            })
        }
        "light-lamp" => Some(ParsedClientMessage::LightLamp {
            lamp_id: parse_id(object.get("lampId")?)?,
        }),
        "refuel-aura" => Some(ParsedClientMessage::RefuelAura {
            lamp_id: parse_id(object.get("lampId")?)?,
        }),
        "pickup-item" => Some(ParsedClientMessage::PickupItem),
        "drop-item" => Some(ParsedClientMessage::DropItem),
        "chaathan-flicker" => Some(ParsedClientMessage::Flicker {
            lamp_id: parse_id(object.get("lampId")?)?,
        }),
        "chaathan-extinguish" => Some(ParsedClientMessage::Extinguish {
            lamp_id: parse_id(object.get("lampId")?)?,
        }),
        "chaathan-seal-door" => Some(ParsedClientMessage::SealDoor {
            door_id: parse_id(object.get("doorId")?)?,
        }),
        "chaathan-push" => Some(ParsedClientMessage::Push {
            target_id: object.get("targetId")?.as_str()?.to_string(),
        }),
        "pickup-salt" => {
            let salt_id = match object.get("saltId") {
                None | Some(Value::Null) => None,
                Some(value) => Some(parse_id(value)?),
            };
            Some(ParsedClientMessage::PickupSalt { salt_id })
        }
        "use-salt" => Some(ParsedClientMessage::UseSalt),
        "ping" => {
            let t = object.get("t")?.as_f64()?;
            if !t.is_finite() {
                return None;
            }
            Some(ParsedClientMessage::Ping { t })
        }
        _ => None,
    }
}

/// `name`, or the older `playerName` key; absent is fine, a non-string is not.
fn parse_name(object: &Map<String, Value>) -> Option<Option<String>> {
    match object.get("name").or_else(|| object.get("playerName")) {
        None | Some(Value::Null) => Some(None),
        Some(value) => Some(Some(value.as_str()?.to_string())),
    }
}

fn parse_id(value: &Value) -> Option<usize> {
    usize::try_from(value.as_u64()?).ok()
}

fn parse_optional_i64(value: Option<&Value>) -> Option<Option<i64>> {
    const MAX_SAFE_INTEGER_F64: f64 = 9_007_199_254_740_991.0;

    let Some(value) = value else {
        return Some(None);
    };
    if value.is_null() {
        return Some(None);
    }
    if let Some(number) = value.as_i64() {
        return Some(Some(number));
    }
    if let Some(number) = value.as_u64() {
        return i64::try_from(number).ok().map(Some);
    }
    if let Some(number) = value.as_f64() {
        if number.is_finite() {
            let floored = number.floor();
            if floored.abs() > MAX_SAFE_INTEGER_F64 {
                return None;
            }
            return Some(Some(floored as i64));
        }
    }
    None
}
