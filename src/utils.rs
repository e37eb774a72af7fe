use crate::error::{Error, Result};
use crate::peer::types::ServerConfig;
use rand::distr::Alphanumeric;
use rand::Rng;

/// Shortest room id accepted by the registry.
pub const MIN_ROOM_ID_LEN: usize = 6;

pub fn random_id() -> String {
    hex::encode(rand::rng().random::<[u8; 8]>())
}

/// Case-sensitive alphanumeric room id, shareable out-of-band.
pub fn random_room_id(len: usize) -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(len.max(MIN_ROOM_ID_LEN))
        .map(char::from)
        .collect()
}

/// Trims a user-entered room id; an empty id is an invalid room.
pub fn normalize_room_id(input: &str) -> Result<String> {
    let id = input.trim();
    if id.is_empty() {
        return Err(Error::InvalidRoom(String::new()));
    }
    Ok(id.to_string())
}

// Adds the protocol scheme to an ICE server url when it is missing
pub fn add_ice_url_scheme(config: &ServerConfig) -> String {
    if config.url.starts_with("turn:") || config.url.starts_with("stun:") {
        config.url.clone()
    } else {
        let scheme = if config.r#type == "turn" {
            "turn:"
        } else {
            "stun:"
        };
        format!("{}{}", scheme, config.url)
    }
}
