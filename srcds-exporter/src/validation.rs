/// Input validation for pushed status snapshots and configuration
use std::collections::HashMap;

use srcds_metrics::{Player, PlayerId, Status};
use thiserror::Error;

/// Max players accepted in one status (prevents DOS)
pub const MAX_PLAYERS: usize = 1000;

/// Max map name length, workshop paths included
pub const MAX_MAP_NAME_LEN: usize = 128;

/// Max server name length
pub const MAX_SERVER_NAME_LEN: usize = 100;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("Map name cannot be empty")]
    MapNameEmpty,

    #[error("Map name too long (max 128 characters, got {0})")]
    MapNameTooLong(usize),

    #[error("Map name contains control characters")]
    MapNameInvalidChars,

    #[error("Player list too large (max {max} players, got {actual})")]
    PlayerListTooLarge { max: usize, actual: usize },

    #[error("Player {0} has an empty steamid")]
    SteamIdEmpty(PlayerId),

    #[error("Players {first} and {second} share steamid {steam_id}")]
    DuplicateSteamId {
        steam_id: String,
        first: PlayerId,
        second: PlayerId,
    },

    #[error("Server name cannot be empty")]
    ServerNameEmpty,

    #[error("Server name too long (max 100 characters, got {0})")]
    ServerNameTooLong(usize),
}

/// Validates a map name
///
/// Rules:
/// - Cannot be empty
/// - Max 128 characters
/// - No control characters
pub fn validate_map_name(map: &str) -> Result<(), ValidationError> {
    if map.is_empty() {
        return Err(ValidationError::MapNameEmpty);
    }

    let len = map.chars().count();
    if len > MAX_MAP_NAME_LEN {
        return Err(ValidationError::MapNameTooLong(len));
    }

    if map.chars().any(char::is_control) {
        return Err(ValidationError::MapNameInvalidChars);
    }

    Ok(())
}

/// Validates the player map of a status
///
/// Rules:
/// - Max 1000 players
/// - Every player has a non-empty steamid
/// - No two players share a steamid, since it is the series identity
pub fn validate_players(players: &HashMap<PlayerId, Player>) -> Result<(), ValidationError> {
    if players.len() > MAX_PLAYERS {
        return Err(ValidationError::PlayerListTooLarge {
            max: MAX_PLAYERS,
            actual: players.len(),
        });
    }

    let mut ids: Vec<PlayerId> = players.keys().copied().collect();
    ids.sort_unstable();

    let mut seen: HashMap<&str, PlayerId> = HashMap::with_capacity(ids.len());
    for id in ids {
        let steam_id = players[&id].steam_id.as_str();
        if steam_id.trim().is_empty() {
            return Err(ValidationError::SteamIdEmpty(id));
        }
        if let Some(&first) = seen.get(steam_id) {
            return Err(ValidationError::DuplicateSteamId {
                steam_id: steam_id.to_string(),
                first,
                second: id,
            });
        }
        seen.insert(steam_id, id);
    }

    Ok(())
}

/// Validates a full status snapshot.
/// `player_count.current > player_count.max` is allowed (reserved slots).
pub fn validate_status(status: &Status) -> Result<(), ValidationError> {
    validate_map_name(&status.map)?;
    validate_players(&status.players)
}

/// Validates the configured server name
///
/// Rules:
/// - Cannot be empty or whitespace
/// - Max 100 characters
pub fn validate_server_name(name: &str) -> Result<(), ValidationError> {
    if name.trim().is_empty() {
        return Err(ValidationError::ServerNameEmpty);
    }

    let len = name.chars().count();
    if len > MAX_SERVER_NAME_LEN {
        return Err(ValidationError::ServerNameTooLong(len));
    }

    Ok(())
}
