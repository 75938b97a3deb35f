use std::collections::HashMap;

use arrayvec::ArrayString;
use serde::{Deserialize, Serialize};

/// Snapshot-local player key assigned by the game server (the `userid` column
/// of the `status` output). Stable for one session within a single run.
pub type PlayerId = u32;

/// Stable platform identity (SteamID2/SteamID3/SteamID64), stored inline.
pub type SteamId = ArrayString<32>;

/// A connected player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Player {
  /// Display name, informational only
  #[serde(default)]
  pub name: String,
  /// Identity used as the `steamid` label
  #[serde(rename = "steamid")]
  pub steam_id: SteamId,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerCount {
  pub current: u32,
  pub max: u32,
}

/// One poll's worth of server state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
  pub map: String,
  pub player_count: PlayerCount,
  #[serde(default)]
  pub players: HashMap<PlayerId, Player>,
}

/// What a single `on_snapshot` call changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReconcileReport {
  /// The map series was (re)created.
  pub map_changed: bool,
  /// Players that got a new series.
  pub added: usize,
  /// Players moved to the retirement queue.
  pub retired: usize,
}

impl ReconcileReport {
  /// True if the snapshot caused no create/register calls and no retirements.
  pub fn is_noop(&self) -> bool {
    !self.map_changed && self.added == 0 && self.retired == 0
  }
}
