use serde::{Deserialize, Serialize};

/// Kind of see-through wall. Blocks movement, not sight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransparentWallKind {
    Glass,
    Mesh,
    Grate,
}

/// A charging spot bots can seek out when their battery runs low.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ChargingStation {
    pub online: bool,
    pub in_use: bool,
}

impl ChargingStation {
    pub fn new() -> Self {
        ChargingStation {
            online: true,
            in_use: false,
        }
    }

    pub fn is_usable(&self) -> bool {
        self.online && !self.in_use
    }
}

/// World tile kinds, matched exhaustively wherever passability or
/// interaction is decided.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum TileType {
    #[default]
    Space,
    Wall,
    TransparentWall(TransparentWallKind),
    ChargingStation(ChargingStation),
}

impl TileType {
    pub fn is_wall(&self) -> bool {
        matches!(self, TileType::Wall | TileType::TransparentWall(_))
    }
}
