pub mod actor;
pub mod bots;
pub mod config;
pub mod error;
pub mod hypergrid;
pub mod intellect;
pub mod obstacle;
pub mod pathfinding;
pub mod subcell;
pub mod tasking;
pub mod tile;
pub mod world;

pub use actor::{ActorBody, ActorId, MovingActor};
pub use hypergrid::{DoubleBufferedHyperMap, HyperMap};
pub use obstacle::{Obstacle, ObstacleTracker};
pub use pathfinding::Path;
pub use tile::TileType;
pub use world::{Simulation, WorldState};
