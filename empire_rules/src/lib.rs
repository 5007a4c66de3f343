//! # Empire Rules
//!
//! The rulebook crate - contains the entity definitions, the pure mechanics
//! (warp distortion, production, loyalty, crisis outcomes) and the entity
//! store contract. It holds no orchestration: the relay and the tick engine
//! live in `empire_core` and drive these rules through the store.

pub mod entities;
pub mod mechanics;
pub mod store;

pub use entities::*;
pub use mechanics::*;
pub use store::*;
