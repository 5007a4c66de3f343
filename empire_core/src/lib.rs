//! # Empire Core
//!
//! Orchestration for a rogue trader's empire, built on the rules in
//! `empire_rules`.
//!
//! ## Core Components
//!
//! - **relay**: the Command Relay. Commands travel owner → astropath →
//!   executor and may be distorted in the warp on the way
//! - **engine**: the Tick Simulation Engine, gated on in-flight commands
//! - **crisis**: settling crises exactly once, directly or as a relayed command
//! - **facade**: a single entry point over the above, plus the executors that
//!   carry out delivered commands
//!
//! ## Concurrency
//!
//! Protocol calls on a message are serialized per message; anything that
//! mutates a planet is serialized per owning trader. Lock order is message
//! before owner.

pub mod config;
pub mod crisis;
pub mod engine;
pub mod error;
pub mod facade;
pub mod locks;
pub mod relay;

pub use config::*;
pub use crisis::*;
pub use engine::*;
pub use error::*;
pub use facade::*;
pub use locks::*;
pub use relay::*;
