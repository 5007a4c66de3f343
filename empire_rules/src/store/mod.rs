//! The entity store contract.
//!
//! The relay and the engine read entity snapshots through this trait and hand
//! completed state transitions back to it. How records are persisted is the
//! implementor's business; [`InMemoryStore`] is the reference implementation.

mod memory;

pub use memory::*;

use thiserror::Error;

use crate::entities::{
    CrisisEvent, EventId, Message, MessageId, Planet, PlanetId, Project, ProjectId, Route,
    RouteId, Upgrade, UpgradeId, User, UserId,
};

/// Failures of the storage layer itself.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entity store unavailable: {0}")]
    Unavailable(String),
    #[error("failed to (de)serialize store snapshot: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Every record written by one tick of one owner's empire.
///
/// Implementations must apply a changeset entirely or not at all.
#[derive(Debug, Clone)]
pub struct TickChangeset {
    /// The owner, with its cycle counter advanced.
    pub owner: User,
    pub planets: Vec<Planet>,
    pub projects: Vec<Project>,
    /// Newly generated crisis events.
    pub events: Vec<CrisisEvent>,
}

/// Narrow repository contract over the durable entity records.
pub trait EntityStore: Send + Sync {
    fn user(&self, id: UserId) -> StoreResult<Option<User>>;
    fn save_user(&self, user: User) -> StoreResult<()>;

    fn planet(&self, id: PlanetId) -> StoreResult<Option<Planet>>;
    /// Planets held by `owner`, in a stable order.
    fn planets_owned_by(&self, owner: UserId) -> StoreResult<Vec<Planet>>;
    fn save_planet(&self, planet: Planet) -> StoreResult<()>;

    fn upgrade(&self, id: UpgradeId) -> StoreResult<Option<Upgrade>>;
    fn upgrades(&self) -> StoreResult<Vec<Upgrade>>;
    fn save_upgrade(&self, upgrade: Upgrade) -> StoreResult<()>;

    fn project(&self, id: ProjectId) -> StoreResult<Option<Project>>;
    fn projects_for_planet(&self, planet: PlanetId) -> StoreResult<Vec<Project>>;
    fn save_project(&self, project: Project) -> StoreResult<()>;

    fn event(&self, id: EventId) -> StoreResult<Option<CrisisEvent>>;
    fn events_for_planet(&self, planet: PlanetId) -> StoreResult<Vec<CrisisEvent>>;
    fn save_event(&self, event: CrisisEvent) -> StoreResult<()>;

    fn route(&self, id: RouteId) -> StoreResult<Option<Route>>;
    fn routes(&self) -> StoreResult<Vec<Route>>;
    fn save_route(&self, route: Route) -> StoreResult<()>;

    fn message(&self, id: MessageId) -> StoreResult<Option<Message>>;
    fn save_message(&self, message: Message) -> StoreResult<()>;
    /// Messages sent or received by `user`, newest first.
    fn messages_for_user(&self, user: UserId) -> StoreResult<Vec<Message>>;
    /// Every hop of every chain started by `origin`.
    fn messages_from_origin(&self, origin: UserId) -> StoreResult<Vec<Message>>;
    /// Messages forwarded from `message`.
    fn forwards_of(&self, message: MessageId) -> StoreResult<Vec<Message>>;

    /// Apply a whole tick atomically.
    fn commit_tick(&self, changes: TickChangeset) -> StoreResult<()>;
    /// Write a settled crisis and the planet it affected in one step.
    fn commit_settlement(&self, planet: Planet, event: CrisisEvent) -> StoreResult<()>;
}
