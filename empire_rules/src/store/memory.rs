//! In-memory entity store.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::{EntityStore, StoreError, StoreResult, TickChangeset};
use crate::entities::{
    CrisisEvent, EventId, Message, MessageId, Planet, PlanetId, Project, ProjectId, Route,
    RouteId, Upgrade, UpgradeId, User, UserId,
};

/// All records of the empire at a point in time.
#[derive(Debug, Clone, Default)]
pub struct EmpireState {
    pub users: HashMap<UserId, User>,
    pub planets: HashMap<PlanetId, Planet>,
    pub upgrades: HashMap<UpgradeId, Upgrade>,
    pub projects: HashMap<ProjectId, Project>,
    pub events: HashMap<EventId, CrisisEvent>,
    pub routes: HashMap<RouteId, Route>,
    pub messages: HashMap<MessageId, Message>,
}

/// Flat, serializable form of [`EmpireState`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub users: Vec<User>,
    pub planets: Vec<Planet>,
    pub upgrades: Vec<Upgrade>,
    pub projects: Vec<Project>,
    pub events: Vec<CrisisEvent>,
    pub routes: Vec<Route>,
    pub messages: Vec<Message>,
}

impl EmpireState {
    /// Create a new empty state.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            users: self.users.values().cloned().collect(),
            planets: self.planets.values().cloned().collect(),
            upgrades: self.upgrades.values().cloned().collect(),
            projects: self.projects.values().cloned().collect(),
            events: self.events.values().cloned().collect(),
            routes: self.routes.values().cloned().collect(),
            messages: self.messages.values().cloned().collect(),
        }
    }

    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            users: snapshot.users.into_iter().map(|u| (u.id, u)).collect(),
            planets: snapshot.planets.into_iter().map(|p| (p.id, p)).collect(),
            upgrades: snapshot.upgrades.into_iter().map(|u| (u.id, u)).collect(),
            projects: snapshot.projects.into_iter().map(|p| (p.id, p)).collect(),
            events: snapshot.events.into_iter().map(|e| (e.id, e)).collect(),
            routes: snapshot.routes.into_iter().map(|r| (r.id, r)).collect(),
            messages: snapshot.messages.into_iter().map(|m| (m.id, m)).collect(),
        }
    }

    pub fn to_json(&self) -> Result<String, StoreError> {
        Ok(serde_json::to_string(&self.snapshot())?)
    }

    pub fn from_json(json: &str) -> Result<Self, StoreError> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        Ok(Self::from_snapshot(snapshot))
    }

    fn apply_tick(&mut self, changes: TickChangeset) {
        self.users.insert(changes.owner.id, changes.owner);
        for planet in changes.planets {
            self.planets.insert(planet.id, planet);
        }
        for project in changes.projects {
            self.projects.insert(project.id, project);
        }
        for event in changes.events {
            self.events.insert(event.id, event);
        }
    }
}

fn newest_first(mut messages: Vec<Message>) -> Vec<Message> {
    messages.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));
    messages
}

/// Thread-safe in-memory [`EntityStore`].
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<EmpireState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_state(state: EmpireState) -> Self {
        Self {
            state: RwLock::new(state),
        }
    }

    /// Copy of the current state.
    pub fn export(&self) -> EmpireState {
        self.state.read().clone()
    }
}

impl EntityStore for InMemoryStore {
    fn user(&self, id: UserId) -> StoreResult<Option<User>> {
        Ok(self.state.read().users.get(&id).cloned())
    }

    fn save_user(&self, user: User) -> StoreResult<()> {
        self.state.write().users.insert(user.id, user);
        Ok(())
    }

    fn planet(&self, id: PlanetId) -> StoreResult<Option<Planet>> {
        Ok(self.state.read().planets.get(&id).cloned())
    }

    fn planets_owned_by(&self, owner: UserId) -> StoreResult<Vec<Planet>> {
        let mut planets: Vec<_> = self
            .state
            .read()
            .planets
            .values()
            .filter(|p| p.owner == owner)
            .cloned()
            .collect();
        planets.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(planets)
    }

    fn save_planet(&self, planet: Planet) -> StoreResult<()> {
        self.state.write().planets.insert(planet.id, planet);
        Ok(())
    }

    fn upgrade(&self, id: UpgradeId) -> StoreResult<Option<Upgrade>> {
        Ok(self.state.read().upgrades.get(&id).cloned())
    }

    fn upgrades(&self) -> StoreResult<Vec<Upgrade>> {
        let mut upgrades: Vec<_> = self.state.read().upgrades.values().cloned().collect();
        upgrades.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(upgrades)
    }

    fn save_upgrade(&self, upgrade: Upgrade) -> StoreResult<()> {
        self.state.write().upgrades.insert(upgrade.id, upgrade);
        Ok(())
    }

    fn project(&self, id: ProjectId) -> StoreResult<Option<Project>> {
        Ok(self.state.read().projects.get(&id).cloned())
    }

    fn projects_for_planet(&self, planet: PlanetId) -> StoreResult<Vec<Project>> {
        let mut projects: Vec<_> = self
            .state
            .read()
            .projects
            .values()
            .filter(|p| p.planet == planet)
            .cloned()
            .collect();
        projects.sort_by(|a, b| a.started_cycle.cmp(&b.started_cycle).then(a.id.cmp(&b.id)));
        Ok(projects)
    }

    fn save_project(&self, project: Project) -> StoreResult<()> {
        self.state.write().projects.insert(project.id, project);
        Ok(())
    }

    fn event(&self, id: EventId) -> StoreResult<Option<CrisisEvent>> {
        Ok(self.state.read().events.get(&id).cloned())
    }

    fn events_for_planet(&self, planet: PlanetId) -> StoreResult<Vec<CrisisEvent>> {
        let mut events: Vec<_> = self
            .state
            .read()
            .events
            .values()
            .filter(|e| e.planet == planet)
            .cloned()
            .collect();
        events.sort_by(|a, b| a.occurred_cycle.cmp(&b.occurred_cycle).then(a.id.cmp(&b.id)));
        Ok(events)
    }

    fn save_event(&self, event: CrisisEvent) -> StoreResult<()> {
        self.state.write().events.insert(event.id, event);
        Ok(())
    }

    fn route(&self, id: RouteId) -> StoreResult<Option<Route>> {
        Ok(self.state.read().routes.get(&id).cloned())
    }

    fn routes(&self) -> StoreResult<Vec<Route>> {
        Ok(self.state.read().routes.values().cloned().collect())
    }

    fn save_route(&self, route: Route) -> StoreResult<()> {
        self.state.write().routes.insert(route.id, route);
        Ok(())
    }

    fn message(&self, id: MessageId) -> StoreResult<Option<Message>> {
        Ok(self.state.read().messages.get(&id).cloned())
    }

    fn save_message(&self, message: Message) -> StoreResult<()> {
        self.state.write().messages.insert(message.id, message);
        Ok(())
    }

    fn messages_for_user(&self, user: UserId) -> StoreResult<Vec<Message>> {
        let messages = self
            .state
            .read()
            .messages
            .values()
            .filter(|m| m.sender == user || m.receiver == user)
            .cloned()
            .collect();
        Ok(newest_first(messages))
    }

    fn messages_from_origin(&self, origin: UserId) -> StoreResult<Vec<Message>> {
        let messages = self
            .state
            .read()
            .messages
            .values()
            .filter(|m| m.origin == origin)
            .cloned()
            .collect();
        Ok(newest_first(messages))
    }

    fn forwards_of(&self, message: MessageId) -> StoreResult<Vec<Message>> {
        let messages = self
            .state
            .read()
            .messages
            .values()
            .filter(|m| m.forwarded_from == Some(message))
            .cloned()
            .collect();
        Ok(newest_first(messages))
    }

    fn commit_tick(&self, changes: TickChangeset) -> StoreResult<()> {
        self.state.write().apply_tick(changes);
        Ok(())
    }

    fn commit_settlement(&self, planet: Planet, event: CrisisEvent) -> StoreResult<()> {
        let mut state = self.state.write();
        state.planets.insert(planet.id, planet);
        state.events.insert(event.id, event);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::{MessageKind, PlanetType, ProjectStatus, Resources};

    #[test]
    fn test_planets_owned_by_filters_owner() {
        let store = InMemoryStore::new();
        let owner = UserId::new();
        store
            .save_planet(Planet::new(owner, "Footfall", PlanetType::AgriWorld))
            .unwrap();
        store
            .save_planet(Planet::new(owner, "Damaris", PlanetType::ForgeWorld))
            .unwrap();
        store
            .save_planet(Planet::new(UserId::new(), "Elsewhere", PlanetType::HiveWorld))
            .unwrap();

        let planets = store.planets_owned_by(owner).unwrap();
        let names: Vec<_> = planets.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Damaris", "Footfall"]);
    }

    #[test]
    fn test_message_queries() {
        let store = InMemoryStore::new();
        let (trader, astropath, governor) = (UserId::new(), UserId::new(), UserId::new());

        let original = Message::new(trader, astropath, MessageKind::UpgradeRequest, "build");
        let forwarded =
            Message::new(astropath, governor, MessageKind::UpgradeRequest, "build").continuing(&original);
        store.save_message(original.clone()).unwrap();
        store.save_message(forwarded.clone()).unwrap();

        assert_eq!(store.messages_for_user(astropath).unwrap().len(), 2);
        assert_eq!(store.messages_for_user(governor).unwrap().len(), 1);
        assert_eq!(store.messages_from_origin(trader).unwrap().len(), 2);
        assert_eq!(store.forwards_of(original.id).unwrap()[0].id, forwarded.id);
    }

    #[test]
    fn test_commit_tick_applies_everything() {
        let store = InMemoryStore::new();
        let trader = User::trader("Lucius", "von Valancius", "W-1");
        let mut planet = Planet::new(trader.id, "Footfall", PlanetType::AgriWorld);
        store.save_user(trader.clone()).unwrap();
        store.save_planet(planet.clone()).unwrap();

        let mut advanced = trader.clone();
        advanced.as_trader_mut().unwrap().cycle = 1;
        planet.stock = Resources::new(12.0, 4.0, 20.0);
        let project = Project::new(planet.id, UpgradeId::new(), 0);

        store
            .commit_tick(TickChangeset {
                owner: advanced,
                planets: vec![planet.clone()],
                projects: vec![project.clone()],
                events: vec![],
            })
            .unwrap();

        assert_eq!(store.user(trader.id).unwrap().unwrap().as_trader().unwrap().cycle, 1);
        assert_eq!(store.planet(planet.id).unwrap().unwrap().stock, planet.stock);
        assert_eq!(
            store.project(project.id).unwrap().unwrap().status,
            ProjectStatus::InProgress
        );
    }

    #[test]
    fn test_snapshot_round_trip_is_exact() {
        let store = InMemoryStore::new();
        let owner = UserId::new();
        let planet = Planet::new(owner, "Port Wander", PlanetType::CivilizedWorld)
            .with_loyalty(33.333333333333336)
            .with_stock(Resources::new(0.1 + 0.2, 1e-300, 123456789.98765433));
        let mut message = Message::new(owner, UserId::new(), MessageKind::CrisisResponse, "help");
        message.deliver(true);
        store.save_planet(planet.clone()).unwrap();
        store.save_message(message.clone()).unwrap();

        let json = store.export().to_json().unwrap();
        let restored = EmpireState::from_json(&json).unwrap();

        let back = &restored.planets[&planet.id];
        assert_eq!(back.loyalty.to_bits(), planet.loyalty.to_bits());
        assert_eq!(back.stock.wealth.to_bits(), planet.stock.wealth.to_bits());
        assert_eq!(back.stock.industry.to_bits(), planet.stock.industry.to_bits());
        assert_eq!(back.stock.resources.to_bits(), planet.stock.resources.to_bits());
        assert_eq!(restored.messages[&message.id], message);
    }
}
