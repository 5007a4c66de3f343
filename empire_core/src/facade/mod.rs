//! The Empire Facade: one entry point composing the relay, the engine and
//! the crisis desk over a shared store.

mod orders;
mod works;

pub use orders::*;
pub use works::*;

use std::sync::Arc;

use empire_rules::{
    CrisisAction, EntityStore, EventId, InMemoryStore, Message, MessageId, Planet, PlanetId,
    PlanetType, Resources, RoleKind, Upgrade, UpgradeId, User, UserId,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::config::EmpireConfig;
use crate::crisis::{CrisisDesk, Settlement};
use crate::engine::{TickEngine, TickSummary};
use crate::error::{EmpireError, Result};
use crate::locks::KeyedLocks;
use crate::relay::{CommandRelay, DispatchRequest};

/// Totals across every planet a trader holds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmpireResources {
    pub planets: usize,
    pub stock: Resources,
    pub treasury: f64,
    pub influence: u8,
    pub cycle: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanetStats {
    pub planet: PlanetId,
    pub name: String,
    pub planet_type: PlanetType,
    pub loyalty: f64,
    pub stock: Resources,
    pub rebellious: bool,
    pub installed_upgrades: usize,
    pub active_projects: usize,
    pub active_crises: usize,
}

pub struct EmpireFacade {
    store: Arc<dyn EntityStore>,
    config: EmpireConfig,
    owner_locks: Arc<KeyedLocks<UserId>>,
    executions: KeyedLocks<MessageId>,
    route_lock: Mutex<()>,
    crisis: Arc<CrisisDesk>,
    relay: CommandRelay,
    engine: TickEngine,
}

impl EmpireFacade {
    pub fn new(store: Arc<dyn EntityStore>, config: EmpireConfig) -> Self {
        let owner_locks = Arc::new(KeyedLocks::new());
        let crisis = Arc::new(CrisisDesk::new(
            store.clone(),
            owner_locks.clone(),
            config.simulation.rebellion_threshold,
        ));
        let relay = CommandRelay::new(
            store.clone(),
            crisis.clone(),
            config.relay.clone(),
            config.simulation.seed.map(|seed| seed.wrapping_add(1)),
        );
        let engine = TickEngine::new(store.clone(), owner_locks.clone(), config.simulation.clone());
        Self {
            store,
            config,
            owner_locks,
            executions: KeyedLocks::new(),
            route_lock: Mutex::new(()),
            crisis,
            relay,
            engine,
        }
    }

    pub fn in_memory(config: EmpireConfig) -> Self {
        Self::new(Arc::new(InMemoryStore::new()), config)
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub fn config(&self) -> &EmpireConfig {
        &self.config
    }

    pub fn relay(&self) -> &CommandRelay {
        &self.relay
    }

    pub fn engine(&self) -> &TickEngine {
        &self.engine
    }

    pub fn crisis(&self) -> &CrisisDesk {
        &self.crisis
    }

    pub fn dispatch(&self, request: DispatchRequest) -> Result<MessageId> {
        self.relay.dispatch(request)
    }

    pub fn forward(
        &self,
        astropath: UserId,
        message: MessageId,
        final_receiver: UserId,
    ) -> Result<MessageId> {
        self.relay.forward(astropath, message, final_receiver)
    }

    pub fn mark_delivered(&self, message: MessageId) -> Result<Message> {
        self.relay.mark_delivered(message)
    }

    pub fn mark_completed(&self, message: MessageId) -> Result<Message> {
        self.relay.mark_completed(message)
    }

    pub fn advance(&self, owner: UserId) -> Result<TickSummary> {
        self.engine.advance(owner)
    }

    /// Settle a crisis without going through the relay.
    pub fn resolve_crisis_now(
        &self,
        event: EventId,
        action: CrisisAction,
        offered: &Resources,
    ) -> Result<Settlement> {
        self.crisis.settle(event, action, offered)
    }

    /// Claim a new planet for `owner`.
    pub fn found_planet(
        &self,
        owner: UserId,
        name: impl Into<String>,
        planet_type: PlanetType,
    ) -> Result<PlanetId> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(EmpireError::InvalidPayload("planet name is empty".to_string()));
        }
        self.load_trader(owner)?;
        let planet = Planet::new(owner, name, planet_type);
        let id = planet.id;
        tracing::info!(
            target: "empire::facade",
            owner = %owner,
            planet = %id,
            planet_type = %planet_type,
            "planet.founded"
        );
        self.store.save_planet(planet)?;
        Ok(id)
    }

    /// Add an upgrade to the catalog.
    pub fn add_upgrade(&self, upgrade: Upgrade) -> Result<UpgradeId> {
        if !upgrade.cost.is_valid() {
            return Err(EmpireError::InvalidPayload(format!(
                "upgrade cost {:?} must be finite and non-negative",
                upgrade.cost
            )));
        }
        let id = upgrade.id;
        self.store.save_upgrade(upgrade)?;
        Ok(id)
    }

    pub fn planet(&self, planet: PlanetId) -> Result<Planet> {
        self.load_planet(planet)
    }

    pub fn empire_resources(&self, trader_id: UserId) -> Result<EmpireResources> {
        let trader = self.load_trader(trader_id)?;
        let profile = trader
            .as_trader()
            .ok_or_else(|| EmpireError::unknown("trader", trader_id))?;
        let planets = self.store.planets_owned_by(trader_id)?;
        Ok(EmpireResources {
            planets: planets.len(),
            stock: planets
                .iter()
                .fold(Resources::ZERO, |total, planet| total.plus(&planet.stock)),
            treasury: profile.treasury,
            influence: profile.influence,
            cycle: profile.cycle,
        })
    }

    pub fn planet_stats(&self, planet_id: PlanetId) -> Result<PlanetStats> {
        let planet = self.load_planet(planet_id)?;
        let active_projects = self
            .store
            .projects_for_planet(planet_id)?
            .iter()
            .filter(|project| project.is_active())
            .count();
        let active_crises = self.crisis.active_events(planet_id)?.len();
        Ok(PlanetStats {
            planet: planet.id,
            installed_upgrades: planet.installed_upgrades.len(),
            name: planet.name,
            planet_type: planet.planet_type,
            loyalty: planet.loyalty,
            stock: planet.stock,
            rebellious: planet.rebellious,
            active_projects,
            active_crises,
        })
    }

    pub fn rebellious_planets(&self, trader: UserId) -> Result<Vec<Planet>> {
        Ok(self
            .store
            .planets_owned_by(trader)?
            .into_iter()
            .filter(|planet| planet.rebellious)
            .collect())
    }

    pub fn installed_upgrades(&self, planet_id: PlanetId) -> Result<Vec<Upgrade>> {
        let planet = self.load_planet(planet_id)?;
        let mut upgrades = Vec::with_capacity(planet.installed_upgrades.len());
        for id in &planet.installed_upgrades {
            match self.store.upgrade(*id)? {
                Some(upgrade) => upgrades.push(upgrade),
                None => tracing::warn!(
                    target: "empire::facade",
                    planet = %planet_id,
                    upgrade = %id,
                    "planet.upgrade_missing"
                ),
            }
        }
        Ok(upgrades)
    }

    /// Catalog entries suitable for `planet_type`.
    pub fn upgrades_for_type(&self, planet_type: PlanetType) -> Result<Vec<Upgrade>> {
        Ok(self
            .store
            .upgrades()?
            .into_iter()
            .filter(|upgrade| upgrade.suitable_type == planet_type)
            .collect())
    }

    pub fn update_influence(&self, trader_id: UserId, influence: u8) -> Result<()> {
        if influence > 100 {
            return Err(EmpireError::InvalidPayload(format!(
                "influence {influence} outside 0-100"
            )));
        }
        self.owner_locks.with(trader_id, || {
            let mut trader = self.load_trader(trader_id)?;
            if let Some(profile) = trader.as_trader_mut() {
                profile.influence = influence;
            }
            self.store.save_user(trader)?;
            Ok(())
        })
    }

    /// Overwrite a planet's loyalty (clamped) and recompute its rebellion flag.
    pub fn update_loyalty(&self, planet_id: PlanetId, loyalty: f64) -> Result<Planet> {
        if loyalty.is_nan() {
            return Err(EmpireError::InvalidPayload("loyalty is NaN".to_string()));
        }
        let owner = self.load_planet(planet_id)?.owner;
        self.owner_locks.with(owner, || {
            let mut planet = self.load_planet(planet_id)?;
            planet.set_loyalty(loyalty, self.config.simulation.rebellion_threshold);
            self.store.save_planet(planet.clone())?;
            Ok(planet)
        })
    }

    fn load_user(&self, id: UserId) -> Result<User> {
        self.store
            .user(id)?
            .ok_or_else(|| EmpireError::unknown("user", id))
    }

    fn load_trader(&self, id: UserId) -> Result<User> {
        let user = self.load_user(id)?;
        if !user.is(RoleKind::Trader) {
            return Err(EmpireError::InvalidReference(format!(
                "user {id} is a {}, not a trader",
                user.kind()
            )));
        }
        Ok(user)
    }

    fn load_planet(&self, id: PlanetId) -> Result<Planet> {
        self.store
            .planet(id)?
            .ok_or_else(|| EmpireError::unknown("planet", id))
    }

    fn load_upgrade(&self, id: UpgradeId) -> Result<Upgrade> {
        self.store
            .upgrade(id)?
            .ok_or_else(|| EmpireError::unknown("upgrade", id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use empire_rules::{CrisisEvent, CrisisKind, Project, ProjectStatus};

    pub(super) struct Empire {
        pub facade: EmpireFacade,
        pub trader: UserId,
        pub astropath: UserId,
        pub governor: UserId,
        pub navigator: UserId,
        pub planet: PlanetId,
    }

    pub(super) fn empire() -> Empire {
        let mut config = EmpireConfig::default().with_seed(11);
        config.simulation.crisis_base_chance = 0.0;
        let facade = EmpireFacade::in_memory(config);

        let trader = User::trader("Lucius", "von Valancius", "W-1");
        let astropath = User::astropath("Idira", 10);
        let navigator = User::navigator("Cassia", "Orsellio", 7);
        let (trader_id, astropath_id, navigator_id) = (trader.id, astropath.id, navigator.id);
        for user in [trader, astropath, navigator] {
            facade.store().save_user(user).unwrap();
        }
        let planet = facade
            .found_planet(trader_id, "Footfall", PlanetType::AgriWorld)
            .unwrap();
        let governor = User::governor("Kastor", planet);
        let governor_id = governor.id;
        facade.store().save_user(governor).unwrap();

        Empire {
            facade,
            trader: trader_id,
            astropath: astropath_id,
            governor: governor_id,
            navigator: navigator_id,
            planet,
        }
    }

    #[test]
    fn test_found_planet_requires_trader() {
        let e = empire();
        assert!(matches!(
            e.facade.found_planet(e.governor, "Nowhere", PlanetType::DeathWorld),
            Err(EmpireError::InvalidReference(_))
        ));
        assert!(matches!(
            e.facade.found_planet(e.trader, "  ", PlanetType::DeathWorld),
            Err(EmpireError::InvalidPayload(_))
        ));
        let planet = e.facade.planet(e.planet).unwrap();
        assert_eq!(planet.loyalty, 50.0);
        assert_eq!(planet.stock, Resources::ZERO);
    }

    #[test]
    fn test_empire_resources_totals_planets() {
        let e = empire();
        let second = e
            .facade
            .found_planet(e.trader, "Damaris", PlanetType::ForgeWorld)
            .unwrap();
        e.facade.advance(e.trader).unwrap();

        let totals = e.facade.empire_resources(e.trader).unwrap();
        assert_eq!(totals.planets, 2);
        assert_eq!(totals.stock, Resources::new(22.0, 28.0, 24.0));
        assert_eq!(totals.treasury, 1_000_000.0);
        assert_eq!(totals.influence, 50);
        assert_eq!(totals.cycle, 1);
        assert_eq!(e.facade.planet_stats(second).unwrap().stock, Resources::new(10.0, 24.0, 4.0));
    }

    #[test]
    fn test_planet_stats_counts_upgrades_projects_and_crises() {
        let e = empire();
        let silo = e
            .facade
            .add_upgrade(Upgrade::new("Silo", PlanetType::AgriWorld, Resources::ZERO))
            .unwrap();
        let dock = e
            .facade
            .add_upgrade(Upgrade::new("Dock", PlanetType::AgriWorld, Resources::new(1e6, 0.0, 0.0)))
            .unwrap();
        e.facade.start_project(e.planet, silo).unwrap();
        e.facade.start_project(e.planet, dock).unwrap();
        e.facade
            .crisis()
            .create_event(e.planet, CrisisKind::EconomicCrisis, 2, None)
            .unwrap();
        e.facade.advance(e.trader).unwrap();

        let stats = e.facade.planet_stats(e.planet).unwrap();
        assert_eq!(stats.installed_upgrades, 1);
        assert_eq!(stats.active_projects, 1);
        assert_eq!(stats.active_crises, 1);
        assert_eq!(
            e.facade
                .installed_upgrades(e.planet)
                .unwrap()
                .into_iter()
                .map(|upgrade| upgrade.id)
                .collect::<Vec<_>>(),
            vec![silo]
        );
    }

    #[test]
    fn test_update_loyalty_recomputes_rebellion() {
        let e = empire();
        let planet = e.facade.update_loyalty(e.planet, 10.0).unwrap();
        assert!(planet.rebellious);
        assert_eq!(e.facade.rebellious_planets(e.trader).unwrap().len(), 1);

        let planet = e.facade.update_loyalty(e.planet, 150.0).unwrap();
        assert_eq!(planet.loyalty, 100.0);
        assert!(!planet.rebellious);
        assert!(e.facade.rebellious_planets(e.trader).unwrap().is_empty());
    }

    #[test]
    fn test_update_influence_bounds() {
        let e = empire();
        e.facade.update_influence(e.trader, 80).unwrap();
        assert_eq!(e.facade.empire_resources(e.trader).unwrap().influence, 80);
        assert!(matches!(
            e.facade.update_influence(e.trader, 101),
            Err(EmpireError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_upgrades_for_type_filters_catalog() {
        let e = empire();
        e.facade
            .add_upgrade(Upgrade::new("Silo", PlanetType::AgriWorld, Resources::ZERO))
            .unwrap();
        e.facade
            .add_upgrade(Upgrade::new("Manufactorum", PlanetType::ForgeWorld, Resources::ZERO))
            .unwrap();
        let agri = e.facade.upgrades_for_type(PlanetType::AgriWorld).unwrap();
        assert_eq!(agri.len(), 1);
        assert_eq!(agri[0].name, "Silo");
        assert!(matches!(
            e.facade.add_upgrade(Upgrade::new(
                "Broken",
                PlanetType::AgriWorld,
                Resources::new(-1.0, 0.0, 0.0)
            )),
            Err(EmpireError::InvalidPayload(_))
        ));
    }

    #[test]
    fn test_resolve_crisis_now_is_idempotent() {
        let e = empire();
        let event = CrisisEvent::new(e.planet, CrisisKind::Insurrection, 3, "riots", 0);
        let event_id = event.id;
        e.facade.store().save_event(event).unwrap();

        let first = e
            .facade
            .resolve_crisis_now(event_id, CrisisAction::Ignore, &Resources::ZERO)
            .unwrap();
        let second = e
            .facade
            .resolve_crisis_now(event_id, CrisisAction::Help, &Resources::ZERO)
            .unwrap();

        assert!(matches!(first, Settlement::Applied(_)));
        assert_eq!(second, Settlement::AlreadyResolved);
        assert_eq!(e.facade.planet(e.planet).unwrap().loyalty, 44.0);
    }

    #[test]
    fn test_tick_without_projects_leaves_projects_alone() {
        let e = empire();
        let project = Project::new(e.planet, UpgradeId::new(), 0);
        let mut cancelled = project.clone();
        cancelled.status = ProjectStatus::Cancelled;
        e.facade.store().save_project(cancelled).unwrap();

        e.facade.advance(e.trader).unwrap();
        assert_eq!(
            e.facade.store().project(project.id).unwrap().unwrap().status,
            ProjectStatus::Cancelled
        );
    }
}
