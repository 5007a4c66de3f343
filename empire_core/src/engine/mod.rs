//! The Tick Simulation Engine.
//!
//! `advance` moves one owner's empire forward by a cycle. Each planet goes
//! through accrual, project progress, a crisis roll and a loyalty adjustment,
//! in that order. Every planet is planned on a copy first and the result is
//! committed as one changeset, so a failure leaves the empire untouched.

mod summary;

pub use summary::*;

use std::sync::Arc;

use empire_rules::{
    next_loyalty, production, roll_crisis, CrisisEvent, EntityStore, LoyaltyRules, Planet,
    Project, TickChangeset, UserId,
};
use parking_lot::Mutex;
use rand::{rngs::SmallRng, SeedableRng};

use crate::config::SimulationConfig;
use crate::error::{EmpireError, Result, TickFailure};
use crate::locks::KeyedLocks;

pub struct TickEngine {
    store: Arc<dyn EntityStore>,
    owner_locks: Arc<KeyedLocks<UserId>>,
    config: SimulationConfig,
    rng: Mutex<SmallRng>,
}

/// One planet's share of a tick, not yet committed.
struct PlanetPlan {
    planet: Planet,
    projects: Vec<Project>,
    event: Option<CrisisEvent>,
    report: PlanetTick,
}

impl TickEngine {
    pub fn new(
        store: Arc<dyn EntityStore>,
        owner_locks: Arc<KeyedLocks<UserId>>,
        config: SimulationConfig,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self {
            store,
            owner_locks,
            config,
            rng: Mutex::new(rng),
        }
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Number of in-flight messages started by `owner` that hold back its tick.
    pub fn pending_commands(&self, owner: UserId) -> Result<usize> {
        Ok(self
            .store
            .messages_from_origin(owner)?
            .iter()
            .filter(|message| message.is_pending_for_tick())
            .count())
    }

    pub fn can_advance(&self, owner: UserId) -> Result<bool> {
        Ok(self.pending_commands(owner)? == 0)
    }

    /// Advance `owner_id`'s empire by one cycle.
    pub fn advance(&self, owner_id: UserId) -> Result<TickSummary> {
        let _guard = self.owner_locks.lock(owner_id);

        let mut owner = self
            .store
            .user(owner_id)?
            .ok_or_else(|| EmpireError::unknown("owner", owner_id))?;
        let kind = owner.kind();
        let trader = owner.as_trader_mut().ok_or_else(|| {
            EmpireError::InvalidReference(format!("user {owner_id} is a {kind}, not a trader"))
        })?;

        let pending = self.pending_commands(owner_id)?;
        if pending > 0 {
            tracing::info!(
                target: "empire::tick",
                owner = %owner_id,
                pending,
                "tick.advance.gated"
            );
            return Err(EmpireError::CommandsPending {
                owner: owner_id,
                pending,
            });
        }

        trader.cycle += 1;
        let cycle = trader.cycle;

        let planets = self.store.planets_owned_by(owner_id)?;
        let rules = self.config.loyalty_rules();
        let mut plans = Vec::with_capacity(planets.len());
        let mut failures = Vec::new();
        {
            let mut rng = self.rng.lock();
            for planet in planets {
                let planet_id = planet.id;
                match self.plan_planet(planet, cycle, &rules, &mut rng) {
                    Ok(plan) => plans.push(plan),
                    Err(err) => failures.push(TickFailure {
                        planet: planet_id,
                        reason: err.to_string(),
                    }),
                }
            }
        }

        if !failures.is_empty() {
            tracing::warn!(
                target: "empire::tick",
                owner = %owner_id,
                cycle,
                failures = failures.len(),
                "tick.advance.aborted"
            );
            return Err(EmpireError::TickAborted {
                owner: owner_id,
                failures,
            });
        }

        let mut changes = TickChangeset {
            owner,
            planets: Vec::with_capacity(plans.len()),
            projects: Vec::new(),
            events: Vec::new(),
        };
        let mut summary = TickSummary {
            owner: owner_id,
            cycle,
            planets: Vec::with_capacity(plans.len()),
        };
        for plan in plans {
            changes.planets.push(plan.planet);
            changes.projects.extend(plan.projects);
            changes.events.extend(plan.event);
            summary.planets.push(plan.report);
        }
        self.store.commit_tick(changes)?;

        for event in summary.new_crises() {
            tracing::info!(target: "empire::tick", owner = %owner_id, event = %event, "tick.crisis.generated");
        }
        tracing::info!(
            target: "empire::tick",
            owner = %owner_id,
            cycle,
            planets = summary.planets.len(),
            "tick.advance.applied"
        );
        Ok(summary)
    }

    fn plan_planet(
        &self,
        mut planet: Planet,
        cycle: u64,
        rules: &LoyaltyRules,
        rng: &mut SmallRng,
    ) -> Result<PlanetPlan> {
        let loyalty_before = planet.loyalty;

        let produced = production(planet.planet_type, planet.loyalty);
        planet.stock = planet.stock.plus(&produced);

        let mut projects = Vec::new();
        let mut completed_projects = Vec::new();
        let mut installed_upgrades = Vec::new();
        for mut project in self.store.projects_for_planet(planet.id)? {
            if !project.is_active() {
                continue;
            }
            let upgrade = self
                .store
                .upgrade(project.upgrade)?
                .ok_or_else(|| EmpireError::unknown("upgrade", project.upgrade))?;
            if project.contribute(&upgrade.cost, &mut planet.stock, cycle) {
                completed_projects.push(project.id);
                if planet.install(upgrade.id) {
                    installed_upgrades.push(upgrade.id);
                }
            }
            projects.push(project);
        }

        // Only crises left unresolved since an earlier tick weigh on loyalty.
        let unresolved_severity: u32 = self
            .store
            .events_for_planet(planet.id)?
            .iter()
            .filter(|event| !event.resolved)
            .map(|event| u32::from(event.severity))
            .sum();
        let event = roll_crisis(&planet, self.config.crisis_base_chance, cycle, rng);

        let loyalty = next_loyalty(
            planet.loyalty,
            planet.installed_upgrades.len(),
            unresolved_severity,
            rules,
        );
        planet.set_loyalty(loyalty, self.config.rebellion_threshold);

        let report = PlanetTick {
            planet: planet.id,
            name: planet.name.clone(),
            produced,
            completed_projects,
            installed_upgrades,
            new_crisis: event.as_ref().map(|event| event.id),
            loyalty_before,
            loyalty_after: planet.loyalty,
            rebellious: planet.rebellious,
        };
        Ok(PlanetPlan {
            planet,
            projects,
            event,
            report,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use empire_rules::{
        CrisisKind, InMemoryStore, Message, MessageKind, PlanetId, PlanetType, ProjectStatus,
        Resources, Upgrade, UpgradeId, User,
    };
    use std::thread;

    fn calm() -> SimulationConfig {
        SimulationConfig {
            crisis_base_chance: 0.0,
            seed: Some(3),
            ..SimulationConfig::default()
        }
    }

    fn setup(config: SimulationConfig) -> (Arc<InMemoryStore>, TickEngine, UserId) {
        let store = Arc::new(InMemoryStore::new());
        let trader = User::trader("Lucius", "von Valancius", "W-1");
        let owner = trader.id;
        store.save_user(trader).unwrap();
        let engine = TickEngine::new(store.clone(), Arc::new(KeyedLocks::new()), config);
        (store, engine, owner)
    }

    fn add_planet(store: &InMemoryStore, owner: UserId, planet_type: PlanetType) -> PlanetId {
        let planet = Planet::new(owner, format!("{planet_type}-{}", PlanetId::new()), planet_type);
        let id = planet.id;
        store.save_planet(planet).unwrap();
        id
    }

    fn cycle_of(store: &InMemoryStore, owner: UserId) -> u64 {
        store.user(owner).unwrap().unwrap().as_trader().unwrap().cycle
    }

    #[test]
    fn test_gate_blocks_until_completion() {
        let (store, engine, owner) = setup(calm());
        let mut command = Message::new(owner, UserId::new(), MessageKind::UpgradeRequest, "build");
        store.save_message(command.clone()).unwrap();

        let err = engine.advance(owner).unwrap_err();
        assert!(matches!(err, EmpireError::CommandsPending { pending: 1, .. }));
        assert_eq!(cycle_of(&store, owner), 0);

        command.deliver(false);
        store.save_message(command.clone()).unwrap();
        assert!(!engine.can_advance(owner).unwrap());

        command.complete().unwrap();
        store.save_message(command).unwrap();
        assert_eq!(engine.advance(owner).unwrap().cycle, 1);
    }

    #[test]
    fn test_forwarded_hops_gate_their_origin() {
        let (store, engine, owner) = setup(calm());
        let mut original = Message::new(owner, UserId::new(), MessageKind::ResourcesTransfer, "tithe");
        original.deliver(false);
        original.complete().unwrap();
        let forwarded = Message::new(original.receiver, UserId::new(), MessageKind::ResourcesTransfer, "tithe")
            .continuing(&original);
        store.save_message(original).unwrap();
        store.save_message(forwarded).unwrap();

        assert_eq!(engine.pending_commands(owner).unwrap(), 1);
    }

    #[test]
    fn test_owner_status_update_gates_until_completed() {
        let (store, engine, owner) = setup(calm());
        let mut status = Message::new(owner, UserId::new(), MessageKind::StatusUpdate, "fyi");
        store.save_message(status.clone()).unwrap();

        assert!(!engine.can_advance(owner).unwrap());
        assert!(matches!(
            engine.advance(owner),
            Err(EmpireError::CommandsPending { pending: 1, .. })
        ));

        status.deliver(false);
        status.complete().unwrap();
        store.save_message(status).unwrap();
        assert!(engine.can_advance(owner).unwrap());
        engine.advance(owner).unwrap();
    }

    #[test]
    fn test_reports_from_astropaths_never_gate() {
        let (store, engine, owner) = setup(calm());
        let astropath = UserId::new();
        let mut report = Message::new(astropath, owner, MessageKind::StatusUpdate, "done");
        report.deliver(false);
        store.save_message(report).unwrap();

        assert_eq!(engine.pending_commands(owner).unwrap(), 0);
        engine.advance(owner).unwrap();
    }

    #[test]
    fn test_accrual_adds_to_existing_wealth() {
        let (store, engine, owner) = setup(calm());
        let planet = Planet::new(owner, "Footfall", PlanetType::AgriWorld)
            .with_stock(Resources::new(100.0, 0.0, 0.0));
        let planet_id = planet.id;
        store.save_planet(planet).unwrap();

        engine.advance(owner).unwrap();

        let planet = store.planet(planet_id).unwrap().unwrap();
        let produced = production(PlanetType::AgriWorld, 50.0);
        assert_eq!(planet.stock.wealth, 100.0 + produced.wealth);
        assert_eq!(planet.stock.wealth, 112.0);
        assert!((0.0..=100.0).contains(&planet.loyalty));
        assert!(!planet.rebellious);
    }

    #[test]
    fn test_accrual_follows_production() {
        let (store, engine, owner) = setup(calm());
        let planet = add_planet(&store, owner, PlanetType::AgriWorld);

        let summary = engine.advance(owner).unwrap();

        let tick = summary.planet(planet).unwrap();
        assert_eq!(tick.produced, Resources::new(12.0, 4.0, 20.0));
        assert_eq!(store.planet(planet).unwrap().unwrap().stock, tick.produced);
        assert_eq!(summary.total_production(), tick.produced);
        assert_eq!(tick.loyalty_before, 50.0);
        assert_eq!(tick.loyalty_after, 50.0);
    }

    #[test]
    fn test_project_completes_and_installs() {
        let (store, engine, owner) = setup(calm());
        let planet = add_planet(&store, owner, PlanetType::AgriWorld);
        let upgrade = Upgrade::new("Grain silo", PlanetType::AgriWorld, Resources::new(10.0, 2.0, 5.0));
        let project = Project::new(planet, upgrade.id, 0);
        let (upgrade_id, project_id) = (upgrade.id, project.id);
        store.save_upgrade(upgrade).unwrap();
        store.save_project(project).unwrap();

        let summary = engine.advance(owner).unwrap();

        let tick = summary.planet(planet).unwrap();
        assert_eq!(tick.completed_projects, vec![project_id]);
        assert_eq!(tick.installed_upgrades, vec![upgrade_id]);
        let stored = store.planet(planet).unwrap().unwrap();
        assert_eq!(stored.stock, Resources::new(2.0, 2.0, 15.0));
        assert!(stored.has_upgrade(upgrade_id));
        assert_eq!(stored.loyalty, 51.0);
        let project = store.project(project_id).unwrap().unwrap();
        assert_eq!(project.status, ProjectStatus::Completed);
        assert_eq!(project.completed_cycle, Some(1));
    }

    #[test]
    fn test_expensive_project_spans_ticks() {
        let (store, engine, owner) = setup(calm());
        let planet = add_planet(&store, owner, PlanetType::AgriWorld);
        let upgrade = Upgrade::new("Orbital dock", PlanetType::AgriWorld, Resources::new(30.0, 0.0, 0.0));
        let project = Project::new(planet, upgrade.id, 0);
        let project_id = project.id;
        store.save_upgrade(upgrade).unwrap();
        store.save_project(project).unwrap();

        engine.advance(owner).unwrap();
        engine.advance(owner).unwrap();
        let project = store.project(project_id).unwrap().unwrap();
        assert_eq!(project.status, ProjectStatus::InProgress);
        assert_eq!(project.contributed.wealth, 24.0);

        let summary = engine.advance(owner).unwrap();
        assert_eq!(summary.planet(planet).unwrap().completed_projects, vec![project_id]);
        assert_eq!(store.planet(planet).unwrap().unwrap().stock.wealth, 6.0);
    }

    #[test]
    fn test_unresolved_crises_drag_loyalty() {
        let (store, engine, owner) = setup(calm());
        let planet = Planet::new(owner, "Dross", PlanetType::HiveWorld).with_loyalty(80.0);
        let planet_id = planet.id;
        store.save_planet(planet).unwrap();
        store
            .save_event(CrisisEvent::new(planet_id, CrisisKind::Insurrection, 10, "riots", 0))
            .unwrap();

        engine.advance(owner).unwrap();

        let loyalty = store.planet(planet_id).unwrap().unwrap().loyalty;
        assert!((loyalty - 72.0).abs() < 1e-9, "loyalty {loyalty}");
    }

    #[test]
    fn test_low_loyalty_flags_rebellion() {
        let (store, engine, owner) = setup(calm());
        let planet = Planet::new(owner, "Vexilla", PlanetType::FeudalWorld).with_loyalty(20.0);
        let planet_id = planet.id;
        store.save_planet(planet).unwrap();

        let summary = engine.advance(owner).unwrap();

        assert!(summary.planet(planet_id).unwrap().rebellious);
        assert!(store.planet(planet_id).unwrap().unwrap().rebellious);
    }

    #[test]
    fn test_disloyal_world_generates_crisis() {
        let config = SimulationConfig {
            crisis_base_chance: 1.0,
            seed: Some(9),
            ..SimulationConfig::default()
        };
        let (store, engine, owner) = setup(config);
        let restless = Planet::new(owner, "Restless", PlanetType::DeathWorld).with_loyalty(0.0);
        let devoted = Planet::new(owner, "Devoted", PlanetType::CivilizedWorld).with_loyalty(100.0);
        let (restless_id, devoted_id) = (restless.id, devoted.id);
        store.save_planet(restless).unwrap();
        store.save_planet(devoted).unwrap();

        let summary = engine.advance(owner).unwrap();

        let event_id = summary.planet(restless_id).unwrap().new_crisis.unwrap();
        let event = store.event(event_id).unwrap().unwrap();
        assert_eq!(event.planet, restless_id);
        assert_eq!(event.occurred_cycle, 1);
        assert!((1..=10).contains(&event.severity));
        assert!(!event.resolved);
        assert!(summary.planet(devoted_id).unwrap().new_crisis.is_none());
        assert_eq!(summary.new_crises().count(), 1);
    }

    #[test]
    fn test_failure_rolls_back_every_planet() {
        let (store, engine, owner) = setup(calm());
        let healthy = add_planet(&store, owner, PlanetType::ForgeWorld);
        let broken = add_planet(&store, owner, PlanetType::MiningWorld);
        store
            .save_project(Project::new(broken, UpgradeId::new(), 0))
            .unwrap();

        let err = engine.advance(owner).unwrap_err();

        match err {
            EmpireError::TickAborted { owner: who, failures } => {
                assert_eq!(who, owner);
                assert_eq!(failures.len(), 1);
                assert_eq!(failures[0].planet, broken);
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(store.planet(healthy).unwrap().unwrap().stock, Resources::ZERO);
        assert_eq!(store.planet(broken).unwrap().unwrap().stock, Resources::ZERO);
        assert_eq!(cycle_of(&store, owner), 0);
    }

    #[test]
    fn test_only_traders_advance() {
        let (store, engine, _) = setup(calm());
        let astropath = User::astropath("Idira", 5);
        let astropath_id = astropath.id;
        store.save_user(astropath).unwrap();

        assert!(matches!(
            engine.advance(astropath_id),
            Err(EmpireError::InvalidReference(_))
        ));
        assert!(matches!(
            engine.advance(UserId::new()),
            Err(EmpireError::InvalidReference(_))
        ));
    }

    #[test]
    fn test_concurrent_advances_serialize() {
        let (store, engine, owner) = setup(calm());
        let planet = add_planet(&store, owner, PlanetType::AgriWorld);
        let engine = Arc::new(engine);

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let engine = engine.clone();
                thread::spawn(move || {
                    for _ in 0..10 {
                        engine.advance(owner).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert_eq!(cycle_of(&store, owner), 40);
        assert_eq!(store.planet(planet).unwrap().unwrap().stock.wealth, 480.0);
    }
}
