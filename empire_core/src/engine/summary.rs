use empire_rules::{EventId, PlanetId, ProjectId, Resources, UpgradeId, UserId};
use serde::{Deserialize, Serialize};

/// What one tick did to an owner's empire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickSummary {
    pub owner: UserId,
    /// The owner's cycle counter after this tick.
    pub cycle: u64,
    pub planets: Vec<PlanetTick>,
}

impl TickSummary {
    pub fn total_production(&self) -> Resources {
        self.planets
            .iter()
            .fold(Resources::ZERO, |total, tick| total.plus(&tick.produced))
    }

    pub fn new_crises(&self) -> impl Iterator<Item = EventId> + '_ {
        self.planets.iter().filter_map(|tick| tick.new_crisis)
    }

    pub fn planet(&self, planet: PlanetId) -> Option<&PlanetTick> {
        self.planets.iter().find(|tick| tick.planet == planet)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanetTick {
    pub planet: PlanetId,
    pub name: String,
    pub produced: Resources,
    pub completed_projects: Vec<ProjectId>,
    pub installed_upgrades: Vec<UpgradeId>,
    pub new_crisis: Option<EventId>,
    pub loyalty_before: f64,
    pub loyalty_after: f64,
    pub rebellious: bool,
}
