//! Planets and everything attached to them: upgrades, projects, crises, routes.

use serde::{Deserialize, Serialize};

use super::{EventId, PlanetId, ProjectId, Resources, RouteId, UpgradeId, UserId};

/// Loyalty of a newly settled planet.
pub const DEFAULT_LOYALTY: f64 = 50.0;

/// World archetypes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PlanetType {
    AgriWorld,
    CivilizedWorld,
    DeathWorld,
    FeudalWorld,
    ForgeWorld,
    HiveWorld,
    MiningWorld,
}

impl PlanetType {
    pub const ALL: [PlanetType; 7] = [
        PlanetType::AgriWorld,
        PlanetType::CivilizedWorld,
        PlanetType::DeathWorld,
        PlanetType::FeudalWorld,
        PlanetType::ForgeWorld,
        PlanetType::HiveWorld,
        PlanetType::MiningWorld,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PlanetType::AgriWorld => "AGRI_WORLD",
            PlanetType::CivilizedWorld => "CIVILIZED_WORLD",
            PlanetType::DeathWorld => "DEATH_WORLD",
            PlanetType::FeudalWorld => "FEUDAL_WORLD",
            PlanetType::ForgeWorld => "FORGE_WORLD",
            PlanetType::HiveWorld => "HIVE_WORLD",
            PlanetType::MiningWorld => "MINING_WORLD",
        }
    }
}

impl std::fmt::Display for PlanetType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A planet held by a rogue trader.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Planet {
    pub id: PlanetId,
    pub owner: UserId,
    pub name: String,
    pub planet_type: PlanetType,
    /// 0.0 - 100.0.
    pub loyalty: f64,
    /// Wealth, industry and raw resources held on the planet.
    pub stock: Resources,
    /// Derived from loyalty; see [`Planet::refresh_rebellion`].
    pub rebellious: bool,
    /// Upgrades whose construction has completed, in installation order.
    pub installed_upgrades: Vec<UpgradeId>,
}

impl Planet {
    /// Create a planet with default loyalty and an empty stock.
    pub fn new(owner: UserId, name: impl Into<String>, planet_type: PlanetType) -> Self {
        Self {
            id: PlanetId::new(),
            owner,
            name: name.into(),
            planet_type,
            loyalty: DEFAULT_LOYALTY,
            stock: Resources::ZERO,
            rebellious: false,
            installed_upgrades: Vec::new(),
        }
    }

    /// Set the loyalty (clamped).
    pub fn with_loyalty(mut self, loyalty: f64) -> Self {
        self.loyalty = loyalty.clamp(0.0, 100.0);
        self
    }

    /// Set the initial stock.
    pub fn with_stock(mut self, stock: Resources) -> Self {
        self.stock = stock;
        self
    }

    /// Clamp loyalty into range and recompute the rebellious flag.
    pub fn set_loyalty(&mut self, loyalty: f64, rebellion_threshold: f64) {
        self.loyalty = if loyalty.is_nan() {
            0.0
        } else {
            loyalty.clamp(0.0, 100.0)
        };
        self.refresh_rebellion(rebellion_threshold);
    }

    /// A planet is rebellious while its loyalty sits below the threshold.
    pub fn refresh_rebellion(&mut self, rebellion_threshold: f64) {
        self.rebellious = self.loyalty < rebellion_threshold;
    }

    pub fn has_upgrade(&self, upgrade: UpgradeId) -> bool {
        self.installed_upgrades.contains(&upgrade)
    }

    /// Record an installed upgrade. Returns false if it was already installed.
    pub fn install(&mut self, upgrade: UpgradeId) -> bool {
        if self.has_upgrade(upgrade) {
            return false;
        }
        self.installed_upgrades.push(upgrade);
        true
    }
}

/// Catalog entry for a planetary upgrade. Immutable at runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Upgrade {
    pub id: UpgradeId,
    pub name: String,
    pub description: String,
    pub suitable_type: PlanetType,
    pub cost: Resources,
}

impl Upgrade {
    pub fn new(name: impl Into<String>, suitable_type: PlanetType, cost: Resources) -> Self {
        Self {
            id: UpgradeId::new(),
            name: name.into(),
            description: String::new(),
            suitable_type,
            cost,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn suits(&self, planet: &Planet) -> bool {
        self.suitable_type == planet.planet_type
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProjectStatus {
    InProgress,
    Completed,
    Cancelled,
}

/// Construction of an upgrade on a planet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub planet: PlanetId,
    pub upgrade: UpgradeId,
    pub status: ProjectStatus,
    /// Cumulative resources already sunk into construction.
    pub contributed: Resources,
    pub started_cycle: u64,
    pub completed_cycle: Option<u64>,
}

impl Project {
    pub fn new(planet: PlanetId, upgrade: UpgradeId, started_cycle: u64) -> Self {
        Self {
            id: ProjectId::new(),
            planet,
            upgrade,
            status: ProjectStatus::InProgress,
            contributed: Resources::ZERO,
            started_cycle,
            completed_cycle: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ProjectStatus::InProgress
    }

    /// What is still owed toward `cost`.
    pub fn remaining(&self, cost: &Resources) -> Resources {
        cost.saturating_minus(&self.contributed)
    }

    /// Move as much of `stock` as is still owed into the project.
    ///
    /// Returns true when this contribution completed the project.
    pub fn contribute(&mut self, cost: &Resources, stock: &mut Resources, cycle: u64) -> bool {
        if !self.is_active() {
            return false;
        }
        let spent = self.remaining(cost).min(stock);
        *stock = stock.saturating_minus(&spent);
        self.contributed = self.contributed.plus(&spent);

        if self.contributed.covers(cost) {
            self.status = ProjectStatus::Completed;
            self.completed_cycle = Some(cycle);
            true
        } else {
            false
        }
    }
}

/// Kinds of crisis a planet may suffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrisisKind {
    Insurrection,
    NaturalDisaster,
    EconomicCrisis,
    ExternalThreat,
}

impl CrisisKind {
    pub const ALL: [CrisisKind; 4] = [
        CrisisKind::Insurrection,
        CrisisKind::NaturalDisaster,
        CrisisKind::EconomicCrisis,
        CrisisKind::ExternalThreat,
    ];

    /// Narrative description for a crisis of this kind on the named planet.
    pub fn describe(&self, planet_name: &str) -> String {
        match self {
            CrisisKind::Insurrection => {
                format!("Insurrection on {planet_name}! The populace demands change.")
            }
            CrisisKind::NaturalDisaster => {
                format!("Natural disaster on {planet_name}! Aid is required.")
            }
            CrisisKind::EconomicCrisis => {
                format!("Economic crisis on {planet_name}! Trade has stalled.")
            }
            CrisisKind::ExternalThreat => {
                format!("External threat to {planet_name}! Defence is required.")
            }
        }
    }
}

/// An owner's decision on a crisis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CrisisAction {
    Help,
    Ignore,
}

/// A crisis on a planet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrisisEvent {
    pub id: EventId,
    pub planet: PlanetId,
    pub kind: CrisisKind,
    /// 1-10.
    pub severity: u8,
    pub description: String,
    pub resolved: bool,
    /// The decision that resolved the event, once resolved.
    pub resolution: Option<CrisisAction>,
    pub occurred_cycle: u64,
}

impl CrisisEvent {
    pub fn new(
        planet: PlanetId,
        kind: CrisisKind,
        severity: u8,
        description: impl Into<String>,
        occurred_cycle: u64,
    ) -> Self {
        Self {
            id: EventId::new(),
            planet,
            kind,
            severity: severity.clamp(1, 10),
            description: description.into(),
            resolved: false,
            resolution: None,
            occurred_cycle,
        }
    }

    /// Resolve the event. Returns false if it had already been resolved.
    pub fn resolve(&mut self, action: CrisisAction) -> bool {
        if self.resolved {
            return false;
        }
        self.resolved = true;
        self.resolution = Some(action);
        true
    }
}

/// A directed warp route between two planets, laid by a navigator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Route {
    pub id: RouteId,
    pub from: PlanetId,
    pub to: PlanetId,
    pub navigator: UserId,
    pub stable: bool,
}

impl Route {
    pub fn new(from: PlanetId, to: PlanetId, navigator: UserId, stable: bool) -> Self {
        Self {
            id: RouteId::new(),
            from,
            to,
            navigator,
            stable,
        }
    }

    /// True if the route joins `a` and `b`, in either direction.
    pub fn connects(&self, a: PlanetId, b: PlanetId) -> bool {
        (self.from == a && self.to == b) || (self.from == b && self.to == a)
    }

    pub fn touches(&self, planet: PlanetId) -> bool {
        self.from == planet || self.to == planet
    }
}
