//! Game mechanics: production, loyalty drift, crisis generation and
//! settlement, route stability and warp distortion.

mod distortion;

pub use distortion::*;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::entities::{CrisisAction, CrisisEvent, CrisisKind, Planet, PlanetType, Resources};

/// Navigation skill from which a navigator's routes hold steady.
pub const STABLE_ROUTE_SKILL: u8 = 4;

/// Base yield of a planet type per cycle at loyalty 50.
pub fn base_yield(planet_type: PlanetType) -> Resources {
    match planet_type {
        PlanetType::AgriWorld => Resources::new(12.0, 4.0, 20.0),
        PlanetType::CivilizedWorld => Resources::new(18.0, 10.0, 6.0),
        PlanetType::DeathWorld => Resources::new(4.0, 2.0, 16.0),
        PlanetType::FeudalWorld => Resources::new(8.0, 3.0, 10.0),
        PlanetType::ForgeWorld => Resources::new(10.0, 24.0, 4.0),
        PlanetType::HiveWorld => Resources::new(20.0, 14.0, 2.0),
        PlanetType::MiningWorld => Resources::new(6.0, 8.0, 24.0),
    }
}

/// Loyalty multiplier on production: 0.5 at loyalty 0, 1.0 at 50, 1.5 at 100.
pub fn loyalty_factor(loyalty: f64) -> f64 {
    0.5 + loyalty.clamp(0.0, 100.0) / 100.0
}

/// Per-cycle production of a planet. Deterministic in type and loyalty.
pub fn production(planet_type: PlanetType, loyalty: f64) -> Resources {
    let base = base_yield(planet_type);
    let factor = loyalty_factor(loyalty);
    Resources {
        wealth: base.wealth * factor,
        industry: base.industry * factor,
        resources: base.resources * factor,
    }
}

/// Tunables for loyalty drift.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LoyaltyRules {
    /// Loyalty drifts toward this value.
    pub baseline: f64,
    /// Fraction of the gap to the baseline closed each cycle.
    pub drift_rate: f64,
    /// Loyalty gained per installed upgrade each cycle.
    pub upgrade_bonus: f64,
    /// Loyalty lost per point of unresolved crisis severity each cycle.
    pub crisis_penalty: f64,
}

impl Default for LoyaltyRules {
    fn default() -> Self {
        Self {
            baseline: 50.0,
            drift_rate: 0.10,
            upgrade_bonus: 1.0,
            crisis_penalty: 0.5,
        }
    }
}

/// Loyalty after one cycle of drift, clamped to [0, 100].
pub fn next_loyalty(
    current: f64,
    installed_upgrades: usize,
    unresolved_severity: u32,
    rules: &LoyaltyRules,
) -> f64 {
    let drift = (rules.baseline - current) * rules.drift_rate;
    let support = installed_upgrades as f64 * rules.upgrade_bonus;
    let unrest = unresolved_severity as f64 * rules.crisis_penalty;
    (current + drift + support - unrest).clamp(0.0, 100.0)
}

/// Chance a planet suffers a new crisis this cycle. Lower loyalty, higher chance.
pub fn crisis_chance(loyalty: f64, base_chance: f64) -> f64 {
    ((100.0 - loyalty.clamp(0.0, 100.0)) / 100.0 * base_chance).clamp(0.0, 1.0)
}

/// Roll for a new crisis on `planet`.
pub fn roll_crisis<R: Rng + ?Sized>(
    planet: &Planet,
    base_chance: f64,
    cycle: u64,
    rng: &mut R,
) -> Option<CrisisEvent> {
    if !rng.gen_bool(crisis_chance(planet.loyalty, base_chance)) {
        return None;
    }
    let kind = CrisisKind::ALL[rng.gen_range(0..CrisisKind::ALL.len())];
    let severity = rng.gen_range(1..=10);
    Some(CrisisEvent::new(
        planet.id,
        kind,
        severity,
        kind.describe(&planet.name),
        cycle,
    ))
}

/// Effect of settling a crisis on its planet.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CrisisOutcome {
    pub action: CrisisAction,
    pub loyalty_delta: f64,
    /// Resources taken from the planet's stock.
    pub spent: Resources,
}

/// Apply an owner's decision on `event` to `planet`.
///
/// HELP spends what was offered (as far as the stock allows) and raises
/// loyalty; IGNORE lowers loyalty and costs raw resources.
pub fn settle_crisis(
    planet: &mut Planet,
    event: &CrisisEvent,
    action: CrisisAction,
    offered: &Resources,
    rebellion_threshold: f64,
) -> CrisisOutcome {
    let severity = event.severity as f64;
    let (loyalty_delta, spent) = match action {
        CrisisAction::Help => {
            let spent = offered.min(&planet.stock);
            let relief = (spent.wealth + spent.industry + spent.resources) / 50.0;
            (severity * 1.5 + relief, spent)
        }
        CrisisAction::Ignore => {
            let lost = Resources::new(0.0, 0.0, severity * 5.0).min(&planet.stock);
            (-severity * 2.0, lost)
        }
    };

    let before = planet.loyalty;
    planet.stock = planet.stock.saturating_minus(&spent);
    planet.set_loyalty(before + loyalty_delta, rebellion_threshold);

    CrisisOutcome {
        action,
        loyalty_delta: planet.loyalty - before,
        spent,
    }
}

/// Whether a route laid by a navigator of the given skill is stable.
pub fn route_is_stable(skill: u8) -> bool {
    skill >= STABLE_ROUTE_SKILL
}
