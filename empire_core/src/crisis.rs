//! Crisis settlement and manual crisis creation.
//!
//! Settling mutates a planet, so it runs under the owning trader's lock and
//! never interleaves with that trader's tick.

use std::sync::Arc;

use empire_rules::{
    settle_crisis, CrisisAction, CrisisEvent, CrisisKind, CrisisOutcome, EntityStore, EventId,
    Planet, PlanetId, Resources, UserId,
};

use crate::error::{EmpireError, Result};
use crate::locks::KeyedLocks;

/// What a settlement attempt did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Settlement {
    Applied(CrisisOutcome),
    /// The event had already been resolved; nothing changed.
    AlreadyResolved,
}

pub struct CrisisDesk {
    store: Arc<dyn EntityStore>,
    owner_locks: Arc<KeyedLocks<UserId>>,
    rebellion_threshold: f64,
}

impl CrisisDesk {
    pub fn new(
        store: Arc<dyn EntityStore>,
        owner_locks: Arc<KeyedLocks<UserId>>,
        rebellion_threshold: f64,
    ) -> Self {
        Self {
            store,
            owner_locks,
            rebellion_threshold,
        }
    }

    /// Resolve `event` with `action`, exactly once.
    ///
    /// `offered` is what the owner commits to a HELP response; it is ignored
    /// for IGNORE.
    pub fn settle(
        &self,
        event_id: EventId,
        action: CrisisAction,
        offered: &Resources,
    ) -> Result<Settlement> {
        if !offered.is_valid() {
            return Err(EmpireError::InvalidPayload(format!(
                "crisis offer {offered:?} must be finite and non-negative"
            )));
        }
        let owner = {
            let event = self.load_event(event_id)?;
            self.load_planet(event.planet)?.owner
        };

        let _guard = self.owner_locks.lock(owner);

        let mut event = self.load_event(event_id)?;
        if event.resolved {
            tracing::debug!(
                target: "empire::crisis",
                event = %event_id,
                "crisis.settle.replayed"
            );
            return Ok(Settlement::AlreadyResolved);
        }
        let mut planet = self.load_planet(event.planet)?;
        let outcome = settle_crisis(
            &mut planet,
            &event,
            action,
            offered,
            self.rebellion_threshold,
        );
        event.resolve(action);

        tracing::info!(
            target: "empire::crisis",
            event = %event_id,
            planet = %planet.id,
            action = ?action,
            loyalty_delta = outcome.loyalty_delta,
            rebellious = planet.rebellious,
            "crisis.settle.applied"
        );
        self.store.commit_settlement(planet, event)?;
        Ok(Settlement::Applied(outcome))
    }

    /// Raise a crisis by hand. The description defaults to the kind's own.
    pub fn create_event(
        &self,
        planet_id: PlanetId,
        kind: CrisisKind,
        severity: u8,
        description: Option<String>,
    ) -> Result<EventId> {
        if !(1..=10).contains(&severity) {
            return Err(EmpireError::InvalidPayload(format!(
                "crisis severity {severity} outside 1-10"
            )));
        }
        let planet = self
            .store
            .planet(planet_id)?
            .ok_or_else(|| EmpireError::unknown("planet", planet_id))?;
        let cycle = self
            .store
            .user(planet.owner)?
            .and_then(|owner| owner.as_trader().map(|trader| trader.cycle))
            .unwrap_or(0);

        let description = description.unwrap_or_else(|| kind.describe(&planet.name));
        let event = CrisisEvent::new(planet.id, kind, severity, description, cycle);
        let id = event.id;
        self.store.save_event(event)?;

        tracing::info!(
            target: "empire::crisis",
            event = %id,
            planet = %planet.id,
            kind = ?kind,
            severity,
            "crisis.created"
        );
        Ok(id)
    }

    pub fn event(&self, event_id: EventId) -> Result<CrisisEvent> {
        self.load_event(event_id)
    }

    pub fn events_for_planet(&self, planet: PlanetId) -> Result<Vec<CrisisEvent>> {
        Ok(self.store.events_for_planet(planet)?)
    }

    /// Unresolved events on `planet`.
    pub fn active_events(&self, planet: PlanetId) -> Result<Vec<CrisisEvent>> {
        Ok(self
            .store
            .events_for_planet(planet)?
            .into_iter()
            .filter(|event| !event.resolved)
            .collect())
    }

    fn load_event(&self, id: EventId) -> Result<CrisisEvent> {
        self.store
            .event(id)?
            .ok_or_else(|| EmpireError::not_found("crisis event", id))
    }

    fn load_planet(&self, id: PlanetId) -> Result<Planet> {
        self.store
            .planet(id)?
            .ok_or_else(|| EmpireError::unknown("planet", id))
    }
}
