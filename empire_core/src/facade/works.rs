//! Construction projects and warp routes.

use empire_rules::{
    route_is_stable, PlanetId, Project, ProjectId, ProjectStatus, Route, RouteId, UpgradeId,
    UserId,
};
use serde::{Deserialize, Serialize};

use super::EmpireFacade;
use crate::error::{EmpireError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NavigatorStats {
    pub routes: usize,
    pub stable_routes: usize,
    pub commands_received: usize,
    pub commands_completed: usize,
    pub commands_pending: usize,
}

impl EmpireFacade {
    /// Whether `upgrade` may be started on `planet` right now.
    pub fn can_install_upgrade(&self, planet: PlanetId, upgrade: UpgradeId) -> Result<bool> {
        Ok(self.installability(planet, upgrade)?.is_ok())
    }

    pub fn start_project(&self, planet: PlanetId, upgrade: UpgradeId) -> Result<ProjectId> {
        self.begin_project(planet, upgrade, false)
    }

    /// Stop an in-progress project. Contributions are not refunded.
    pub fn cancel_project(&self, project_id: ProjectId) -> Result<Project> {
        let planet = self
            .store
            .project(project_id)?
            .ok_or_else(|| EmpireError::not_found("project", project_id))?
            .planet;
        let owner = self.load_planet(planet)?.owner;
        self.owner_locks.with(owner, || {
            let mut project = self
                .store
                .project(project_id)?
                .ok_or_else(|| EmpireError::not_found("project", project_id))?;
            if project.status != ProjectStatus::InProgress {
                return Err(EmpireError::InvalidState(format!(
                    "project {project_id} is {:?}",
                    project.status
                )));
            }
            project.status = ProjectStatus::Cancelled;
            self.store.save_project(project.clone())?;
            tracing::info!(target: "empire::facade", project = %project_id, "project.cancelled");
            Ok(project)
        })
    }

    pub fn projects_for_planet(&self, planet: PlanetId) -> Result<Vec<Project>> {
        Ok(self.store.projects_for_planet(planet)?)
    }

    /// Start a project, or with `reuse_active` hand back the one already
    /// building the same upgrade.
    pub(super) fn begin_project(
        &self,
        planet_id: PlanetId,
        upgrade_id: UpgradeId,
        reuse_active: bool,
    ) -> Result<ProjectId> {
        let owner = self.load_planet(planet_id)?.owner;
        self.owner_locks.with(owner, || {
            if reuse_active {
                let existing = self
                    .store
                    .projects_for_planet(planet_id)?
                    .into_iter()
                    .find(|project| project.is_active() && project.upgrade == upgrade_id);
                if let Some(project) = existing {
                    return Ok(project.id);
                }
            }
            self.installability(planet_id, upgrade_id)??;

            let cycle = self
                .store
                .user(owner)?
                .and_then(|user| user.as_trader().map(|trader| trader.cycle))
                .unwrap_or(0);
            let project = Project::new(planet_id, upgrade_id, cycle);
            let id = project.id;
            self.store.save_project(project)?;
            tracing::info!(
                target: "empire::facade",
                planet = %planet_id,
                upgrade = %upgrade_id,
                project = %id,
                "project.started"
            );
            Ok(id)
        })
    }

    /// Outer error: lookups failed. Inner error: the upgrade may not start.
    fn installability(
        &self,
        planet_id: PlanetId,
        upgrade_id: UpgradeId,
    ) -> Result<std::result::Result<(), EmpireError>> {
        let planet = self.load_planet(planet_id)?;
        let upgrade = self.load_upgrade(upgrade_id)?;
        if !upgrade.suits(&planet) {
            return Ok(Err(EmpireError::InvalidPayload(format!(
                "{} is meant for a {}, not a {}",
                upgrade.name, upgrade.suitable_type, planet.planet_type
            ))));
        }
        if planet.has_upgrade(upgrade_id) {
            return Ok(Err(EmpireError::InvalidState(format!(
                "{} is already installed on {}",
                upgrade.name, planet.name
            ))));
        }
        let building = self
            .store
            .projects_for_planet(planet_id)?
            .iter()
            .any(|project| project.is_active() && project.upgrade == upgrade_id);
        if building {
            return Ok(Err(EmpireError::InvalidState(format!(
                "{} is already under construction on {}",
                upgrade.name, planet.name
            ))));
        }
        Ok(Ok(()))
    }

    /// Lay a warp route. Only one route may join two planets, whichever way.
    pub fn lay_route(&self, navigator: UserId, from: PlanetId, to: PlanetId) -> Result<RouteId> {
        self.chart_route(navigator, from, to, false)
    }

    pub(super) fn chart_route(
        &self,
        navigator_id: UserId,
        from: PlanetId,
        to: PlanetId,
        reuse_own: bool,
    ) -> Result<RouteId> {
        if from == to {
            return Err(EmpireError::InvalidPayload(format!(
                "a route cannot start and end at {from}"
            )));
        }
        let navigator = self.load_user(navigator_id)?;
        let skill = navigator
            .as_navigator()
            .map(|profile| profile.skill)
            .ok_or_else(|| EmpireError::not_authorized(navigator_id, "only navigators lay routes"))?;
        self.load_planet(from)?;
        self.load_planet(to)?;

        let _guard = self.route_lock.lock();
        if let Some(existing) = self
            .store
            .routes()?
            .into_iter()
            .find(|route| route.connects(from, to))
        {
            if reuse_own && existing.navigator == navigator_id {
                return Ok(existing.id);
            }
            return Err(EmpireError::InvalidState(format!(
                "route {} already joins {from} and {to}",
                existing.id
            )));
        }

        let route = Route::new(from, to, navigator_id, route_is_stable(skill));
        let id = route.id;
        tracing::info!(
            target: "empire::facade",
            route = %id,
            navigator = %navigator_id,
            stable = route.stable,
            "route.laid"
        );
        self.store.save_route(route)?;
        Ok(id)
    }

    pub fn routes_for_navigator(&self, navigator: UserId) -> Result<Vec<Route>> {
        Ok(self
            .store
            .routes()?
            .into_iter()
            .filter(|route| route.navigator == navigator)
            .collect())
    }

    /// Routes that touch any planet `trader` holds.
    pub fn routes_for_trader(&self, trader: UserId) -> Result<Vec<Route>> {
        let planets: Vec<PlanetId> = self
            .store
            .planets_owned_by(trader)?
            .into_iter()
            .map(|planet| planet.id)
            .collect();
        Ok(self
            .store
            .routes()?
            .into_iter()
            .filter(|route| planets.iter().any(|planet| route.touches(*planet)))
            .collect())
    }

    pub fn route_stability(&self, route: RouteId) -> Result<bool> {
        Ok(self
            .store
            .route(route)?
            .ok_or_else(|| EmpireError::not_found("route", route))?
            .stable)
    }

    pub fn navigator_stats(&self, navigator: UserId) -> Result<NavigatorStats> {
        let routes = self.routes_for_navigator(navigator)?;
        let mut stats = NavigatorStats {
            routes: routes.len(),
            stable_routes: routes.iter().filter(|route| route.stable).count(),
            ..NavigatorStats::default()
        };
        for message in self.store.messages_for_user(navigator)? {
            if message.receiver != navigator || !message.kind.is_command() {
                continue;
            }
            stats.commands_received += 1;
            if message.completed() {
                stats.commands_completed += 1;
            } else {
                stats.commands_pending += 1;
            }
        }
        Ok(stats)
    }
}
