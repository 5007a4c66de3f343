//! Issuing commands through the relay and carrying them out at the far end.

use empire_rules::{
    CommandId, CrisisAction, Directive, EventId, MessageId, MessageKind, Planet, PlanetId,
    ProjectId, Resources, RoleKind, RouteId, UpgradeId, User, UserId,
};
use serde::{Deserialize, Serialize};

use super::EmpireFacade;
use crate::error::{EmpireError, Result};
use crate::relay::DispatchRequest;

/// What carrying out a command did.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Execution {
    ProjectStarted(ProjectId),
    RouteLaid(RouteId),
    /// Settlement happens as the message completes.
    CrisisSettled(EventId),
    /// What actually left the planet, after clamping to its stock.
    ResourcesTransferred(Resources),
    Acknowledged,
    /// The message was already completed; nothing was done.
    AlreadyCompleted,
}

impl EmpireFacade {
    /// Order an upgrade built on one of `trader`'s planets.
    pub fn order_upgrade(
        &self,
        trader: UserId,
        astropath: UserId,
        planet_id: PlanetId,
        upgrade_id: UpgradeId,
    ) -> Result<MessageId> {
        let planet = self.owned_planet(trader, planet_id)?;
        let upgrade = self.load_upgrade(upgrade_id)?;
        let request = DispatchRequest::new(
            trader,
            astropath,
            MessageKind::UpgradeRequest,
            format!("Construct {} on {}", upgrade.name, planet.name),
        )
        .with_directive(Directive::InstallUpgrade {
            planet: planet_id,
            upgrade: upgrade_id,
        });
        self.issue(request)
    }

    pub fn order_route(
        &self,
        trader: UserId,
        astropath: UserId,
        from: PlanetId,
        to: PlanetId,
    ) -> Result<MessageId> {
        let origin = self.owned_planet(trader, from)?;
        let destination = self.load_planet(to)?;
        let request = DispatchRequest::new(
            trader,
            astropath,
            MessageKind::NavigationRequest,
            format!("Chart a route from {} to {}", origin.name, destination.name),
        )
        .with_directive(Directive::LayRoute { from, to });
        self.issue(request)
    }

    /// Send the owner's decision on a crisis to the planet's governor.
    ///
    /// The event resolves when the governor completes the message.
    pub fn resolve_crisis(
        &self,
        trader: UserId,
        astropath: UserId,
        event_id: EventId,
        action: CrisisAction,
        offered: Resources,
    ) -> Result<MessageId> {
        let event = self.crisis.event(event_id)?;
        let planet = self.owned_planet(trader, event.planet)?;
        if event.resolved {
            return Err(EmpireError::InvalidState(format!(
                "crisis {event_id} on {} is already resolved",
                planet.name
            )));
        }
        let verb = match action {
            CrisisAction::Help => "Send aid to",
            CrisisAction::Ignore => "Leave to its fate",
        };
        let request = DispatchRequest::new(
            trader,
            astropath,
            MessageKind::CrisisResponse,
            format!("{verb} {}: {}", planet.name, event.description),
        )
        .with_resources(offered)
        .with_directive(Directive::ResolveCrisis {
            event: event_id,
            action,
        });
        self.issue(request)
    }

    /// Call in `amount` from a planet's stock to its owner's treasury.
    pub fn order_transfer(
        &self,
        trader: UserId,
        astropath: UserId,
        planet_id: PlanetId,
        amount: Resources,
    ) -> Result<MessageId> {
        let planet = self.owned_planet(trader, planet_id)?;
        let request = DispatchRequest::new(
            trader,
            astropath,
            MessageKind::ResourcesTransfer,
            format!("Tithe from {}", planet.name),
        )
        .with_resources(amount)
        .with_directive(Directive::TransferResources { planet: planet_id });
        self.issue(request)
    }

    /// Carry out a delivered command as its receiver, then complete it.
    ///
    /// Duplicate calls for one message are serialized; once the message is
    /// completed further calls do nothing.
    pub fn execute_command(&self, executor_id: UserId, message_id: MessageId) -> Result<Execution> {
        let _guard = self.executions.lock(message_id);

        let message = self.relay.message(message_id)?;
        if message.receiver != executor_id {
            return Err(EmpireError::not_authorized(
                executor_id,
                format!("message {message_id} is addressed to {}", message.receiver),
            ));
        }
        if message.completed() {
            return Ok(Execution::AlreadyCompleted);
        }
        if !message.delivered() {
            return Err(EmpireError::InvalidState(format!(
                "message {message_id} has not been delivered"
            )));
        }
        let executor = self.load_user(executor_id)?;

        let execution = match (message.kind, message.directive) {
            (MessageKind::StatusUpdate, _) => Execution::Acknowledged,
            (
                MessageKind::UpgradeRequest,
                Some(Directive::InstallUpgrade { planet, upgrade }),
            ) => {
                self.ensure_administers(&executor, planet)?;
                Execution::ProjectStarted(self.begin_project(planet, upgrade, true)?)
            }
            (MessageKind::NavigationRequest, Some(Directive::LayRoute { from, to })) => {
                Execution::RouteLaid(self.chart_route(executor_id, from, to, true)?)
            }
            (MessageKind::CrisisResponse, Some(Directive::ResolveCrisis { event, .. })) => {
                let planet = self.crisis.event(event)?.planet;
                self.ensure_administers(&executor, planet)?;
                Execution::CrisisSettled(event)
            }
            (MessageKind::ResourcesTransfer, Some(Directive::TransferResources { planet })) => {
                self.ensure_administers(&executor, planet)?;
                Execution::ResourcesTransferred(self.transfer(
                    planet,
                    message.origin,
                    &message.payload,
                )?)
            }
            (kind, _) => {
                return Err(EmpireError::InvalidPayload(format!(
                    "{kind} message {message_id} carries no usable directive"
                )))
            }
        };

        self.relay.mark_completed(message_id)?;
        tracing::info!(
            target: "empire::facade",
            message_id = %message_id,
            executor = %executor_id,
            execution = ?execution,
            "command.executed"
        );
        Ok(execution)
    }

    fn issue(&self, request: DispatchRequest) -> Result<MessageId> {
        self.relay.dispatch(request.with_command_id(CommandId::new()))
    }

    fn owned_planet(&self, trader: UserId, planet_id: PlanetId) -> Result<Planet> {
        let planet = self.load_planet(planet_id)?;
        if planet.owner != trader {
            return Err(EmpireError::not_authorized(
                trader,
                format!("{} belongs to another trader", planet.name),
            ));
        }
        Ok(planet)
    }

    /// Governors act for their own planet; traders for any planet they own.
    fn ensure_administers(&self, executor: &User, planet_id: PlanetId) -> Result<()> {
        let allowed = match executor.kind() {
            RoleKind::Governor => executor
                .as_governor()
                .is_some_and(|profile| profile.planet == planet_id),
            RoleKind::Trader => self.load_planet(planet_id)?.owner == executor.id,
            RoleKind::Astropath | RoleKind::Navigator => false,
        };
        if allowed {
            Ok(())
        } else {
            Err(EmpireError::not_authorized(
                executor.id,
                format!("does not administer planet {planet_id}"),
            ))
        }
    }

    /// Move up to `amount` from the planet's stock into its owner's treasury.
    ///
    /// Every unit of wealth, industry and raw resources counts at par.
    fn transfer(
        &self,
        planet_id: PlanetId,
        beneficiary: UserId,
        amount: &Resources,
    ) -> Result<Resources> {
        let owner = self.load_planet(planet_id)?.owner;
        if owner != beneficiary {
            return Err(EmpireError::not_authorized(
                beneficiary,
                format!("does not own planet {planet_id}"),
            ));
        }
        self.owner_locks.with(owner, || {
            let mut planet = self.load_planet(planet_id)?;
            let mut trader = self.load_trader(owner)?;
            let taken = amount.min(&planet.stock);
            planet.stock = planet.stock.saturating_minus(&taken);
            if let Some(profile) = trader.as_trader_mut() {
                profile.treasury += taken.wealth + taken.industry + taken.resources;
            }
            self.store.save_planet(planet)?;
            self.store.save_user(trader)?;
            tracing::info!(
                target: "empire::facade",
                planet = %planet_id,
                owner = %owner,
                wealth = taken.wealth,
                industry = taken.industry,
                resources = taken.resources,
                "resources.transferred"
            );
            Ok(taken)
        })
    }
}
