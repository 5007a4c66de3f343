//! The Command Relay.
//!
//! Owners dispatch commands to an astropath; the astropath forwards them
//! through the warp (where they may be distorted) to the executor; the
//! executor marks them completed. Every protocol call is idempotent and is
//! serialized per message.

mod dispatch;
mod stats;

pub use dispatch::*;
pub use stats::*;

use std::sync::Arc;

use empire_rules::{
    transmit, CommandId, Directive, EntityStore, Message, MessageId, MessageKind, Resources,
    RoleKind, Transition, User, UserId,
};
use parking_lot::Mutex;
use rand::{rngs::SmallRng, SeedableRng};

use crate::config::RelayConfig;
use crate::crisis::CrisisDesk;
use crate::error::{EmpireError, Result};
use crate::locks::KeyedLocks;

pub struct CommandRelay {
    store: Arc<dyn EntityStore>,
    crisis: Arc<CrisisDesk>,
    config: RelayConfig,
    rng: Mutex<SmallRng>,
    message_locks: KeyedLocks<MessageId>,
}

impl CommandRelay {
    pub fn new(
        store: Arc<dyn EntityStore>,
        crisis: Arc<CrisisDesk>,
        config: RelayConfig,
        seed: Option<u64>,
    ) -> Self {
        let rng = match seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => SmallRng::from_entropy(),
        };
        Self {
            store,
            crisis,
            config,
            rng: Mutex::new(rng),
            message_locks: KeyedLocks::new(),
        }
    }

    /// Create a command addressed to an astropath.
    pub fn dispatch(&self, request: DispatchRequest) -> Result<MessageId> {
        request.validate()?;
        self.store
            .user(request.sender)?
            .ok_or_else(|| EmpireError::unknown("sender", request.sender))?;
        let astropath = self
            .store
            .user(request.astropath)?
            .ok_or_else(|| EmpireError::unknown("astropath", request.astropath))?;
        if !astropath.is(RoleKind::Astropath) {
            return Err(EmpireError::InvalidReference(format!(
                "user {} is a {}, not an astropath",
                astropath.id,
                astropath.kind()
            )));
        }
        if let Some(directive) = &request.directive {
            let owner = self.directive_owner(directive)?;
            if owner != request.sender {
                return Err(EmpireError::not_authorized(
                    request.sender,
                    format!("{directive:?} concerns a planet held by {owner}"),
                ));
            }
        }

        let message = request.into_message();
        let id = message.id;
        tracing::info!(
            target: "empire::relay",
            message_id = %id,
            sender = %message.sender,
            astropath = %message.receiver,
            kind = %message.kind,
            "relay.dispatch"
        );
        self.store.save_message(message)?;
        Ok(id)
    }

    /// Relay `message_id` through the warp to `final_receiver`.
    ///
    /// Replays return the first forward's id, whoever it went to.
    pub fn forward(
        &self,
        astropath_id: UserId,
        message_id: MessageId,
        final_receiver: UserId,
    ) -> Result<MessageId> {
        let _guard = self.message_locks.lock(message_id);

        let mut original = self.load_message(message_id)?;
        if original.receiver != astropath_id {
            return Err(EmpireError::not_authorized(
                astropath_id,
                format!("message {message_id} is addressed to {}", original.receiver),
            ));
        }
        if let Some(existing) = self.store.forwards_of(message_id)?.into_iter().next() {
            if original.deliver(false) == Transition::Applied {
                self.store.save_message(original)?;
            }
            tracing::debug!(
                target: "empire::relay",
                message_id = %message_id,
                forwarded = %existing.id,
                "relay.forward.replayed"
            );
            return Ok(existing.id);
        }
        if original.delivered() {
            return Err(EmpireError::InvalidState(format!(
                "message {message_id} was acknowledged without being forwarded"
            )));
        }

        let astropath = self
            .store
            .user(astropath_id)?
            .ok_or_else(|| EmpireError::unknown("astropath", astropath_id))?;
        let proficiency = astropath
            .as_astropath()
            .map(|profile| profile.proficiency)
            .ok_or_else(|| EmpireError::not_authorized(astropath_id, "only astropaths relay"))?;
        let receiver = self
            .store
            .user(final_receiver)?
            .ok_or_else(|| EmpireError::unknown("receiver", final_receiver))?;
        if !original.kind.accepts_receiver(receiver.kind()) {
            return Err(EmpireError::InvalidReference(format!(
                "a {} cannot receive {}",
                receiver.kind(),
                original.kind
            )));
        }

        let transmission = transmit(
            proficiency,
            &original.content,
            &original.payload,
            &mut *self.rng.lock(),
        );
        let mut forwarded = Message::new(
            astropath_id,
            final_receiver,
            original.kind,
            transmission.content,
        )
        .continuing(&original)
        .with_payload(transmission.payload)
        .with_directive(original.directive)
        .with_distortion_chance(transmission.chance);
        forwarded.deliver(transmission.distorted);
        let forwarded_id = forwarded.id;

        self.store.save_message(forwarded)?;
        original.deliver(false);
        self.store.save_message(original)?;

        if transmission.distorted {
            tracing::info!(
                target: "empire::relay",
                message_id = %message_id,
                forwarded = %forwarded_id,
                receiver = %final_receiver,
                chance = transmission.chance,
                "relay.forward.distorted"
            );
        } else {
            tracing::info!(
                target: "empire::relay",
                message_id = %message_id,
                forwarded = %forwarded_id,
                receiver = %final_receiver,
                "relay.forward.delivered"
            );
        }
        Ok(forwarded_id)
    }

    /// Acknowledge receipt without relaying.
    pub fn mark_delivered(&self, message_id: MessageId) -> Result<Message> {
        let _guard = self.message_locks.lock(message_id);

        let mut message = self.load_message(message_id)?;
        match message.deliver(false) {
            Transition::Applied => {
                self.store.save_message(message.clone())?;
                tracing::info!(target: "empire::relay", message_id = %message_id, "relay.delivered");
            }
            Transition::Unchanged => {
                tracing::debug!(
                    target: "empire::relay",
                    message_id = %message_id,
                    "relay.delivered.replayed"
                );
            }
        }
        Ok(message)
    }

    /// Record that the action embodied by `message_id` has been executed.
    ///
    /// Completing a forwarded message completes the chain it was forwarded
    /// from. A crisis response settles its crisis before the flag is set.
    pub fn mark_completed(&self, message_id: MessageId) -> Result<Message> {
        let _guard = self.message_locks.lock(message_id);

        let mut message = self.load_message(message_id)?;
        if message.completed() {
            tracing::debug!(
                target: "empire::relay",
                message_id = %message_id,
                "relay.completed.replayed"
            );
            return Ok(message);
        }
        if !message.delivered() {
            return Err(EmpireError::InvalidState(format!(
                "message {message_id} cannot complete before it is delivered"
            )));
        }

        if let (MessageKind::CrisisResponse, Some(Directive::ResolveCrisis { event, action })) =
            (message.kind, message.directive)
        {
            let owner = self.directive_owner(&Directive::ResolveCrisis { event, action })?;
            if owner != message.origin {
                return Err(EmpireError::not_authorized(
                    message.origin,
                    format!("crisis {event} is on a planet held by {owner}"),
                ));
            }
            self.crisis.settle(event, action, &message.payload)?;
        }

        message.complete().map_err(|_| {
            EmpireError::InvalidState(format!("message {message_id} is not delivered"))
        })?;
        self.store.save_message(message.clone())?;
        tracing::info!(
            target: "empire::relay",
            message_id = %message_id,
            kind = %message.kind,
            distorted = message.distorted(),
            "relay.completed"
        );

        self.complete_chain(&message)?;
        if self.config.auto_status_updates
            && message.kind != MessageKind::StatusUpdate
            && message.forwarded_from.is_some()
        {
            self.send_status_update(&message);
        }
        Ok(message)
    }

    /// An astropath reports on a command's progress to `receiver`.
    pub fn report_status(
        &self,
        astropath_id: UserId,
        command_id: Option<CommandId>,
        receiver_id: UserId,
        status: &str,
        comment: Option<&str>,
    ) -> Result<MessageId> {
        if status.trim().is_empty() {
            return Err(EmpireError::InvalidPayload("empty status".to_string()));
        }
        let astropath = self
            .store
            .user(astropath_id)?
            .ok_or_else(|| EmpireError::unknown("astropath", astropath_id))?;
        let receiver = self
            .store
            .user(receiver_id)?
            .ok_or_else(|| EmpireError::unknown("receiver", receiver_id))?;
        if !MessageKind::StatusUpdate.accepts_receiver(receiver.kind()) {
            return Err(EmpireError::InvalidReference(format!(
                "a {} cannot receive status updates",
                receiver.kind()
            )));
        }

        let mut content = match command_id {
            Some(command) => format!("Status of command {command}: {status}"),
            None => format!("Status: {status}"),
        };
        if let Some(comment) = comment {
            content.push_str("\nComment: ");
            content.push_str(comment);
        }
        self.transmit_status(&astropath, receiver_id, command_id, content)
    }

    pub fn message(&self, message_id: MessageId) -> Result<Message> {
        self.load_message(message_id)
    }

    /// Messages sent or received by `user`, newest first.
    pub fn messages_for_user(&self, user: UserId) -> Result<Vec<Message>> {
        Ok(self.store.messages_for_user(user)?)
    }

    /// Messages waiting for `astropath` to forward or acknowledge them.
    pub fn awaiting_relay(&self, astropath: UserId) -> Result<Vec<Message>> {
        self.filter_for(astropath, |message| {
            message.receiver == astropath && !message.delivered()
        })
    }

    /// Forwards and reports transmitted by `astropath`.
    pub fn relayed_by(&self, astropath: UserId) -> Result<Vec<Message>> {
        self.filter_for(astropath, |message| message.sender == astropath)
    }

    /// Commands addressed to `receiver` that still await execution.
    pub fn commands_for_receiver(&self, receiver: UserId) -> Result<Vec<Message>> {
        self.filter_for(receiver, |message| {
            message.receiver == receiver && message.kind.is_command() && !message.completed()
        })
    }

    /// Commands `trader` dispatched that are not yet completed.
    pub fn pending_commands(&self, trader: UserId) -> Result<Vec<Message>> {
        self.filter_for(trader, |message| {
            message.sender == trader && message.kind.is_command() && !message.completed()
        })
    }

    pub fn completed_commands(&self, trader: UserId) -> Result<Vec<Message>> {
        self.filter_for(trader, |message| {
            message.sender == trader && message.kind.is_command() && message.completed()
        })
    }

    pub fn astropath_stats(&self, astropath: UserId) -> Result<AstropathStats> {
        let user = self
            .store
            .user(astropath)?
            .ok_or_else(|| EmpireError::unknown("astropath", astropath))?;
        if !user.is(RoleKind::Astropath) {
            return Err(EmpireError::InvalidReference(format!(
                "user {astropath} is not an astropath"
            )));
        }
        let messages = self.store.messages_for_user(astropath)?;
        Ok(AstropathStats::tally(astropath, &messages))
    }

    fn filter_for(
        &self,
        user: UserId,
        keep: impl Fn(&Message) -> bool,
    ) -> Result<Vec<Message>> {
        Ok(self
            .store
            .messages_for_user(user)?
            .into_iter()
            .filter(|message| keep(message))
            .collect())
    }

    /// The trader holding the planet a directive acts on.
    fn directive_owner(&self, directive: &Directive) -> Result<UserId> {
        let planet = match *directive {
            Directive::InstallUpgrade { planet, .. } | Directive::TransferResources { planet } => {
                planet
            }
            Directive::LayRoute { from, .. } => from,
            Directive::ResolveCrisis { event, .. } => {
                self.store
                    .event(event)?
                    .ok_or_else(|| EmpireError::unknown("crisis event", event))?
                    .planet
            }
        };
        Ok(self
            .store
            .planet(planet)?
            .ok_or_else(|| EmpireError::unknown("planet", planet))?
            .owner)
    }

    fn load_message(&self, id: MessageId) -> Result<Message> {
        self.store
            .message(id)?
            .ok_or_else(|| EmpireError::not_found("message", id))
    }

    /// Complete every message `message` was forwarded from.
    fn complete_chain(&self, message: &Message) -> Result<()> {
        let mut next = message.forwarded_from;
        while let Some(parent_id) = next {
            let _guard = self.message_locks.lock(parent_id);

            let Some(mut parent) = self.store.message(parent_id)? else {
                tracing::warn!(
                    target: "empire::relay",
                    message_id = %message.id,
                    parent = %parent_id,
                    "relay.chain.broken"
                );
                break;
            };
            parent.deliver(false);
            if let Ok(Transition::Applied) = parent.complete() {
                self.store.save_message(parent.clone())?;
            }
            next = parent.forwarded_from;
        }
        Ok(())
    }

    /// Best effort: a failure is logged and swallowed.
    fn send_status_update(&self, completed: &Message) {
        let correlation = completed
            .command_id
            .map(|command| command.to_string())
            .unwrap_or_else(|| completed.id.to_string());
        let content = format!(
            "{}: {} {}",
            self.config.status_update_prefix, completed.kind, correlation
        );

        let result = self
            .store
            .user(completed.sender)
            .map_err(EmpireError::from)
            .and_then(|astropath| {
                let astropath =
                    astropath.ok_or_else(|| EmpireError::unknown("astropath", completed.sender))?;
                self.transmit_status(&astropath, completed.origin, completed.command_id, content)
            });
        match result {
            Ok(status) => tracing::info!(
                target: "empire::relay",
                message_id = %completed.id,
                status = %status,
                receiver = %completed.origin,
                "relay.status.sent"
            ),
            Err(err) => tracing::warn!(
                target: "empire::relay",
                message_id = %completed.id,
                error = %err,
                "relay.status.failed"
            ),
        }
    }

    /// A status update crosses the warp in one hop and arrives delivered.
    fn transmit_status(
        &self,
        astropath: &User,
        receiver: UserId,
        command_id: Option<CommandId>,
        content: String,
    ) -> Result<MessageId> {
        let proficiency = astropath
            .as_astropath()
            .map(|profile| profile.proficiency)
            .ok_or_else(|| EmpireError::not_authorized(astropath.id, "only astropaths relay"))?;
        let transmission = transmit(
            proficiency,
            &content,
            &Resources::ZERO,
            &mut *self.rng.lock(),
        );
        let mut message = Message::new(
            astropath.id,
            receiver,
            MessageKind::StatusUpdate,
            transmission.content,
        )
        .with_command_id(command_id)
        .with_distortion_chance(transmission.chance);
        message.deliver(transmission.distorted);
        let id = message.id;
        self.store.save_message(message)?;
        Ok(id)
    }
}
