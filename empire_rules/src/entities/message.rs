//! Relay messages: the unit of communication through the warp.

use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use super::{
    CommandId, CrisisAction, EventId, MessageId, PlanetId, Resources, RoleKind, UpgradeId, UserId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageKind {
    NavigationRequest,
    UpgradeRequest,
    CrisisResponse,
    ResourcesTransfer,
    StatusUpdate,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::NavigationRequest => "NAVIGATION_REQUEST",
            MessageKind::UpgradeRequest => "UPGRADE_REQUEST",
            MessageKind::CrisisResponse => "CRISIS_RESPONSE",
            MessageKind::ResourcesTransfer => "RESOURCES_TRANSFER",
            MessageKind::StatusUpdate => "STATUS_UPDATE",
        }
    }

    /// Orders executed by a governor or navigator.
    pub fn is_command(&self) -> bool {
        matches!(
            self,
            MessageKind::NavigationRequest
                | MessageKind::UpgradeRequest
                | MessageKind::CrisisResponse
        )
    }

    /// Whether a user with `role` may be the final receiver of this kind.
    pub fn accepts_receiver(&self, role: RoleKind) -> bool {
        match self {
            MessageKind::NavigationRequest => role == RoleKind::Navigator,
            MessageKind::UpgradeRequest | MessageKind::CrisisResponse => {
                role == RoleKind::Governor
            }
            MessageKind::ResourcesTransfer | MessageKind::StatusUpdate => {
                role != RoleKind::Astropath
            }
        }
    }
}

impl std::fmt::Display for MessageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured order carried alongside the opaque text content.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Directive {
    InstallUpgrade { planet: PlanetId, upgrade: UpgradeId },
    LayRoute { from: PlanetId, to: PlanetId },
    ResolveCrisis { event: EventId, action: CrisisAction },
    TransferResources { planet: PlanetId },
}

/// Lifecycle of a message. Illegal flag combinations are unrepresentable:
/// a message can only be distorted once delivered, and only completed once
/// delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageState {
    Sent,
    Delivered,
    DistortedDelivered,
    Completed { distorted: bool },
}

/// Outcome of applying a lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// The state changed.
    Applied,
    /// The message was already at or past the requested state.
    Unchanged,
}

/// A message cannot be completed while still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotYetDelivered;

/// A single hop of a command (or report) through the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: UserId,
    pub receiver: UserId,
    /// The user who started this chain of hops.
    pub origin: UserId,
    /// The message this one was forwarded from, if any.
    pub forwarded_from: Option<MessageId>,
    pub kind: MessageKind,
    pub content: String,
    pub command_id: Option<CommandId>,
    pub payload: Resources,
    pub directive: Option<Directive>,
    /// Corruption probability recorded when the message was sent.
    pub distortion_chance: f64,
    pub state: MessageState,
    pub sent_at: SystemTime,
}

impl Message {
    /// A fresh, undelivered message starting a new chain.
    pub fn new(
        sender: UserId,
        receiver: UserId,
        kind: MessageKind,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: MessageId::new(),
            sender,
            receiver,
            origin: sender,
            forwarded_from: None,
            kind,
            content: content.into(),
            command_id: None,
            payload: Resources::ZERO,
            directive: None,
            distortion_chance: 0.0,
            state: MessageState::Sent,
            sent_at: SystemTime::now(),
        }
    }

    pub fn with_command_id(mut self, command_id: Option<CommandId>) -> Self {
        self.command_id = command_id;
        self
    }

    pub fn with_payload(mut self, payload: Resources) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_directive(mut self, directive: Option<Directive>) -> Self {
        self.directive = directive;
        self
    }

    pub fn with_distortion_chance(mut self, chance: f64) -> Self {
        self.distortion_chance = chance;
        self
    }

    /// Continue `parent`'s chain: keeps its origin and correlation id.
    pub fn continuing(mut self, parent: &Message) -> Self {
        self.origin = parent.origin;
        self.forwarded_from = Some(parent.id);
        self.command_id = parent.command_id;
        self
    }

    pub fn delivered(&self) -> bool {
        !matches!(self.state, MessageState::Sent)
    }

    pub fn distorted(&self) -> bool {
        matches!(
            self.state,
            MessageState::DistortedDelivered | MessageState::Completed { distorted: true }
        )
    }

    pub fn completed(&self) -> bool {
        matches!(self.state, MessageState::Completed { .. })
    }

    /// Mark the message as received by its immediate receiver.
    pub fn deliver(&mut self, distorted: bool) -> Transition {
        match self.state {
            MessageState::Sent => {
                self.state = if distorted {
                    MessageState::DistortedDelivered
                } else {
                    MessageState::Delivered
                };
                Transition::Applied
            }
            _ => Transition::Unchanged,
        }
    }

    /// Mark the embodied action as executed.
    pub fn complete(&mut self) -> Result<Transition, NotYetDelivered> {
        match self.state {
            MessageState::Sent => Err(NotYetDelivered),
            MessageState::Delivered => {
                self.state = MessageState::Completed { distorted: false };
                Ok(Transition::Applied)
            }
            MessageState::DistortedDelivered => {
                self.state = MessageState::Completed { distorted: true };
                Ok(Transition::Applied)
            }
            MessageState::Completed { .. } => Ok(Transition::Unchanged),
        }
    }

    /// Whether this message holds back its origin's next tick. Any kind
    /// does until completed.
    pub fn is_pending_for_tick(&self) -> bool {
        !self.completed()
    }
}
