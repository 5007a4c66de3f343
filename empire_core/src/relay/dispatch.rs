use empire_rules::{CommandId, Directive, Message, MessageKind, Resources, UserId};

use crate::error::{EmpireError, Result};

/// Everything an owner hands the relay to send a command through an astropath.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRequest {
    pub sender: UserId,
    pub astropath: UserId,
    pub kind: MessageKind,
    pub content: String,
    pub command_id: Option<CommandId>,
    pub resources: Resources,
    /// Distortion probability the sender declares; recorded, never rolled.
    pub distortion_hint: Option<f64>,
    pub directive: Option<Directive>,
}

impl DispatchRequest {
    pub fn new(
        sender: UserId,
        astropath: UserId,
        kind: MessageKind,
        content: impl Into<String>,
    ) -> Self {
        Self {
            sender,
            astropath,
            kind,
            content: content.into(),
            command_id: None,
            resources: Resources::ZERO,
            distortion_hint: None,
            directive: None,
        }
    }

    pub fn with_command_id(mut self, command_id: CommandId) -> Self {
        self.command_id = Some(command_id);
        self
    }

    pub fn with_resources(mut self, resources: Resources) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_distortion_hint(mut self, hint: f64) -> Self {
        self.distortion_hint = Some(hint);
        self
    }

    pub fn with_directive(mut self, directive: Directive) -> Self {
        self.directive = Some(directive);
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if !self.resources.is_valid() {
            return Err(EmpireError::InvalidPayload(format!(
                "resources {:?} must be finite and non-negative",
                self.resources
            )));
        }
        if let Some(hint) = self.distortion_hint {
            if !(0.0..=1.0).contains(&hint) {
                return Err(EmpireError::InvalidPayload(format!(
                    "declared distortion {hint} outside [0, 1]"
                )));
            }
        }
        if let Some(directive) = &self.directive {
            if !directive_fits(self.kind, directive) {
                return Err(EmpireError::InvalidPayload(format!(
                    "{directive:?} cannot ride on a {}",
                    self.kind
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn into_message(self) -> Message {
        Message::new(self.sender, self.astropath, self.kind, self.content)
            .with_command_id(self.command_id)
            .with_payload(self.resources)
            .with_directive(self.directive)
            .with_distortion_chance(self.distortion_hint.unwrap_or(0.0))
    }
}

fn directive_fits(kind: MessageKind, directive: &Directive) -> bool {
    matches!(
        (kind, directive),
        (MessageKind::UpgradeRequest, Directive::InstallUpgrade { .. })
            | (MessageKind::NavigationRequest, Directive::LayRoute { .. })
            | (MessageKind::CrisisResponse, Directive::ResolveCrisis { .. })
            | (MessageKind::ResourcesTransfer, Directive::TransferResources { .. })
    )
}
