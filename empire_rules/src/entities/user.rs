//! Users and their roles.

use serde::{Deserialize, Serialize};

use super::{PlanetId, UserId};

/// Default treasury of a freshly warranted trader.
pub const DEFAULT_TREASURY: f64 = 1_000_000.0;

/// Default influence of a freshly warranted trader.
pub const DEFAULT_INFLUENCE: u8 = 50;

/// The role tag of a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoleKind {
    Trader,
    Governor,
    Astropath,
    Navigator,
}

impl RoleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoleKind::Trader => "TRADER",
            RoleKind::Governor => "GOVERNOR",
            RoleKind::Astropath => "ASTROPATH",
            RoleKind::Navigator => "NAVIGATOR",
        }
    }
}

impl std::fmt::Display for RoleKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rogue trader: owns planets, dispatches commands and advances time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraderProfile {
    pub dynasty: String,
    pub warrant: String,
    pub treasury: f64,
    /// 0-100.
    pub influence: u8,
    /// Number of tick cycles this trader's empire has advanced.
    pub cycle: u64,
}

/// A planetary governor, bound to the planet they administer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernorProfile {
    pub planet: PlanetId,
}

/// An astropath relaying messages through the warp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AstropathProfile {
    /// 1-10, drives the distortion probability of forwarded messages.
    pub proficiency: u8,
}

/// A navigator of a Navis Nobilite house.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigatorProfile {
    pub house: String,
    /// 1-10, drives route stability.
    pub skill: u8,
}

/// Role-specific payload of a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Role {
    Trader(TraderProfile),
    Governor(GovernorProfile),
    Astropath(AstropathProfile),
    Navigator(NavigatorProfile),
}

impl Role {
    pub fn kind(&self) -> RoleKind {
        match self {
            Role::Trader(_) => RoleKind::Trader,
            Role::Governor(_) => RoleKind::Governor,
            Role::Astropath(_) => RoleKind::Astropath,
            Role::Navigator(_) => RoleKind::Navigator,
        }
    }
}

/// A user of the empire. The shape is shared; behaviour switches on [`Role`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub role: Role,
}

impl User {
    /// Create a trader with the default treasury and influence.
    pub fn trader(
        name: impl Into<String>,
        dynasty: impl Into<String>,
        warrant: impl Into<String>,
    ) -> Self {
        Self::with_role(
            name,
            Role::Trader(TraderProfile {
                dynasty: dynasty.into(),
                warrant: warrant.into(),
                treasury: DEFAULT_TREASURY,
                influence: DEFAULT_INFLUENCE,
                cycle: 0,
            }),
        )
    }

    /// Create a governor of the given planet.
    pub fn governor(name: impl Into<String>, planet: PlanetId) -> Self {
        Self::with_role(name, Role::Governor(GovernorProfile { planet }))
    }

    /// Create an astropath. Proficiency is clamped to 1-10.
    pub fn astropath(name: impl Into<String>, proficiency: u8) -> Self {
        Self::with_role(
            name,
            Role::Astropath(AstropathProfile {
                proficiency: proficiency.clamp(1, 10),
            }),
        )
    }

    /// Create a navigator. Skill is clamped to 1-10.
    pub fn navigator(name: impl Into<String>, house: impl Into<String>, skill: u8) -> Self {
        Self::with_role(
            name,
            Role::Navigator(NavigatorProfile {
                house: house.into(),
                skill: skill.clamp(1, 10),
            }),
        )
    }

    fn with_role(name: impl Into<String>, role: Role) -> Self {
        Self {
            id: UserId::new(),
            name: name.into(),
            role,
        }
    }

    pub fn kind(&self) -> RoleKind {
        self.role.kind()
    }

    pub fn is(&self, kind: RoleKind) -> bool {
        self.kind() == kind
    }

    pub fn as_trader(&self) -> Option<&TraderProfile> {
        match &self.role {
            Role::Trader(profile) => Some(profile),
            _ => None,
        }
    }

    pub fn as_trader_mut(&mut self) -> Option<&mut TraderProfile> {
        match &mut self.role {
            Role::Trader(profile) => Some(profile),
            _ => None,
        }
    }

    pub fn as_governor(&self) -> Option<&GovernorProfile> {
        match &self.role {
            Role::Governor(profile) => Some(profile),
            _ => None,
        }
    }

    pub fn as_astropath(&self) -> Option<&AstropathProfile> {
        match &self.role {
            Role::Astropath(profile) => Some(profile),
            _ => None,
        }
    }

    pub fn as_navigator(&self) -> Option<&NavigatorProfile> {
        match &self.role {
            Role::Navigator(profile) => Some(profile),
            _ => None,
        }
    }
}
