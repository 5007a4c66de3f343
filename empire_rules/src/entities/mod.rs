//! Entity definitions for the empire.

mod message;
mod planet;
mod user;

pub use message::*;
pub use planet::*;
pub use user::*;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Declares a uuid-backed identifier newtype.
macro_rules! entity_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Create an identifier from a specific UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Create a nil identifier.
            pub fn nil() -> Self {
                Self(Uuid::nil())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

entity_id!(
    /// Identifier of any user, whatever their role.
    UserId
);
entity_id!(
    /// Identifier of a planet.
    PlanetId
);
entity_id!(
    /// Identifier of an upgrade in the catalog.
    UpgradeId
);
entity_id!(
    /// Identifier of a construction project.
    ProjectId
);
entity_id!(
    /// Identifier of a crisis event.
    EventId
);
entity_id!(
    /// Identifier of a warp route.
    RouteId
);
entity_id!(
    /// Identifier of a single relay message.
    MessageId
);
entity_id!(
    /// Correlation id linking every hop and reply of one command.
    CommandId
);

/// The three economic quantities: wealth, industry and raw resources.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Resources {
    pub wealth: f64,
    pub industry: f64,
    pub resources: f64,
}

impl Resources {
    pub const ZERO: Resources = Resources {
        wealth: 0.0,
        industry: 0.0,
        resources: 0.0,
    };

    pub fn new(wealth: f64, industry: f64, resources: f64) -> Self {
        Self {
            wealth,
            industry,
            resources,
        }
    }

    /// True when every quantity is a finite, non-negative number.
    pub fn is_valid(&self) -> bool {
        [self.wealth, self.industry, self.resources]
            .iter()
            .all(|v| v.is_finite() && *v >= 0.0)
    }

    /// True when each quantity of `self` is at least the matching one in `other`.
    pub fn covers(&self, other: &Resources) -> bool {
        self.wealth >= other.wealth
            && self.industry >= other.industry
            && self.resources >= other.resources
    }

    /// Component-wise sum.
    pub fn plus(&self, other: &Resources) -> Resources {
        Resources {
            wealth: self.wealth + other.wealth,
            industry: self.industry + other.industry,
            resources: self.resources + other.resources,
        }
    }

    /// Component-wise difference, floored at zero.
    pub fn saturating_minus(&self, other: &Resources) -> Resources {
        Resources {
            wealth: (self.wealth - other.wealth).max(0.0),
            industry: (self.industry - other.industry).max(0.0),
            resources: (self.resources - other.resources).max(0.0),
        }
    }

    /// Component-wise minimum.
    pub fn min(&self, other: &Resources) -> Resources {
        Resources {
            wealth: self.wealth.min(other.wealth),
            industry: self.industry.min(other.industry),
            resources: self.resources.min(other.resources),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.wealth == 0.0 && self.industry == 0.0 && self.resources == 0.0
    }
}
