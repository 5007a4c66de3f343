//! The warp distortion model.
//!
//! An astropath's proficiency is the sole input to the corruption probability
//! of a message they forward. Corruption is decided once per transmission.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::entities::Resources;

/// Marker appended to the content of a corrupted message.
pub const DISTORTION_MARKER: &str = "[DISTORTED IN THE WARP]";

/// Corruption probability for proficiency below 4.
pub const NOVICE_DISTORTION: f64 = 0.30;
/// Corruption probability for proficiency 4-6.
pub const ADEPT_DISTORTION: f64 = 0.20;
/// Corruption probability for proficiency 7 and above.
pub const MASTER_DISTORTION: f64 = 0.10;

/// Corruption probability of a message forwarded by an astropath of the
/// given proficiency. Monotonically non-increasing in proficiency.
pub fn distortion_probability(proficiency: u8) -> f64 {
    if proficiency < 4 {
        NOVICE_DISTORTION
    } else if proficiency < 7 {
        ADEPT_DISTORTION
    } else {
        MASTER_DISTORTION
    }
}

/// Content and payload as they emerge on the far side of the warp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transmission {
    pub content: String,
    pub payload: Resources,
    pub distorted: bool,
    /// The probability the roll was made against.
    pub chance: f64,
}

/// Send `content` and `payload` through the warp.
pub fn transmit<R: Rng + ?Sized>(
    proficiency: u8,
    content: &str,
    payload: &Resources,
    rng: &mut R,
) -> Transmission {
    let chance = distortion_probability(proficiency);
    if rng.gen_bool(chance) {
        let (content, payload) = corrupt(content, payload, rng);
        Transmission {
            content,
            payload,
            distorted: true,
            chance,
        }
    } else {
        Transmission {
            content: content.to_string(),
            payload: *payload,
            distorted: false,
            chance,
        }
    }
}

/// Tamper with a message: marks the content and scales every non-zero
/// resource quantity by a factor that is never 1.
pub fn corrupt<R: Rng + ?Sized>(
    content: &str,
    payload: &Resources,
    rng: &mut R,
) -> (String, Resources) {
    let content = if content.is_empty() {
        DISTORTION_MARKER.to_string()
    } else {
        format!("{content} {DISTORTION_MARKER}")
    };
    let payload = Resources {
        wealth: payload.wealth * scramble_factor(rng),
        industry: payload.industry * scramble_factor(rng),
        resources: payload.resources * scramble_factor(rng),
    };
    (content, payload)
}

fn scramble_factor<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    if rng.gen_bool(0.5) {
        rng.gen_range(0.5..0.9)
    } else {
        rng.gen_range(1.1..1.5)
    }
}
