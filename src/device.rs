//! Neutral device model.
//!
//! A [`Device`] is a transient value object rebuilt per request from a vendor
//! response. It is never mutated in place — a mutation produces a new
//! provider call, whose fresh response produces a new `Device`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Power {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Brightness,
    Color,
    Temperature,
    Effects,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Color {
    /// Degrees, [0, 360].
    pub hue: f64,
    /// [0.0, 1.0].
    pub saturation: f64,
    /// Kelvin, [1500, 9000].
    pub kelvin: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationRef {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub account_id: uuid::Uuid,
    pub provider: String,
    pub label: String,
    pub power: Power,
    pub brightness: f64,
    pub color: Option<Color>,
    pub connected: bool,
    pub reachable: bool,
    pub group: Option<GroupRef>,
    pub location: Option<LocationRef>,
    pub capabilities: Vec<Capability>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Device {
    pub fn is_on(&self) -> bool {
        self.power == Power::On
    }

    pub fn has_capability(&self, cap: Capability) -> bool {
        self.capabilities.contains(&cap)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Device {
        Device {
            id: "d1".into(),
            account_id: uuid::Uuid::nil(),
            provider: "lifx".into(),
            label: "Lamp".into(),
            power: Power::On,
            brightness: 0.5,
            color: None,
            connected: true,
            reachable: true,
            group: None,
            location: None,
            capabilities: vec![Capability::Brightness, Capability::Effects],
            metadata: HashMap::new(),
        }
    }

    #[test]
    fn is_on_reflects_power() {
        let mut d = sample();
        assert!(d.is_on());
        d.power = Power::Off;
        assert!(!d.is_on());
    }

    #[test]
    fn has_capability_checks_set() {
        let d = sample();
        assert!(d.has_capability(Capability::Brightness));
        assert!(!d.has_capability(Capability::Color));
    }
}
