//! Action model and validator (§4.5).
//!
//! `ActionRequest` is the wire shape posted to
//! `POST /accounts/:accountId/devices/:selector/action`. Validation happens
//! once, at the pipeline entry, before any side effect.

use serde::{Deserialize, Serialize};

use crate::device::Color;
use crate::validation::ValidationError;

const DEFAULT_DURATION_SECS: f64 = 0.5;
const DEFAULT_KELVIN: u32 = 3500;
const DEFAULT_EFFECT_CYCLES: u32 = 3;
const DEFAULT_EFFECT_PERIOD_SECS: f64 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerState {
    On,
    Off,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectName {
    Pulse,
    Breathe,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ActionParameters {
    pub state: Option<String>,
    pub level: Option<f64>,
    pub hue: Option<f64>,
    pub saturation: Option<f64>,
    pub kelvin: Option<f64>,
    pub name: Option<String>,
    pub color: Option<ColorParams>,
    pub cycles: Option<u32>,
    pub period: Option<f64>,
    pub duration: Option<f64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ColorParams {
    pub hue: f64,
    pub saturation: f64,
    pub kelvin: Option<f64>,
}

/// The wire shape of a `POST .../action` body: `{action, parameters}`.
#[derive(Debug, Clone, Deserialize)]
pub struct ActionRequest {
    pub action: String,
    #[serde(default)]
    pub parameters: ActionParameters,
}

/// A validated, dispatch-ready action with defaults applied.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidatedAction {
    Power {
        state: PowerState,
        duration: f64,
    },
    Brightness {
        level: f64,
        duration: f64,
    },
    Color {
        color: Color,
        duration: f64,
    },
    Temperature {
        kelvin: u32,
        duration: f64,
    },
    Effect {
        name: EffectName,
        color: Option<Color>,
        cycles: u32,
        period: f64,
    },
}

fn validate_hue(hue: f64) -> Result<(), ValidationError> {
    if (0.0..=360.0).contains(&hue) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange("color.hue"))
    }
}

fn validate_saturation(saturation: f64) -> Result<(), ValidationError> {
    if (0.0..=1.0).contains(&saturation) {
        Ok(())
    } else {
        Err(ValidationError::OutOfRange("color.saturation"))
    }
}

fn validate_kelvin(kelvin: f64) -> Result<u32, ValidationError> {
    if (1500.0..=9000.0).contains(&kelvin) {
        Ok(kelvin as u32)
    } else {
        Err(ValidationError::OutOfRange("kelvin"))
    }
}

fn color_from_params(params: &ColorParams) -> Result<Color, ValidationError> {
    validate_hue(params.hue)?;
    validate_saturation(params.saturation)?;
    let kelvin = match params.kelvin {
        Some(k) => validate_kelvin(k)?,
        None => DEFAULT_KELVIN,
    };
    Ok(Color {
        hue: params.hue,
        saturation: params.saturation,
        kelvin,
    })
}

/// Validate an [`ActionRequest`], rejecting it before any side effect if the
/// action kind is unknown or a parameter contract is unmet (§4.5).
pub fn validate(req: &ActionRequest) -> Result<ValidatedAction, ValidationError> {
    let duration = req.parameters.duration.unwrap_or(DEFAULT_DURATION_SECS);

    match req.action.as_str() {
        "power" => {
            let state_str = req
                .parameters
                .state
                .as_deref()
                .ok_or(ValidationError::MissingParameter("power.state"))?;
            let state = match state_str {
                "on" => PowerState::On,
                "off" => PowerState::Off,
                _ => return Err(ValidationError::OutOfRange("power.state")),
            };
            Ok(ValidatedAction::Power { state, duration })
        }
        "brightness" => {
            let level = req
                .parameters
                .level
                .ok_or(ValidationError::MissingParameter("brightness.level"))?;
            if !(0.0..=1.0).contains(&level) {
                return Err(ValidationError::OutOfRange("brightness.level"));
            }
            Ok(ValidatedAction::Brightness { level, duration })
        }
        "color" => {
            let hue = req
                .parameters
                .hue
                .ok_or(ValidationError::MissingParameter("color.hue"))?;
            let saturation = req
                .parameters
                .saturation
                .ok_or(ValidationError::MissingParameter("color.saturation"))?;
            validate_hue(hue)?;
            validate_saturation(saturation)?;
            let kelvin = match req.parameters.kelvin {
                Some(k) => validate_kelvin(k)?,
                None => DEFAULT_KELVIN,
            };
            Ok(ValidatedAction::Color {
                color: Color {
                    hue,
                    saturation,
                    kelvin,
                },
                duration,
            })
        }
        "temperature" => {
            let kelvin = req
                .parameters
                .kelvin
                .ok_or(ValidationError::MissingParameter("temperature.kelvin"))?;
            let kelvin = validate_kelvin(kelvin)?;
            Ok(ValidatedAction::Temperature { kelvin, duration })
        }
        "effect" => {
            let name_str = req
                .parameters
                .name
                .as_deref()
                .ok_or(ValidationError::MissingParameter("effect.name"))?;
            let name = match name_str {
                "pulse" => EffectName::Pulse,
                "breathe" => EffectName::Breathe,
                _ => return Err(ValidationError::OutOfRange("effect.name")),
            };
            let color = req
                .parameters
                .color
                .as_ref()
                .map(color_from_params)
                .transpose()?;
            let cycles = req.parameters.cycles.unwrap_or(DEFAULT_EFFECT_CYCLES);
            let period = req.parameters.period.unwrap_or(DEFAULT_EFFECT_PERIOD_SECS);
            if period <= 0.0 {
                return Err(ValidationError::OutOfRange("effect.period"));
            }
            Ok(ValidatedAction::Effect {
                name,
                color,
                cycles,
                period,
            })
        }
        _ => Err(ValidationError::UnknownAction),
    }
}
