//! Admission control for incoming events.
//!
//! Deterministic privacy checks always run before the random sampling draw,
//! so a sampled-out event can never hide a consent violation and a rejected
//! consent never consumes a draw.

use crate::config::EngineConfig;
use rand::Rng;
use serde::Serialize;
use std::fmt;

/// Inputs of the gate that come from configuration plus the runtime enable flag.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingPolicy {
    pub enabled: bool,
    pub consent_required: bool,
    pub respect_do_not_track: bool,
    pub sample_rate: f64,
}

impl SamplingPolicy {
    pub fn from_config(config: &EngineConfig, enabled: bool) -> Self {
        Self {
            enabled,
            consent_required: config.privacy.consent_required,
            respect_do_not_track: config.privacy.respect_do_not_track,
            sample_rate: config.sample_rate,
        }
    }
}

/// User privacy signals known to the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsentState {
    /// `None` until the user has answered; `Some(false)` after a revocation.
    pub granted: Option<bool>,
    pub do_not_track: bool,
}

impl ConsentState {
    pub fn is_granted(&self) -> bool {
        self.granted == Some(true)
    }

    pub fn is_revoked(&self) -> bool {
        self.granted == Some(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    Admitted,
    Disabled,
    ConsentMissing,
    DoNotTrack,
    SampledOut,
}

impl GateDecision {
    pub fn is_admitted(self) -> bool {
        self == GateDecision::Admitted
    }
}

impl fmt::Display for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            GateDecision::Admitted => "admitted",
            GateDecision::Disabled => "engine disabled",
            GateDecision::ConsentMissing => "consent not granted",
            GateDecision::DoNotTrack => "do-not-track signal present",
            GateDecision::SampledOut => "sampled out",
        };
        f.write_str(text)
    }
}

/// Runs only the deterministic checks. `None` means nothing blocks tracking.
pub fn check(policy: &SamplingPolicy, consent: &ConsentState) -> Option<GateDecision> {
    if !policy.enabled {
        return Some(GateDecision::Disabled);
    }
    // An explicit revocation blocks even when consent is optional
    if consent.is_revoked() || (policy.consent_required && !consent.is_granted()) {
        return Some(GateDecision::ConsentMissing);
    }
    if policy.respect_do_not_track && consent.do_not_track {
        return Some(GateDecision::DoNotTrack);
    }
    None
}

pub fn decide<R: Rng + ?Sized>(
    policy: &SamplingPolicy,
    consent: &ConsentState,
    rng: &mut R,
) -> GateDecision {
    if let Some(blocked) = check(policy, consent) {
        return blocked;
    }

    if policy.sample_rate >= 1.0 {
        return GateDecision::Admitted;
    }
    if policy.sample_rate <= 0.0 {
        return GateDecision::SampledOut;
    }

    let draw: f64 = rng.random();
    if draw < policy.sample_rate {
        GateDecision::Admitted
    } else {
        GateDecision::SampledOut
    }
}

pub fn admit<R: Rng + ?Sized>(
    policy: &SamplingPolicy,
    consent: &ConsentState,
    rng: &mut R,
) -> bool {
    decide(policy, consent, rng).is_admitted()
}
