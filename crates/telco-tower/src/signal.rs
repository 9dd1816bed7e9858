//! Deterministic radio signal model.
//!
//! Each tower owns one omnidirectional [`SignalModel`] fixed at the tower's
//! position. Received power follows free-space path loss:
//!
//! ```text
//! P(r) = 10 * log10(P_tx) - 20 * log10(max(r, r_min) / r_0)
//! ```
//!
//! Where:
//! - `P_tx`: transmit power (linear units), so `10 * log10(P_tx)` is dB
//! - `r`: Euclidean distance from the antenna in meters
//! - `r_min`: [`MIN_DISTANCE_M`], keeps the logarithm finite at the antenna
//! - `r_0`: reference distance in meters
//!
//! The result is non-increasing in `r` and depends on nothing but the
//! inputs. No shadowing, no multipath, no directionality.

use telco_types::Position;

use crate::error::SignalError;

/// Smallest distance fed into the path loss formula.
pub const MIN_DISTANCE_M: f64 = 1e-3;

/// Transmit power and reference distance of an antenna.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PowerSettings {
    /// Transmit power in linear units.
    pub transmit_power: f64,
    /// Distance in meters at which free-space loss is 0 dB.
    pub reference_distance: f64,
}

impl PowerSettings {
    /// Validate and build power settings.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::InvalidPower`] unless both values are finite
    /// and strictly positive.
    pub fn new(transmit_power: f64, reference_distance: f64) -> Result<Self, SignalError> {
        let valid = transmit_power.is_finite()
            && transmit_power > 0.0
            && reference_distance.is_finite()
            && reference_distance > 0.0;
        if valid {
            Ok(Self {
                transmit_power,
                reference_distance,
            })
        } else {
            Err(SignalError::InvalidPower {
                transmit_power,
                reference_distance,
            })
        }
    }
}

impl Default for PowerSettings {
    fn default() -> Self {
        Self {
            transmit_power: 100.0,
            reference_distance: 1.0,
        }
    }
}

/// Omnidirectional antenna at a fixed position.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalModel {
    position: Position,
    power: PowerSettings,
    configured: bool,
}

impl SignalModel {
    /// Antenna centered at `position` with default power settings.
    pub fn new(position: Position) -> Self {
        Self {
            position,
            power: PowerSettings::default(),
            configured: false,
        }
    }

    /// Antenna centered at `(x, y)`.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::InvalidPosition`] for non-finite coordinates.
    pub fn omni(x: f64, y: f64) -> Result<Self, SignalError> {
        Ok(Self::new(Position::new(x, y)?))
    }

    /// Apply power settings. Allowed exactly once.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::AlreadyConfigured`] on every call after the
    /// first successful one (the first settings stay in effect), or
    /// [`SignalError::InvalidPower`] for unusable values.
    pub fn set_power(
        &mut self,
        transmit_power: f64,
        reference_distance: f64,
    ) -> Result<(), SignalError> {
        if self.configured {
            return Err(SignalError::AlreadyConfigured);
        }
        self.power = PowerSettings::new(transmit_power, reference_distance)?;
        self.configured = true;
        Ok(())
    }

    /// Where the antenna stands.
    pub const fn position(&self) -> Position {
        self.position
    }

    /// Active power settings.
    pub const fn power_settings(&self) -> PowerSettings {
        self.power
    }

    /// Euclidean distance from the antenna to `(x, y)`.
    pub fn distance(&self, x: f64, y: f64) -> f64 {
        self.position.distance_to(Position { x, y })
    }

    /// Received power at `(x, y)`.
    ///
    /// A query point that is not a finite position receives
    /// `f64::NEG_INFINITY`, i.e. no signal at all.
    pub fn power(&self, x: f64, y: f64) -> f64 {
        let r = self.distance(x, y);
        if !r.is_finite() {
            return f64::NEG_INFINITY;
        }
        let r = r.max(MIN_DISTANCE_M);
        10.0_f64.mul_add(
            self.power.transmit_power.log10(),
            -20.0 * (r / self.power.reference_distance).log10(),
        )
    }
}
