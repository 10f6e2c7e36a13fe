use super::error::ConfigError;

/// Fractional multiplier applied to the keepalive period to space heartbeats.
///
/// Stored as an exact decimal in parts per million so the heartbeat interval
/// is computed with integer arithmetic and truncated only once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeepaliveCoefficient {
    ppm: u64,
}

impl KeepaliveCoefficient {
    const SCALE: u64 = 1_000_000;

    pub fn new(value: f64) -> Result<Self, ConfigError> {
        if !value.is_finite() || value <= 0.0 {
            return Err(ConfigError::InvalidCoefficient(value));
        }
        let ppm = (value * Self::SCALE as f64).round() as u64;
        if ppm == 0 {
            return Err(ConfigError::InvalidCoefficient(value));
        }
        Ok(Self { ppm })
    }

    /// Scales a millisecond count, truncating the result and saturating at
    /// `u64::MAX`
    pub fn apply(&self, millis: u64) -> u64 {
        let scaled = u128::from(millis) * u128::from(self.ppm) / u128::from(Self::SCALE);
        u64::try_from(scaled).unwrap_or(u64::MAX)
    }

    pub fn as_f64(&self) -> f64 {
        self.ppm as f64 / Self::SCALE as f64
    }
}

impl Default for KeepaliveCoefficient {
    fn default() -> Self {
        Self { ppm: 800_000 }
    }
}

/// Immutable per-session connect configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParameters {
    client_id: String,
    keepalive_secs: u16,
    coefficient: KeepaliveCoefficient,
}

impl ConnectParameters {
    pub fn new(
        client_id: impl Into<String>,
        keepalive_secs: u16,
        coefficient: f64,
    ) -> Result<Self, ConfigError> {
        let client_id = client_id.into();
        if client_id.is_empty() {
            return Err(ConfigError::EmptyClientId);
        }
        if keepalive_secs == 0 {
            return Err(ConfigError::ZeroKeepalive);
        }
        Ok(Self {
            client_id,
            keepalive_secs,
            coefficient: KeepaliveCoefficient::new(coefficient)?,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    pub fn keepalive_secs(&self) -> u16 {
        self.keepalive_secs
    }

    pub fn coefficient(&self) -> KeepaliveCoefficient {
        self.coefficient
    }
}
