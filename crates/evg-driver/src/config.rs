//! Per-device configuration.

use std::net::{Ipv4Addr, SocketAddrV4};

use evg_card::CardRevision;

use crate::error::{EvgError, Result};

/// Device names must be shorter than this many bytes.
pub const NAME_LENGTH: usize = 30;

/// What init does to the card right after connecting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResetPolicy {
    /// No traffic at init; the card keeps whatever state it had.
    None,
    /// Master disable only.
    #[default]
    Disable,
    /// Master disable, sequencers stopped with prescaler 1, AC trigger
    /// cleared with prescaler 50, RF prescaler 4, and the head of each
    /// fitted sequence RAM cleared to the end event code with zero
    /// timestamps.
    Factory,
}

/// Configuration of one card, fixed at registration time.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Unique device name, 1 to 29 printable ASCII characters.
    pub name: String,
    /// Gateway IPv4 address.
    pub ip: Ipv4Addr,
    /// Gateway UDP port.
    pub port: u16,
    /// Reference clock frequency in hertz; converts timestamp seconds to
    /// device clock cycles.
    pub frequency_hz: u32,
    /// Which sequencer engines the card has fitted.
    pub revision: CardRevision,
    /// Reset behavior at init.
    pub reset: ResetPolicy,
}

impl DeviceConfig {
    /// Build and validate a configuration with the default revision
    /// (dual sequencer) and reset policy (master disable).
    ///
    /// # Errors
    ///
    /// [`EvgError::InvalidArgument`] for an out-of-domain name, port, or
    /// frequency.
    pub fn new(
        name: impl Into<String>,
        ip: Ipv4Addr,
        port: u16,
        frequency_hz: u32,
    ) -> Result<Self> {
        let config = Self {
            name: name.into(),
            ip,
            port,
            frequency_hz,
            revision: CardRevision::default(),
            reset: ResetPolicy::default(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Select the card revision.
    #[must_use]
    pub fn with_revision(mut self, revision: CardRevision) -> Self {
        self.revision = revision;
        self
    }

    /// Select the init reset policy.
    #[must_use]
    pub fn with_reset(mut self, reset: ResetPolicy) -> Self {
        self.reset = reset;
        self
    }

    /// The resolved gateway endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> SocketAddrV4 {
        SocketAddrV4::new(self.ip, self.port)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.is_empty() || self.name.len() >= NAME_LENGTH {
            return Err(EvgError::invalid_argument(format!(
                "device name must be 1 to {} characters, got {}",
                NAME_LENGTH - 1,
                self.name.len()
            )));
        }
        if !self.name.chars().all(|c| c.is_ascii_graphic()) {
            return Err(EvgError::invalid_argument(format!(
                "device name {:?} contains non-printable characters",
                self.name
            )));
        }
        if self.port == 0 {
            return Err(EvgError::invalid_argument("port must be non-zero"));
        }
        if self.frequency_hz == 0 {
            return Err(EvgError::invalid_argument(
                "reference frequency must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base(name: &str) -> Result<DeviceConfig> {
        DeviceConfig::new(name, Ipv4Addr::new(10, 0, 0, 20), 2000, 125_000_000)
    }

    #[test]
    fn accepts_names_up_to_29_chars() {
        assert!(base("evg0").is_ok());
        assert!(base(&"x".repeat(29)).is_ok());
    }

    #[test]
    fn rejects_empty_and_oversized_names() {
        assert!(matches!(base(""), Err(EvgError::InvalidArgument { .. })));
        assert!(matches!(
            base(&"x".repeat(30)),
            Err(EvgError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn rejects_unprintable_name() {
        assert!(base("evg 0").is_err());
        assert!(base("evg\t0").is_err());
    }

    #[test]
    fn rejects_zero_port_and_frequency() {
        assert!(DeviceConfig::new("evg0", Ipv4Addr::LOCALHOST, 0, 1).is_err());
        assert!(DeviceConfig::new("evg0", Ipv4Addr::LOCALHOST, 2000, 0).is_err());
    }
}
