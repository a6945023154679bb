//! Device registry and lifecycle.
//!
//! The registry owns every configured [`EvgDevice`] and hands out
//! index-based [`DeviceHandle`]s instead of raw references or pointers:
//! handles are non-forgeable outside the crate and a stale one can at worst
//! address the wrong record, never corrupt device state.
//!
//! Configuration is a single-threaded phase; once `init` has run the
//! registry is only read, so operation threads share it without further
//! locking (each device serializes its own register traffic).

use std::fmt::Write as _;

use crate::config::{DeviceConfig, NAME_LENGTH};
use crate::device::EvgDevice;
use crate::error::{EvgError, Result};
use crate::transport::Transport;
use crate::transports::UdpTransport;

/// Maximum number of configurable devices.
pub const MAX_DEVICES: usize = 10;

/// Opaque reference to one configured device.
///
/// Obtained from [`EvgRegistry::open`]; valid for the life of the registry
/// that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceHandle(usize);

/// The set of configured EVG cards.
#[derive(Debug, Default)]
pub struct EvgRegistry {
    devices: Vec<EvgDevice>,
}

impl EvgRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device. No I/O happens until [`init`](Self::init).
    ///
    /// # Errors
    ///
    /// [`EvgError::ConfigFull`] past [`MAX_DEVICES`];
    /// [`EvgError::InvalidArgument`] for an invalid configuration or a
    /// duplicate name.
    pub fn configure(&mut self, config: DeviceConfig) -> Result<()> {
        if self.devices.len() >= MAX_DEVICES {
            return Err(EvgError::ConfigFull { max: MAX_DEVICES });
        }
        config.validate()?;
        if self.devices.iter().any(|d| d.name() == config.name) {
            return Err(EvgError::invalid_argument(format!(
                "device {:?} is already configured",
                config.name
            )));
        }
        tracing::info!(
            device = %config.name,
            endpoint = %config.endpoint(),
            frequency_hz = config.frequency_hz,
            "device configured"
        );
        self.devices.push(EvgDevice::new(config));
        Ok(())
    }

    /// Initialize every configured device over UDP: create and connect the
    /// socket, then apply the device's reset policy.
    ///
    /// A failing device is logged and skipped; the others still come up.
    /// Returns the failures so the caller can decide what is fatal.
    pub fn init(&self) -> Vec<(String, EvgError)> {
        self.init_with(|config| {
            let link = UdpTransport::connect(config.ip, config.port)?;
            Ok(Box::new(link) as Box<dyn Transport>)
        })
    }

    /// [`init`](Self::init) with a caller-supplied transport factory.
    /// This is how tests and simulations run the full lifecycle without
    /// sockets.
    pub fn init_with<F>(&self, mut factory: F) -> Vec<(String, EvgError)>
    where
        F: FnMut(&DeviceConfig) -> Result<Box<dyn Transport>>,
    {
        let mut failures = Vec::new();
        for device in &self.devices {
            let outcome = factory(device.config()).and_then(|link| device.attach(link));
            match outcome {
                Ok(()) => tracing::info!(device = device.name(), "device ready"),
                Err(e) => {
                    tracing::warn!(device = device.name(), error = %e, "device init failed");
                    failures.push((device.name().to_string(), e));
                }
            }
        }
        failures
    }

    /// Look up a device by name.
    ///
    /// Valid before and after init; operations on the handle additionally
    /// require the device to be initialized. Idempotent — repeated opens
    /// return handles to the same record.
    ///
    /// # Errors
    ///
    /// [`EvgError::UnknownDevice`] for an empty, oversized, or unregistered
    /// name.
    pub fn open(&self, name: &str) -> Result<DeviceHandle> {
        if name.is_empty() || name.len() >= NAME_LENGTH {
            return Err(EvgError::unknown_device(name));
        }
        self.devices
            .iter()
            .position(|d| d.name() == name)
            .map(DeviceHandle)
            .ok_or_else(|| EvgError::unknown_device(name))
    }

    /// The device a handle refers to.
    #[must_use]
    pub fn device(&self, handle: DeviceHandle) -> &EvgDevice {
        &self.devices[handle.0]
    }

    /// All configured devices, in configuration order.
    #[must_use]
    pub fn devices(&self) -> &[EvgDevice] {
        &self.devices
    }

    /// Number of configured devices.
    #[must_use]
    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Text report of every configured device: name, endpoint, reference
    /// frequency, and lifecycle state.
    #[must_use]
    pub fn report(&self) -> String {
        let mut out = String::from("=== EVG device report ===\n");
        for device in &self.devices {
            let config = device.config();
            let state = if device.is_ready() { "ready" } else { "configured" };
            let _ = writeln!(
                out,
                "{} @ {} ({} Hz, {})",
                config.name,
                config.endpoint(),
                config.frequency_hz,
                state
            );
        }
        out.push_str("=== end of report ===\n");
        out
    }

    /// Close every device: sockets are dropped, records stay so the report
    /// still lists them. Operations after shutdown fail with `NotReady`.
    pub fn shutdown(&self) {
        for device in &self.devices {
            device.detach();
        }
    }
}
