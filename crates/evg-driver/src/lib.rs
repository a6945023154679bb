//! Network driver for the VME-EVG230/RF timing event generator.
//!
//! The card is reached over UDP through its network register gateway; this
//! crate provides the typed, concurrency-safe programming surface: master
//! enable, RF/AC/sequencer clock control, event-code and timestamp
//! programming of the sequence RAM, multiplexed-counter prescalers, and
//! firmware readback.
//!
//! # Layering
//!
//! ```text
//! EvgRegistry ── configure / init / open / report / shutdown
//!   EvgDevice ── typed operations, one mutex per card
//!     RegisterIo ── read / write / verified write
//!       Transport ── UdpTransport (hardware) or SimTransport (software)
//!         evg-card ── register map + 12-octet wire message
//! ```
//!
//! Every operation takes the device's lock for its whole register sequence,
//! so the address-latch protocols (sequence RAM, MXC prescalers) are safe
//! under concurrent callers; distinct cards run in parallel.
//!
//! # Quick start
//!
//! ```
//! use evg_driver::{DeviceConfig, EvgRegistry, ResetPolicy, SimTransport};
//!
//! # fn main() -> evg_driver::Result<()> {
//! let mut registry = EvgRegistry::new();
//! registry.configure(
//!     DeviceConfig::new("evg0", [10, 0, 0, 20].into(), 2000, 125_000_000)?
//!         .with_reset(ResetPolicy::None),
//! )?;
//!
//! // Swap the closure for `registry.init()` to drive real hardware.
//! let failures = registry.init_with(|_| Ok(Box::new(SimTransport::new())));
//! assert!(failures.is_empty());
//!
//! let handle = registry.open("evg0")?;
//! let device = registry.device(handle);
//! device.enable(true)?;
//! assert!(device.is_enabled()?);
//! registry.shutdown();
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

mod config;
mod device;
mod error;
mod regio;
mod registry;
mod transport;
pub mod transports;

pub use config::{DeviceConfig, ResetPolicy, NAME_LENGTH};
pub use device::{
    AcSyncSource, EvgDevice, RfClockSource, TriggerSource, RESET_RAM_ENTRIES,
};
pub use error::{EvgError, Result};
pub use regio::RegisterIo;
pub use registry::{DeviceHandle, EvgRegistry, MAX_DEVICES};
pub use transport::{Transport, MAX_RETRIES, REPLY_TIMEOUT};
pub use transports::{SimTransport, UdpTransport};

// The card model types callers need alongside the driver.
pub use evg_card::{CardRevision, Message, Sequencer};

/// Commonly used types.
pub mod prelude {
    pub use crate::{
        AcSyncSource, CardRevision, DeviceConfig, DeviceHandle, EvgDevice, EvgError,
        EvgRegistry, ResetPolicy, Result, RfClockSource, Sequencer, TriggerSource,
    };
}
