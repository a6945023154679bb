//! Register-level I/O over a locked transport.
//!
//! Thin composition layer between the transport and the typed operations:
//! single-register read, write, and verified write. Does not own the
//! transport — the device does, and hands a [`RegisterIo`] out only while
//! its serialization lock is held.

use evg_card::Message;

use crate::error::{EvgError, Result};
use crate::transport::Transport;

/// Register access operations on one locked device.
#[derive(Debug)]
pub struct RegisterIo<'a> {
    link: &'a mut dyn Transport,
    device: &'a str,
}

impl<'a> RegisterIo<'a> {
    /// Wrap a locked transport. `device` is used for log context only.
    pub fn new(link: &'a mut dyn Transport, device: &'a str) -> Self {
        Self { link, device }
    }

    /// Read a 16-bit register.
    ///
    /// # Errors
    ///
    /// Propagates transport failure.
    pub fn read_reg(&mut self, reg: u16) -> Result<u16> {
        let reply = self.link.exchange(&Message::read(reg))?;
        tracing::trace!(
            "{}: read {reg:#04x} -> {:#06x}",
            self.device,
            reply.data
        );
        Ok(reply.data)
    }

    /// Write a 16-bit register; the reply payload is discarded.
    ///
    /// # Errors
    ///
    /// Propagates transport failure.
    pub fn write_reg(&mut self, reg: u16, data: u16) -> Result<()> {
        self.link.exchange(&Message::write(reg, data))?;
        tracing::trace!("{}: write {reg:#04x} <- {data:#06x}", self.device);
        Ok(())
    }

    /// Write a register, then read it back and require equality.
    ///
    /// The card is write-through with some sticky bits; read-back is the
    /// only in-band consistency check the gateway offers, so every
    /// state-bearing write goes through here.
    ///
    /// # Errors
    ///
    /// [`EvgError::VerifyMismatch`] when the read-back disagrees;
    /// transport failures propagate.
    pub fn write_check_reg(&mut self, reg: u16, data: u16) -> Result<()> {
        self.write_reg(reg, data)?;
        let read = self.read_reg(reg)?;
        if read != data {
            tracing::warn!(
                "{}: read-back mismatch on {reg:#04x}: wrote {data:#06x}, read {read:#06x}",
                self.device
            );
            return Err(EvgError::VerifyMismatch {
                reg,
                wrote: data,
                read,
            });
        }
        Ok(())
    }
}
