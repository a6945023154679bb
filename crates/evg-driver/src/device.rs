//! EVG device handle and typed operations.
//!
//! Every operation acquires the device's serialization lock at entry and
//! releases it on every exit path. The lock is what makes the address-latch
//! register sequences (`set_event`, `set_timestamp`, `set_counter_prescaler`)
//! safe: no other thread can slip an exchange between the latch write and
//! the data access.
//!
//! Argument validation happens before the lock is taken; out-of-domain
//! inputs never generate wire traffic.

use std::sync::{Mutex, MutexGuard, PoisonError};

use evg_card::regs::{self, ac_enable, control, event_enable, mxc_control, rf_control};
use evg_card::Sequencer;

use crate::config::{DeviceConfig, ResetPolicy};
use crate::error::{EvgError, Result};
use crate::regio::RegisterIo;
use crate::transport::Transport;

/// RF reference clock source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RfClockSource {
    /// On-card oscillator.
    Internal,
    /// Front-panel RF input.
    External,
}

/// AC trigger synchronization source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcSyncSource {
    /// Event clock.
    Event,
    /// Multiplexed counter 7.
    Mxc7,
}

/// Sequencer trigger source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerSource {
    /// Software trigger via the control register pulse bits.
    Soft,
    /// AC mains trigger.
    Ac,
}

/// How many sequence RAM entries a factory reset clears per sequencer.
pub const RESET_RAM_ENTRIES: u16 = 100;

type Link = Option<Box<dyn Transport>>;

/// One configured card.
///
/// Created by the registry at configure time; the transport is attached at
/// init and detached at shutdown. All operations are `&self` and safe to
/// call from multiple threads — the internal mutex totally orders register
/// traffic per device while leaving other devices free to run in parallel.
#[derive(Debug)]
pub struct EvgDevice {
    config: DeviceConfig,
    link: Mutex<Link>,
}

impl EvgDevice {
    pub(crate) fn new(config: DeviceConfig) -> Self {
        Self {
            config,
            link: Mutex::new(None),
        }
    }

    /// Device configuration.
    #[must_use]
    pub fn config(&self) -> &DeviceConfig {
        &self.config
    }

    /// Device name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Whether the device has a live transport (READY state).
    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.lock_link().is_some()
    }

    /// Attach a transport and apply the configured reset policy. On reset
    /// failure the transport is detached again so the device never presents
    /// half-initialized.
    pub(crate) fn attach(&self, link: Box<dyn Transport>) -> Result<()> {
        *self.lock_link() = Some(link);
        if let Err(e) = self.apply_reset() {
            *self.lock_link() = None;
            return Err(e);
        }
        Ok(())
    }

    /// Drop the transport; the device returns to the configured state.
    pub(crate) fn detach(&self) {
        if self.lock_link().take().is_some() {
            tracing::info!(device = self.name(), "device closed");
        }
    }

    fn lock_link(&self) -> MutexGuard<'_, Link> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn locked_io<'g>(&'g self, guard: &'g mut MutexGuard<'_, Link>) -> Result<RegisterIo<'g>> {
        match guard.as_mut() {
            Some(link) => Ok(RegisterIo::new(link.as_mut(), &self.config.name)),
            None => Err(EvgError::not_ready(&self.config.name)),
        }
    }

    fn apply_reset(&self) -> Result<()> {
        match self.config.reset {
            ResetPolicy::None => Ok(()),
            ResetPolicy::Disable => self.enable(false),
            ResetPolicy::Factory => self.factory_reset(),
        }
    }

    fn factory_reset(&self) -> Result<()> {
        tracing::info!(device = self.name(), "factory reset");
        self.enable(false)?;
        self.set_ac_sync_source(AcSyncSource::Event)?;
        self.set_ac_prescaler(50)?;
        self.set_rf_prescaler(4)?;
        for seq in [Sequencer::A, Sequencer::B] {
            if !self.config.revision.has_sequencer(seq) {
                continue;
            }
            self.enable_sequencer(seq, false)?;
            self.set_sequencer_prescaler(seq, 1)?;
            for address in 0..RESET_RAM_ENTRIES {
                self.set_event(seq, address, regs::END_EVENT_CODE)?;
                self.set_timestamp(seq, address, 0.0)?;
            }
        }
        Ok(())
    }

    fn check_sequencer(&self, seq: Sequencer) -> Result<()> {
        if self.config.revision.has_sequencer(seq) {
            Ok(())
        } else {
            Err(EvgError::invalid_argument(format!(
                "{seq} is not fitted on this card revision"
            )))
        }
    }

    // ── Master enable ────────────────────────────────────────────────────

    /// Enable or disable the card. The upstream receiver stays disabled in
    /// both composite control words.
    ///
    /// # Errors
    ///
    /// Transport failure.
    pub fn enable(&self, on: bool) -> Result<()> {
        tracing::debug!(device = self.name(), on, "master enable");
        let mut guard = self.lock_link();
        let mut io = self.locked_io(&mut guard)?;
        let word = if on { control::ENABLE } else { control::DISABLE };
        io.write_reg(regs::CONTROL, word)
    }

    /// Whether the master-disable bit is clear.
    ///
    /// # Errors
    ///
    /// Transport failure.
    pub fn is_enabled(&self) -> Result<bool> {
        let mut guard = self.lock_link();
        let mut io = self.locked_io(&mut guard)?;
        let value = io.read_reg(regs::CONTROL)?;
        Ok(value & control::DISABLE_BIT == 0)
    }

    // ── RF clock ─────────────────────────────────────────────────────────

    /// Select the RF reference clock source. Verified.
    ///
    /// # Errors
    ///
    /// Transport failure or read-back mismatch.
    pub fn set_rf_clock_source(&self, source: RfClockSource) -> Result<()> {
        tracing::debug!(device = self.name(), ?source, "set RF clock source");
        let mut guard = self.lock_link();
        let mut io = self.locked_io(&mut guard)?;
        let value = io.read_reg(regs::RF_CONTROL)?;
        let value = match source {
            RfClockSource::Internal => value & !rf_control::EXTERNAL,
            RfClockSource::External => value | rf_control::EXTERNAL,
        };
        io.write_check_reg(regs::RF_CONTROL, value)
    }

    /// Current RF reference clock source.
    ///
    /// # Errors
    ///
    /// Transport failure.
    pub fn get_rf_clock_source(&self) -> Result<RfClockSource> {
        let mut guard = self.lock_link();
        let mut io = self.locked_io(&mut guard)?;
        let value = io.read_reg(regs::RF_CONTROL)?;
        if value & rf_control::EXTERNAL == 0 {
            Ok(RfClockSource::Internal)
        } else {
            Ok(RfClockSource::External)
        }
    }

    /// Set the RF clock prescaler, divisor 1 to 31. The hardware field
    /// stores the divisor minus one; this pair of accessors hides that, so
    /// `set_rf_prescaler(p)` reads back as `p`. Verified.
    ///
    /// # Errors
    ///
    /// [`EvgError::InvalidArgument`] outside 1..=31 (no wire traffic),
    /// transport failure, or read-back mismatch.
    pub fn set_rf_prescaler(&self, prescaler: u16) -> Result<()> {
        if !regs::RF_PRESCALER_RANGE.contains(&prescaler) {
            return Err(EvgError::invalid_argument(format!(
                "RF prescaler {prescaler} outside 1..=31"
            )));
        }
        tracing::debug!(device = self.name(), prescaler, "set RF prescaler");
        let mut guard = self.lock_link();
        let mut io = self.locked_io(&mut guard)?;
        let value = io.read_reg(regs::RF_CONTROL)?;
        let value = (value & !rf_control::DIVIDER_MASK) | (prescaler - 1);
        io.write_check_reg(regs::RF_CONTROL, value)
    }

    /// Current RF clock prescaler as a divisor (field value plus one).
    ///
    /// # Errors
    ///
    /// Transport failure.
    pub fn get_rf_prescaler(&self) -> Result<u16> {
        let mut guard = self.lock_link();
        let mut io = self.locked_io(&mut guard)?;
        let value = io.read_reg(regs::RF_CONTROL)?;
        Ok((value & rf_control::DIVIDER_MASK) + 1)
    }

    // ── AC trigger ───────────────────────────────────────────────────────

    /// Set the AC trigger prescaler, divisor 1 to 255. The rest of the AC
    /// enable register is left intact. Verified.
    ///
    /// # Errors
    ///
    /// [`EvgError::InvalidArgument`] outside 1..=255 (no wire traffic),
    /// transport failure, or read-back mismatch.
    pub fn set_ac_prescaler(&self, prescaler: u16) -> Result<()> {
        if !regs::AC_PRESCALER_RANGE.contains(&prescaler) {
            return Err(EvgError::invalid_argument(format!(
                "AC prescaler {prescaler} outside 1..=255"
            )));
        }
        tracing::debug!(device = self.name(), prescaler, "set AC prescaler");
        let mut guard = self.lock_link();
        let mut io = self.locked_io(&mut guard)?;
        let value = io.read_reg(regs::AC_ENABLE)?;
        let value = (value & !ac_enable::DIVIDER_MASK) | prescaler;
        io.write_check_reg(regs::AC_ENABLE, value)
    }

    /// Current AC trigger prescaler.
    ///
    /// # Errors
    ///
    /// Transport failure.
    pub fn get_ac_prescaler(&self) -> Result<u16> {
        let mut guard = self.lock_link();
        let mut io = self.locked_io(&mut guard)?;
        let value = io.read_reg(regs::AC_ENABLE)?;
        Ok(value & ac_enable::DIVIDER_MASK)
    }

    /// Select the AC trigger synchronization source. Verified.
    ///
    /// # Errors
    ///
    /// Transport failure or read-back mismatch.
    pub fn set_ac_sync_source(&self, source: AcSyncSource) -> Result<()> {
        tracing::debug!(device = self.name(), ?source, "set AC sync source");
        let mut guard = self.lock_link();
        let mut io = self.locked_io(&mut guard)?;
        let value = io.read_reg(regs::AC_ENABLE)?;
        let value = match source {
            AcSyncSource::Event => value & !ac_enable::SYNC,
            AcSyncSource::Mxc7 => value | ac_enable::SYNC,
        };
        io.write_check_reg(regs::AC_ENABLE, value)
    }

    /// Current AC trigger synchronization source, decoded from the sync
    /// bit mask.
    ///
    /// # Errors
    ///
    /// Transport failure.
    pub fn get_ac_sync_source(&self) -> Result<AcSyncSource> {
        let mut guard = self.lock_link();
        let mut io = self.locked_io(&mut guard)?;
        let value = io.read_reg(regs::AC_ENABLE)?;
        if value & ac_enable::SYNC == 0 {
            Ok(AcSyncSource::Event)
        } else {
            Ok(AcSyncSource::Mxc7)
        }
    }

    // ── Sequencers ───────────────────────────────────────────────────────

    /// Start or stop a sequencer. Write only, not verified: the run bit can
    /// clear itself when a sequence finishes.
    ///
    /// # Errors
    ///
    /// [`EvgError::InvalidArgument`] if the revision lacks the sequencer;
    /// transport failure.
    pub fn enable_sequencer(&self, seq: Sequencer, on: bool) -> Result<()> {
        self.check_sequencer(seq)?;
        tracing::debug!(device = self.name(), %seq, on, "sequencer enable");
        let mut guard = self.lock_link();
        let mut io = self.locked_io(&mut guard)?;
        let value = io.read_reg(regs::EVENT_ENABLE)?;
        let value = if on {
            value | seq.enable_bit()
        } else {
            value & !seq.enable_bit()
        };
        io.write_reg(regs::EVENT_ENABLE, value)
    }

    /// Whether a sequencer's run bit is set.
    ///
    /// # Errors
    ///
    /// [`EvgError::InvalidArgument`] if the revision lacks the sequencer;
    /// transport failure.
    pub fn is_sequencer_enabled(&self, seq: Sequencer) -> Result<bool> {
        self.check_sequencer(seq)?;
        let mut guard = self.lock_link();
        let mut io = self.locked_io(&mut guard)?;
        let value = io.read_reg(regs::EVENT_ENABLE)?;
        Ok(value & seq.enable_bit() != 0)
    }

    /// Route a sequencer's trigger to the soft (VME) source or the AC
    /// mains trigger. Touches both the event enable and AC enable
    /// registers; neither write is read back.
    ///
    /// # Errors
    ///
    /// [`EvgError::InvalidArgument`] if the revision lacks the sequencer;
    /// transport failure.
    pub fn set_sequencer_trigger_source(
        &self,
        seq: Sequencer,
        source: TriggerSource,
    ) -> Result<()> {
        self.check_sequencer(seq)?;
        tracing::debug!(device = self.name(), %seq, ?source, "set trigger source");
        let mut guard = self.lock_link();
        let mut io = self.locked_io(&mut guard)?;

        let enables = io.read_reg(regs::EVENT_ENABLE)?;
        let enables = match source {
            TriggerSource::Soft => enables | event_enable::VME,
            TriggerSource::Ac => enables & !event_enable::VME,
        };
        io.write_reg(regs::EVENT_ENABLE, enables)?;

        let ac = io.read_reg(regs::AC_ENABLE)?;
        let ac = match source {
            TriggerSource::Soft => ac & !seq.ac_route_bit(),
            TriggerSource::Ac => ac | seq.ac_route_bit(),
        };
        io.write_reg(regs::AC_ENABLE, ac)
    }

    /// Set a sequencer's clock prescaler. Verified.
    ///
    /// # Errors
    ///
    /// [`EvgError::InvalidArgument`] if the revision lacks the sequencer;
    /// transport failure or read-back mismatch.
    pub fn set_sequencer_prescaler(&self, seq: Sequencer, prescaler: u16) -> Result<()> {
        self.check_sequencer(seq)?;
        tracing::debug!(device = self.name(), %seq, prescaler, "set sequencer prescaler");
        let mut guard = self.lock_link();
        let mut io = self.locked_io(&mut guard)?;
        io.write_check_reg(seq.clock_sel_reg(), prescaler)
    }

    /// Pulse a sequencer's soft trigger bit. The bit self-clears, so the
    /// write is not read back.
    ///
    /// # Errors
    ///
    /// [`EvgError::InvalidArgument`] if the revision lacks the sequencer;
    /// transport failure.
    pub fn trigger_sequencer(&self, seq: Sequencer) -> Result<()> {
        self.check_sequencer(seq)?;
        tracing::debug!(device = self.name(), %seq, "soft trigger");
        let mut guard = self.lock_link();
        let mut io = self.locked_io(&mut guard)?;
        let value = io.read_reg(regs::CONTROL)?;
        io.write_reg(regs::CONTROL, value | seq.trigger_bit())
    }

    // ── Sequence RAM ─────────────────────────────────────────────────────

    /// Program an event code at a sequence RAM address. Latched write:
    /// the address register is written and verified, then the code port.
    ///
    /// # Errors
    ///
    /// [`EvgError::InvalidArgument`] for a missing sequencer, address
    /// outside the RAM, or code above 7 bits (no wire traffic); transport
    /// failure or read-back mismatch.
    pub fn set_event(&self, seq: Sequencer, address: u16, code: u16) -> Result<()> {
        self.check_sequencer(seq)?;
        check_ram_address(address)?;
        check_event_code(code)?;
        tracing::debug!(device = self.name(), %seq, address, code, "set event");
        let mut guard = self.lock_link();
        let mut io = self.locked_io(&mut guard)?;
        io.write_check_reg(seq.address_reg(), address)?;
        io.write_check_reg(seq.code_reg(), code)
    }

    /// Read the event code at a sequence RAM address.
    ///
    /// # Errors
    ///
    /// [`EvgError::InvalidArgument`] for a missing sequencer or address
    /// outside the RAM; transport failure or latch read-back mismatch.
    pub fn get_event(&self, seq: Sequencer, address: u16) -> Result<u16> {
        self.check_sequencer(seq)?;
        check_ram_address(address)?;
        let mut guard = self.lock_link();
        let mut io = self.locked_io(&mut guard)?;
        io.write_check_reg(seq.address_reg(), address)?;
        io.read_reg(seq.code_reg())
    }

    /// Program a timestamp, in seconds, at a sequence RAM address. The
    /// time is converted to device clock cycles at the configured reference
    /// frequency and split across the two timestamp words, each verified.
    ///
    /// # Errors
    ///
    /// [`EvgError::InvalidArgument`] for a missing sequencer, address
    /// outside the RAM, a negative or non-finite time, or a cycle count
    /// above 32 bits (no wire traffic); transport failure or read-back
    /// mismatch.
    #[allow(clippy::cast_possible_truncation)]
    pub fn set_timestamp(&self, seq: Sequencer, address: u16, seconds: f64) -> Result<()> {
        self.check_sequencer(seq)?;
        check_ram_address(address)?;
        let cycles = seconds_to_cycles(seconds, self.config.frequency_hz)?;
        tracing::debug!(device = self.name(), %seq, address, seconds, cycles, "set timestamp");
        let mut guard = self.lock_link();
        let mut io = self.locked_io(&mut guard)?;
        io.write_check_reg(seq.address_reg(), address)?;
        io.write_check_reg(seq.time_reg(), (cycles >> 16) as u16)?;
        io.write_check_reg(seq.time_reg() + 2, (cycles & 0xFFFF) as u16)
    }

    /// Read the timestamp, in seconds, at a sequence RAM address.
    ///
    /// # Errors
    ///
    /// [`EvgError::InvalidArgument`] for a missing sequencer or address
    /// outside the RAM; transport failure or latch read-back mismatch.
    pub fn get_timestamp(&self, seq: Sequencer, address: u16) -> Result<f64> {
        self.check_sequencer(seq)?;
        check_ram_address(address)?;
        let mut guard = self.lock_link();
        let mut io = self.locked_io(&mut guard)?;
        io.write_check_reg(seq.address_reg(), address)?;
        let hi = io.read_reg(seq.time_reg())?;
        let lo = io.read_reg(seq.time_reg() + 2)?;
        let cycles = (u32::from(hi) << 16) | u32::from(lo);
        Ok(f64::from(cycles) / f64::from(self.config.frequency_hz))
    }

    // ── Multiplexed counters ─────────────────────────────────────────────

    /// Program a multiplexed counter's 32-bit prescaler. Four verified
    /// writes: select counter + high word, write high word, select counter
    /// + low word, write low word.
    ///
    /// # Errors
    ///
    /// [`EvgError::InvalidArgument`] for a counter above 7 (no wire
    /// traffic); transport failure or read-back mismatch.
    #[allow(clippy::cast_possible_truncation)]
    pub fn set_counter_prescaler(&self, counter: u8, prescaler: u32) -> Result<()> {
        if counter >= regs::MXC_COUNT {
            return Err(EvgError::invalid_argument(format!(
                "counter {counter} outside 0..={}",
                regs::MXC_COUNT - 1
            )));
        }
        tracing::debug!(device = self.name(), counter, prescaler, "set counter prescaler");
        let mut guard = self.lock_link();
        let mut io = self.locked_io(&mut guard)?;
        let select = u16::from(counter);
        io.write_check_reg(regs::MXC_CONTROL, mxc_control::HIGH_WORD | select)?;
        io.write_check_reg(regs::MXC_PRESCALER, (prescaler >> 16) as u16)?;
        io.write_check_reg(regs::MXC_CONTROL, select)?;
        io.write_check_reg(regs::MXC_PRESCALER, (prescaler & 0xFFFF) as u16)
    }

    // ── Misc ─────────────────────────────────────────────────────────────

    /// Firmware revision word.
    ///
    /// # Errors
    ///
    /// Transport failure.
    pub fn get_firmware_version(&self) -> Result<u16> {
        let mut guard = self.lock_link();
        let mut io = self.locked_io(&mut guard)?;
        io.read_reg(regs::FIRMWARE)
    }

    /// Inject a software event code. No read-back.
    ///
    /// # Errors
    ///
    /// [`EvgError::InvalidArgument`] for a code above 7 bits (no wire
    /// traffic); transport failure.
    pub fn set_software_event(&self, code: u16) -> Result<()> {
        check_event_code(code)?;
        tracing::debug!(device = self.name(), code, "software event");
        let mut guard = self.lock_link();
        let mut io = self.locked_io(&mut guard)?;
        io.write_reg(regs::SW_EVENT, code)
    }
}

fn check_ram_address(address: u16) -> Result<()> {
    if address < regs::SEQUENCE_RAM_SIZE {
        Ok(())
    } else {
        Err(EvgError::invalid_argument(format!(
            "sequence address {address} outside 0..{}",
            regs::SEQUENCE_RAM_SIZE
        )))
    }
}

fn check_event_code(code: u16) -> Result<()> {
    if code <= regs::MAX_EVENT_CODE {
        Ok(())
    } else {
        Err(EvgError::invalid_argument(format!(
            "event code {code:#x} above {:#x}",
            regs::MAX_EVENT_CODE
        )))
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn seconds_to_cycles(seconds: f64, frequency_hz: u32) -> Result<u32> {
    if !seconds.is_finite() || seconds < 0.0 {
        return Err(EvgError::invalid_argument(format!(
            "timestamp {seconds} is not a non-negative time"
        )));
    }
    let cycles = (seconds * f64::from(frequency_hz)).round();
    if cycles > f64::from(u32::MAX) {
        return Err(EvgError::invalid_argument(format!(
            "timestamp {seconds} s overflows the cycle counter at {frequency_hz} Hz"
        )));
    }
    Ok(cycles as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_conversion_rounds_to_nearest() {
        assert_eq!(seconds_to_cycles(0.000_008, 125_000_000).unwrap(), 1000);
        assert_eq!(seconds_to_cycles(0.0, 125_000_000).unwrap(), 0);
        // Half a cycle rounds up.
        assert_eq!(seconds_to_cycles(1.5, 1).unwrap(), 2);
    }

    #[test]
    fn cycle_conversion_rejects_overflow_and_nonsense() {
        // 40 s at 125 MHz is 5e9 cycles, past 2^32 - 1.
        assert!(seconds_to_cycles(40.0, 125_000_000).is_err());
        assert!(seconds_to_cycles(-1.0, 125_000_000).is_err());
        assert!(seconds_to_cycles(f64::NAN, 125_000_000).is_err());
        assert!(seconds_to_cycles(f64::INFINITY, 125_000_000).is_err());
    }

    #[test]
    fn largest_representable_timestamp_fits() {
        // 2^32 - 1 cycles exactly.
        let seconds = f64::from(u32::MAX);
        assert_eq!(seconds_to_cycles(seconds, 1).unwrap(), u32::MAX);
    }
}
