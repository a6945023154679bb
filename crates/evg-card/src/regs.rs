//! VME-EVG230/RF register map.
//!
//! Offsets and bit values are the external contract with the card firmware
//! (VME-EVG230 address map, reached through the network register gateway at
//! `REGISTER_BASE`). They must not be reordered or renumbered.
//!
//! Registers are 16 bits wide. The gateway addresses them as
//! `REGISTER_BASE + offset`; 32-bit quantities (sequence timestamps, MXC
//! prescalers) are split across two adjacent registers, high word first.

/// Base address of the register file as seen by the network gateway.
pub const REGISTER_BASE: u32 = 0x8000_0000;

// ── Register offsets ─────────────────────────────────────────────────────────

/// Master control: enable/disable, soft trigger pulse bits.
pub const CONTROL: u16 = 0x00;
/// Event source enables: sequencers, VME (soft) trigger.
pub const EVENT_ENABLE: u16 = 0x02;
/// Software event injection.
pub const SW_EVENT: u16 = 0x04;
/// Sequencer 0 clock prescaler.
pub const SEQ_CLOCK_SEL1: u16 = 0x24;
/// Sequencer 1 clock prescaler.
pub const SEQ_CLOCK_SEL2: u16 = 0x26;
/// AC trigger: sync source, per-sequencer routing, divider.
pub const AC_ENABLE: u16 = 0x28;
/// MXC counter select and high/low word latch.
pub const MXC_CONTROL: u16 = 0x2A;
/// MXC prescaler data port (word selected via `MXC_CONTROL`).
pub const MXC_PRESCALER: u16 = 0x2C;
/// Firmware revision, read-only.
pub const FIRMWARE: u16 = 0x2E;
/// RF clock: source select and divider.
pub const RF_CONTROL: u16 = 0x40;
/// Sequencer 0 RAM address latch.
pub const SEQ_ADDRESS0: u16 = 0x44;
/// Sequencer 0 event code port.
pub const SEQ_CODE0: u16 = 0x46;
/// Sequencer 0 timestamp port, high word (low word at +2).
pub const SEQ_TIME0: u16 = 0x48;
/// Sequencer 1 RAM address latch.
pub const SEQ_ADDRESS1: u16 = 0x50;
/// Sequencer 1 event code port.
pub const SEQ_CODE1: u16 = 0x52;
/// Sequencer 1 timestamp port, high word (low word at +2).
pub const SEQ_TIME1: u16 = 0x54;
/// Microsecond divider for the on-card timebase.
pub const USEC_DIVIDER: u16 = 0x68;

// ── CONTROL bits ─────────────────────────────────────────────────────────────

/// `CONTROL` register bit definitions.
pub mod control {
    /// Composite word written to enable the card (receiver left disabled).
    pub const ENABLE: u16 = 0x7001;
    /// Composite word written to disable the card.
    pub const DISABLE: u16 = 0xF001;
    /// Master-disable bit; clear means the card is enabled.
    pub const DISABLE_BIT: u16 = 0x8000;
    /// Soft trigger pulse for sequencer 0.
    pub const VTRG1: u16 = 0x0100;
    /// Soft trigger pulse for sequencer 1.
    pub const VTRG2: u16 = 0x0080;
}

// ── EVENT_ENABLE bits ────────────────────────────────────────────────────────

/// `EVENT_ENABLE` register bit definitions.
pub mod event_enable {
    /// Sequencer 0 run enable.
    pub const SEQUENCER0: u16 = 0x0004;
    /// Sequencer 1 run enable.
    pub const SEQUENCER1: u16 = 0x0002;
    /// VME (soft) trigger source enable.
    pub const VME: u16 = 0x0001;
}

// ── AC_ENABLE bits ───────────────────────────────────────────────────────────

/// `AC_ENABLE` register bit definitions.
pub mod ac_enable {
    /// Sync source select: set = MXC7, clear = event clock.
    pub const SYNC: u16 = 0x1000;
    /// Route the AC trigger to sequencer 0.
    pub const SEQ0: u16 = 0x4000;
    /// Route the AC trigger to sequencer 1.
    pub const SEQ1: u16 = 0x8000;
    /// AC trigger divider field, low byte.
    pub const DIVIDER_MASK: u16 = 0x00FF;
}

// ── MXC_CONTROL bits ─────────────────────────────────────────────────────────

/// `MXC_CONTROL` register bit definitions.
pub mod mxc_control {
    /// Select the high word of the 32-bit prescaler; clear selects the low.
    pub const HIGH_WORD: u16 = 0x0008;
    /// Counter index field.
    pub const COUNTER_MASK: u16 = 0x0007;
}

// ── RF_CONTROL bits ──────────────────────────────────────────────────────────

/// `RF_CONTROL` register bit definitions.
pub mod rf_control {
    /// External RF source select bits; all clear means internal.
    pub const EXTERNAL: u16 = 0x01C0;
    /// RF divider field. The field holds the divisor minus one.
    pub const DIVIDER_MASK: u16 = 0x003F;
}

// ── Domain constants ─────────────────────────────────────────────────────────

/// Event code that terminates a sequence.
pub const END_EVENT_CODE: u16 = 0x7F;
/// Largest event code the card accepts (7-bit codes).
pub const MAX_EVENT_CODE: u16 = 0x7F;
/// Number of entries in each sequencer's RAM.
pub const SEQUENCE_RAM_SIZE: u16 = 2048;
/// Number of multiplexed counters.
pub const MXC_COUNT: u8 = 8;
/// Valid RF prescaler divisors.
pub const RF_PRESCALER_RANGE: core::ops::RangeInclusive<u16> = 1..=31;
/// Valid AC trigger prescaler divisors.
pub const AC_PRESCALER_RANGE: core::ops::RangeInclusive<u16> = 1..=255;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offsets_match_address_map() {
        assert_eq!(CONTROL, 0x00);
        assert_eq!(EVENT_ENABLE, 0x02);
        assert_eq!(SEQ_CLOCK_SEL1, 0x24);
        assert_eq!(AC_ENABLE, 0x28);
        assert_eq!(MXC_CONTROL, 0x2A);
        assert_eq!(MXC_PRESCALER, 0x2C);
        assert_eq!(RF_CONTROL, 0x40);
        assert_eq!(SEQ_ADDRESS0, 0x44);
        assert_eq!(SEQ_ADDRESS1, 0x50);
        assert_eq!(USEC_DIVIDER, 0x68);
    }

    #[test]
    fn timestamp_ports_are_adjacent_pairs() {
        // Low word of each timestamp sits directly after the high word.
        assert_eq!(SEQ_TIME0 + 2, 0x4A);
        assert_eq!(SEQ_TIME1 + 2, 0x56);
        // Neither low word collides with another register.
        assert_ne!(SEQ_TIME0 + 2, SEQ_ADDRESS1);
        assert_ne!(SEQ_TIME1 + 2, USEC_DIVIDER);
    }

    #[test]
    fn control_words_carry_disable_bit() {
        assert_eq!(control::ENABLE & control::DISABLE_BIT, 0);
        assert_eq!(control::DISABLE & control::DISABLE_BIT, control::DISABLE_BIT);
    }

    #[test]
    fn rf_divider_field_holds_full_range() {
        // Divisor minus one for every valid divisor fits in the field.
        for p in RF_PRESCALER_RANGE {
            assert_eq!((p - 1) & !rf_control::DIVIDER_MASK, 0);
        }
    }
}
