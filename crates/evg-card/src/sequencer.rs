//! Sequencer register banks and card revision variants.
//!
//! The card carries up to two sequencer engines with identical programming
//! models over disjoint register banks. [`Sequencer`] resolves an engine to
//! its bank; [`CardRevision`] says which engines a given card actually has,
//! folding the single- and dual-sequencer firmware revisions into one
//! superset register map.

use crate::regs;

/// One of the two on-card sequencer engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Sequencer {
    /// Sequencer 0 (present on all revisions).
    A,
    /// Sequencer 1 (dual-sequencer revisions only).
    B,
}

impl Sequencer {
    /// Engine index as used by the external interface (0 or 1).
    #[must_use]
    pub const fn index(self) -> u8 {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }

    /// Engine from its external index.
    #[must_use]
    pub const fn from_index(index: u8) -> Option<Self> {
        match index {
            0 => Some(Self::A),
            1 => Some(Self::B),
            _ => None,
        }
    }

    /// RAM address latch register.
    #[must_use]
    pub const fn address_reg(self) -> u16 {
        match self {
            Self::A => regs::SEQ_ADDRESS0,
            Self::B => regs::SEQ_ADDRESS1,
        }
    }

    /// Event code port, addressed through the latch.
    #[must_use]
    pub const fn code_reg(self) -> u16 {
        match self {
            Self::A => regs::SEQ_CODE0,
            Self::B => regs::SEQ_CODE1,
        }
    }

    /// Timestamp port, high word; the low word sits at `+2`.
    #[must_use]
    pub const fn time_reg(self) -> u16 {
        match self {
            Self::A => regs::SEQ_TIME0,
            Self::B => regs::SEQ_TIME1,
        }
    }

    /// Clock prescaler register.
    #[must_use]
    pub const fn clock_sel_reg(self) -> u16 {
        match self {
            Self::A => regs::SEQ_CLOCK_SEL1,
            Self::B => regs::SEQ_CLOCK_SEL2,
        }
    }

    /// Run-enable bit in `EVENT_ENABLE`.
    #[must_use]
    pub const fn enable_bit(self) -> u16 {
        match self {
            Self::A => regs::event_enable::SEQUENCER0,
            Self::B => regs::event_enable::SEQUENCER1,
        }
    }

    /// Soft trigger pulse bit in `CONTROL`.
    #[must_use]
    pub const fn trigger_bit(self) -> u16 {
        match self {
            Self::A => regs::control::VTRG1,
            Self::B => regs::control::VTRG2,
        }
    }

    /// AC trigger routing bit in `AC_ENABLE`.
    #[must_use]
    pub const fn ac_route_bit(self) -> u16 {
        match self {
            Self::A => regs::ac_enable::SEQ0,
            Self::B => regs::ac_enable::SEQ1,
        }
    }
}

impl core::fmt::Display for Sequencer {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "sequencer {}", self.index())
    }
}

/// Firmware revision variant of a card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CardRevision {
    /// Revisions with only sequencer 0 fitted.
    SingleSequencer,
    /// Revisions with both sequencer engines.
    #[default]
    DualSequencer,
}

impl CardRevision {
    /// Whether this revision fits the given engine.
    #[must_use]
    pub const fn has_sequencer(self, sequencer: Sequencer) -> bool {
        match self {
            Self::DualSequencer => true,
            Self::SingleSequencer => matches!(sequencer, Sequencer::A),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn banks_are_disjoint() {
        assert_ne!(Sequencer::A.address_reg(), Sequencer::B.address_reg());
        assert_ne!(Sequencer::A.code_reg(), Sequencer::B.code_reg());
        assert_ne!(Sequencer::A.time_reg(), Sequencer::B.time_reg());
        assert_ne!(Sequencer::A.clock_sel_reg(), Sequencer::B.clock_sel_reg());
        assert_ne!(Sequencer::A.enable_bit(), Sequencer::B.enable_bit());
        assert_ne!(Sequencer::A.trigger_bit(), Sequencer::B.trigger_bit());
        assert_ne!(Sequencer::A.ac_route_bit(), Sequencer::B.ac_route_bit());
    }

    #[test]
    fn index_roundtrip() {
        for seq in [Sequencer::A, Sequencer::B] {
            assert_eq!(Sequencer::from_index(seq.index()), Some(seq));
        }
        assert_eq!(Sequencer::from_index(2), None);
    }

    #[test]
    fn single_sequencer_revision_lacks_engine_b() {
        assert!(CardRevision::SingleSequencer.has_sequencer(Sequencer::A));
        assert!(!CardRevision::SingleSequencer.has_sequencer(Sequencer::B));
        assert!(CardRevision::DualSequencer.has_sequencer(Sequencer::B));
    }
}
