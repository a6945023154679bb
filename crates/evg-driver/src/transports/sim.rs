//! Software model of the card behind the [`Transport`] trait.
//!
//! Implements the register gateway in pure Rust: a flat register file plus
//! the stateful indirections the real card has — per-sequencer RAM reached
//! through the address latch, and the MXC prescaler word mux. This lets the
//! entire driver path (registry, lock, register I/O, typed operations) run
//! in CI with no hardware and no sockets.
//!
//! Fidelity notes:
//!
//! - Reads and writes behave like the card's write-through registers:
//!   a write stores, a read returns the stored value, replies echo the
//!   request with `status = 0`.
//! - `SEQ_CODEn` / `SEQ_TIMEn` accesses are indirected through the value
//!   last written to `SEQ_ADDRESSn`, exactly like the latched protocol.
//! - `MXC_PRESCALER` accesses hit the high or low word of the counter
//!   selected in `MXC_CONTROL`.
//! - `FIRMWARE` is read-only and reports [`SIM_FIRMWARE`].

use std::collections::HashMap;

use evg_card::{regs, Message, Sequencer, ACCESS_WRITE};

use crate::error::Result;
use crate::transport::Transport;

/// Firmware word the simulated card reports.
pub const SIM_FIRMWARE: u16 = 0x0230;

const RAM_SIZE: usize = regs::SEQUENCE_RAM_SIZE as usize;
const RAM_INDEX_MASK: u16 = regs::SEQUENCE_RAM_SIZE - 1;

/// Per-sequencer RAM: event codes plus the two timestamp words.
#[derive(Debug)]
struct SequenceRam {
    codes: Vec<u16>,
    time_hi: Vec<u16>,
    time_lo: Vec<u16>,
}

impl SequenceRam {
    fn new() -> Self {
        Self {
            codes: vec![0; RAM_SIZE],
            time_hi: vec![0; RAM_SIZE],
            time_lo: vec![0; RAM_SIZE],
        }
    }
}

/// In-process model of one card.
#[derive(Debug)]
pub struct SimTransport {
    /// Flat registers (CONTROL, EVENT_ENABLE, AC_ENABLE, ...).
    registers: HashMap<u16, u16>,
    /// Sequence RAM banks, indexed by sequencer.
    rams: [SequenceRam; 2],
    /// MXC prescaler words, `[counter][0]` = high, `[counter][1]` = low.
    mxc: [[u16; 2]; 8],
}

impl SimTransport {
    /// Fresh card: all registers zero, firmware word preloaded.
    #[must_use]
    pub fn new() -> Self {
        let mut registers = HashMap::new();
        registers.insert(regs::FIRMWARE, SIM_FIRMWARE);
        Self {
            registers,
            rams: [SequenceRam::new(), SequenceRam::new()],
            mxc: [[0; 2]; 8],
        }
    }

    fn latch(&self, seq: Sequencer) -> usize {
        let raw = self
            .registers
            .get(&seq.address_reg())
            .copied()
            .unwrap_or(0);
        usize::from(raw & RAM_INDEX_MASK)
    }

    fn mxc_slot(&mut self) -> &mut u16 {
        let control = self.registers.get(&regs::MXC_CONTROL).copied().unwrap_or(0);
        let counter = usize::from(control & regs::mxc_control::COUNTER_MASK);
        let word = usize::from(control & regs::mxc_control::HIGH_WORD == 0);
        &mut self.mxc[counter][word]
    }

    /// Resolve a register offset to its backing cell, honoring the latched
    /// indirections.
    fn cell(&mut self, reg: u16) -> &mut u16 {
        for seq in [Sequencer::A, Sequencer::B] {
            if reg == seq.code_reg() {
                let index = self.latch(seq);
                return &mut self.rams[seq.index() as usize].codes[index];
            }
            if reg == seq.time_reg() {
                let index = self.latch(seq);
                return &mut self.rams[seq.index() as usize].time_hi[index];
            }
            if reg == seq.time_reg() + 2 {
                let index = self.latch(seq);
                return &mut self.rams[seq.index() as usize].time_lo[index];
            }
        }
        if reg == regs::MXC_PRESCALER {
            return self.mxc_slot();
        }
        self.registers.entry(reg).or_insert(0)
    }
}

impl Default for SimTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for SimTransport {
    fn exchange(&mut self, request: &Message) -> Result<Message> {
        let reg = request.register();
        let mut reply = *request;
        reply.status = 0;

        if request.access == ACCESS_WRITE {
            if reg != regs::FIRMWARE {
                *self.cell(reg) = request.data;
            }
        } else {
            reply.data = *self.cell(reg);
        }

        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read(sim: &mut SimTransport, reg: u16) -> u16 {
        sim.exchange(&Message::read(reg)).unwrap().data
    }

    fn write(sim: &mut SimTransport, reg: u16, data: u16) {
        sim.exchange(&Message::write(reg, data)).unwrap();
    }

    #[test]
    fn plain_registers_are_write_through() {
        let mut sim = SimTransport::new();
        assert_eq!(read(&mut sim, regs::CONTROL), 0);
        write(&mut sim, regs::CONTROL, 0x7001);
        assert_eq!(read(&mut sim, regs::CONTROL), 0x7001);
    }

    #[test]
    fn firmware_is_read_only() {
        let mut sim = SimTransport::new();
        write(&mut sim, regs::FIRMWARE, 0xFFFF);
        assert_eq!(read(&mut sim, regs::FIRMWARE), SIM_FIRMWARE);
    }

    #[test]
    fn code_port_is_latched() {
        let mut sim = SimTransport::new();
        write(&mut sim, regs::SEQ_ADDRESS0, 5);
        write(&mut sim, regs::SEQ_CODE0, 0x2A);
        write(&mut sim, regs::SEQ_ADDRESS0, 6);
        write(&mut sim, regs::SEQ_CODE0, 0x7F);

        write(&mut sim, regs::SEQ_ADDRESS0, 5);
        assert_eq!(read(&mut sim, regs::SEQ_CODE0), 0x2A);
        write(&mut sim, regs::SEQ_ADDRESS0, 6);
        assert_eq!(read(&mut sim, regs::SEQ_CODE0), 0x7F);
    }

    #[test]
    fn sequencer_banks_are_independent() {
        let mut sim = SimTransport::new();
        write(&mut sim, regs::SEQ_ADDRESS0, 0);
        write(&mut sim, regs::SEQ_ADDRESS1, 0);
        write(&mut sim, regs::SEQ_CODE0, 0x11);
        write(&mut sim, regs::SEQ_CODE1, 0x22);
        assert_eq!(read(&mut sim, regs::SEQ_CODE0), 0x11);
        assert_eq!(read(&mut sim, regs::SEQ_CODE1), 0x22);
    }

    #[test]
    fn mxc_words_follow_the_select_register() {
        let mut sim = SimTransport::new();
        write(&mut sim, regs::MXC_CONTROL, regs::mxc_control::HIGH_WORD | 3);
        write(&mut sim, regs::MXC_PRESCALER, 0x00BC);
        write(&mut sim, regs::MXC_CONTROL, 3);
        write(&mut sim, regs::MXC_PRESCALER, 0x614E);

        write(&mut sim, regs::MXC_CONTROL, regs::mxc_control::HIGH_WORD | 3);
        assert_eq!(read(&mut sim, regs::MXC_PRESCALER), 0x00BC);
        write(&mut sim, regs::MXC_CONTROL, 3);
        assert_eq!(read(&mut sim, regs::MXC_PRESCALER), 0x614E);
    }

    #[test]
    fn reply_echoes_address_and_access() {
        let mut sim = SimTransport::new();
        let request = Message::read(regs::AC_ENABLE);
        let reply = sim.exchange(&request).unwrap();
        assert_eq!(reply.access, request.access);
        assert_eq!(reply.address, request.address);
        assert_eq!(reply.status, 0);
    }
}
