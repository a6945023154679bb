//! Transport abstraction for the register gateway.
//!
//! A transport moves one 12-octet request to the card and brings one
//! 12-octet reply back. Two implementations ship with the crate:
//!
//! - [`UdpTransport`](crate::transports::UdpTransport) — the real thing,
//!   one connected datagram socket per device.
//! - [`SimTransport`](crate::transports::SimTransport) — a software model
//!   of the card, so the full driver path runs without hardware.
//!
//! Serialization is NOT the transport's job: callers hold the device lock
//! around every exchange, so requests and replies on one device form a
//! strict sequence (essential for the address-latch register protocol).

use std::time::Duration;

use evg_card::Message;

use crate::error::Result;

/// Maximum number of transmission attempts per exchange.
pub const MAX_RETRIES: u32 = 3;

/// How long each attempt waits for a reply datagram.
pub const REPLY_TIMEOUT: Duration = Duration::from_millis(1000);

/// One request/reply round-trip to the register gateway.
///
/// Implementations retry internally; an `Err` return means the exchange is
/// definitively over. A non-zero reply `status` is NOT an error at this
/// layer — the card is authoritative and the caller may inspect it.
pub trait Transport: Send + std::fmt::Debug {
    /// Send `request` and return the card's reply.
    ///
    /// # Errors
    ///
    /// Returns [`EvgError::TransportTimeout`](crate::EvgError::TransportTimeout)
    /// when every attempt failed or went unanswered.
    fn exchange(&mut self, request: &Message) -> Result<Message>;
}
