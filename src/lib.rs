//! # `cc3000-hal`
//! This is a host-side driver for the TI CC3000 Wi-Fi co-processor.
//! The chip runs the whole network stack itself, we just tell it what to do over SPI and keep
//! track of what it reports back.
//! ## Overview
//! The bus and the framing of commands are provided by an implementation of [Hci]. On top of that
//! this crate implements the connection lifecycle, the provisioning handshake and a byte stream
//! for sockets.
//!
//! ### Asynchronous events
//! Apart from replying to commands, the chip raises events on its own, for example when the link
//! comes up or the remote side of a socket closes it. The interrupt dispatcher of the bus hands
//! every one of these to [SessionState::apply], which updates a set of flags. That is the only way
//! information flows from the interrupt back into the driver. Nothing ever waits on a
//! notification, everything polls those flags.
//!
//! ### Waiting
//! Every multi-step operation of [Cc3000] issues commands and then polls the [SessionState] in
//! 10 ms increments, until either the condition is met or a fixed bound expires. The only
//! exception is [Cc3000::connect_with_retry], which keeps retrying for as long as it takes.
//!
//! ### Sockets
//! A [Client] wraps one socket of the chip. Reads are buffered, so reading byte by byte doesn't
//! cost a bus transaction per byte. A remote close is only noticed, once all received data has
//! been read.

#![cfg_attr(not(test), no_std)]
pub(crate) mod fmt;

mod client;
mod config;
mod controller;
mod events;
mod hci;
#[cfg(test)]
mod mock;
mod state;
mod sync;

pub use client::*;
pub use config::*;
pub use controller::*;
pub use events::*;
pub use hci::*;
pub use state::*;

type DefaultRawMutex = embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
