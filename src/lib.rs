//! A host-side driver for reading N64 cartridge ROM over a USB-attached
//! FTDI FT2232H running in MPSSE mode.
//!
//! The cartridge bus is multiplexed 16-bit address/data, latched by ALE_H/
//! ALE_L strobes and read out through /RE, across the FT2232H's two MPSSE
//! channels in lock-step via a GPIO WAIT handshake. [`RomSession`] is the
//! only type most callers need: open it, call [`RomSession::read512`]
//! repeatedly at increasing addresses, close it.
//!
//! # Quickstart
//!
//! ```no_run
//! use n64_cart_reader::RomSession;
//!
//! let mut session = RomSession::open()?;
//! let window = session.read512(0x1000_0000)?;
//! println!("read {} bytes", window.len());
//! # Ok::<(), n64_cart_reader::RomError>(())
//! ```
//!
//! # Limitations
//!
//! * Read-only: no cartridge writes, flash programming, or SRAM access.
//! * No CIC/security handshake or cartridge-presence detection beyond what
//!   the bus returns.
//! * Linux users: the udev rules an FTDI device normally needs for
//!   unprivileged access apply here too.

#![forbid(unsafe_code)]

mod bringup;
mod error;
mod list;
mod mpsse;
mod pins;
mod session;
mod transport;

pub use error::RomError;
pub use session::RomSession;
pub use transport::{ChannelId, ChipType};
