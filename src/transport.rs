//! The narrow interface this crate needs from an opened FTDI channel.
//!
//! Everything above this module talks to [`ChannelTransport`], never to USB
//! or to `nusb` directly. That keeps the protocol engine (`mpsse`,
//! `bringup`, `session`) testable against [`MockTransport`] without any
//! hardware attached.

use crate::error::RomError;
use futures_lite::future::block_on;
use nusb::transfer::{Control, ControlType, Recipient, RequestBuffer};
use std::time::Duration;

/// Which of the two FT2232H channels a transport or error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelId {
    A,
    B,
}

/// FTDI chip type, as reported by `bcdDevice` during enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChipType {
    FT2232H,
    Other(u16),
}

/// FTDI `SIO_SET_BITMODE` modes this crate uses.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitMode {
    Reset = 0,
    Mpsse = 2,
}

/// Everything the protocol engine needs from one open FTDI channel.
///
/// Device type, vendor ID, and product ID are immutable for the life of the
/// channel; bit mode is the only mutable transport-level state.
pub trait ChannelTransport {
    /// Resets the FTDI interface (`SIO_RESET`).
    fn reset(&mut self) -> Result<(), RomError>;
    /// Applies latency timer, flow control, and read/write timeouts. Values
    /// are the vendor library defaults; this crate does not tune them.
    fn setup_common(&mut self) -> Result<(), RomError>;
    /// Sets the GPIO direction mask and bit mode (MPSSE vs. reset).
    fn set_bit_mode(&mut self, mask: u8, mode: BitMode) -> Result<(), RomError>;
    /// Submits `bytes` as a bulk OUT transfer. Returns the accepted count;
    /// callers must treat a count short of `bytes.len()` as fatal.
    fn write(&mut self, bytes: &[u8]) -> Result<usize, RomError>;
    /// Performs one bulk IN poll into `buf`, returning the number of data
    /// bytes copied in (0 is a valid, non-error result).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, RomError>;
    /// Reads until `buf` is completely filled or a transport error occurs.
    ///
    /// On real hardware this genuinely blocks — the FTDI engine is always
    /// either about to deliver the next byte or wedged behind a stalled
    /// `WaitOnIOHigh`, and a stalled engine surfaces as a USB-level timeout
    /// from an individual [`ChannelTransport::read`] call. The poll cap here
    /// only exists so a transport that keeps returning `Ok(0)` (as a test
    /// double can) fails with [`RomError::ShortRead`] instead of spinning
    /// forever.
    fn read_exact(&mut self, channel: ChannelId, buf: &mut [u8]) -> Result<(), RomError> {
        const MAX_EMPTY_POLLS: usize = 100_000;
        let mut filled = 0;
        let mut empty_polls = 0;
        while filled < buf.len() {
            let n = self.read(&mut buf[filled..])?;
            if n == 0 {
                empty_polls += 1;
                if empty_polls >= MAX_EMPTY_POLLS {
                    return Err(RomError::ShortRead {
                        channel,
                        got: filled,
                        expected: buf.len(),
                    });
                }
            } else {
                empty_polls = 0;
                filled += n;
            }
        }
        Ok(())
    }
    /// Releases the underlying device handle.
    fn close(&mut self) -> Result<(), RomError>;

    fn chip_type(&self) -> ChipType;
    fn vendor_id(&self) -> u16;
    fn product_id(&self) -> u16;
}

/// USB-backed [`ChannelTransport`], one per FT2232H MPSSE interface.
///
/// Mirrors the bring-up sequence of `nusb`-based FTDI drivers in the
/// ecosystem: `SIO_RESET`, buffer purge, latency timer, then
/// `SIO_SET_BITMODE`.
pub struct UsbChannelTransport {
    handle: nusb::Interface,
    channel: ChannelId,
    interface_index: u16,
    write_ep: u8,
    read_ep: u8,
    max_packet_size: usize,
    chip_type: ChipType,
    vendor_id: u16,
    product_id: u16,
}

impl UsbChannelTransport {
    pub(crate) fn new(
        handle: nusb::Interface,
        channel: ChannelId,
        interface_index: u16,
        write_ep: u8,
        read_ep: u8,
        max_packet_size: usize,
        chip_type: ChipType,
        vendor_id: u16,
        product_id: u16,
    ) -> Self {
        Self {
            handle,
            channel,
            interface_index,
            write_ep,
            read_ep,
            max_packet_size,
            chip_type,
            vendor_id,
            product_id,
        }
    }

    fn sio_write(&mut self, request: u8, value: u16) -> Result<(), std::io::Error> {
        self.handle
            .control_out_blocking(
                Control {
                    control_type: ControlType::Vendor,
                    recipient: Recipient::Device,
                    request,
                    value,
                    index: self.interface_index,
                },
                &[],
                Duration::from_secs(1),
            )
            .map_err(std::io::Error::from)?;
        Ok(())
    }
}

impl ChannelTransport for UsbChannelTransport {
    fn reset(&mut self) -> Result<(), RomError> {
        const SIO_RESET_REQUEST: u8 = 0;
        const SIO_RESET_SIO: u16 = 0;
        self.sio_write(SIO_RESET_REQUEST, SIO_RESET_SIO)
            .map_err(|source| RomError::Usb {
                channel: self.channel,
                source,
            })
    }

    fn setup_common(&mut self) -> Result<(), RomError> {
        const SIO_RESET_REQUEST: u8 = 0;
        const SIO_RESET_PURGE_TX: u16 = 2;
        const SIO_RESET_PURGE_RX: u16 = 1;
        const SIO_SET_LATENCY_TIMER_REQUEST: u8 = 0x09;
        const LATENCY_MS: u8 = 16;

        let wrap = |r: Result<(), std::io::Error>| {
            r.map_err(|source| RomError::Usb {
                channel: self.channel,
                source,
            })
        };
        wrap(self.sio_write(SIO_RESET_REQUEST, SIO_RESET_PURGE_TX))?;
        wrap(self.sio_write(SIO_RESET_REQUEST, SIO_RESET_PURGE_RX))?;
        wrap(self.sio_write(SIO_SET_LATENCY_TIMER_REQUEST, LATENCY_MS as u16))
    }

    fn set_bit_mode(&mut self, mask: u8, mode: BitMode) -> Result<(), RomError> {
        const SIO_SET_BITMODE_REQUEST: u8 = 0x0B;
        self.sio_write(
            SIO_SET_BITMODE_REQUEST,
            u16::from_le_bytes([mask, mode as u8]),
        )
        .map_err(|source| RomError::Usb {
            channel: self.channel,
            source,
        })
    }

    fn write(&mut self, bytes: &[u8]) -> Result<usize, RomError> {
        let fut = async {
            let mut sent = 0;
            for batch in bytes.chunks(self.max_packet_size) {
                let result = self
                    .handle
                    .bulk_out(self.write_ep, Vec::from(batch))
                    .await
                    .into_result()
                    .map_err(std::io::Error::from)?;
                sent += result.actual_length();
            }
            Result::<usize, std::io::Error>::Ok(sent)
        };
        block_on(fut).map_err(|source| RomError::Usb {
            channel: self.channel,
            source,
        })
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, RomError> {
        let fut = async {
            let result = self
                .handle
                .bulk_in(self.read_ep, RequestBuffer::new(self.max_packet_size))
                .await
                .into_result()
                .map_err(std::io::Error::from)?;
            // The first two bytes of every FTDI IN packet are modem status,
            // not protocol data.
            if result.len() <= 2 {
                return Result::<usize, std::io::Error>::Ok(0);
            }
            let data = &result[2..];
            let n = data.len().min(buf.len());
            buf[..n].copy_from_slice(&data[..n]);
            Ok(n)
        };
        block_on(fut).map_err(|source| RomError::Usb {
            channel: self.channel,
            source,
        })
    }

    fn close(&mut self) -> Result<(), RomError> {
        self.set_bit_mode(0x00, BitMode::Reset)
    }

    fn chip_type(&self) -> ChipType {
        self.chip_type
    }
    fn vendor_id(&self) -> u16 {
        self.vendor_id
    }
    fn product_id(&self) -> u16 {
        self.product_id
    }
}

#[cfg(test)]
pub(crate) mod mock {
    use super::*;
    use std::collections::VecDeque;

    /// Records every byte written and plays back scripted read responses,
    /// one chunk per `read()` call.
    pub(crate) struct MockTransport {
        pub(crate) written: Vec<u8>,
        pub(crate) read_script: VecDeque<Vec<u8>>,
        pub(crate) write_short_by: usize,
        pub(crate) bit_mode_history: Vec<(u8, BitMode)>,
        pub(crate) chip_type: ChipType,
        pub(crate) closed: bool,
    }

    impl MockTransport {
        pub(crate) fn new() -> Self {
            Self {
                written: Vec::new(),
                read_script: VecDeque::new(),
                write_short_by: 0,
                bit_mode_history: Vec::new(),
                chip_type: ChipType::FT2232H,
                closed: false,
            }
        }

        /// Queues a chunk to be returned by the next `read()` call.
        pub(crate) fn push_read(&mut self, chunk: Vec<u8>) {
            self.read_script.push_back(chunk);
        }

        /// Makes the next `write()` accept `requested - short_by` bytes.
        pub(crate) fn short_next_write_by(&mut self, short_by: usize) {
            self.write_short_by = short_by;
        }
    }

    impl ChannelTransport for MockTransport {
        fn reset(&mut self) -> Result<(), RomError> {
            Ok(())
        }
        fn setup_common(&mut self) -> Result<(), RomError> {
            Ok(())
        }
        fn set_bit_mode(&mut self, mask: u8, mode: BitMode) -> Result<(), RomError> {
            self.bit_mode_history.push((mask, mode));
            Ok(())
        }
        fn write(&mut self, bytes: &[u8]) -> Result<usize, RomError> {
            let accepted = bytes.len().saturating_sub(self.write_short_by);
            self.write_short_by = 0;
            self.written.extend_from_slice(&bytes[..accepted]);
            Ok(accepted)
        }
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, RomError> {
            let Some(chunk) = self.read_script.pop_front() else {
                return Ok(0);
            };
            let n = chunk.len().min(buf.len());
            buf[..n].copy_from_slice(&chunk[..n]);
            Ok(n)
        }
        fn close(&mut self) -> Result<(), RomError> {
            self.closed = true;
            Ok(())
        }
        fn chip_type(&self) -> ChipType {
            self.chip_type
        }
        fn vendor_id(&self) -> u16 {
            0x0403
        }
        fn product_id(&self) -> u16 {
            0x6010
        }
    }
}
