//! Device enumeration and the real-hardware `RomSession::open` path.
//!
//! Grounded in the teacher's `list::list_all_device` (VID/PID filtering) and
//! `FtdiMpsse::open` (chip-type detection via `bcdDevice`, interface claim,
//! and max-packet-size lookup), narrowed to the one chip this crate drives:
//! an FT2232H with both of its MPSSE interfaces in use.

use crate::error::RomError;
use crate::session::{self, RomSession};
use crate::transport::{ChannelId, ChannelTransport, ChipType, UsbChannelTransport};

const FTDI_VID: u16 = 0x0403;
const FT2232H_PID: u16 = 0x6010;
const FT2232H_BCD_DEVICE: u16 = 0x0700;

/// Channel A is FTDI interface index 1 (endpoints 0x02/0x81); channel B is
/// interface index 2 (endpoints 0x04/0x83). Matches the teacher's
/// `ftdaye::Interface::{A,B}` endpoint table.
fn interface_index(channel: ChannelId) -> u16 {
    match channel {
        ChannelId::A => 1,
        ChannelId::B => 2,
    }
}

fn write_ep(channel: ChannelId) -> u8 {
    match channel {
        ChannelId::A => 0x02,
        ChannelId::B => 0x04,
    }
}

fn read_ep(channel: ChannelId) -> u8 {
    match channel {
        ChannelId::A => 0x81,
        ChannelId::B => 0x83,
    }
}

/// Finds the first two FT2232H devices on the bus, opens one MPSSE interface
/// on each (device 0 as channel A, device 1 as channel B), brings both up,
/// and returns a ready-to-use [`RomSession`].
pub(crate) fn open_ft2232h_pair() -> Result<RomSession, RomError> {
    let candidates: Vec<_> = nusb::list_devices()
        .map_err(|source| RomError::Usb {
            channel: ChannelId::A,
            source,
        })?
        .filter(|info| info.vendor_id() == FTDI_VID && info.product_id() == FT2232H_PID)
        .collect();

    log::info!("found {} FT2232H candidate(s)", candidates.len());
    if candidates.len() < 2 {
        return Err(RomError::TooFewDevices {
            found: candidates.len(),
        });
    }

    let mut channel_a = open_channel(&candidates[0], ChannelId::A)?;
    let mut channel_b = match open_channel(&candidates[1], ChannelId::B) {
        Ok(b) => b,
        Err(e) => {
            close_best_effort(ChannelId::A, &mut channel_a);
            return Err(e);
        }
    };

    if let Err(e) = session::bring_up_pair(&mut channel_a, &mut channel_b) {
        close_best_effort(ChannelId::A, &mut channel_a);
        close_best_effort(ChannelId::B, &mut channel_b);
        return Err(e);
    }

    // `from_channels` takes ownership of both transports; if `ResetROM`
    // fails here, `RomSession`'s own `Drop` (which calls `close`) runs
    // when the Err path drops the struct, so there is nothing left for
    // this function to release.
    RomSession::from_channels(Box::new(channel_a), Box::new(channel_b))
}

/// Closes a channel that was successfully opened but must be abandoned
/// because a later bring-up step failed, logging rather than propagating
/// a second error (spec.md §7: "On any error during Open, all partially
/// acquired channels are closed").
fn close_best_effort(channel: ChannelId, transport: &mut dyn ChannelTransport) {
    if let Err(e) = transport.close() {
        log::warn!("{channel:?}: failed to close after a failed Open: {e}");
    }
}

fn open_channel(
    info: &nusb::DeviceInfo,
    channel: ChannelId,
) -> Result<UsbChannelTransport, RomError> {
    let chip_type = match info.device_version() {
        FT2232H_BCD_DEVICE => ChipType::FT2232H,
        other => ChipType::Other(other),
    };
    if chip_type != ChipType::FT2232H {
        return Err(RomError::WrongChipType {
            channel,
            found: chip_type,
        });
    }

    let device = info.open().map_err(|e| RomError::OpenFailed {
        channel,
        reason: e.to_string(),
    })?;

    let interface_index = interface_index(channel);
    let max_packet_size = {
        let alt_settings: Vec<_> = device
            .active_configuration()
            .map_err(|e| RomError::OpenFailed {
                channel,
                reason: e.to_string(),
            })?
            .interface_alt_settings()
            .collect();
        let endpoints: Vec<_> = alt_settings[interface_index as usize - 1]
            .endpoints()
            .collect();
        endpoints
            .first()
            .ok_or_else(|| RomError::OpenFailed {
                channel,
                reason: "interface exposes no endpoints".to_string(),
            })?
            .max_packet_size()
    };

    let handle = device
        .detach_and_claim_interface((interface_index - 1) as u8)
        .map_err(|e| RomError::OpenFailed {
            channel,
            reason: e.to_string(),
        })?;

    Ok(UsbChannelTransport::new(
        handle,
        channel,
        interface_index,
        write_ep(channel),
        read_ep(channel),
        max_packet_size,
        chip_type,
        info.vendor_id(),
        info.product_id(),
    ))
}
