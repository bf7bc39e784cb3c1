//! Error types for the N64 cartridge-bus protocol engine.

use crate::transport::ChannelId;

/// Everything that can go wrong opening, driving, or closing a [`crate::RomSession`].
#[derive(Debug, thiserror::Error)]
pub enum RomError {
    #[error("a USB transport error occurred on channel {channel:?}")]
    /// Reported by the operating system while performing a USB operation on
    /// one of the two FTDI channels. May mean the device was unplugged, is
    /// held by another process, or is not accessible to the current user.
    Usb {
        channel: ChannelId,
        #[source]
        source: std::io::Error,
    },

    #[error("expected at least 2 FTDI devices, found {found}")]
    /// Fewer than the two channels of one FT2232H were enumerated.
    TooFewDevices { found: usize },

    #[error("channel {channel:?} reports chip type {found:?}, expected FT2232H")]
    /// One of the two opened devices is not an FT2232H channel.
    WrongChipType {
        channel: ChannelId,
        found: crate::transport::ChipType,
    },

    #[error("channel {channel:?} failed to synchronize the MPSSE: expected {expected:?}, got {got:?}")]
    /// The loopback/bogus-command handshake did not echo `{0xFA, 0xAB}`.
    SyncMismatch {
        channel: ChannelId,
        expected: [u8; 2],
        got: Vec<u8>,
    },

    #[error("channel {channel:?} receive buffer was not empty when it should be: {pending} byte(s) pending")]
    /// A receive-buffer-empty assertion failed during bring-up.
    RxBufferNotEmpty { channel: ChannelId, pending: usize },

    #[error("channel {channel:?} failed to write command: sent {sent} of {requested} bytes")]
    /// A bulk write to a channel accepted fewer bytes than were submitted.
    ShortWrite {
        channel: ChannelId,
        sent: usize,
        requested: usize,
    },

    #[error("channel {channel:?} failed to read response: got {got} of {expected} bytes")]
    /// A `read_exact` on a channel could not fill the requested buffer.
    ShortRead {
        channel: ChannelId,
        got: usize,
        expected: usize,
    },

    #[error("failed to open channel {channel:?}: {reason}")]
    /// Resource acquisition (enumerate/open/claim-interface) failed.
    OpenFailed { channel: ChannelId, reason: String },
}
