//! MPSSE command encoding.
//!
//! [`CommandBuffer`] is a pure byte builder: it performs no I/O. It mirrors
//! the teacher's `MpsseCmdBuilder` shape (a growable `Vec<u8>` plus named
//! opcode writers) but exposes only the opcodes this protocol engine uses,
//! named and table-driven per spec.md's §4.1 opcode table.

use crate::transport::ChannelTransport;

#[repr(u8)]
#[derive(Debug, Copy, Clone)]
enum MpsseOpcode {
    SetDataBitsLow = 0x80,
    SetDataBitsHigh = 0x82,
    ReadDataBitsHigh = 0x83,
    EnableLoopback = 0x84,
    DisableLoopback = 0x85,
    ClockDivisor = 0x86,
    WaitOnIOHigh = 0x88,
    Use60MHzClock = 0x8A,
    DisableThreePhaseClocking = 0x8C,
    WaitNBits = 0x8F,
    DisableAdaptiveClocking = 0x97,
    BogusCommand = 0xAB,
}

/// An ordered MPSSE byte program destined for one FTDI channel.
///
/// Tracks how many bytes of reply the program will produce (`read_len`) so
/// callers know how large a buffer to pass to
/// [`CommandBuffer::flush`]/`read_exact`.
#[derive(Default)]
pub(crate) struct CommandBuffer {
    cmd: Vec<u8>,
    read_len: usize,
}

impl CommandBuffer {
    pub(crate) fn new() -> Self {
        Default::default()
    }

    pub(crate) fn as_slice(&self) -> &[u8] {
        &self.cmd
    }

    pub(crate) fn read_len(&self) -> usize {
        self.read_len
    }

    /// `0x80` — set low-byte GPIO state and direction.
    pub(crate) fn set_data_bits_low(&mut self, value: u8, dir: u8) -> &mut Self {
        self.cmd
            .extend_from_slice(&[MpsseOpcode::SetDataBitsLow as u8, value, dir]);
        self
    }

    /// `0x82` — set high-byte GPIO state and direction.
    pub(crate) fn set_data_bits_high(&mut self, value: u8, dir: u8) -> &mut Self {
        self.cmd
            .extend_from_slice(&[MpsseOpcode::SetDataBitsHigh as u8, value, dir]);
        self
    }

    /// `0x83` — sample one byte of the current high-byte pin state.
    pub(crate) fn read_data_bits_high(&mut self) -> &mut Self {
        self.read_len += 1;
        self.cmd.push(MpsseOpcode::ReadDataBitsHigh as u8);
        self
    }

    /// `0x84` — enable internal TX-to-RX loopback.
    pub(crate) fn enable_loopback(&mut self) -> &mut Self {
        self.cmd.push(MpsseOpcode::EnableLoopback as u8);
        self
    }

    /// `0x85` — disable internal TX-to-RX loopback.
    pub(crate) fn disable_loopback(&mut self) -> &mut Self {
        self.cmd.push(MpsseOpcode::DisableLoopback as u8);
        self
    }

    /// `0x86` — set clock divisor. Effective clock is `60 MHz / ((1 + value) * 2)`.
    pub(crate) fn clock_divisor(&mut self, lo: u8, hi: u8) -> &mut Self {
        self.cmd
            .extend_from_slice(&[MpsseOpcode::ClockDivisor as u8, lo, hi]);
        self
    }

    /// `0x88` — stall the engine until GPIOL1 (channel B's WAIT input) is high.
    pub(crate) fn wait_on_io_high(&mut self) -> &mut Self {
        self.cmd.push(MpsseOpcode::WaitOnIOHigh as u8);
        self
    }

    /// `0x8A` — disable the /5 clock divider (run from the 60 MHz master).
    pub(crate) fn use_60mhz_clock(&mut self) -> &mut Self {
        self.cmd.push(MpsseOpcode::Use60MHzClock as u8);
        self
    }

    /// `0x8C` — disable three-phase data clocking.
    pub(crate) fn disable_three_phase_clocking(&mut self) -> &mut Self {
        self.cmd.push(MpsseOpcode::DisableThreePhaseClocking as u8);
        self
    }

    /// `0x8F` — stall for `value + 1` clock-bit times.
    pub(crate) fn wait_n_bits(&mut self, value: u16) -> &mut Self {
        self.cmd.extend_from_slice(&[
            MpsseOpcode::WaitNBits as u8,
            (value & 0xFF) as u8,
            ((value >> 8) & 0xFF) as u8,
        ]);
        self
    }

    /// `0x97` — disable adaptive clocking.
    pub(crate) fn disable_adaptive_clocking(&mut self) -> &mut Self {
        self.cmd.push(MpsseOpcode::DisableAdaptiveClocking as u8);
        self
    }

    /// `0xAB` — a deliberately invalid opcode, used to provoke the `{0xFA, 0xAB}`
    /// echo that confirms the MPSSE engine is in sync.
    pub(crate) fn bogus_command(&mut self) -> &mut Self {
        self.cmd.push(MpsseOpcode::BogusCommand as u8);
        self
    }

    /// Submits the buffered program to `transport` and advances nothing —
    /// the buffer is consumed. Fails if the transport accepts fewer bytes
    /// than were submitted.
    pub(crate) fn flush(
        self,
        channel: crate::transport::ChannelId,
        transport: &mut dyn ChannelTransport,
    ) -> Result<(), crate::error::RomError> {
        let requested = self.cmd.len();
        let sent = transport.write(&self.cmd)?;
        if sent != requested {
            return Err(crate::error::RomError::ShortWrite {
                channel,
                sent,
                requested,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_data_bits_low_encodes_opcode_and_operands() {
        let mut cmd = CommandBuffer::new();
        cmd.set_data_bits_low(0x51, 0x5B);
        assert_eq!(cmd.as_slice(), &[0x80, 0x51, 0x5B]);
    }

    #[test]
    fn set_data_bits_high_encodes_opcode_and_operands() {
        let mut cmd = CommandBuffer::new();
        cmd.set_data_bits_high(0x31, 0xFB);
        assert_eq!(cmd.as_slice(), &[0x82, 0x31, 0xFB]);
    }

    #[test]
    fn read_data_bits_high_tracks_read_len() {
        let mut cmd = CommandBuffer::new();
        cmd.read_data_bits_high().read_data_bits_high();
        assert_eq!(cmd.as_slice(), &[0x83, 0x83]);
        assert_eq!(cmd.read_len(), 2);
    }

    #[test]
    fn clocking_prelude_matches_bringup_sequence() {
        let mut cmd = CommandBuffer::new();
        cmd.use_60mhz_clock()
            .disable_adaptive_clocking()
            .disable_three_phase_clocking()
            .clock_divisor(0x02, 0x00);
        assert_eq!(cmd.as_slice(), &[0x8A, 0x97, 0x8C, 0x86, 0x02, 0x00]);
    }

    #[test]
    fn bogus_command_is_a_single_byte() {
        let mut cmd = CommandBuffer::new();
        cmd.bogus_command();
        assert_eq!(cmd.as_slice(), &[0xAB]);
    }
}
