//! Bus operations and the public ROM facade (spec.md §4.3-4.5, §6).

use crate::bringup;
use crate::error::RomError;
use crate::mpsse::CommandBuffer;
use crate::pins;
use crate::transport::{BitMode, ChannelId, ChannelTransport, ChipType};
use std::time::Duration;

const POST_RESET_SLEEP: Duration = Duration::from_millis(5);

/// Exclusive owner of both FT2232H channel handles. Created by
/// [`RomSession::open`], destroyed by [`RomSession::close`]. Closing sets
/// both channels to reset bit-mode before releasing the handles, even on
/// error paths.
pub struct RomSession {
    channel_a: Box<dyn ChannelTransport>,
    channel_b: Box<dyn ChannelTransport>,
    closed: bool,
}

impl RomSession {
    /// Wraps two already-opened, already-bring-up'd channel transports into
    /// a session and resets the cartridge. Used by [`crate::list`] for real
    /// hardware and directly by tests for a mocked pair.
    pub(crate) fn from_channels(
        channel_a: Box<dyn ChannelTransport>,
        channel_b: Box<dyn ChannelTransport>,
    ) -> Result<Self, RomError> {
        let mut session = RomSession {
            channel_a,
            channel_b,
            closed: false,
        };
        session.reset_rom()?;
        Ok(session)
    }

    /// Opens devices 0 and 1 of the first FT2232H found, brings both
    /// channels up, and resets the cartridge.
    pub fn open() -> Result<Self, RomError> {
        crate::list::open_ft2232h_pair()
    }

    /// Returns channel B's device type, vendor ID, and product ID.
    pub fn device_info(&self) -> (ChipType, u16, u16) {
        (
            self.channel_b.chip_type(),
            self.channel_b.vendor_id(),
            self.channel_b.product_id(),
        )
    }

    /// Latches `addr` and reads the following 512 bytes of cartridge ROM.
    /// Successive calls with `addr += 512` yield contiguous ROM content.
    pub fn read512(&mut self, addr: u32) -> Result<[u8; 512], RomError> {
        self.set_address(addr)?;
        self.read_rom512()
    }

    /// Returns both channels to reset bit-mode and closes them. Idempotent:
    /// calling `close` more than once, or after a failed operation, is safe.
    pub fn close(&mut self) -> Result<(), RomError> {
        if self.closed {
            return Ok(());
        }
        let a = self.channel_a.set_bit_mode(0x00, BitMode::Reset);
        let b = self.channel_b.set_bit_mode(0x00, BitMode::Reset);
        let a_close = self.channel_a.close();
        let b_close = self.channel_b.close();
        self.closed = true;
        a?;
        b?;
        a_close?;
        b_close?;
        Ok(())
    }

    /// Toggles channel B's CLK line low then high, holding /RST high
    /// throughout (spec.md §4.3). No reply expected.
    fn reset_rom(&mut self) -> Result<(), RomError> {
        log::debug!("ResetROM: pulsing CLK");
        let mut clk_low = CommandBuffer::new();
        clk_low.set_data_bits_low(pins::B_LOW_CLK_LOW, pins::CHANNEL_B_LOW_DIR);
        clk_low.flush(ChannelId::B, self.channel_b.as_mut())?;

        let mut clk_high = CommandBuffer::new();
        clk_high.set_data_bits_low(pins::B_LOW_IDLE, pins::CHANNEL_B_LOW_DIR);
        clk_high.flush(ChannelId::B, self.channel_b.as_mut())?;

        std::thread::sleep(POST_RESET_SLEEP);
        Ok(())
    }

    /// Latches a 32-bit cartridge address as two 16-bit halves, high half
    /// first (spec.md §4.4). Channel B's program is submitted first so it
    /// is armed on `WaitOnIOHigh` before channel A's WAIT pulses arrive.
    fn set_address(&mut self, addr: u32) -> Result<(), RomError> {
        log::trace!("SetAddress(0x{addr:08x})");
        let hi_hi = ((addr >> 24) & 0xFF) as u8;
        let hi_lo = ((addr >> 16) & 0xFF) as u8;
        let lo_hi = ((addr >> 8) & 0xFF) as u8;
        let lo_lo = (addr & 0xFF) as u8;

        let mut a = CommandBuffer::new();
        a.set_data_bits_low(pins::A_LOW_IDLE, pins::CHANNEL_A_LOW_DIR)
            .wait_n_bits(pins::SET_ADDRESS_SETTLE_WAIT)
            .set_data_bits_low(pins::A_LOW_ALE10_CS0, pins::CHANNEL_A_LOW_DIR)
            .set_data_bits_low(pins::A_LOW_ALE11_CS1, pins::CHANNEL_A_LOW_DIR)
            .set_data_bits_low(pins::A_LOW_ALE11_CS0, pins::CHANNEL_A_LOW_DIR)
            .set_data_bits_high(hi_lo, pins::A_HIGH_DIR_OUTPUT)
            .set_data_bits_low(pins::A_LOW_ALE01_CS1, pins::CHANNEL_A_LOW_DIR)
            .set_data_bits_low(pins::A_LOW_ALE01_CS0, pins::CHANNEL_A_LOW_DIR)
            .set_data_bits_high(lo_lo, pins::A_HIGH_DIR_OUTPUT)
            .set_data_bits_low(pins::A_LOW_IDLE, pins::CHANNEL_A_LOW_DIR);

        let mut b = CommandBuffer::new();
        b.wait_on_io_high()
            .set_data_bits_low(pins::B_LOW_IDLE, pins::CHANNEL_B_LOW_DIR)
            .set_data_bits_high(hi_hi, pins::B_HIGH_DIR_OUTPUT)
            .wait_on_io_high()
            .set_data_bits_low(pins::B_LOW_IDLE, pins::CHANNEL_B_LOW_DIR)
            .set_data_bits_high(lo_hi, pins::B_HIGH_DIR_OUTPUT);

        b.flush(ChannelId::B, self.channel_b.as_mut())?;
        a.flush(ChannelId::A, self.channel_a.as_mut())?;
        Ok(())
    }

    /// Bursts 256 16-bit reads at the previously-latched address, returning
    /// the interleaved 512-byte big-endian ROM window (spec.md §4.5).
    fn read_rom512(&mut self) -> Result<[u8; 512], RomError> {
        const WORDS: usize = 256;

        let mut a = CommandBuffer::new();
        let mut b = CommandBuffer::new();

        a.set_data_bits_high(0x00, pins::A_HIGH_DIR_INPUT);
        b.set_data_bits_high(0x00, pins::B_HIGH_DIR_INPUT);

        for _ in 0..WORDS {
            a.set_data_bits_low(pins::A_LOW_RE_LOW_CS0, pins::CHANNEL_A_LOW_DIR)
                .set_data_bits_low(pins::A_LOW_RE_LOW_CS1, pins::CHANNEL_A_LOW_DIR)
                .set_data_bits_low(pins::A_LOW_RE_LOW_CS0, pins::CHANNEL_A_LOW_DIR)
                .read_data_bits_high()
                .set_data_bits_low(pins::A_LOW_RE_HIGH_CS0, pins::CHANNEL_A_LOW_DIR);

            b.wait_on_io_high()
                .set_data_bits_low(pins::B_LOW_IDLE, pins::CHANNEL_B_LOW_DIR)
                .read_data_bits_high();
        }

        a.set_data_bits_low(pins::A_LOW_RE_HIGH_CS1, pins::CHANNEL_A_LOW_DIR)
            .set_data_bits_low(pins::A_LOW_RE_HIGH_CS0, pins::CHANNEL_A_LOW_DIR)
            .set_data_bits_high(0x00, pins::A_HIGH_DIR_OUTPUT);
        b.wait_on_io_high()
            .set_data_bits_high(0x00, pins::B_HIGH_DIR_OUTPUT);

        debug_assert_eq!(a.read_len(), WORDS);
        debug_assert_eq!(b.read_len(), WORDS);

        log::debug!("ReadROM512: submitting B then A");
        b.flush(ChannelId::B, self.channel_b.as_mut())?;
        a.flush(ChannelId::A, self.channel_a.as_mut())?;

        let mut b_bytes = [0u8; WORDS];
        self.channel_b.read_exact(ChannelId::B, &mut b_bytes)?;
        let mut a_bytes = [0u8; WORDS];
        self.channel_a.read_exact(ChannelId::A, &mut a_bytes)?;

        let mut out = [0u8; 512];
        for i in 0..WORDS {
            out[2 * i] = b_bytes[i];
            out[2 * i + 1] = a_bytes[i];
        }
        Ok(out)
    }
}

impl Drop for RomSession {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                log::warn!("RomSession dropped without a clean close: {e}");
            }
        }
    }
}

/// Runs bring-up on a freshly-opened channel pair. Exposed to [`crate::list`]
/// so the real-hardware open path and test setup share one code path.
pub(crate) fn bring_up_pair(
    channel_a: &mut dyn ChannelTransport,
    channel_b: &mut dyn ChannelTransport,
) -> Result<(), RomError> {
    bringup::bring_up_channel(ChannelId::A, channel_a)?;
    bringup::bring_up_channel(ChannelId::B, channel_b)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// Forwards every [`ChannelTransport`] call to a shared [`MockTransport`],
    /// so a test can keep its own handle to inspect `written`/`bit_mode_history`
    /// after handing the other half to a [`RomSession`] as a `Box<dyn
    /// ChannelTransport>`.
    struct SharedMock(Rc<RefCell<MockTransport>>);

    impl ChannelTransport for SharedMock {
        fn reset(&mut self) -> Result<(), RomError> {
            self.0.borrow_mut().reset()
        }
        fn setup_common(&mut self) -> Result<(), RomError> {
            self.0.borrow_mut().setup_common()
        }
        fn set_bit_mode(&mut self, mask: u8, mode: BitMode) -> Result<(), RomError> {
            self.0.borrow_mut().set_bit_mode(mask, mode)
        }
        fn write(&mut self, bytes: &[u8]) -> Result<usize, RomError> {
            self.0.borrow_mut().write(bytes)
        }
        fn read(&mut self, buf: &mut [u8]) -> Result<usize, RomError> {
            self.0.borrow_mut().read(buf)
        }
        fn close(&mut self) -> Result<(), RomError> {
            self.0.borrow_mut().close()
        }
        fn chip_type(&self) -> ChipType {
            self.0.borrow().chip_type()
        }
        fn vendor_id(&self) -> u16 {
            self.0.borrow().vendor_id()
        }
        fn product_id(&self) -> u16 {
            self.0.borrow().product_id()
        }
    }

    /// A session backed by two shared mocks, plus the handles used to
    /// inspect them. `ResetROM` runs as part of `from_channels`, so its
    /// bytes are already in `written` by the time this returns.
    struct Harness {
        session: RomSession,
        a: Rc<RefCell<MockTransport>>,
        b: Rc<RefCell<MockTransport>>,
    }

    impl Harness {
        fn new() -> Self {
            let a = Rc::new(RefCell::new(MockTransport::new()));
            let b = Rc::new(RefCell::new(MockTransport::new()));
            let session =
                RomSession::from_channels(Box::new(SharedMock(a.clone())), Box::new(SharedMock(b.clone())))
                    .unwrap();
            Harness { session, a, b }
        }

        /// Clears bytes recorded so far (e.g. from `ResetROM`) so later
        /// assertions see only what the next call writes.
        fn clear_written(&self) {
            self.a.borrow_mut().written.clear();
            self.b.borrow_mut().written.clear();
        }

        fn a_written(&self) -> Vec<u8> {
            self.a.borrow().written.clone()
        }
        fn b_written(&self) -> Vec<u8> {
            self.b.borrow().written.clone()
        }

        /// Scripts both channels' `ReadDataBitsHigh` replies: B returns
        /// `b_byte` 256 times, A returns `a_byte` 256 times.
        fn script_reads(&self, b_byte: u8, a_byte: u8) {
            self.b.borrow_mut().push_read(vec![b_byte; 256]);
            self.a.borrow_mut().push_read(vec![a_byte; 256]);
        }
    }

    #[test]
    fn set_address_b_and_a_prefixes_match_scenario_3() {
        let mut h = Harness::new();
        h.clear_written();

        h.session.set_address(0x1000_0000).unwrap();

        assert_eq!(&h.b_written()[..4], &[0x88, 0x80, 0x51, 0x5B]);
        assert_eq!(&h.a_written()[..3], &[0x80, 0x31, 0xFB]);
    }

    #[test]
    fn set_address_is_idempotent() {
        let mut h = Harness::new();
        h.clear_written();
        h.session.set_address(0x1234_5678).unwrap();
        let a_first = h.a_written();
        let b_first = h.b_written();

        h.clear_written();
        h.session.set_address(0x1234_5678).unwrap();
        assert_eq!(h.a_written(), a_first);
        assert_eq!(h.b_written(), b_first);
    }

    #[test]
    fn set_address_channel_b_has_two_waits_before_any_high_byte_write() {
        let mut h = Harness::new();
        h.clear_written();
        h.session.set_address(0x1000_0000).unwrap();

        let written = h.b_written();
        let first_high = written.iter().position(|&b| b == 0x82).unwrap();
        let waits_before = written[..first_high].iter().filter(|&&b| b == 0x88).count();
        assert_eq!(
            waits_before, 1,
            "only the first WaitOnIOHigh precedes the first SetDataBitsHigh"
        );
        assert_eq!(written.iter().filter(|&&b| b == 0x88).count(), 2);
    }

    #[test]
    fn set_address_channel_a_ale_cs_pulse_sequence() {
        let mut h = Harness::new();
        h.clear_written();
        h.session.set_address(0x1000_0000).unwrap();

        let written = h.a_written();
        let pulses: Vec<u8> = written
            .windows(3)
            .filter(|w| w[0] == 0x80)
            .map(|w| w[1])
            .collect();
        assert_eq!(
            pulses,
            vec![
                pins::A_LOW_IDLE,
                pins::A_LOW_ALE10_CS0,
                pins::A_LOW_ALE11_CS1,
                pins::A_LOW_ALE11_CS0,
                pins::A_LOW_ALE01_CS1,
                pins::A_LOW_ALE01_CS0,
                pins::A_LOW_IDLE,
            ]
        );
    }

    #[test]
    fn read_rom512_interleaves_big_endian() {
        let mut h = Harness::new();
        h.clear_written();
        h.session.set_address(0x1000_0000).unwrap();
        h.script_reads(0xAB, 0xCD);

        let data = h.session.read_rom512().unwrap();
        for i in 0..256 {
            assert_eq!(data[2 * i], 0xAB);
            assert_eq!(data[2 * i + 1], 0xCD);
        }
    }

    #[test]
    fn read_rom512_opcode_counts_match_256_each() {
        let mut h = Harness::new();
        h.clear_written();
        h.session.set_address(0x1000_0000).unwrap();
        h.script_reads(0xAB, 0xCD);
        h.session.read_rom512().unwrap();

        assert_eq!(h.a_written().iter().filter(|&&b| b == 0x83).count(), 256);
        assert_eq!(h.b_written().iter().filter(|&&b| b == 0x83).count(), 256);
    }

    #[test]
    fn short_write_aborts_before_any_read() {
        let mut h = Harness::new();
        h.a.borrow_mut().short_next_write_by(1);
        let err = h.session.set_address(0x1000_0000).unwrap_err();
        assert!(matches!(err, RomError::ShortWrite { .. }));
    }

    #[test]
    fn close_is_idempotent_and_resets_bit_mode() {
        let mut h = Harness::new();
        h.session.close().unwrap();
        h.session.close().unwrap();
        assert!(
            h.a.borrow()
                .bit_mode_history
                .iter()
                .any(|&(_, m)| m == BitMode::Reset)
        );
        assert!(
            h.b.borrow()
                .bit_mode_history
                .iter()
                .any(|&(_, m)| m == BitMode::Reset)
        );
    }

    #[test]
    fn dump_128kib_emits_256_independent_windows() {
        let mut h = Harness::new();
        let mut dump = Vec::with_capacity(256 * 512);
        for i in 0..256u32 {
            let addr = 0x1000_0000 + i * 512;
            h.script_reads(0xAB, 0xCD);
            let window = h.session.read512(addr).unwrap();
            dump.extend_from_slice(&window);
        }
        assert_eq!(dump.len(), 131_072);
    }
}
