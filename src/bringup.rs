//! Channel bring-up: MPSSE mode entry, the loopback/bogus-command sync
//! handshake, clocking setup, and the initial pin program (spec.md §4.2).

use crate::error::RomError;
use crate::mpsse::CommandBuffer;
use crate::pins;
use crate::transport::{BitMode, ChannelId, ChannelTransport};
use std::time::Duration;

const POST_BITMODE_SLEEP: Duration = Duration::from_millis(50);
const SYNC_EXPECTED: [u8; 2] = [0xFA, 0xAB];

/// Runs the full bring-up sequence on one channel: reset, MPSSE entry,
/// sync handshake, clocking, and initial pins.
pub(crate) fn bring_up_channel(
    channel: ChannelId,
    transport: &mut dyn ChannelTransport,
) -> Result<(), RomError> {
    log::debug!("{channel:?}: resetting interface");
    transport.reset()?;
    transport.setup_common()?;
    transport.set_bit_mode(0x00, BitMode::Mpsse)?;

    log::debug!("{channel:?}: sleeping {POST_BITMODE_SLEEP:?} for MPSSE to settle");
    std::thread::sleep(POST_BITMODE_SLEEP);

    synchronize_mpsse(channel, transport)?;

    log::trace!("{channel:?}: emitting clocking prelude");
    let mut clocking = CommandBuffer::new();
    clocking
        .use_60mhz_clock()
        .disable_adaptive_clocking()
        .disable_three_phase_clocking()
        .clock_divisor(pins::CLOCK_DIVISOR_LO, pins::CLOCK_DIVISOR_HI);
    clocking.flush(channel, transport)?;

    log::trace!("{channel:?}: emitting initial pin program");
    let mut initial_pins = CommandBuffer::new();
    match channel {
        ChannelId::A => {
            initial_pins.set_data_bits_low(pins::A_LOW_IDLE, pins::CHANNEL_A_LOW_DIR);
            initial_pins.set_data_bits_high(0x00, pins::A_HIGH_DIR_OUTPUT);
        }
        ChannelId::B => {
            initial_pins.set_data_bits_low(pins::B_LOW_IDLE, pins::CHANNEL_B_LOW_DIR);
            initial_pins.set_data_bits_high(0x00, pins::B_HIGH_DIR_OUTPUT);
        }
    }
    initial_pins.flush(channel, transport)?;

    log::debug!("{channel:?}: bring-up complete");
    Ok(())
}

/// Loopback-enable, bogus-opcode, loopback-disable handshake (spec.md §4.2
/// step 3). Any deviation from the `{0xFA, 0xAB}` echo, or a non-empty
/// receive buffer where one is asserted, is fatal.
fn synchronize_mpsse(
    channel: ChannelId,
    transport: &mut dyn ChannelTransport,
) -> Result<(), RomError> {
    assert_rx_empty(channel, transport)?;

    let mut enable = CommandBuffer::new();
    enable.enable_loopback();
    enable.flush(channel, transport)?;
    assert_rx_empty(channel, transport)?;

    let mut bogus = CommandBuffer::new();
    bogus.bogus_command();
    bogus.flush(channel, transport)?;

    let mut echo = [0u8; 2];
    transport.read_exact(channel, &mut echo)?;
    if echo != SYNC_EXPECTED {
        log::error!("{channel:?}: MPSSE sync mismatch, got {echo:?}");
        return Err(RomError::SyncMismatch {
            channel,
            expected: SYNC_EXPECTED,
            got: echo.to_vec(),
        });
    }

    let mut disable = CommandBuffer::new();
    disable.disable_loopback();
    disable.flush(channel, transport)?;
    assert_rx_empty(channel, transport)?;

    Ok(())
}

fn assert_rx_empty(channel: ChannelId, transport: &mut dyn ChannelTransport) -> Result<(), RomError> {
    let mut probe = [0u8; 64];
    let pending = transport.read(&mut probe)?;
    if pending != 0 {
        return Err(RomError::RxBufferNotEmpty { channel, pending });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::mock::MockTransport;

    #[test]
    fn bring_up_happy_path_emits_clocking_prelude_and_pins() {
        let mut t = MockTransport::new();
        t.push_read(vec![]); // rx-empty probe before loopback enable
        t.push_read(vec![]); // rx-empty probe after loopback enable
        t.push_read(vec![0xFA, 0xAB]); // bogus-command echo
        t.push_read(vec![]); // rx-empty probe after loopback disable
        bring_up_channel(ChannelId::A, &mut t).unwrap();

        assert!(t.written.starts_with(&[0x84])); // enable loopback
        let bogus_pos = t.written.iter().position(|&b| b == 0xAB).unwrap();
        assert_eq!(t.written[bogus_pos], 0xAB);
        let disable_pos = t.written.iter().position(|&b| b == 0x85).unwrap();
        assert!(disable_pos > bogus_pos);

        let clocking_pos = t
            .written
            .windows(6)
            .position(|w| w == [0x8A, 0x97, 0x8C, 0x86, 0x02, 0x00])
            .unwrap();
        assert!(clocking_pos > disable_pos);

        // Channel A initial pins follow the clocking prelude.
        let tail = &t.written[clocking_pos + 6..];
        assert_eq!(tail, &[0x80, 0x31, 0xFB, 0x82, 0x00, 0xFF]);
    }

    #[test]
    fn sync_failure_is_fatal() {
        let mut t = MockTransport::new();
        t.push_read(vec![]);
        t.push_read(vec![]);
        t.push_read(vec![0xAA, 0xAB]);
        let err = bring_up_channel(ChannelId::A, &mut t).unwrap_err();
        assert!(matches!(err, RomError::SyncMismatch { .. }));
    }

    #[test]
    fn channel_b_initial_pins_match_its_pin_map() {
        let mut t = MockTransport::new();
        t.push_read(vec![]);
        t.push_read(vec![]);
        t.push_read(vec![0xFA, 0xAB]);
        t.push_read(vec![]);
        bring_up_channel(ChannelId::B, &mut t).unwrap();
        assert_eq!(
            &t.written[t.written.len() - 6..],
            &[0x80, 0x51, 0x5B, 0x82, 0x00, 0xFF]
        );
    }
}
