//! Pin maps and bit encodings for the two FT2232H channels.
//!
//! These are invariant for the life of a [`crate::RomSession`] (spec.md §3).
//! Grouped here, rather than inlined at each call site, so the exact
//! encodings in spec.md's tables have one place to be checked against.

/// Channel A low byte (ADBUS0-7): SCLK, MOSI, MISO, CS_bridge, /WE, /RE,
/// ALE_L, ALE_H. `dir` is constant for the life of the session.
pub(crate) const CHANNEL_A_LOW_DIR: u8 = 0b1111_1011;

/// Channel A low byte, idle: ALE_H=1, ALE_L=0, /RE=1, /WE=1, CS=0, SCLK=1.
pub(crate) const A_LOW_IDLE: u8 = 0b0011_0001;
/// Channel A low byte, ALE=10 (ALE_H=0, ALE_L=1), CS=0.
pub(crate) const A_LOW_ALE10_CS0: u8 = 0b1011_0001;
/// Channel A low byte, ALE=11, CS=1 (WAIT pulse rising edge).
pub(crate) const A_LOW_ALE11_CS1: u8 = 0b1111_1001;
/// Channel A low byte, ALE=11, CS=0 (WAIT pulse falling edge).
pub(crate) const A_LOW_ALE11_CS0: u8 = 0b1111_0001;
/// Channel A low byte, ALE=01, CS=1 (WAIT pulse rising edge).
pub(crate) const A_LOW_ALE01_CS1: u8 = 0b0111_1001;
/// Channel A low byte, ALE=01, CS=0 (WAIT pulse falling edge).
pub(crate) const A_LOW_ALE01_CS0: u8 = 0b0111_0001;

/// Channel A low byte, during `ReadROM512`: /RE low (asserted), CS=0.
pub(crate) const A_LOW_RE_LOW_CS0: u8 = 0b0001_0001;
/// Channel A low byte, during `ReadROM512`: /RE low, CS=1 (WAIT rising edge).
pub(crate) const A_LOW_RE_LOW_CS1: u8 = 0b0001_1001;
/// Channel A low byte, during `ReadROM512`: /RE high (deasserted), CS=0.
pub(crate) const A_LOW_RE_HIGH_CS0: u8 = 0b0011_0001;
/// Channel A low byte, final post-loop WAIT pulse: /RE high, CS=1.
pub(crate) const A_LOW_RE_HIGH_CS1: u8 = 0b0011_1001;

/// Channel A high byte (AD0..AD7), address/idle direction: output.
pub(crate) const A_HIGH_DIR_OUTPUT: u8 = 0xFF;
/// Channel A high byte (AD0..AD7), read direction: input.
pub(crate) const A_HIGH_DIR_INPUT: u8 = 0x00;

/// Channel B low byte (BDBUS0-7): SCLK, MOSI, MISO, CS, /RST, WAIT, CLK,
/// S_DAT. `dir` is constant for the life of the session.
pub(crate) const CHANNEL_B_LOW_DIR: u8 = 0b0101_1011;

/// Channel B low byte, idle: S_DAT in, CLK=1, WAIT in, /RST=1, CS=0, SCLK=1.
pub(crate) const B_LOW_IDLE: u8 = 0b0101_0001;
/// Channel B low byte, `ResetROM` assert: CLK=0, /RST=1 held throughout.
pub(crate) const B_LOW_CLK_LOW: u8 = 0b0100_0001;

/// Channel B high byte (AD8..AD15), address/idle direction: output.
pub(crate) const B_HIGH_DIR_OUTPUT: u8 = 0xFF;
/// Channel B high byte (AD8..AD15), read direction: input.
pub(crate) const B_HIGH_DIR_INPUT: u8 = 0x00;

/// `WaitNBits` value used in `SetAddress` to let the cartridge settle
/// (~12.5 µs at the 10 MHz bring-up clock). Empirical; do not shrink
/// without validating against hardware (spec.md §9).
pub(crate) const SET_ADDRESS_SETTLE_WAIT: u16 = 9;

/// 10 MHz clocking divisor: `60 MHz / ((1 + 2) * 2) = 10 MHz`.
pub(crate) const CLOCK_DIVISOR_LO: u8 = 0x02;
pub(crate) const CLOCK_DIVISOR_HI: u8 = 0x00;
