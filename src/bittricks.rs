// SPDX-License-Identifier: Parity-7.0.0 OR PolyForm-Noncommercial-1.0.0
/*!
bit packing.

Probe flags travel to and from the GPU inside a float lane, and the clear-probe
request is a plain bitset of 32-bit words.
*/

pub fn flags_to_f32(flags: u8) -> f32 {
    flags as f32
}

///Inverse of [flags_to_f32].  Lanes outside 0..=255 clamp.
pub fn f32_to_flags(value: f32) -> u8 {
    value.round().clamp(0.0, u8::MAX as f32) as u8
}

pub const fn words_for_bits(bits: usize) -> usize {
    bits.div_ceil(32)
}

pub fn set_bit(words: &mut [u32], bit: usize) {
    words[bit / 32] |= 1u32 << (bit % 32);
}

pub fn is_bit_set(words: &[u32], bit: usize) -> bool {
    words[bit / 32] & (1u32 << (bit % 32)) != 0
}
