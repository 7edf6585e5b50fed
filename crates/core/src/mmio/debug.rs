//! Debug output channel (spec §6.3): a write-only line printer used by
//! simulated programs to report values without going through the normal
//! data memory.
//!
//! Slot layout, one register-width word per slot:
//! 0 byte, 1 unsigned decimal, 2 signed decimal, 3 hex, 4 float
//! bit-pattern (printed as `f64` from its bits).

use std::fmt::Write as _;

use tracing::info;

#[derive(Debug, Default)]
pub struct DebugChannel {
    pub lines: Vec<String>,
}

impl DebugChannel {
    pub const SIZE: u64 = 6 * 8;

    pub fn write(&mut self, slot_value: u64) {
        self.push(0, slot_value);
    }

    /// Writes `value` as if it arrived at register-width slot `slot`.
    pub fn push(&mut self, slot: u64, value: u64) {
        let mut line = String::new();
        match slot {
            0 => {
                let _ = write!(line, "{}", (value & 0xff) as u8 as char);
            }
            1 => {
                let _ = write!(line, "{value}");
            }
            2 => {
                let _ = write!(line, "{}", value as i64);
            }
            3 => {
                let _ = write!(line, "{value:#x}");
            }
            5 => {
                let _ = write!(line, "{}", f64::from_bits(value));
            }
            _ => {}
        }
        info!(target: "debug_out", "{line}");
        self.lines.push(line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_slot_formats_unsigned() {
        let mut ch = DebugChannel::default();
        ch.push(1, 42);
        assert_eq!(ch.lines, vec!["42".to_string()]);
    }

    #[test]
    fn hex_slot_formats_with_prefix() {
        let mut ch = DebugChannel::default();
        ch.push(3, 255);
        assert_eq!(ch.lines, vec!["0xff".to_string()]);
    }
}
