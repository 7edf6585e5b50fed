//! Action device (spec §6.3): a single write-only control word that lets
//! a running program ask the simulator to continue, abort, or exit.
//!
//! Address bits (byte address divided by the register width) select the
//! action: bit 2 set means "announce", bits 0-1 choose CONTINUE (0),
//! INTERRUPT (1), ABORT (2), or EXIT (3). EXIT's low byte is the exit
//! code.

use tracing::info;

use crate::common::error::SimError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Action {
    Continue,
    Interrupt,
    Abort,
    Exit,
}

const fn classify(slot: u64) -> Action {
    match slot & 0b11 {
        0 => Action::Continue,
        1 => Action::Interrupt,
        2 => Action::Abort,
        _ => Action::Exit,
    }
}

#[derive(Debug, Default)]
pub struct ActionDevice {
    pub interrupted: bool,
}

impl ActionDevice {
    pub const SIZE: u64 = 8;

    #[must_use]
    pub fn read(&self, _offset: u64, _size: u8) -> Option<u64> {
        None
    }

    /// # Errors
    ///
    /// Returns [`SimError::ProgramTermination`] on an EXIT or ABORT word;
    /// ABORT carries exit code 1, EXIT carries the low byte of `value`.
    pub fn write(&mut self, offset: u64, _size: u8, value: u64) -> Result<bool, SimError> {
        let slot = offset / 8;
        match classify(slot) {
            Action::Continue => {}
            Action::Interrupt => self.interrupted = true,
            Action::Abort => {
                info!("program requested simulator abort");
                return Err(SimError::ProgramTermination(1));
            }
            Action::Exit => {
                let code = (value & 0xff) as i32;
                info!(code, "program requested simulator exit");
                return Err(SimError::ProgramTermination(code));
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn continue_write_is_a_no_op() {
        let mut dev = ActionDevice::default();
        assert!(dev.write(0, 8, 0).unwrap());
        assert!(!dev.interrupted);
    }

    #[test]
    fn exit_write_reports_termination_with_its_code() {
        let mut dev = ActionDevice::default();
        let err = dev.write(3 * 8, 8, 7).unwrap_err();
        assert!(matches!(err, SimError::ProgramTermination(7)));
    }

    #[test]
    fn abort_write_reports_termination() {
        let mut dev = ActionDevice::default();
        let err = dev.write(2 * 8, 8, 0).unwrap_err();
        assert!(matches!(err, SimError::ProgramTermination(1)));
    }
}
