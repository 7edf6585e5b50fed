//! ELF binary loading (spec §6.4's `Boot(runAddress, legacy)`; the
//! `runAddress` comes from here when booting a real image rather than a
//! directly-injected program).

use object::{Object, ObjectSegment};
use thiserror::Error;

use super::place::Place;

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("failed to parse ELF image: {0}")]
    Parse(String),
    #[error("segment at {address:#x} (size {size}) does not fit the configured memory")]
    OutOfBounds { address: u64, size: u64 },
}

/// Loads `bytes` (a full ELF image) into `place`'s shared memory, copying
/// every loadable segment to its virtual address, and returns the
/// entry point to pass as `Boot`'s `runAddress`.
///
/// # Errors
///
/// Returns [`LoaderError::Parse`] if `bytes` isn't a valid object file
/// `object` can read, or [`LoaderError::OutOfBounds`] if a segment falls
/// outside the configured memory size.
pub fn load_elf(place: &mut Place, bytes: &[u8]) -> Result<u64, LoaderError> {
    let file = object::File::parse(bytes).map_err(|e| LoaderError::Parse(e.to_string()))?;
    let memory_size = place.memory_size() as u64;
    for segment in file.segments() {
        let address = segment.address();
        let data = segment.data().map_err(|e| LoaderError::Parse(e.to_string()))?;
        if data.is_empty() {
            continue;
        }
        let size = data.len() as u64;
        if address.checked_add(size).is_none_or(|end| end > memory_size) {
            return Err(LoaderError::OutOfBounds { address, size });
        }
        place.load_image(address, data);
    }
    Ok(file.entry())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::isa::demo::DemoIsa;

    #[test]
    fn parsing_garbage_bytes_is_a_parse_error() {
        let config = Config::default();
        let mut place = Place::new(1, &config, || Box::new(DemoIsa::default()), 1 << 20, 2);
        let err = load_elf(&mut place, b"not an elf file").unwrap_err();
        assert!(matches!(err, LoaderError::Parse(_)));
    }
}
