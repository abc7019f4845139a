//! Save state (quick save / quick load) for the tone-burst device.
//!
//! Captures the register file, controller and tick counter to a file using
//! bincode serialization with deflate compression.
//!
//! ## File format
//!
//! ```text
//! +------------------+
//! | Magic "TBST"     |  4 bytes
//! +------------------+
//! | Format version   |  u32 little-endian (currently 1)
//! +------------------+
//! | Compressed data  |  deflate-compressed bincode payload
//! +------------------+
//! ```

use serde::{Serialize, Deserialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::controller::BurstState;

/// Magic bytes identifying a tone-burst save state file.
const MAGIC: &[u8; 4] = b"TBST";
/// Current save state format version.
const FORMAT_VERSION: u32 = 1;
/// Magic + version.
const HEADER_LEN: usize = 8;

#[derive(Error, Debug)]
pub enum SaveStateError {
    #[error("could not access save state file")]
    Io(#[from] std::io::Error),
    #[error("could not encode save state")]
    Encode(#[source] bincode::Error),
    #[error("could not decode save state")]
    Decode(#[source] bincode::Error),
    #[error("could not decompress save state ({0})")]
    Decompress(String),
    #[error("file too small ({0} bytes)")]
    Truncated(usize),
    #[error("invalid save state file (bad magic)")]
    BadMagic,
    #[error("unsupported save state version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
}

// ─── Per-component state structs ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterFileState {
    pub control: u32,
    pub pulse_count: u32,
    pub burst_count: u32,
    pub duty_cycle: u32,
    pub inter_burst_delay: u32,
    pub pulse_period: u32,
    pub status: u32,
    pub trigger_committed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerState {
    pub state: BurstState,
    pub pulse_counter: u32,
    pub burst_counter: u32,
    pub period_counter: u32,
    pub delay_counter: u32,
    pub tone_out: bool,
}

// ─── Top-level save state ───────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveState {
    pub registers: RegisterFileState,
    pub controller: ControllerState,
    pub tick: u64,
}

// ─── Encoding ───────────────────────────────────────────────────────────────

/// Serialize with header and deflate compression.
pub fn encode(state: &SaveState) -> Result<Vec<u8>, SaveStateError> {
    let payload = bincode::serialize(state).map_err(SaveStateError::Encode)?;
    let compressed = miniz_oxide::deflate::compress_to_vec(&payload, 6);

    let mut out = Vec::with_capacity(HEADER_LEN + compressed.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&FORMAT_VERSION.to_le_bytes());
    out.extend_from_slice(&compressed);
    Ok(out)
}

/// Parse bytes produced by [`encode`], verifying magic and version.
pub fn decode(data: &[u8]) -> Result<SaveState, SaveStateError> {
    if data.len() < HEADER_LEN {
        return Err(SaveStateError::Truncated(data.len()));
    }
    if &data[0..4] != MAGIC {
        return Err(SaveStateError::BadMagic);
    }
    let version = u32::from_le_bytes([data[4], data[5], data[6], data[7]]);
    if version != FORMAT_VERSION {
        return Err(SaveStateError::Version { found: version, expected: FORMAT_VERSION });
    }

    let decompressed = miniz_oxide::inflate::decompress_to_vec(&data[HEADER_LEN..])
        .map_err(|e| SaveStateError::Decompress(format!("{:?}", e)))?;

    bincode::deserialize(&decompressed).map_err(SaveStateError::Decode)
}

// ─── File I/O ───────────────────────────────────────────────────────────────

pub fn save_to_file(state: &SaveState, path: &Path) -> Result<(), SaveStateError> {
    let out = encode(state)?;
    std::fs::write(path, &out)?;
    log::info!("Saved state at tick {} to {}", state.tick, path.display());
    Ok(())
}

pub fn load_from_file(path: &Path) -> Result<SaveState, SaveStateError> {
    let data = std::fs::read(path)?;
    let state = decode(&data)?;
    log::info!("Loaded state at tick {} from {}", state.tick, path.display());
    Ok(state)
}

/// Derive save state file path from a profile path.
/// `pulses.toml` → `pulses.state`
pub fn state_path(profile_path: &Path) -> PathBuf {
    let stem = profile_path.file_stem().and_then(|s| s.to_str()).unwrap_or("toneburst");
    let dir = profile_path.parent().unwrap_or(Path::new("."));
    dir.join(format!("{}.state", stem))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SaveState {
        SaveState {
            registers: RegisterFileState {
                control: 0b11,
                pulse_count: 2,
                burst_count: 1,
                duty_cycle: 512,
                inter_burst_delay: 0,
                pulse_period: 4,
                status: 0x0100_0005,
                trigger_committed: true,
            },
            controller: ControllerState {
                state: BurstState::PulseLow,
                pulse_counter: 1,
                burst_counter: 0,
                period_counter: 2,
                delay_counter: 0,
                tone_out: false,
            },
            tick: 1234,
        }
    }

    #[test]
    fn test_encode_decode() {
        let bytes = encode(&sample()).unwrap();
        assert_eq!(&bytes[0..4], b"TBST");
        assert_eq!(decode(&bytes).unwrap(), sample());
    }

    #[test]
    fn test_bad_magic() {
        let mut bytes = encode(&sample()).unwrap();
        bytes[0] = b'X';
        assert!(matches!(decode(&bytes), Err(SaveStateError::BadMagic)));
    }

    #[test]
    fn test_bad_version() {
        let mut bytes = encode(&sample()).unwrap();
        bytes[4] = 9;
        assert!(matches!(
            decode(&bytes),
            Err(SaveStateError::Version { found: 9, expected: 1 })
        ));
    }

    #[test]
    fn test_truncated() {
        assert!(matches!(decode(b"TBS"), Err(SaveStateError::Truncated(3))));
    }

    #[test]
    fn test_state_path() {
        let p = state_path(Path::new("profiles/sonar.toml"));
        assert_eq!(p, Path::new("profiles").join("sonar.state"));
    }
}
