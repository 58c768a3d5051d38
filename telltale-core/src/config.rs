//! Build-time configuration
//!
//! Capacities, timing constants and the persisted record layout. The record
//! layout is fixed little-endian on every platform.

/// Default channel table capacity
pub const MAX_CHANNELS: usize = 16;

/// Short (dashboard) name length in bytes, excluding the terminator slot
pub const SHORT_NAME_LEN: usize = 7;

/// Long (display) name length in bytes, excluding the terminator slot
pub const LONG_NAME_LEN: usize = 31;

/// Stabilization window between alarm INIT and WARMUP
///
/// Fixed, independent of the configured warmup: covers values captured
/// before the first read cycle completes.
pub const INIT_STABILIZE_MS: u32 = 1000;

/// Persisted record magic ("TTLE")
pub const MAGIC: u32 = 0x5454_4C45;

/// Persisted record schema version
pub const SCHEMA_VERSION: u16 = 1;

/// Offset of the record header within the storage device
pub const STORAGE_BASE: usize = 0;

/// Header: magic (4) + version (2) + count (1) + checksum (1)
pub const HEADER_LEN: usize = 8;

/// Persisted bytes per channel
pub const ENTRY_LEN: usize = 75;

/// Bytes of storage needed to persist `channels` entries
pub const fn record_len(channels: usize) -> usize {
    HEADER_LEN + channels * ENTRY_LEN
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_len() {
        assert_eq!(record_len(0), 8);
        assert_eq!(record_len(MAX_CHANNELS), 8 + 16 * 75);
    }
}
