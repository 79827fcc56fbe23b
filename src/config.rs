//! Engine-wide configuration (spec.md §6 "Configuration keys"),
//! following the teacher's `robt_config.rs` pattern: a plain struct
//! with `serde::Deserialize` for TOML loading and documented defaults.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::Error;

/// Size of a single extent allocation unit (spec.md §4.3: "a single
/// extent size class (2 MiB)").
pub const EXTENT_SIZE: u64 = 2 * 1024 * 1024;

/// Default maximum encoded-key length (spec.md §3: "typically 256 bytes").
pub const DEFAULT_KEY_MAX: usize = 256;

/// `4 bytes index-id + 1 byte row-id tag + 4 bytes row-id`.
pub const KEY_EXTRA_LENGTH: usize = 4 + 1 + 4;

/// `KEY_DATA_LENGTH = KEY_MAX - KEY_EXTRA_LENGTH` at the default key size.
pub const DEFAULT_KEY_DATA_LENGTH: usize = DEFAULT_KEY_MAX - KEY_EXTRA_LENGTH;

/// Upper bound on a table's row layout (spec.md §7 `RowSizeExceeded`).
pub const MAX_TUPLE_LEN: usize = 8 * 1024;

/// Default row-id-map entries per segment.
pub const DEFAULT_SEG_LEN: usize = 1024;

/// Default row-id-map top-array growth factor (spec.md §6).
pub const DEFAULT_EXTEND_FACTOR: usize = 2;

/// Default scan iterator batch size (spec.md §4.7).
pub const DEFAULT_BATCH: usize = 6;

/// Row-id 0 is reserved; row-id end-of-range sentinel for unbounded
/// composite-prefix scans (spec.md §4.6 "Key layout rationale").
pub const ROWID_RANGE_MIN: u32 = 0;
pub const ROWID_RANGE_MAX: u32 = 0xFFFF_FFFF;

/// Engine-wide configuration, loaded from a TOML file or defaulted.
/// Mirrors the teacher's `robt_config.rs::Config` shape: a directly
/// constructible struct with a `default()`-style constructor and a
/// `from_file` loader.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory path holding the pool's on-disk layout (spec.md §6,
    /// "pool directory path"). May be a semicolon-separated list for
    /// multi-group pools.
    pub pool_dir: String,
    /// Fixed extent size; configurable only for tests, production
    /// value is always `EXTENT_SIZE`.
    pub extent_size: u64,
    /// Maximum encoded composite-key length.
    pub key_max: usize,
    /// Initial row-id-map segment count.
    pub rowid_map_initial_segments: usize,
    /// Row-id-map top-array growth factor.
    pub rowid_map_growth_factor: usize,
    /// Number of index epoch-reclamation thread groups; 0 means
    /// "derive from available parallelism" (spec.md §6).
    pub thread_group_count: usize,
}

impl Default for Config {
    fn default() -> Config {
        Config {
            pool_dir: "./nvmdb_data".to_string(),
            extent_size: EXTENT_SIZE,
            key_max: DEFAULT_KEY_MAX,
            rowid_map_initial_segments: 1,
            rowid_map_growth_factor: DEFAULT_EXTEND_FACTOR,
            thread_group_count: 0,
        }
    }
}

impl Config {
    pub fn new(pool_dir: &str) -> Config {
        Config {
            pool_dir: pool_dir.to_string(),
            ..Config::default()
        }
    }

    pub fn key_data_length(&self) -> usize {
        self.key_max - KEY_EXTRA_LENGTH
    }

    pub fn thread_groups(&self) -> usize {
        if self.thread_group_count == 0 {
            num_cpus::get().max(1)
        } else {
            self.thread_group_count
        }
    }

    /// Load configuration from a TOML file, falling back to defaults
    /// for any key left unset.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config, Error> {
        let text = fs::read_to_string(path.as_ref())
            .map_err(|e| Error::InvalidFile(format!("{}: {}", path.as_ref().display(), e)))?;
        toml::from_str(&text).map_err(|e| Error::InputError(format!("bad config toml: {}", e)))
    }
}
