//! crates/doc_library_core/src/config.rs
//!
//! Tunables for caching, file placement and image compression.

use std::time::Duration;

pub const DEFAULT_CACHE_DURATION: Duration = Duration::from_millis(5 * 60 * 1000);
pub const DEFAULT_MAX_FILE_SIZE: u64 = 10 * 1024 * 1024;
pub const DEFAULT_SMALL_FILE_THRESHOLD: u64 = 1024 * 1024;
pub const DEFAULT_IMAGE_MAX_SIZE: usize = 500 * 1024;
pub const DEFAULT_MAX_IMAGE_DIMENSION: u32 = 1200;
pub const DEFAULT_ADMIN_EMAIL: &str = "admin@code-mitra.com";

#[derive(Debug, Clone)]
pub struct CoreConfig {
    /// How long a cached list stays valid.
    pub cache_duration: Duration,
    /// Uploads estimated above this many bytes are rejected.
    pub max_file_size: u64,
    /// Payloads up to this many bytes are stored inline; larger ones go to blob storage.
    pub small_file_threshold: u64,
    /// Target length of a recompressed subject image payload.
    pub image_max_size: usize,
    pub use_cache: bool,
    /// Longest side of a recompressed subject image, in pixels.
    pub max_image_dimension: u32,
    /// Email the `admin` login identifier stands for.
    pub admin_email: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            cache_duration: DEFAULT_CACHE_DURATION,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            small_file_threshold: DEFAULT_SMALL_FILE_THRESHOLD,
            image_max_size: DEFAULT_IMAGE_MAX_SIZE,
            use_cache: true,
            max_image_dimension: DEFAULT_MAX_IMAGE_DIMENSION,
            admin_email: DEFAULT_ADMIN_EMAIL.to_string(),
        }
    }
}
