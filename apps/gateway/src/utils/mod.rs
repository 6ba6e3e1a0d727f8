pub mod format;
pub mod share_url;

pub use format::{format_size, thumbnail_dimensions};
pub use share_url::normalize_short_url;
