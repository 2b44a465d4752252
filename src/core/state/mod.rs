// Cursor store and watermark tracking

pub mod manager;
pub mod watermark;

pub use manager::{CursorStore, StagedAdvances};
pub use watermark::{Watermark, WatermarkBuilder, WatermarkKey};
