//! Frames and the sources that produce them.
//!
//! Sources yield frames in capture order with strictly increasing sequence
//! numbers. Each frame is handed to exactly one pipeline worker and dropped
//! once that worker has finished with it.

mod image_dir;
mod raw;
mod source;
mod synthetic;

pub use image_dir::ImageDirSource;
pub use raw::{Frame, FrameRef};
pub use source::{FrameSource, SourceConfig};
pub use synthetic::SyntheticSource;
