//! Text preparation: markdown stripping and sentence segmentation

pub mod markup;
pub mod segmenter;

pub use markup::strip_markdown;
pub use segmenter::{segment, TextChunk};
