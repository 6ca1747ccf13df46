//! Image pipeline components.
//!
//! - **decode**: format detection, decode/encode, blocking offload
//! - **decision**: which pre-processing steps apply to an item
//! - **watermark**: text and image watermarks
//! - **compress**: resize, rotate, convert, re-encode
//! - **exif**: metadata detection and stripping
//! - **font**: shared font asset for text watermarks
//! - **preprocess**: per-run pre-processing and staging
//! - **rename**: template-based file renaming
//! - **hash**: content and name digests
//! - **discovery**: expand directories into image files

pub mod compress;
pub mod decision;
pub mod decode;
pub mod discovery;
pub mod exif;
pub mod font;
pub mod hash;
pub mod preprocess;
pub mod rename;
pub mod watermark;

// Re-exports for convenient access
pub use decision::{decide, PreprocessDecision};
pub use discovery::FileDiscovery;
pub use rename::rename;
