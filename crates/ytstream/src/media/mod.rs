pub mod manifest;
pub mod rendition;

pub use manifest::{PlayerRef, StreamManifest, StreamManifestBuilder};
pub use rendition::RenditionDescriptor;
