pub mod tjpgd;

pub use tjpgd::{JpegWorkspace, RomJpegDecoder};
