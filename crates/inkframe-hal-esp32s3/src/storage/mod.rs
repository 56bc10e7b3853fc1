pub mod card_mux;
pub mod sd_volume;

pub use card_mux::CardReaderMux;
pub use sd_volume::{FixedTimeSource, SdVolume};
