pub mod clock;
pub mod epdiy;
pub mod frontlight;

pub use clock::SystemClock;
pub use epdiy::EpdiyPanel;
pub use frontlight::Frontlight;
