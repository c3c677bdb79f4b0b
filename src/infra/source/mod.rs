pub mod ecb;
pub mod mock;

pub use ecb::{EcbConfig, EcbSource};
pub use mock::MockContentSource;
