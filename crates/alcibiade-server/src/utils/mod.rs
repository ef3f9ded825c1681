pub mod error;
pub mod rng;

pub use rng::SharedRng;
