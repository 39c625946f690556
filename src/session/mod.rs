mod store;
mod transcript;

pub use store::*;
pub use transcript::*;
