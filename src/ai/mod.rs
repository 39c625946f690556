mod cloud_api;
mod context;

pub use cloud_api::*;
pub use context::*;
