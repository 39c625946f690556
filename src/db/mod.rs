mod connection;
mod introspection;
mod query;

pub use connection::*;
pub use introspection::*;
pub use query::*;
