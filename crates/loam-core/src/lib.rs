pub mod clause;
pub mod naming;
pub mod schema;

mod error;
pub use error::Error;

mod value;
pub use value::Value;

pub use naming::NamingStrategy;

/// A Result type alias that uses loam's [`Error`] type.
pub type Result<T, E = Error> = core::result::Result<T, E>;
