//! Repository implementations for database operations

pub mod results;
pub mod signals;
pub mod tournament;

pub use results::*;
pub use signals::*;
pub use tournament::*;
