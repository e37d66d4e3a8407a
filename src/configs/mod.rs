pub mod base;
pub mod logging;
pub mod resolver;

pub use base::*;
pub use logging::*;
pub use resolver::*;
