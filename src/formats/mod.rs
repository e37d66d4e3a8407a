pub mod catalog;
pub mod scorer;
pub mod stream;

pub use catalog::*;
pub use scorer::*;
pub use stream::*;
