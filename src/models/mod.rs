pub mod card;
pub mod outcome;
pub mod price;
pub mod stats;

pub use card::*;
pub use outcome::*;
pub use price::*;
pub use stats::*;
