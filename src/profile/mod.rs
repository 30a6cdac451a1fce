pub mod aggregate;
pub mod analysis;
pub mod blind_spots;
pub mod catalog;
pub mod scoring;

pub use aggregate::*;
pub use analysis::*;
pub use blind_spots::*;
pub use catalog::*;
pub use scoring::*;
