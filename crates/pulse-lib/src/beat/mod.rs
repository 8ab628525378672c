pub mod boundaries;
pub mod extract;
pub mod intervals;
pub mod morphology;
