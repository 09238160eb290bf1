pub mod core;
pub mod reports;
pub mod scores;
pub mod students;
pub mod subjects;
pub mod weights;
