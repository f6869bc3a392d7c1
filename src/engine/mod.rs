pub mod candidates;
pub mod fusion;
pub mod rerank;
pub mod calibration;

pub use candidates::CandidateGenerator;
pub use calibration::{CalibrationGrid, CalibrationReport};
