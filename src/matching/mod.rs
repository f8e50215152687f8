pub mod candidates;
pub mod confidence;
pub mod dismissal;
pub mod phonetic;
pub mod similarity;

pub use candidates::CandidateGenerator;
pub use confidence::classify;
pub use dismissal::DismissalRegistry;
pub use similarity::{score, SimilarityScores};
