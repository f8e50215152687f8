pub mod core;
pub mod matching;

pub use self::core::{Entity, FigureProperties, PropertyValue, Relationship};
pub use self::matching::{
    Confidence, DetectionReport, DismissedPair, DuplicatePair, EntitySummary, HaltReason,
    MergeRecord, PairKey, PropertyConflict,
};
