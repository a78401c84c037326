/// Symbol dictionaries
pub mod dictionary;

/// The segment-aware task and its dictionaries
pub mod segment;

pub use dictionary::Dictionary;
pub use segment::SegmentTask;
