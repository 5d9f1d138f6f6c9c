//! Database schemas for Merit
//!
//! Defines the MongoDB document structures for achievement records.

mod achievement;

pub use achievement::{AchievementDoc, AttachmentDoc, ACHIEVEMENT_COLLECTION};
