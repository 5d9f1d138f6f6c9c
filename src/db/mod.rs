//! Storage backends
//!
//! - `relational`: SQLite for workflow state, people and roles
//! - `mongo` + `schemas` + `records`: MongoDB for achievement records
//! - `memory`: in-process record store for dev mode and tests

pub mod memory;
pub mod mongo;
pub mod records;
pub mod relational;
pub mod schemas;

pub use memory::MemoryRecordStore;
pub use mongo::MongoClient;
pub use records::{
    AchievementRecord, Attachment, DetailValue, Details, MongoRecordStore, NewRecord, RecordPatch,
    RecordStore,
};
pub use relational::RelationalDb;
