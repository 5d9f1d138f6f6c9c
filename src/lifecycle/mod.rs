//! Achievement workflow
//!
//! - `status`: the five workflow states and their legal transitions
//! - `listing`: pagination, sorting and visibility scopes
//! - `history`: status history rebuilt from reference timestamps
//! - `engine`: the operations that move an achievement through its lifecycle

pub mod engine;
pub mod history;
pub mod listing;
pub mod status;

pub use engine::{
    AchievementEngine, AchievementHandle, AchievementView, DraftInput, EngineConfig, EngineStores,
    RejectInput, Transition, VerifyInput,
};
pub use history::HistoryEntry;
pub use listing::{ListParams, ListQuery, ListScope, Page};
pub use status::AchievementStatus;
