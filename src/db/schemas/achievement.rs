//! Achievement document schema
//!
//! Stores the variable-shape payload of an achievement. Field names are
//! camelCase on the wire to match documents written by other tools.

use bson::{doc, oid::ObjectId, Document};
use chrono::{DateTime, Utc};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::IntoIndexes;
use crate::db::records::{AchievementRecord, Attachment, Details, NewRecord};
use crate::types::MeritError;

/// Collection name for achievement records
pub const ACHIEVEMENT_COLLECTION: &str = "achievements";

/// Achievement document stored in MongoDB
#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AchievementDoc {
    /// MongoDB document ID
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,

    /// Owning student (denormalized from the reference row)
    pub student_id: String,

    /// academic, competition, organization, publication, certification, ...
    pub achievement_type: String,

    pub title: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub details: Details,

    /// Append-only while the reference is draft or submitted
    #[serde(default)]
    pub attachments: Vec<AttachmentDoc>,

    #[serde(default)]
    pub tags: Vec<String>,

    #[serde(default)]
    pub points: i64,

    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentDoc {
    pub file_name: String,
    pub file_url: String,
    pub file_type: String,
    pub uploaded_at: bson::DateTime,
}

impl AchievementDoc {
    /// Build a new draft document with an empty attachment list.
    pub fn from_new(record: NewRecord, now: DateTime<Utc>) -> Self {
        let now = bson::DateTime::from_chrono(now);
        Self {
            id: None,
            student_id: record.student_id,
            achievement_type: record.achievement_type,
            title: record.title,
            description: record.description,
            details: record.details,
            attachments: Vec::new(),
            tags: record.tags,
            points: record.points,
            created_at: now,
            updated_at: now,
        }
    }
}

impl TryFrom<AchievementDoc> for AchievementRecord {
    type Error = MeritError;

    fn try_from(doc: AchievementDoc) -> Result<Self, Self::Error> {
        let id = doc
            .id
            .ok_or_else(|| MeritError::Database("achievement document without _id".into()))?;
        Ok(Self {
            id: id.to_hex(),
            student_id: doc.student_id,
            achievement_type: doc.achievement_type,
            title: doc.title,
            description: doc.description,
            details: doc.details,
            attachments: doc.attachments.into_iter().map(Attachment::from).collect(),
            tags: doc.tags,
            points: doc.points,
            created_at: doc.created_at.to_chrono(),
            updated_at: doc.updated_at.to_chrono(),
        })
    }
}

impl From<Attachment> for AttachmentDoc {
    fn from(a: Attachment) -> Self {
        Self {
            file_name: a.file_name,
            file_url: a.file_url,
            file_type: a.file_type,
            uploaded_at: bson::DateTime::from_chrono(a.uploaded_at),
        }
    }
}

impl From<AttachmentDoc> for Attachment {
    fn from(a: AttachmentDoc) -> Self {
        Self {
            file_name: a.file_name,
            file_url: a.file_url,
            file_type: a.file_type,
            uploaded_at: a.uploaded_at.to_chrono(),
        }
    }
}

impl IntoIndexes for AchievementDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            // Student reports
            (doc! { "studentId": 1 }, None),
            // Statistics per type
            (doc! { "achievementType": 1 }, None),
        ]
    }
}
