//! Achievement records: the variable-shape half of an achievement.
//!
//! A record holds the full payload (title, description, `details`,
//! attachments, tags, points). It never carries workflow status; the paired
//! relational reference does. Records are never hard-deleted except as a
//! compensating step when the reference insert of a new draft fails.

use std::collections::BTreeMap;

use async_trait::async_trait;
use bson::{doc, oid::ObjectId, Document};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::db::mongo::{MongoClient, MongoCollection};
use crate::db::schemas::{AchievementDoc, AttachmentDoc, ACHIEVEMENT_COLLECTION};
use crate::types::{MeritError, Result};

/// A value inside an achievement's `details` mapping.
///
/// Open-ended on keys, constrained on values: strings, numbers, booleans,
/// lists and nested mappings. `null` is not a valid detail value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DetailValue {
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    List(Vec<DetailValue>),
    Map(BTreeMap<String, DetailValue>),
}

impl DetailValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }
}

/// Type-specific achievement details (`competitionLevel`, `publisher`, ...).
pub type Details = BTreeMap<String, DetailValue>;

/// Metadata for one uploaded evidence file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub file_name: String,
    pub file_url: String,
    pub file_type: String,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AchievementRecord {
    pub id: String,
    pub student_id: String,
    pub achievement_type: String,
    pub title: String,
    pub description: String,
    pub details: Details,
    pub attachments: Vec<Attachment>,
    pub tags: Vec<String>,
    pub points: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Payload for a freshly created draft record.
#[derive(Debug, Clone, PartialEq)]
pub struct NewRecord {
    pub student_id: String,
    pub achievement_type: String,
    pub title: String,
    pub description: String,
    pub details: Details,
    pub tags: Vec<String>,
    pub points: i64,
}

/// Partial update of the mutable record fields.
///
/// `None` leaves a field untouched. `details` and `tags` are replaced as a
/// whole when present.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RecordPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub details: Option<Details>,
    pub tags: Option<Vec<String>>,
    pub points: Option<i64>,
}

impl RecordPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.details.is_none()
            && self.tags.is_none()
            && self.points.is_none()
    }

    pub fn validate(&self) -> Result<()> {
        if self.is_empty() {
            return Err(MeritError::Validation(
                "update must change at least one field".into(),
            ));
        }
        if matches!(&self.title, Some(t) if t.trim().is_empty()) {
            return Err(MeritError::Validation("title cannot be empty".into()));
        }
        if matches!(self.points, Some(p) if p < 0) {
            return Err(MeritError::Validation("points cannot be negative".into()));
        }
        Ok(())
    }

    /// Apply this patch to an in-memory record.
    pub fn apply_to(&self, record: &mut AchievementRecord, now: DateTime<Utc>) {
        if let Some(title) = &self.title {
            record.title = title.clone();
        }
        if let Some(description) = &self.description {
            record.description = description.clone();
        }
        if let Some(details) = &self.details {
            record.details = details.clone();
        }
        if let Some(tags) = &self.tags {
            record.tags = tags.clone();
        }
        if let Some(points) = self.points {
            record.points = points;
        }
        record.updated_at = now;
    }
}

/// Document store for achievement records.
///
/// Update methods return `false` when no record has the given id.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a record with an empty attachment list; returns the new id.
    async fn insert(&self, record: NewRecord) -> Result<String>;

    async fn find(&self, id: &str) -> Result<Option<AchievementRecord>>;

    /// Fetch several records. Unknown ids are skipped; order is unspecified.
    async fn find_many(&self, ids: &[String]) -> Result<Vec<AchievementRecord>>;

    async fn apply_patch(&self, id: &str, patch: &RecordPatch) -> Result<bool>;

    async fn set_points(&self, id: &str, points: i64) -> Result<bool>;

    async fn push_attachment(&self, id: &str, attachment: &Attachment) -> Result<bool>;

    /// Hard delete. Only used to compensate a failed draft creation.
    async fn delete(&self, id: &str) -> Result<bool>;
}

// =============================================================================
// MongoDB-backed store
// =============================================================================

/// Record store over the `achievements` collection.
#[derive(Clone)]
pub struct MongoRecordStore {
    collection: MongoCollection<AchievementDoc>,
}

impl MongoRecordStore {
    pub async fn new(client: &MongoClient) -> Result<Self> {
        let collection = client.collection(ACHIEVEMENT_COLLECTION).await?;
        Ok(Self { collection })
    }

    fn id_filter(id: &str) -> Option<Document> {
        // A malformed id can never match a stored record.
        ObjectId::parse_str(id).ok().map(|oid| doc! { "_id": oid })
    }

    async fn update_by_id(&self, id: &str, update: Document) -> Result<bool> {
        let Some(filter) = Self::id_filter(id) else {
            return Ok(false);
        };
        let result = self.collection.update_one(filter, update).await?;
        Ok(result.matched_count > 0)
    }
}

#[async_trait]
impl RecordStore for MongoRecordStore {
    async fn insert(&self, record: NewRecord) -> Result<String> {
        let doc = AchievementDoc::from_new(record, Utc::now());
        let oid = self.collection.insert_one(doc).await?;
        debug!(record_id = %oid, "Inserted achievement record");
        Ok(oid.to_hex())
    }

    async fn find(&self, id: &str) -> Result<Option<AchievementRecord>> {
        let Some(filter) = Self::id_filter(id) else {
            return Ok(None);
        };
        self.collection
            .find_one(filter)
            .await?
            .map(AchievementRecord::try_from)
            .transpose()
    }

    async fn find_many(&self, ids: &[String]) -> Result<Vec<AchievementRecord>> {
        let oids: Vec<ObjectId> = ids
            .iter()
            .filter_map(|id| ObjectId::parse_str(id).ok())
            .collect();
        if oids.is_empty() {
            return Ok(Vec::new());
        }
        self.collection
            .find_many(doc! { "_id": { "$in": oids } })
            .await?
            .into_iter()
            .map(AchievementRecord::try_from)
            .collect()
    }

    async fn apply_patch(&self, id: &str, patch: &RecordPatch) -> Result<bool> {
        let mut set = doc! { "updatedAt": bson::DateTime::now() };
        if let Some(title) = &patch.title {
            set.insert("title", title.as_str());
        }
        if let Some(description) = &patch.description {
            set.insert("description", description.as_str());
        }
        if let Some(details) = &patch.details {
            set.insert("details", bson::to_bson(details)?);
        }
        if let Some(tags) = &patch.tags {
            set.insert("tags", tags.clone());
        }
        if let Some(points) = patch.points {
            set.insert("points", points);
        }
        self.update_by_id(id, doc! { "$set": set }).await
    }

    async fn set_points(&self, id: &str, points: i64) -> Result<bool> {
        self.update_by_id(
            id,
            doc! { "$set": { "points": points, "updatedAt": bson::DateTime::now() } },
        )
        .await
    }

    async fn push_attachment(&self, id: &str, attachment: &Attachment) -> Result<bool> {
        let entry = bson::to_bson(&AttachmentDoc::from(attachment.clone()))?;
        self.update_by_id(
            id,
            doc! {
                "$push": { "attachments": entry },
                "$set": { "updatedAt": bson::DateTime::now() },
            },
        )
        .await
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let Some(filter) = Self::id_filter(id) else {
            return Ok(false);
        };
        let result = self.collection.delete_one(filter).await?;
        Ok(result.deleted_count > 0)
    }
}
