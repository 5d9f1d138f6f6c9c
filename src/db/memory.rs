//! In-memory record store.
//!
//! Used in dev mode when MongoDB is unreachable, and by tests.

use async_trait::async_trait;
use bson::oid::ObjectId;
use chrono::Utc;
use dashmap::DashMap;

use crate::db::records::{AchievementRecord, Attachment, NewRecord, RecordPatch, RecordStore};
use crate::types::Result;

#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: DashMap<String, AchievementRecord>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn insert(&self, record: NewRecord) -> Result<String> {
        let id = ObjectId::new().to_hex();
        let now = Utc::now();
        self.records.insert(
            id.clone(),
            AchievementRecord {
                id: id.clone(),
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
            },
        );
        Ok(id)
    }

    async fn find(&self, id: &str) -> Result<Option<AchievementRecord>> {
        Ok(self.records.get(id).map(|r| r.value().clone()))
    }

    async fn find_many(&self, ids: &[String]) -> Result<Vec<AchievementRecord>> {
        Ok(ids
            .iter()
            .filter_map(|id| self.records.get(id).map(|r| r.value().clone()))
            .collect())
    }

    async fn apply_patch(&self, id: &str, patch: &RecordPatch) -> Result<bool> {
        match self.records.get_mut(id) {
            Some(mut record) => {
                patch.apply_to(&mut record, Utc::now());
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn set_points(&self, id: &str, points: i64) -> Result<bool> {
        match self.records.get_mut(id) {
            Some(mut record) => {
                record.points = points;
                record.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn push_attachment(&self, id: &str, attachment: &Attachment) -> Result<bool> {
        match self.records.get_mut(id) {
            Some(mut record) => {
                record.attachments.push(attachment.clone());
                record.updated_at = Utc::now();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        Ok(self.records.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::records::Details;

    fn draft(student_id: &str) -> NewRecord {
        NewRecord {
            student_id: student_id.into(),
            achievement_type: "academic".into(),
            title: "Dean's List".into(),
            description: String::new(),
            details: Details::new(),
            tags: vec![],
            points: 50,
        }
    }

    #[tokio::test]
    async fn test_insert_starts_without_attachments() {
        let store = MemoryRecordStore::new();
        let id = store.insert(draft("s1")).await.unwrap();

        let record = store.find(&id).await.unwrap().unwrap();
        assert_eq!(record.student_id, "s1");
        assert!(record.attachments.is_empty());
        assert!(ObjectId::parse_str(&id).is_ok());
    }

    #[tokio::test]
    async fn test_updates_report_missing_records() {
        let store = MemoryRecordStore::new();
        let patch = RecordPatch {
            points: Some(5),
            ..Default::default()
        };
        assert!(!store.apply_patch("missing", &patch).await.unwrap());
        assert!(!store.set_points("missing", 5).await.unwrap());
        assert!(!store.delete("missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_push_attachment_appends_in_order() {
        let store = MemoryRecordStore::new();
        let id = store.insert(draft("s1")).await.unwrap();
        for name in ["a.pdf", "b.pdf"] {
            let attachment = Attachment {
                file_name: name.into(),
                file_url: format!("/uploads/{}", name),
                file_type: "application/pdf".into(),
                uploaded_at: Utc::now(),
            };
            assert!(store.push_attachment(&id, &attachment).await.unwrap());
        }

        let record = store.find(&id).await.unwrap().unwrap();
        let names: Vec<_> = record.attachments.iter().map(|a| a.file_name.as_str()).collect();
        assert_eq!(names, vec!["a.pdf", "b.pdf"]);
    }

    #[tokio::test]
    async fn test_find_many_skips_unknown_ids() {
        let store = MemoryRecordStore::new();
        let a = store.insert(draft("s1")).await.unwrap();
        let b = store.insert(draft("s2")).await.unwrap();

        let found = store
            .find_many(&[a.clone(), "nope".into(), b.clone()])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
    }
}
