//! Achievement statistics and per-student reports
//!
//! Statistics only count **verified** achievements visible to the caller's
//! listing tier. Aggregation runs in process over the scoped records so the
//! same code serves the MongoDB and in-memory record stores.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::auth::gate::Caller;
use crate::auth::permissions::REPORT_VIEW;
use crate::db::records::AchievementRecord;
use crate::lifecycle::{AchievementEngine, AchievementStatus, AchievementView, ListScope};
use crate::types::Result;

pub const TOP_STUDENT_COUNT: usize = 5;
pub const UNKNOWN_CODE: &str = "unknown";

const COMPETITION_LEVEL_KEY: &str = "competitionLevel";

/// Display name for an achievement type code.
pub fn achievement_type_label(code: &str) -> String {
    match code {
        "academic" => "Academic".into(),
        "nonacad" => "Non-academic".into(),
        UNKNOWN_CODE => "Unknown".into(),
        other => other.to_string(),
    }
}

/// Display name for a competition level code.
pub fn competition_level_label(code: &str) -> String {
    match code {
        "local" => "Local".into(),
        "regional" => "Regional".into(),
        "national" => "National".into(),
        "intl" => "International".into(),
        UNKNOWN_CODE => "Unknown".into(),
        other => other.to_string(),
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatisticItem {
    pub code: String,
    pub name: String,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopStudent {
    pub student_id: String,
    pub student_name: String,
    pub total: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total_verified: u64,
    pub total_points: i64,
    pub total_per_type: Vec<StatisticItem>,
    /// Keyed by `YYYY-MM` of record creation, oldest first
    pub total_per_period: Vec<StatisticItem>,
    pub competition_levels: Vec<StatisticItem>,
    pub top_students: Vec<TopStudent>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StudentReport {
    pub student_id: String,
    pub status_counts: BTreeMap<String, u64>,
    pub total_verified_points: i64,
    pub achievements: Vec<AchievementView>,
}

fn items(counts: HashMap<String, u64>, label: fn(&str) -> String) -> Vec<StatisticItem> {
    let mut items: Vec<StatisticItem> = counts
        .into_iter()
        .map(|(code, total)| StatisticItem {
            name: label(&code),
            code,
            total,
        })
        .collect();
    items.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.code.cmp(&b.code)));
    items
}

/// Aggregate verified records. Student names in `top_students` are left
/// empty for the caller to fill in.
pub fn aggregate(records: &[AchievementRecord]) -> Statistics {
    let mut per_type: HashMap<String, u64> = HashMap::new();
    let mut per_period: BTreeMap<String, u64> = BTreeMap::new();
    let mut per_level: HashMap<String, u64> = HashMap::new();
    let mut per_student: HashMap<&str, u64> = HashMap::new();
    let mut total_points = 0i64;

    for record in records {
        let kind = match record.achievement_type.trim() {
            "" => UNKNOWN_CODE.to_string(),
            kind => kind.to_string(),
        };
        *per_type.entry(kind).or_default() += 1;
        *per_period
            .entry(record.created_at.format("%Y-%m").to_string())
            .or_default() += 1;

        let level = record
            .details
            .get(COMPETITION_LEVEL_KEY)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
            .unwrap_or(UNKNOWN_CODE);
        *per_level.entry(level.to_string()).or_default() += 1;

        *per_student.entry(record.student_id.as_str()).or_default() += 1;
        total_points += record.points;
    }

    let mut top: Vec<(&str, u64)> = per_student.into_iter().collect();
    top.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
    top.truncate(TOP_STUDENT_COUNT);

    Statistics {
        total_verified: records.len() as u64,
        total_points,
        total_per_type: items(per_type, achievement_type_label),
        total_per_period: per_period
            .into_iter()
            .map(|(period, total)| StatisticItem {
                name: period.clone(),
                code: period,
                total,
            })
            .collect(),
        competition_levels: items(per_level, competition_level_label),
        top_students: top
            .into_iter()
            .map(|(id, total)| TopStudent {
                student_id: id.to_string(),
                student_name: String::new(),
                total,
            })
            .collect(),
    }
}

/// Read-only reports on top of the lifecycle engine.
pub struct ReportService {
    engine: Arc<AchievementEngine>,
}

impl ReportService {
    pub fn new(engine: Arc<AchievementEngine>) -> Self {
        Self { engine }
    }

    async fn require(&self, caller: &Caller) -> Result<()> {
        self.engine
            .bounded(
                "permission lookup",
                self.engine.gate().require(caller, REPORT_VIEW),
            )
            .await
    }

    pub async fn statistics(&self, caller: &Caller) -> Result<Statistics> {
        self.require(caller).await?;
        let scope = self.engine.scope_for(caller).await?;

        let references = self
            .engine
            .bounded(
                "reference scan",
                self.engine
                    .references()
                    .scan(&scope, Some(AchievementStatus::Verified)),
            )
            .await?;
        let ids: Vec<String> = references.into_iter().map(|r| r.record_id).collect();
        let records = self
            .engine
            .bounded("record lookup", self.engine.records().find_many(&ids))
            .await?;

        let mut stats = aggregate(&records);
        let top_ids: Vec<String> = stats
            .top_students
            .iter()
            .map(|s| s.student_id.clone())
            .collect();
        let names = self
            .engine
            .bounded(
                "student names",
                self.engine.directory().student_names(&top_ids),
            )
            .await?;
        for student in &mut stats.top_students {
            if let Some(name) = names.get(&student.student_id) {
                student.student_name = name.clone();
            }
        }

        debug!(
            user_id = %caller.user_id,
            total_verified = stats.total_verified,
            "Statistics computed"
        );
        Ok(stats)
    }

    pub async fn student_report(&self, caller: &Caller, student_id: &str) -> Result<StudentReport> {
        self.require(caller).await?;
        self.engine.ensure_student_visible(caller, student_id).await?;

        let scope = ListScope::Student {
            student_id: student_id.to_string(),
        };
        let references = self
            .engine
            .bounded("reference scan", self.engine.references().scan(&scope, None))
            .await?;
        let achievements = self.engine.join_records(references).await?;

        let mut status_counts: BTreeMap<String, u64> = AchievementStatus::ALL
            .iter()
            .map(|s| (s.as_str().to_string(), 0))
            .collect();
        let mut total_verified_points = 0i64;
        for view in &achievements {
            *status_counts
                .entry(view.reference.status.as_str().to_string())
                .or_default() += 1;
            if view.reference.status == AchievementStatus::Verified {
                total_verified_points += view.record.as_ref().map_or(0, |r| r.points);
            }
        }

        Ok(StudentReport {
            student_id: student_id.to_string(),
            status_counts,
            total_verified_points,
            achievements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::records::{DetailValue, Details};
    use chrono::{TimeZone, Utc};

    fn record(student: &str, kind: &str, level: Option<&str>, month: u32, points: i64) -> AchievementRecord {
        let mut details = Details::new();
        if let Some(level) = level {
            details.insert(COMPETITION_LEVEL_KEY.into(), DetailValue::Text(level.into()));
        }
        let at = Utc.with_ymd_and_hms(2024, month, 15, 10, 0, 0).unwrap();
        AchievementRecord {
            id: format!("{}-{}-{}", student, kind, month),
            student_id: student.into(),
            achievement_type: kind.into(),
            title: "t".into(),
            description: String::new(),
            details,
            attachments: vec![],
            tags: vec![],
            points,
            created_at: at,
            updated_at: at,
        }
    }

    #[test]
    fn test_aggregate_groups() {
        let records = vec![
            record("s1", "academic", Some("national"), 1, 50),
            record("s1", "academic", None, 1, 10),
            record("s2", "nonacad", Some("intl"), 3, 20),
        ];
        let stats = aggregate(&records);

        assert_eq!(stats.total_verified, 3);
        assert_eq!(stats.total_points, 80);
        assert_eq!(
            stats.total_per_type[0],
            StatisticItem {
                code: "academic".into(),
                name: "Academic".into(),
                total: 2
            }
        );
        let periods: Vec<_> = stats
            .total_per_period
            .iter()
            .map(|p| (p.code.as_str(), p.total))
            .collect();
        assert_eq!(periods, vec![("2024-01", 2), ("2024-03", 1)]);

        let unknown = stats
            .competition_levels
            .iter()
            .find(|l| l.code == UNKNOWN_CODE)
            .unwrap();
        assert_eq!(unknown.total, 1);
        assert_eq!(unknown.name, "Unknown");

        assert_eq!(stats.top_students[0].student_id, "s1");
        assert_eq!(stats.top_students[0].total, 2);
    }

    #[test]
    fn test_top_students_capped() {
        let records: Vec<_> = (0..8)
            .map(|i| record(&format!("s{}", i), "academic", None, 2, 1))
            .collect();
        let stats = aggregate(&records);
        assert_eq!(stats.top_students.len(), TOP_STUDENT_COUNT);
        // Ties break by student id.
        assert_eq!(stats.top_students[0].student_id, "s0");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(aggregate(&[]), Statistics::default());
    }

    #[test]
    fn test_labels_fall_back_to_code() {
        assert_eq!(achievement_type_label("olympiad"), "olympiad");
        assert_eq!(competition_level_label("regional"), "Regional");
    }
}
