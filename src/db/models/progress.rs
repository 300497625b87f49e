use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row};

use super::common::{decode_date, decode_text, Rating};

/// Dated assessment of one student across five developmental dimensions
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    pub id: i64,
    pub student_id: i64,
    pub date: NaiveDate,
    pub social_skills: Rating,
    pub pre_literacy: Rating,
    pub pre_numeracy: Rating,
    pub motor_skills: Rating,
    pub emotional_development: Rating,
    pub comments: Option<String>,
    pub created_by: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl ProgressEntry {
    pub const RATING_LABELS: [&'static str; 5] = [
        "Social skills",
        "Pre-literacy",
        "Pre-numeracy",
        "Motor skills",
        "Emotional development",
    ];

    /// Overlay the present fields of `patch`. `created_by` is never patched.
    pub fn merged(&self, patch: &ProgressPatch) -> ProgressEntry {
        let mut entry = self.clone();
        if let Some(student_id) = patch.student_id {
            entry.student_id = student_id;
        }
        if let Some(date) = patch.date {
            entry.date = date;
        }
        if let Some(r) = patch.social_skills {
            entry.social_skills = r;
        }
        if let Some(r) = patch.pre_literacy {
            entry.pre_literacy = r;
        }
        if let Some(r) = patch.pre_numeracy {
            entry.pre_numeracy = r;
        }
        if let Some(r) = patch.motor_skills {
            entry.motor_skills = r;
        }
        if let Some(r) = patch.emotional_development {
            entry.emotional_development = r;
        }
        if let Some(comments) = &patch.comments {
            entry.comments = comments.clone();
        }
        entry
    }

    /// Ratings in display order, labelled
    pub fn ratings(&self) -> [(&'static str, Rating); 5] {
        let [social, literacy, numeracy, motor, emotional] = Self::RATING_LABELS;
        [
            (social, self.social_skills),
            (literacy, self.pre_literacy),
            (numeracy, self.pre_numeracy),
            (motor, self.motor_skills),
            (emotional, self.emotional_development),
        ]
    }
}

impl<'r> FromRow<'r, SqliteRow> for ProgressEntry {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            student_id: row.try_get("student_id")?,
            date: decode_date(row, "date")?,
            social_skills: decode_text(row, "social_skills")?,
            pre_literacy: decode_text(row, "pre_literacy")?,
            pre_numeracy: decode_text(row, "pre_numeracy")?,
            motor_skills: decode_text(row, "motor_skills")?,
            emotional_development: decode_text(row, "emotional_development")?,
            comments: row.try_get("comments")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewProgressEntry {
    pub student_id: i64,
    pub date: NaiveDate,
    pub social_skills: Rating,
    pub pre_literacy: Rating,
    pub pre_numeracy: Rating,
    pub motor_skills: Rating,
    pub emotional_development: Rating,
    pub comments: Option<String>,
    pub created_by: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressPatch {
    pub student_id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub social_skills: Option<Rating>,
    pub pre_literacy: Option<Rating>,
    pub pre_numeracy: Option<Rating>,
    pub motor_skills: Option<Rating>,
    pub emotional_development: Option<Rating>,
    pub comments: Option<Option<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct ProgressFilter {
    pub student_id: Option<i64>,
    /// Entries the teacher wrote, or about students the teacher owns
    pub visible_to_teacher: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRequest {
    pub student_id: Option<i64>,
    pub date: Option<String>,
    pub social_skills: Option<String>,
    pub pre_literacy: Option<String>,
    pub pre_numeracy: Option<String>,
    pub motor_skills: Option<String>,
    pub emotional_development: Option<String>,
    pub comments: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressQuery {
    pub student_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_preserves_creator() {
        let entry = ProgressEntry {
            id: 1,
            student_id: 2,
            date: NaiveDate::from_ymd_opt(2024, 7, 1).unwrap(),
            social_skills: Rating::Good,
            pre_literacy: Rating::Good,
            pre_numeracy: Rating::Excellent,
            motor_skills: Rating::NeedsImprovement,
            emotional_development: Rating::Good,
            comments: None,
            created_by: 9,
            created_at: "2024-07-01T10:00:00Z".to_string(),
            updated_at: "2024-07-01T10:00:00Z".to_string(),
        };
        let patch = ProgressPatch {
            motor_skills: Some(Rating::Good),
            ..Default::default()
        };

        let merged = entry.merged(&patch);
        assert_eq!(merged.created_by, 9);
        assert_eq!(merged.motor_skills, Rating::Good);
        assert_eq!(merged.pre_numeracy, Rating::Excellent);
        assert_eq!(merged.ratings()[3], ("Motor skills", Rating::Good));
    }
}
