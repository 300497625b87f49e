use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row};

use super::common::{decode_date, decode_text, ClassName, PlanType};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeachingPlan {
    pub id: i64,
    #[serde(rename = "type")]
    pub plan_type: PlanType,
    pub class: ClassName,
    pub title: String,
    pub description: String,
    pub activities: String,
    pub goals: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created_by: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl TeachingPlan {
    /// Overlay the present fields of `patch`. `created_by` is never patched.
    pub fn merged(&self, patch: &PlanPatch) -> TeachingPlan {
        let mut plan = self.clone();
        if let Some(t) = patch.plan_type {
            plan.plan_type = t;
        }
        if let Some(class) = patch.class {
            plan.class = class;
        }
        if let Some(v) = &patch.title {
            plan.title = v.clone();
        }
        if let Some(v) = &patch.description {
            plan.description = v.clone();
        }
        if let Some(v) = &patch.activities {
            plan.activities = v.clone();
        }
        if let Some(v) = &patch.goals {
            plan.goals = v.clone();
        }
        if let Some(d) = patch.start_date {
            plan.start_date = d;
        }
        if let Some(d) = patch.end_date {
            plan.end_date = d;
        }
        plan
    }
}

impl<'r> FromRow<'r, SqliteRow> for TeachingPlan {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            plan_type: decode_text(row, "plan_type")?,
            class: decode_text(row, "class")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            activities: row.try_get("activities")?,
            goals: row.try_get("goals")?,
            start_date: decode_date(row, "start_date")?,
            end_date: decode_date(row, "end_date")?,
            created_by: row.try_get("created_by")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewTeachingPlan {
    pub plan_type: PlanType,
    pub class: ClassName,
    pub title: String,
    pub description: String,
    pub activities: String,
    pub goals: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub created_by: i64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlanPatch {
    pub plan_type: Option<PlanType>,
    pub class: Option<ClassName>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub activities: Option<String>,
    pub goals: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default)]
pub struct PlanFilter {
    pub plan_type: Option<PlanType>,
    pub class: Option<ClassName>,
    pub created_by: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanRequest {
    #[serde(rename = "type")]
    pub plan_type: Option<String>,
    pub class: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub activities: Option<String>,
    pub goals: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct PlanQuery {
    #[serde(rename = "type")]
    pub plan_type: Option<String>,
    pub class: Option<String>,
}
