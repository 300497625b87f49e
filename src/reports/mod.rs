//! PDF and Excel exports.
//!
//! Records are first flattened into a `ReportTable` (title, column headers,
//! one row of text cells per record plus an optional photo). Both renderers
//! work from that table only, so they never touch the store or the network.

mod excel;
mod pdf;

pub use excel::render_xlsx;
pub use pdf::render_pdf;

use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;

use crate::db::{ProgressEntry, Student, TeachingPlan};
use crate::media::{ImageFormat, PhotoStore};

pub const PDF_CONTENT_TYPE: &str = "application/pdf";
pub const XLSX_CONTENT_TYPE: &str = "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("spreadsheet error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    Students,
    Progress,
    Plans,
}

impl ReportKind {
    pub fn file_stem(&self) -> &'static str {
        match self {
            ReportKind::Students => "students",
            ReportKind::Progress => "progress",
            ReportKind::Plans => "teaching-plans",
        }
    }
}

/// Records selected for a report, with the names needed to label them
#[derive(Debug, Clone)]
pub enum ReportRecords {
    Students {
        students: Vec<Student>,
        teacher_names: HashMap<i64, String>,
    },
    Progress {
        entries: Vec<ProgressEntry>,
        student_names: HashMap<i64, String>,
    },
    Plans(Vec<TeachingPlan>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportImage {
    pub data: Vec<u8>,
    pub format: ImageFormat,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportRow {
    pub cells: Vec<String>,
    pub photo_url: Option<String>,
    pub photo: Option<ReportImage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportTable {
    pub title: String,
    pub columns: Vec<&'static str>,
    pub rows: Vec<ReportRow>,
}

impl ReportTable {
    pub fn has_photos(&self) -> bool {
        self.rows.iter().any(|r| r.photo.is_some())
    }

    /// Fetch every row's photo. Rows whose photo cannot be loaded keep `photo: None`.
    pub async fn attach_photos(&mut self, photos: &PhotoStore, timeout: Duration) {
        for row in &mut self.rows {
            let Some(url) = row.photo_url.as_deref() else {
                continue;
            };
            row.photo = photos
                .fetch(url, timeout)
                .await
                .map(|(data, format)| ReportImage { data, format });
        }
    }
}

fn text(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

fn name_of(names: &HashMap<i64, String>, id: i64) -> String {
    names.get(&id).cloned().unwrap_or_else(|| format!("#{}", id))
}

pub fn build_table(records: &ReportRecords) -> ReportTable {
    match records {
        ReportRecords::Students {
            students,
            teacher_names,
        } => ReportTable {
            title: "Student Report".to_string(),
            columns: vec![
                "Name",
                "Age",
                "Class",
                "Learning ability",
                "Writing speed",
                "Parent contact",
                "Teacher",
                "Notes",
            ],
            rows: students
                .iter()
                .map(|s| ReportRow {
                    cells: vec![
                        s.name.clone(),
                        s.age.to_string(),
                        s.class.to_string(),
                        s.learning_ability.to_string(),
                        s.writing_speed.to_string(),
                        text(&s.parent_contact),
                        name_of(teacher_names, s.teacher_id),
                        text(&s.notes),
                    ],
                    photo_url: s.photo_url.clone(),
                    photo: None,
                })
                .collect(),
        },
        ReportRecords::Progress {
            entries,
            student_names,
        } => {
            let mut columns = vec!["Student", "Date"];
            columns.extend(ProgressEntry::RATING_LABELS);
            columns.push("Comments");
            ReportTable {
                title: "Progress Report".to_string(),
                columns,
                rows: entries
                    .iter()
                    .map(|e| {
                        let mut cells = vec![name_of(student_names, e.student_id), e.date.to_string()];
                        cells.extend(e.ratings().iter().map(|(_, r)| r.to_string()));
                        cells.push(text(&e.comments));
                        ReportRow {
                            cells,
                            photo_url: None,
                            photo: None,
                        }
                    })
                    .collect(),
            }
        }
        ReportRecords::Plans(plans) => ReportTable {
            title: "Teaching Plans".to_string(),
            columns: vec![
                "Title",
                "Type",
                "Class",
                "Start date",
                "End date",
                "Description",
                "Activities",
                "Goals",
            ],
            rows: plans
                .iter()
                .map(|p| ReportRow {
                    cells: vec![
                        p.title.clone(),
                        p.plan_type.to_string(),
                        p.class.to_string(),
                        p.start_date.to_string(),
                        p.end_date.to_string(),
                        p.description.clone(),
                        p.activities.clone(),
                        p.goals.clone(),
                    ],
                    photo_url: None,
                    photo: None,
                })
                .collect(),
        },
    }
}

#[cfg(test)]
pub(crate) mod testdata {
    use chrono::NaiveDate;
    use std::collections::HashMap;

    use super::ReportRecords;
    use crate::db::{
        ClassName, LearningAbility, PlanType, ProgressEntry, Rating, Student, TeachingPlan, WritingSpeed,
    };

    pub fn student(id: i64, name: &str, photo_url: Option<&str>) -> Student {
        Student {
            id,
            name: name.to_string(),
            age: 4,
            class: ClassName::Lkg,
            parent_contact: Some("98450 12345".to_string()),
            learning_ability: LearningAbility::Talented,
            writing_speed: WritingSpeed::SpeedWriting,
            notes: Some("Enjoys puzzles (and blocks)".to_string()),
            photo_url: photo_url.map(str::to_string),
            photo_public_id: None,
            teacher_id: 2,
            created_at: "2024-06-01T08:00:00Z".to_string(),
            updated_at: "2024-06-01T08:00:00Z".to_string(),
        }
    }

    pub fn students(count: i64) -> ReportRecords {
        ReportRecords::Students {
            students: (1..=count).map(|i| student(i, &format!("Child {}", i), None)).collect(),
            teacher_names: HashMap::from([(2, "Asha".to_string())]),
        }
    }

    pub fn progress() -> ReportRecords {
        ReportRecords::Progress {
            entries: vec![ProgressEntry {
                id: 1,
                student_id: 1,
                date: NaiveDate::from_ymd_opt(2024, 9, 2).unwrap(),
                social_skills: Rating::Good,
                pre_literacy: Rating::Excellent,
                pre_numeracy: Rating::Good,
                motor_skills: Rating::NeedsImprovement,
                emotional_development: Rating::Good,
                comments: None,
                created_by: 2,
                created_at: "2024-09-02T08:00:00Z".to_string(),
                updated_at: "2024-09-02T08:00:00Z".to_string(),
            }],
            student_names: HashMap::from([(1, "Meera".to_string())]),
        }
    }

    pub fn plans() -> ReportRecords {
        ReportRecords::Plans(vec![TeachingPlan {
            id: 1,
            plan_type: PlanType::Weekly,
            class: ClassName::Ukg,
            title: "Seasons".to_string(),
            description: "Weather and seasons".to_string(),
            activities: "Weather chart, leaf collage".to_string(),
            goals: "Name four seasons".to_string(),
            start_date: NaiveDate::from_ymd_opt(2024, 10, 7).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 10, 11).unwrap(),
            created_by: 2,
            created_at: "2024-10-01T08:00:00Z".to_string(),
            updated_at: "2024-10-01T08:00:00Z".to_string(),
        }])
    }
}
