use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row};

use super::common::{decode_text, ClassName, LearningAbility, WritingSpeed};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Student {
    pub id: i64,
    pub name: String,
    pub age: i64,
    pub class: ClassName,
    pub parent_contact: Option<String>,
    pub learning_ability: LearningAbility,
    pub writing_speed: WritingSpeed,
    pub notes: Option<String>,
    pub photo_url: Option<String>,
    /// Opaque identifier on the image host, needed to delete the photo
    #[serde(skip_serializing)]
    pub photo_public_id: Option<String>,
    pub teacher_id: i64,
    pub created_at: String,
    pub updated_at: String,
}

impl Student {
    /// Overlay the present fields of `patch`; absent fields are kept.
    pub fn merged(&self, patch: &StudentPatch) -> Student {
        let mut student = self.clone();
        if let Some(name) = &patch.name {
            student.name = name.clone();
        }
        if let Some(age) = patch.age {
            student.age = age;
        }
        if let Some(class) = patch.class {
            student.class = class;
        }
        if let Some(contact) = &patch.parent_contact {
            student.parent_contact = contact.clone();
        }
        if let Some(ability) = patch.learning_ability {
            student.learning_ability = ability;
        }
        if let Some(speed) = patch.writing_speed {
            student.writing_speed = speed;
        }
        if let Some(notes) = &patch.notes {
            student.notes = notes.clone();
        }
        if let Some(teacher_id) = patch.teacher_id {
            student.teacher_id = teacher_id;
        }
        student.writing_speed = writing_speed_for(student.class, student.writing_speed);
        student
    }
}

/// Nursery children are not assessed on writing speed.
pub fn writing_speed_for(class: ClassName, requested: WritingSpeed) -> WritingSpeed {
    if class == ClassName::Nursery {
        WritingSpeed::NotApplicable
    } else {
        requested
    }
}

impl<'r> FromRow<'r, SqliteRow> for Student {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            age: row.try_get("age")?,
            class: decode_text(row, "class")?,
            parent_contact: row.try_get("parent_contact")?,
            learning_ability: decode_text(row, "learning_ability")?,
            writing_speed: decode_text(row, "writing_speed")?,
            notes: row.try_get("notes")?,
            photo_url: row.try_get("photo_url")?,
            photo_public_id: row.try_get("photo_public_id")?,
            teacher_id: row.try_get("teacher_id")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewStudent {
    pub name: String,
    pub age: i64,
    pub class: ClassName,
    pub parent_contact: Option<String>,
    pub learning_ability: LearningAbility,
    pub writing_speed: WritingSpeed,
    pub notes: Option<String>,
    pub teacher_id: i64,
}

/// Partial update. `Some(None)` clears an optional field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StudentPatch {
    pub name: Option<String>,
    pub age: Option<i64>,
    pub class: Option<ClassName>,
    pub parent_contact: Option<Option<String>>,
    pub learning_ability: Option<LearningAbility>,
    pub writing_speed: Option<WritingSpeed>,
    pub notes: Option<Option<String>>,
    pub teacher_id: Option<i64>,
}

#[derive(Debug, Clone, Default)]
pub struct StudentFilter {
    pub class: Option<ClassName>,
    pub teacher_id: Option<i64>,
}

/// Body of `POST /api/students` and `PUT /api/students/:id`
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRequest {
    pub name: Option<String>,
    pub age: Option<i64>,
    pub class: Option<String>,
    pub parent_contact: Option<String>,
    pub learning_ability: Option<String>,
    pub writing_speed: Option<String>,
    pub notes: Option<String>,
    pub teacher_id: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentQuery {
    pub class: Option<String>,
    pub teacher_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Student {
        Student {
            id: 1,
            name: "Meera".to_string(),
            age: 4,
            class: ClassName::Lkg,
            parent_contact: Some("98450 12345".to_string()),
            learning_ability: LearningAbility::Average,
            writing_speed: WritingSpeed::SlowWriting,
            notes: None,
            photo_url: None,
            photo_public_id: None,
            teacher_id: 3,
            created_at: "2024-06-01T08:00:00Z".to_string(),
            updated_at: "2024-06-01T08:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_merge_is_shallow() {
        let patch = StudentPatch {
            age: Some(5),
            notes: Some(Some("Loves drawing".to_string())),
            ..Default::default()
        };
        let merged = sample().merged(&patch);
        assert_eq!(merged.age, 5);
        assert_eq!(merged.notes.as_deref(), Some("Loves drawing"));
        assert_eq!(merged.name, "Meera");
        assert_eq!(merged.parent_contact.as_deref(), Some("98450 12345"));
    }

    #[test]
    fn test_merge_can_clear_optional_field() {
        let patch = StudentPatch {
            parent_contact: Some(None),
            ..Default::default()
        };
        assert_eq!(sample().merged(&patch).parent_contact, None);
    }

    #[test]
    fn test_moving_to_nursery_resets_writing_speed() {
        let patch = StudentPatch {
            class: Some(ClassName::Nursery),
            ..Default::default()
        };
        let merged = sample().merged(&patch);
        assert_eq!(merged.writing_speed, WritingSpeed::NotApplicable);
    }

    #[test]
    fn test_photo_public_id_not_serialized() {
        let mut student = sample();
        student.photo_public_id = Some("crayon/students/abc".to_string());
        let json = serde_json::to_value(&student).unwrap();
        assert!(json.get("photoPublicId").is_none());
        assert_eq!(json["class"], "LKG");
        assert_eq!(json["teacherId"], 3);
    }
}
