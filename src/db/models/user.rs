use serde::{Deserialize, Serialize};
use sqlx::{sqlite::SqliteRow, FromRow, Row};
use std::collections::BTreeSet;

use super::common::{decode_text, ClassName, Role};

#[derive(Debug, Clone, PartialEq)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub assigned_classes: BTreeSet<ClassName>,
    pub created_at: String,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    pub fn merged(&self, patch: &UserPatch) -> User {
        let mut user = self.clone();
        if let Some(name) = &patch.name {
            user.name = name.clone();
        }
        if let Some(classes) = &patch.assigned_classes {
            user.assigned_classes = classes.clone();
        }
        if user.role == Role::Admin {
            user.assigned_classes.clear();
        }
        user
    }
}

impl<'r> FromRow<'r, SqliteRow> for User {
    fn from_row(row: &'r SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            name: row.try_get("name")?,
            role: decode_text(row, "role")?,
            assigned_classes: parse_classes(row.try_get("assigned_classes")?)?,
            created_at: row.try_get("created_at")?,
        })
    }
}

fn parse_classes(raw: String) -> Result<BTreeSet<ClassName>, sqlx::Error> {
    serde_json::from_str(&raw).map_err(|e| sqlx::Error::ColumnDecode {
        index: "assigned_classes".to_string(),
        source: Box::new(e),
    })
}

/// Serialize assigned classes for the `assigned_classes` column
pub fn serialize_classes(classes: &BTreeSet<ClassName>) -> String {
    serde_json::to_string(classes).unwrap_or_else(|_| "[]".to_string())
}

/// User as returned by the API (never carries the password hash)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserResponse {
    pub id: i64,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub assigned_classes: Vec<ClassName>,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            name: user.name,
            role: user.role,
            assigned_classes: user.assigned_classes.into_iter().collect(),
            created_at: user.created_at,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub assigned_classes: BTreeSet<ClassName>,
}

#[derive(Debug, Clone, Default)]
pub struct UserPatch {
    pub name: Option<String>,
    pub assigned_classes: Option<BTreeSet<ClassName>>,
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub class: Option<ClassName>,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Session {
    pub id: String,
    pub user_id: i64,
    pub token_hash: String,
    pub expires_at: String,
    pub created_at: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user: UserResponse,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
    pub name: Option<String>,
    pub role: Option<String>,
    pub assigned_classes: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateTeacherRequest {
    pub name: Option<String>,
    pub assigned_classes: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TeacherQuery {
    pub class: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn teacher() -> User {
        User {
            id: 7,
            email: "t@school.test".to_string(),
            password_hash: "hash".to_string(),
            name: "Asha".to_string(),
            role: Role::Teacher,
            assigned_classes: [ClassName::Lkg].into_iter().collect(),
            created_at: "2024-01-01T00:00:00Z".to_string(),
        }
    }

    #[test]
    fn test_response_hides_password_hash() {
        let json = serde_json::to_value(UserResponse::from(teacher())).unwrap();
        assert!(json.get("passwordHash").is_none());
        assert_eq!(json["assignedClasses"][0], "LKG");
        assert_eq!(json["role"], "teacher");
    }

    #[test]
    fn test_merge_keeps_unpatched_fields() {
        let patch = UserPatch {
            assigned_classes: Some([ClassName::Ukg].into_iter().collect()),
            ..Default::default()
        };
        let merged = teacher().merged(&patch);
        assert_eq!(merged.name, "Asha");
        assert!(merged.assigned_classes.contains(&ClassName::Ukg));
        assert!(!merged.assigned_classes.contains(&ClassName::Lkg));
    }

    #[test]
    fn test_admin_never_keeps_classes() {
        let mut admin = teacher();
        admin.role = Role::Admin;
        let patch = UserPatch {
            assigned_classes: Some([ClassName::Nursery].into_iter().collect()),
            ..Default::default()
        };
        assert!(admin.merged(&patch).assigned_classes.is_empty());
    }
}
