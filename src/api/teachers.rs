//! Teacher accounts: listing for everyone, maintenance for admins.

use axum::{extract::State, http::StatusCode, Json};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::info;

use crate::db::{ClassName, Role, TeacherQuery, UpdateTeacherRequest, User, UserFilter, UserPatch, UserResponse};
use crate::AppState;

use super::error::{ApiError, ApiJson, ApiPath, ApiQuery, ValidationErrorBuilder};
use super::validation::{parse_choice, required_text, MAX_NAME_LEN};

fn require_admin(user: &User) -> Result<(), ApiError> {
    if user.is_admin() {
        Ok(())
    } else {
        Err(ApiError::forbidden("Administrator access required"))
    }
}

/// Parse a list of class names, reporting each bad entry under `field`
fn parse_classes(
    errors: &mut ValidationErrorBuilder,
    field: &str,
    classes: &[String],
) -> BTreeSet<ClassName> {
    classes
        .iter()
        .filter_map(|c| errors.check(field, parse_choice::<ClassName>("Class", Some(c))))
        .collect()
}

fn validate_update_request(req: &UpdateTeacherRequest) -> Result<UserPatch, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    let name = match req.name.as_deref() {
        Some(name) => errors.check("name", required_text("Name", Some(name), MAX_NAME_LEN)),
        None => None,
    };
    let assigned_classes = req
        .assigned_classes
        .as_ref()
        .map(|classes| parse_classes(&mut errors, "assignedClasses", classes));

    errors.finish()?;
    Ok(UserPatch { name, assigned_classes })
}

async fn load_teacher(state: &AppState, id: i64) -> Result<User, ApiError> {
    state
        .store
        .get_user(id)
        .await?
        .filter(|u| u.role == Role::Teacher)
        .ok_or_else(|| ApiError::not_found("Teacher not found"))
}

/// List teachers. A teacher only ever sees their own account.
pub async fn list_teachers(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiQuery(query): ApiQuery<TeacherQuery>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    let class = match query.class.as_deref() {
        None | Some("") => None,
        Some(class) => Some(class.parse::<ClassName>().map_err(|e| ApiError::validation_field("class", e))?),
    };

    let teachers = if user.is_admin() {
        state
            .store
            .list_users(&UserFilter {
                role: Some(Role::Teacher),
                class,
            })
            .await?
    } else {
        let visible = class.map_or(true, |c| user.assigned_classes.contains(&c));
        if visible {
            vec![user]
        } else {
            Vec::new()
        }
    };

    Ok(Json(teachers.into_iter().map(UserResponse::from).collect()))
}

/// Rename a teacher or change their classes (admin only)
pub async fn update_teacher(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiPath(id): ApiPath<i64>,
    ApiJson(request): ApiJson<UpdateTeacherRequest>,
) -> Result<Json<UserResponse>, ApiError> {
    require_admin(&user)?;
    let teacher = load_teacher(&state, id).await?;
    let patch = validate_update_request(&request)?;

    if let Some(classes) = &patch.assigned_classes {
        for removed in teacher.assigned_classes.difference(classes) {
            let owned = state.store.count_students_for_teacher(id, Some(*removed)).await?;
            if owned > 0 {
                return Err(ApiError::conflict(format!(
                    "Teacher still has {} student(s) in {}",
                    owned, removed
                )));
            }
        }
    }

    let updated = state
        .store
        .update_user(id, &patch)
        .await?
        .ok_or_else(|| ApiError::not_found("Teacher not found"))?;

    info!(teacher_id = id, "Updated teacher");
    Ok(Json(UserResponse::from(updated)))
}

/// Delete a teacher with no students (admin only)
pub async fn delete_teacher(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    require_admin(&user)?;
    load_teacher(&state, id).await?;

    let owned = state.store.count_students_for_teacher(id, None).await?;
    if owned > 0 {
        return Err(ApiError::conflict(format!(
            "Teacher still has {} student(s); reassign them first",
            owned
        )));
    }

    if !state.store.delete_user(id).await? {
        return Err(ApiError::not_found("Teacher not found"));
    }

    info!(teacher_id = id, "Deleted teacher");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_request_reports_bad_classes() {
        let req = UpdateTeacherRequest {
            name: Some("  ".to_string()),
            assigned_classes: Some(vec!["LKG".to_string(), "Grade 1".to_string()]),
        };
        let err = validate_update_request(&req).unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().contains("2 fields"));
    }

    #[test]
    fn test_update_request_keeps_absent_fields() {
        let patch = validate_update_request(&UpdateTeacherRequest {
            name: None,
            assigned_classes: Some(vec!["ukg".to_string(), "UKG".to_string()]),
        })
        .unwrap();
        assert_eq!(patch.name, None);
        assert_eq!(patch.assigned_classes, Some(BTreeSet::from([ClassName::Ukg])));
    }
}
