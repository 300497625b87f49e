//! Progress entries.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::info;

use crate::access::{Actor, Target};
use crate::db::{
    NewProgressEntry, ProgressEntry, ProgressFilter, ProgressPatch, ProgressQuery, ProgressRequest, Rating, User,
};
use crate::AppState;

use super::ensure_access;
use super::error::{ApiError, ApiJson, ApiPath, ApiQuery, ValidationErrorBuilder};
use super::students::load_student;
use super::validation::{if_present, optional_text, parse_choice, parse_date, MAX_TEXT_LEN};

/// Field name and label of each rating, in request order
const RATING_FIELDS: [(&str, &str); 5] = [
    ("socialSkills", "Social skills"),
    ("preLiteracy", "Pre-literacy"),
    ("preNumeracy", "Pre-numeracy"),
    ("motorSkills", "Motor skills"),
    ("emotionalDevelopment", "Emotional development"),
];

fn rating_values(req: &ProgressRequest) -> [Option<&str>; 5] {
    [
        req.social_skills.as_deref(),
        req.pre_literacy.as_deref(),
        req.pre_numeracy.as_deref(),
        req.motor_skills.as_deref(),
        req.emotional_development.as_deref(),
    ]
}

fn validate_create_request(req: &ProgressRequest, created_by: i64) -> Result<NewProgressEntry, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    let student_id = req.student_id;
    if student_id.is_none() {
        errors.add("studentId", "Student is required");
    }
    let date = errors.check("date", parse_date("Date", req.date.as_deref()));

    let mut ratings = [None; 5];
    for (slot, ((field, label), value)) in ratings.iter_mut().zip(RATING_FIELDS.iter().zip(rating_values(req))) {
        *slot = errors.check(field, parse_choice::<Rating>(label, value));
    }
    let comments = errors.check("comments", optional_text("Comments", req.comments.as_deref(), MAX_TEXT_LEN));

    errors.finish()?;
    match (student_id, date, ratings) {
        (Some(student_id), Some(date), [Some(social), Some(literacy), Some(numeracy), Some(motor), Some(emotional)]) => {
            Ok(NewProgressEntry {
                student_id,
                date,
                social_skills: social,
                pre_literacy: literacy,
                pre_numeracy: numeracy,
                motor_skills: motor,
                emotional_development: emotional,
                comments: comments.flatten(),
                created_by,
            })
        }
        _ => Err(ApiError::bad_request("Invalid progress entry")),
    }
}

fn validate_update_request(req: &ProgressRequest) -> Result<ProgressPatch, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    let date = errors
        .check("date", if_present(req.date.as_deref(), |v| parse_date("Date", v)))
        .flatten();

    let mut ratings = [None; 5];
    for (slot, ((field, label), value)) in ratings.iter_mut().zip(RATING_FIELDS.iter().zip(rating_values(req))) {
        *slot = errors
            .check(field, if_present(value, |v| parse_choice::<Rating>(label, v)))
            .flatten();
    }
    let [social_skills, pre_literacy, pre_numeracy, motor_skills, emotional_development] = ratings;

    let comments = errors
        .check(
            "comments",
            if_present(req.comments.as_deref(), |v| optional_text("Comments", v, MAX_TEXT_LEN)),
        )
        .flatten();

    errors.finish()?;
    Ok(ProgressPatch {
        student_id: req.student_id,
        date,
        social_skills,
        pre_literacy,
        pre_numeracy,
        motor_skills,
        emotional_development,
        comments,
    })
}

/// Load an entry and check the caller may see it
async fn load_visible_entry(state: &AppState, user: &User, id: i64) -> Result<ProgressEntry, ApiError> {
    let entry = state
        .store
        .get_progress(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Progress entry not found"))?;
    let student = load_student(state, entry.student_id).await?;
    ensure_access(
        &Actor::from(user),
        Target::progress(&entry, &student),
        "Not your progress entry",
    )?;
    Ok(entry)
}

/// List progress entries. Teachers see entries they wrote or about their students.
pub async fn list_progress(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiQuery(query): ApiQuery<ProgressQuery>,
) -> Result<Json<Vec<ProgressEntry>>, ApiError> {
    let filter = ProgressFilter {
        student_id: query.student_id,
        visible_to_teacher: if user.is_admin() { None } else { Some(user.id) },
    };
    Ok(Json(state.store.list_progress(&filter).await?))
}

pub async fn create_progress(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(request): ApiJson<ProgressRequest>,
) -> Result<(StatusCode, Json<ProgressEntry>), ApiError> {
    let new_entry = validate_create_request(&request, user.id)?;

    let student = load_student(&state, new_entry.student_id).await?;
    ensure_access(&Actor::from(&user), Target::student(&student), "Not your student")?;

    let entry = state.store.create_progress(new_entry).await?;
    info!(progress_id = entry.id, student_id = entry.student_id, "Recorded progress");

    Ok((StatusCode::CREATED, Json(entry)))
}

pub async fn get_progress(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<ProgressEntry>, ApiError> {
    Ok(Json(load_visible_entry(&state, &user, id).await?))
}

pub async fn update_progress(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiPath(id): ApiPath<i64>,
    ApiJson(request): ApiJson<ProgressRequest>,
) -> Result<Json<ProgressEntry>, ApiError> {
    let existing = load_visible_entry(&state, &user, id).await?;
    let patch = validate_update_request(&request)?;

    if let Some(student_id) = patch.student_id.filter(|s| *s != existing.student_id) {
        let student = load_student(&state, student_id).await?;
        ensure_access(&Actor::from(&user), Target::student(&student), "Not your student")?;
    }

    let entry = state
        .store
        .update_progress(id, &patch)
        .await?
        .ok_or_else(|| ApiError::not_found("Progress entry not found"))?;

    info!(progress_id = id, "Updated progress entry");
    Ok(Json(entry))
}

pub async fn delete_progress(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    load_visible_entry(&state, &user, id).await?;

    if !state.store.delete_progress(id).await? {
        return Err(ApiError::not_found("Progress entry not found"));
    }

    info!(progress_id = id, "Deleted progress entry");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> ProgressRequest {
        ProgressRequest {
            student_id: Some(7),
            date: Some("2024-09-02".to_string()),
            social_skills: Some("Good".to_string()),
            pre_literacy: Some("Excellent".to_string()),
            pre_numeracy: Some("good".to_string()),
            motor_skills: Some("Needs Improvement".to_string()),
            emotional_development: Some("Good".to_string()),
            comments: None,
        }
    }

    #[test]
    fn test_create_request_maps_every_rating() {
        let entry = validate_create_request(&request(), 3).unwrap();
        assert_eq!(entry.student_id, 7);
        assert_eq!(entry.created_by, 3);
        assert_eq!(entry.pre_literacy, Rating::Excellent);
        assert_eq!(entry.pre_numeracy, Rating::Good);
        assert_eq!(entry.motor_skills, Rating::NeedsImprovement);
    }

    #[test]
    fn test_create_request_requires_all_ratings() {
        let mut req = request();
        req.motor_skills = None;
        req.emotional_development = Some("Superb".to_string());
        req.date = Some("02/09/2024".to_string());

        let err = validate_create_request(&req, 3).unwrap_err();
        assert!(err.to_string().contains("3 fields"));
    }

    #[test]
    fn test_update_request_only_touches_sent_fields() {
        let patch = validate_update_request(&ProgressRequest {
            motor_skills: Some("Excellent".to_string()),
            comments: Some(String::new()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(patch.motor_skills, Some(Rating::Excellent));
        assert_eq!(patch.social_skills, None);
        assert_eq!(patch.comments, Some(None));
        assert_eq!(patch.date, None);
    }
}
