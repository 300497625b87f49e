//! Student records.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::info;

use crate::access::{Actor, Target};
use crate::db::{
    ClassName, LearningAbility, NewStudent, Role, Student, StudentFilter, StudentPatch, StudentQuery,
    StudentRequest, User, WritingSpeed,
};
use crate::AppState;

use super::ensure_access;
use super::error::{ApiError, ApiJson, ApiPath, ApiQuery, ValidationErrorBuilder};
use super::validation::{
    if_present, optional_text, parse_choice, required_text, validate_age, MAX_NAME_LEN, MAX_TEXT_LEN,
};

fn validate_create_request(req: &StudentRequest, user: &User) -> Result<NewStudent, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    let name = errors.check("name", required_text("Name", req.name.as_deref(), MAX_NAME_LEN));
    let age = errors.check(
        "age",
        req.age.ok_or_else(|| "Age is required".to_string()).and_then(validate_age),
    );
    let class = errors.check("class", parse_choice::<ClassName>("Class", req.class.as_deref()));
    let learning_ability = errors.check(
        "learningAbility",
        parse_choice::<LearningAbility>("Learning ability", req.learning_ability.as_deref()),
    );
    let writing_speed = match class {
        Some(ClassName::Nursery) => Some(WritingSpeed::NotApplicable),
        _ => errors.check(
            "writingSpeed",
            parse_choice::<WritingSpeed>("Writing speed", req.writing_speed.as_deref()),
        ),
    };
    let parent_contact = errors.check(
        "parentContact",
        optional_text("Parent contact", req.parent_contact.as_deref(), MAX_NAME_LEN),
    );
    let notes = errors.check("notes", optional_text("Notes", req.notes.as_deref(), MAX_TEXT_LEN));

    let teacher_id = match (req.teacher_id, user.role) {
        (Some(id), _) => Some(id),
        (None, Role::Teacher) => Some(user.id),
        (None, Role::Admin) => {
            errors.add("teacherId", "Teacher is required");
            None
        }
    };

    errors.finish()?;
    match (name, age, class, learning_ability, writing_speed, teacher_id) {
        (Some(name), Some(age), Some(class), Some(learning_ability), Some(writing_speed), Some(teacher_id)) => {
            Ok(NewStudent {
                name,
                age,
                class,
                parent_contact: parent_contact.flatten(),
                learning_ability,
                writing_speed,
                notes: notes.flatten(),
                teacher_id,
            })
        }
        _ => Err(ApiError::bad_request("Invalid student")),
    }
}

fn validate_update_request(req: &StudentRequest) -> Result<StudentPatch, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    let patch = StudentPatch {
        name: errors
            .check("name", if_present(req.name.as_deref(), |v| required_text("Name", v, MAX_NAME_LEN)))
            .flatten(),
        age: errors.check("age", req.age.map(validate_age).transpose()).flatten(),
        class: errors
            .check("class", if_present(req.class.as_deref(), |v| parse_choice("Class", v)))
            .flatten(),
        parent_contact: errors
            .check(
                "parentContact",
                if_present(req.parent_contact.as_deref(), |v| {
                    optional_text("Parent contact", v, MAX_NAME_LEN)
                }),
            )
            .flatten(),
        learning_ability: errors
            .check(
                "learningAbility",
                if_present(req.learning_ability.as_deref(), |v| parse_choice("Learning ability", v)),
            )
            .flatten(),
        writing_speed: errors
            .check(
                "writingSpeed",
                if_present(req.writing_speed.as_deref(), |v| parse_choice("Writing speed", v)),
            )
            .flatten(),
        notes: errors
            .check(
                "notes",
                if_present(req.notes.as_deref(), |v| optional_text("Notes", v, MAX_TEXT_LEN)),
            )
            .flatten(),
        teacher_id: req.teacher_id,
    };

    errors.finish()?;
    Ok(patch)
}

/// Load a student or fail with 404
pub(crate) async fn load_student(state: &AppState, id: i64) -> Result<Student, ApiError> {
    state
        .store
        .get_student(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Student not found"))
}

/// The owning teacher must exist and be assigned to the student's class
async fn check_owner(state: &AppState, teacher_id: i64, class: ClassName) -> Result<(), ApiError> {
    match state.store.get_user(teacher_id).await? {
        Some(teacher) if teacher.role == Role::Teacher => {
            if teacher.assigned_classes.contains(&class) {
                Ok(())
            } else {
                Err(ApiError::validation_field(
                    "teacherId",
                    format!("{} is not assigned to {}", teacher.name, class),
                ))
            }
        }
        _ => Err(ApiError::validation_field("teacherId", "Teacher not found")),
    }
}

/// List students. Teachers only see their own.
pub async fn list_students(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiQuery(query): ApiQuery<StudentQuery>,
) -> Result<Json<Vec<Student>>, ApiError> {
    let class = match query.class.as_deref() {
        None | Some("") => None,
        Some(class) => Some(class.parse::<ClassName>().map_err(|e| ApiError::validation_field("class", e))?),
    };
    let teacher_id = if user.is_admin() { query.teacher_id } else { Some(user.id) };

    let students = state
        .store
        .list_students(&StudentFilter { class, teacher_id })
        .await?;
    Ok(Json(students))
}

pub async fn create_student(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(request): ApiJson<StudentRequest>,
) -> Result<(StatusCode, Json<Student>), ApiError> {
    let new_student = validate_create_request(&request, &user)?;

    let actor = Actor::from(&user);
    ensure_access(
        &actor,
        Target::NewInClass { class: new_student.class },
        "You are not assigned to this class",
    )?;
    if !actor.is_admin() && new_student.teacher_id != actor.id {
        return Err(ApiError::forbidden("Teachers can only add students to their own roster"));
    }
    check_owner(&state, new_student.teacher_id, new_student.class).await?;

    let student = state.store.create_student(new_student).await?;
    info!(student_id = student.id, teacher_id = student.teacher_id, "Created student");

    Ok((StatusCode::CREATED, Json(student)))
}

pub async fn get_student(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Student>, ApiError> {
    let student = load_student(&state, id).await?;
    ensure_access(&Actor::from(&user), Target::student(&student), "Not your student")?;
    Ok(Json(student))
}

pub async fn update_student(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiPath(id): ApiPath<i64>,
    ApiJson(request): ApiJson<StudentRequest>,
) -> Result<Json<Student>, ApiError> {
    let existing = load_student(&state, id).await?;
    let actor = Actor::from(&user);
    ensure_access(&actor, Target::student(&existing), "Not your student")?;

    let patch = validate_update_request(&request)?;
    let merged = existing.merged(&patch);

    if !actor.is_admin() {
        if merged.teacher_id != actor.id {
            return Err(ApiError::forbidden("Teachers cannot reassign students"));
        }
        ensure_access(
            &actor,
            Target::NewInClass { class: merged.class },
            "You are not assigned to this class",
        )?;
    }
    if merged.teacher_id != existing.teacher_id || merged.class != existing.class {
        check_owner(&state, merged.teacher_id, merged.class).await?;
    }

    let student = state
        .store
        .update_student(id, &patch)
        .await?
        .ok_or_else(|| ApiError::not_found("Student not found"))?;

    info!(student_id = id, "Updated student");
    Ok(Json(student))
}

pub async fn delete_student(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    let student = load_student(&state, id).await?;
    ensure_access(&Actor::from(&user), Target::student(&student), "Not your student")?;

    if !state.store.delete_student(id).await? {
        return Err(ApiError::not_found("Student not found"));
    }
    if let Some(public_id) = &student.photo_public_id {
        state.photos.remove(public_id).await;
    }

    info!(student_id = id, "Deleted student");
    Ok(StatusCode::NO_CONTENT)
}
