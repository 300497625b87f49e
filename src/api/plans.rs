//! Teaching plans.

use axum::{extract::State, http::StatusCode, Json};
use std::sync::Arc;
use tracing::info;

use crate::access::{Actor, Target};
use crate::db::{
    ClassName, NewTeachingPlan, PlanFilter, PlanPatch, PlanQuery, PlanRequest, PlanType, TeachingPlan, User,
};
use crate::AppState;

use super::ensure_access;
use super::error::{ApiError, ApiJson, ApiPath, ApiQuery, ValidationErrorBuilder};
use super::validation::{
    if_present, parse_choice, parse_date, required_text, validate_date_range, MAX_TEXT_LEN, MAX_TITLE_LEN,
};

fn validate_create_request(req: &PlanRequest, created_by: i64) -> Result<NewTeachingPlan, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    let plan_type = errors.check("type", parse_choice::<PlanType>("Plan type", req.plan_type.as_deref()));
    let class = errors.check("class", parse_choice::<ClassName>("Class", req.class.as_deref()));
    let title = errors.check("title", required_text("Title", req.title.as_deref(), MAX_TITLE_LEN));
    let description = errors.check(
        "description",
        required_text("Description", req.description.as_deref(), MAX_TEXT_LEN),
    );
    let activities = errors.check(
        "activities",
        required_text("Activities", req.activities.as_deref(), MAX_TEXT_LEN),
    );
    let goals = errors.check("goals", required_text("Goals", req.goals.as_deref(), MAX_TEXT_LEN));
    let start_date = errors.check("startDate", parse_date("Start date", req.start_date.as_deref()));
    let end_date = errors.check("endDate", parse_date("End date", req.end_date.as_deref()));

    if let (Some(start), Some(end)) = (start_date, end_date) {
        errors.check("endDate", validate_date_range(start, end));
    }

    errors.finish()?;
    match (plan_type, class, title, description, activities, goals, start_date, end_date) {
        (
            Some(plan_type),
            Some(class),
            Some(title),
            Some(description),
            Some(activities),
            Some(goals),
            Some(start_date),
            Some(end_date),
        ) => Ok(NewTeachingPlan {
            plan_type,
            class,
            title,
            description,
            activities,
            goals,
            start_date,
            end_date,
            created_by,
        }),
        _ => Err(ApiError::bad_request("Invalid teaching plan")),
    }
}

fn validate_update_request(req: &PlanRequest) -> Result<PlanPatch, ApiError> {
    let mut errors = ValidationErrorBuilder::new();

    let patch = PlanPatch {
        plan_type: errors
            .check("type", if_present(req.plan_type.as_deref(), |v| parse_choice("Plan type", v)))
            .flatten(),
        class: errors
            .check("class", if_present(req.class.as_deref(), |v| parse_choice("Class", v)))
            .flatten(),
        title: errors
            .check("title", if_present(req.title.as_deref(), |v| required_text("Title", v, MAX_TITLE_LEN)))
            .flatten(),
        description: errors
            .check(
                "description",
                if_present(req.description.as_deref(), |v| required_text("Description", v, MAX_TEXT_LEN)),
            )
            .flatten(),
        activities: errors
            .check(
                "activities",
                if_present(req.activities.as_deref(), |v| required_text("Activities", v, MAX_TEXT_LEN)),
            )
            .flatten(),
        goals: errors
            .check("goals", if_present(req.goals.as_deref(), |v| required_text("Goals", v, MAX_TEXT_LEN)))
            .flatten(),
        start_date: errors
            .check("startDate", if_present(req.start_date.as_deref(), |v| parse_date("Start date", v)))
            .flatten(),
        end_date: errors
            .check("endDate", if_present(req.end_date.as_deref(), |v| parse_date("End date", v)))
            .flatten(),
    };

    errors.finish()?;
    Ok(patch)
}

async fn load_visible_plan(state: &AppState, user: &User, id: i64) -> Result<TeachingPlan, ApiError> {
    let plan = state
        .store
        .get_plan(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Teaching plan not found"))?;
    ensure_access(&Actor::from(user), Target::plan(&plan), "Not your teaching plan")?;
    Ok(plan)
}

/// List plans, newest first. Teachers only see plans they wrote.
pub async fn list_plans(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiQuery(query): ApiQuery<PlanQuery>,
) -> Result<Json<Vec<TeachingPlan>>, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    let plan_type = match query.plan_type.as_deref() {
        None | Some("") => None,
        Some(v) => errors.check("type", v.parse::<PlanType>()),
    };
    let class = match query.class.as_deref() {
        None | Some("") => None,
        Some(v) => errors.check("class", v.parse::<ClassName>()),
    };
    errors.finish()?;

    let filter = PlanFilter {
        plan_type,
        class,
        created_by: if user.is_admin() { None } else { Some(user.id) },
    };
    Ok(Json(state.store.list_plans(&filter).await?))
}

pub async fn create_plan(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(request): ApiJson<PlanRequest>,
) -> Result<(StatusCode, Json<TeachingPlan>), ApiError> {
    let new_plan = validate_create_request(&request, user.id)?;
    ensure_access(
        &Actor::from(&user),
        Target::NewInClass { class: new_plan.class },
        "You are not assigned to this class",
    )?;

    let plan = state.store.create_plan(new_plan).await?;
    info!(plan_id = plan.id, class = %plan.class, "Created teaching plan");

    Ok((StatusCode::CREATED, Json(plan)))
}

pub async fn get_plan(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<TeachingPlan>, ApiError> {
    Ok(Json(load_visible_plan(&state, &user, id).await?))
}

pub async fn update_plan(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiPath(id): ApiPath<i64>,
    ApiJson(request): ApiJson<PlanRequest>,
) -> Result<Json<TeachingPlan>, ApiError> {
    let existing = load_visible_plan(&state, &user, id).await?;
    let patch = validate_update_request(&request)?;

    let merged = existing.merged(&patch);
    validate_date_range(merged.start_date, merged.end_date)
        .map_err(|e| ApiError::validation_field("endDate", e))?;
    if merged.class != existing.class {
        ensure_access(
            &Actor::from(&user),
            Target::NewInClass { class: merged.class },
            "You are not assigned to this class",
        )?;
    }

    let plan = state
        .store
        .update_plan(id, &patch)
        .await?
        .ok_or_else(|| ApiError::not_found("Teaching plan not found"))?;

    info!(plan_id = id, "Updated teaching plan");
    Ok(Json(plan))
}

pub async fn delete_plan(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    load_visible_plan(&state, &user, id).await?;

    if !state.store.delete_plan(id).await? {
        return Err(ApiError::not_found("Teaching plan not found"));
    }

    info!(plan_id = id, "Deleted teaching plan");
    Ok(StatusCode::NO_CONTENT)
}
