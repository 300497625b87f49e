//! PDF and Excel downloads.

use axum::{
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::access::{Actor, Target};
use crate::db::{ClassName, PlanFilter, PlanType, ProgressFilter, Role, StudentFilter, User, UserFilter};
use crate::reports::{
    build_table, render_pdf, render_xlsx, ReportKind, ReportRecords, ReportTable, PDF_CONTENT_TYPE,
    XLSX_CONTENT_TYPE,
};
use crate::AppState;

use super::ensure_access;
use super::error::{ApiError, ApiJson, ValidationErrorBuilder};
use super::students::load_student;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportRequest {
    pub kind: ReportKind,
    pub class: Option<String>,
    pub student_id: Option<i64>,
    pub plan_type: Option<String>,
}

#[derive(Debug)]
struct ReportFilters {
    class: Option<ClassName>,
    student_id: Option<i64>,
    plan_type: Option<PlanType>,
}

fn validate_request(req: &ReportRequest) -> Result<ReportFilters, ApiError> {
    let mut errors = ValidationErrorBuilder::new();
    let class = match req.class.as_deref() {
        None | Some("") => None,
        Some(v) => errors.check("class", v.parse::<ClassName>()),
    };
    let plan_type = match req.plan_type.as_deref() {
        None | Some("") => None,
        Some(v) => errors.check("planType", v.parse::<PlanType>()),
    };
    errors.finish()?;

    Ok(ReportFilters {
        class,
        student_id: req.student_id,
        plan_type,
    })
}

/// Fetch the records of one report kind that the caller may see
async fn collect_records(
    state: &AppState,
    user: &User,
    kind: ReportKind,
    filters: &ReportFilters,
) -> Result<ReportRecords, ApiError> {
    let own_id = if user.is_admin() { None } else { Some(user.id) };

    if let Some(student_id) = filters.student_id {
        if kind != ReportKind::Plans {
            let student = load_student(state, student_id).await?;
            if kind == ReportKind::Students {
                ensure_access(&Actor::from(user), Target::student(&student), "Not your student")?;
            }
        }
    }

    let records = match kind {
        ReportKind::Students => {
            let mut students = state
                .store
                .list_students(&StudentFilter {
                    class: filters.class,
                    teacher_id: own_id,
                })
                .await?;
            if let Some(student_id) = filters.student_id {
                students.retain(|s| s.id == student_id);
            }
            let teacher_names = state
                .store
                .list_users(&UserFilter {
                    role: Some(Role::Teacher),
                    class: None,
                })
                .await?
                .into_iter()
                .map(|u| (u.id, u.name))
                .collect();
            ReportRecords::Students { students, teacher_names }
        }
        ReportKind::Progress => {
            let students: HashMap<i64, (String, ClassName)> = state
                .store
                .list_students(&StudentFilter::default())
                .await?
                .into_iter()
                .map(|s| (s.id, (s.name, s.class)))
                .collect();

            let mut entries = state
                .store
                .list_progress(&ProgressFilter {
                    student_id: filters.student_id,
                    visible_to_teacher: own_id,
                })
                .await?;
            if let Some(class) = filters.class {
                entries.retain(|e| students.get(&e.student_id).is_some_and(|(_, c)| *c == class));
            }

            let student_names = students.into_iter().map(|(id, (name, _))| (id, name)).collect();
            ReportRecords::Progress { entries, student_names }
        }
        ReportKind::Plans => ReportRecords::Plans(
            state
                .store
                .list_plans(&PlanFilter {
                    plan_type: filters.plan_type,
                    class: filters.class,
                    created_by: own_id,
                })
                .await?,
        ),
    };
    Ok(records)
}

async fn prepare_table(state: &AppState, user: &User, request: &ReportRequest) -> Result<ReportTable, ApiError> {
    let filters = validate_request(request)?;
    let records = collect_records(state, user, request.kind, &filters).await?;

    let mut table = build_table(&records);
    table.attach_photos(&state.photos, state.external_timeout()).await;
    Ok(table)
}

fn attachment(content_type: &'static str, kind: ReportKind, extension: &str, body: Vec<u8>) -> Response {
    let filename = format!(
        "{}-report-{}.{}",
        kind.file_stem(),
        Utc::now().format("%Y-%m-%d"),
        extension
    );
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response()
}

/// POST /api/reports/pdf
pub async fn pdf_report(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(request): ApiJson<ReportRequest>,
) -> Result<Response, ApiError> {
    let table = prepare_table(&state, &user, &request).await?;
    let body = render_pdf(&table);

    info!(kind = request.kind.file_stem(), rows = table.rows.len(), bytes = body.len(), "Generated PDF report");
    Ok(attachment(PDF_CONTENT_TYPE, request.kind, "pdf", body))
}

/// POST /api/reports/excel
pub async fn excel_report(
    State(state): State<Arc<AppState>>,
    user: User,
    ApiJson(request): ApiJson<ReportRequest>,
) -> Result<Response, ApiError> {
    let table = prepare_table(&state, &user, &request).await?;
    let body = render_xlsx(&table).map_err(|e| {
        tracing::error!("Failed to render spreadsheet: {}", e);
        ApiError::internal("Failed to generate report")
    })?;

    info!(kind = request.kind.file_stem(), rows = table.rows.len(), bytes = body.len(), "Generated Excel report");
    Ok(attachment(XLSX_CONTENT_TYPE, request.kind, "xlsx", body))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_parses_kind_and_filters() {
        let req: ReportRequest =
            serde_json::from_str(r#"{"kind":"plans","class":"ukg","planType":"Monthly"}"#).unwrap();
        assert_eq!(req.kind, ReportKind::Plans);

        let filters = validate_request(&req).unwrap();
        assert_eq!(filters.class, Some(ClassName::Ukg));
        assert_eq!(filters.plan_type, Some(PlanType::Monthly));
        assert_eq!(filters.student_id, None);
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        assert!(serde_json::from_str::<ReportRequest>(r#"{"kind":"grades"}"#).is_err());
    }

    #[test]
    fn test_bad_filter_is_a_validation_error() {
        let req: ReportRequest = serde_json::from_str(r#"{"kind":"students","class":"Grade 3"}"#).unwrap();
        let err = validate_request(&req).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_attachment_headers() {
        let response = attachment(PDF_CONTENT_TYPE, ReportKind::Plans, "pdf", b"%PDF-1.4".to_vec());
        assert_eq!(response.headers()[header::CONTENT_TYPE], PDF_CONTENT_TYPE);
        let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap();
        assert!(disposition.starts_with("attachment; filename=\"teaching-plans-report-"));
        assert!(disposition.ends_with(".pdf\""));
    }
}
