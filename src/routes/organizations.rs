use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use uuid::Uuid;

use crate::app::AppState;
use crate::authz::{require_role, Principal, Role};
use crate::errors::AppResult;
use crate::events::log_activity;
use crate::models::organization::{
    AoaoOrganization, DbAoaoOrganization, DbPmCompany, OrganizationCreateRequest, PmCompany,
};
use crate::utils::{blank_to_none, utc_now};

const ORG_ADMIN_ROLES: &[Role] = &[Role::SuperAdmin, Role::Admin];

#[utoipa::path(
    get,
    path = "/organizations/pm-companies",
    tag = "Organizations",
    responses((status = 200, description = "PM companies", body = [PmCompany]))
)]
pub async fn list_pm_companies(
    State(state): State<AppState>,
    principal: Principal,
) -> AppResult<Json<Vec<PmCompany>>> {
    require_role(&principal, ORG_ADMIN_ROLES)?;

    let companies = sqlx::query_as::<_, DbPmCompany>(
        "SELECT id, name, contact_email, created_at, updated_at FROM pm_companies ORDER BY name",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(companies.into_iter().map(PmCompany::from).collect()))
}

#[utoipa::path(
    post,
    path = "/organizations/pm-companies",
    tag = "Organizations",
    request_body = OrganizationCreateRequest,
    responses((status = 201, description = "PM company created", body = PmCompany))
)]
pub async fn create_pm_company(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<OrganizationCreateRequest>,
) -> AppResult<(StatusCode, Json<PmCompany>)> {
    require_role(&principal, ORG_ADMIN_ROLES)?;

    let now = utc_now();
    let id = Uuid::new_v4();

    sqlx::query("INSERT INTO pm_companies (id, name, contact_email, created_at, updated_at) VALUES (?, ?, ?, ?, ?)")
        .bind(id)
        .bind(&payload.name)
        .bind(blank_to_none(payload.contact_email))
        .bind(now)
        .bind(now)
        .execute(&state.pool)
        .await?;

    let company = sqlx::query_as::<_, DbPmCompany>(
        "SELECT id, name, contact_email, created_at, updated_at FROM pm_companies WHERE id = ?",
    )
    .bind(id)
    .fetch_one(&state.pool)
    .await?;

    let company = PmCompany::from(company);
    log_activity(&state.event_bus, "created", Some(principal.user_id), &company);

    Ok((StatusCode::CREATED, Json(company)))
}

#[utoipa::path(
    get,
    path = "/organizations/aoao",
    tag = "Organizations",
    responses((status = 200, description = "AOAO organizations", body = [AoaoOrganization]))
)]
pub async fn list_aoao_organizations(
    State(state): State<AppState>,
    principal: Principal,
) -> AppResult<Json<Vec<AoaoOrganization>>> {
    require_role(&principal, ORG_ADMIN_ROLES)?;

    let organizations = sqlx::query_as::<_, DbAoaoOrganization>(
        "SELECT id, name, contact_email, created_at, updated_at FROM aoao_organizations ORDER BY name",
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(
        organizations.into_iter().map(AoaoOrganization::from).collect(),
    ))
}

#[utoipa::path(
    post,
    path = "/organizations/aoao",
    tag = "Organizations",
    request_body = OrganizationCreateRequest,
    responses((status = 201, description = "AOAO organization created", body = AoaoOrganization))
)]
pub async fn create_aoao_organization(
    State(state): State<AppState>,
    principal: Principal,
    Json(payload): Json<OrganizationCreateRequest>,
) -> AppResult<(StatusCode, Json<AoaoOrganization>)> {
    require_role(&principal, ORG_ADMIN_ROLES)?;

    let now = utc_now();
    let id = Uuid::new_v4();

    sqlx::query(
        "INSERT INTO aoao_organizations (id, name, contact_email, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(id)
    .bind(&payload.name)
    .bind(blank_to_none(payload.contact_email))
    .bind(now)
    .bind(now)
    .execute(&state.pool)
    .await?;

    let organization = sqlx::query_as::<_, DbAoaoOrganization>(
        "SELECT id, name, contact_email, created_at, updated_at FROM aoao_organizations WHERE id = ?",
    )
    .bind(id)
    .fetch_one(&state.pool)
    .await?;

    let organization = AoaoOrganization::from(organization);
    log_activity(&state.event_bus, "created", Some(principal.user_id), &organization);

    Ok((StatusCode::CREATED, Json(organization)))
}
