use axum::routing::get;
use axum::{Json, Router};
use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::models;

struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearerAuth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    components(
        schemas(
            models::user::User,
            models::user::AuthResponse,
            models::user::LoginRequest,
            models::user::RegisterRequest,
            models::user::PasswordResetRequest,
            models::building::Building,
            models::building::BuildingCreateRequest,
            models::building::BuildingUpdateRequest,
            models::unit::Unit,
            models::unit::UnitCreateRequest,
            models::unit::UnitUpdateRequest,
            models::building_event::BuildingEvent,
            models::building_event::BuildingEventCreateRequest,
            models::building_event::BuildingEventUpdateRequest,
            models::document::Document,
            models::document::DocumentCreateRequest,
            models::document::DocumentUpdateRequest,
            models::document::DocumentEmailRequest,
            models::contractor::Contractor,
            models::contractor::ContractorCreateRequest,
            models::contractor::ContractorUpdateRequest,
            models::organization::PmCompany,
            models::organization::AoaoOrganization,
            models::organization::OrganizationCreateRequest,
            models::access::AccessGrant,
            models::access::GrantCreateRequest,
            models::access::AccessRequest,
            models::access::AccessRequestCreate,
            models::access::SubjectType,
            models::access::ResourceType,
            models::access::RequestStatus,
            models::subscription::SubscriptionRecord,
            models::subscription::SubscriptionSnapshot,
            models::subscription::StartTrialRequest,
            models::subscription::Tier,
            models::message::Message,
            models::message::SendMessageRequest,
            crate::authz::Role,
            crate::billing::BillingEvent,
            crate::billing::ProviderStatus,
            crate::sync::SyncOutcome,
            crate::routes::billing::WebhookAck,
            crate::routes::health::HealthResponse
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "Auth", description = "Authentication endpoints"),
        (name = "Buildings", description = "Building management"),
        (name = "Units", description = "Unit management"),
        (name = "Events", description = "Building event records"),
        (name = "Documents", description = "Document metadata and delivery"),
        (name = "Contractors", description = "Contractor directory"),
        (name = "Organizations", description = "PM companies and AOAO associations"),
        (name = "Access", description = "Grants and access requests"),
        (name = "Subscriptions", description = "Subscription and trial management"),
        (name = "Billing", description = "Provider feed and synchronization"),
        (name = "Messages", description = "User messaging"),
        (name = "Health", description = "Service health")
    )
)]
pub struct ApiDoc;

/// Serve the OpenAPI JSON plus the Swagger UI pointed at it.
pub fn swagger_routes() -> Router {
    let doc = ApiDoc::openapi();
    let doc_json = serde_json::to_value(&doc).expect("OpenAPI serialization must succeed");

    let json_route = Router::new().route(
        "/api-docs/openapi.json",
        get(move || {
            let doc_json = doc_json.clone();
            async move { Json(doc_json) }
        }),
    );

    let swagger_config = utoipa_swagger_ui::Config::new(["/api-docs/openapi.json"])
        .try_it_out_enabled(true)
        .persist_authorization(true);

    json_route.merge(SwaggerUi::new("/docs").config(swagger_config))
}
