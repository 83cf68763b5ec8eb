use std::sync::Arc;

use axum::http::Method;
use axum::routing::{delete, get, post, put};
use axum::Router;
use sqlx::SqlitePool;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::authz::AccessResolver;
use crate::billing::{BillingProvider, DisabledBilling};
use crate::cache::TtlCache;
use crate::errors::AppError;
use crate::events::{init_event_bus, start_activity_listener, EventBus};
use crate::jwt::JwtConfig;
use crate::notify::{LogNotifier, Notifier};
use crate::rate_limit::RateLimiter;
use crate::routes::{access, auth, billing, buildings, building_events, contractors, documents, health, messages, organizations, subscriptions, units};
use crate::subscriptions::SubscriptionEngine;
use crate::sync::SyncGuard;

/// Process-wide shared state. All mutable pieces (cache, rate-limit
/// windows, sync flag) live here behind their own synchronization so tests
/// get a fresh world per constructed state.
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub jwt: Arc<JwtConfig>,
    pub cache: Arc<TtlCache<bool>>,
    pub rate_limiter: Arc<RateLimiter>,
    pub sync_guard: Arc<SyncGuard>,
    pub resolver: AccessResolver,
    pub subscriptions: SubscriptionEngine,
    pub notifier: Arc<dyn Notifier>,
    pub event_bus: EventBus,
}

impl AppState {
    pub fn new(pool: SqlitePool, jwt: JwtConfig) -> Self {
        Self::with_collaborators(pool, jwt, Arc::new(DisabledBilling), Arc::new(LogNotifier))
    }

    /// Inject billing/notification collaborators; integration tests use
    /// this to substitute fakes.
    pub fn with_collaborators(
        pool: SqlitePool,
        jwt: JwtConfig,
        billing: Arc<dyn BillingProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let cache = Arc::new(TtlCache::new());
        let (event_bus, rx) = init_event_bus();
        tokio::spawn(start_activity_listener(rx, pool.clone()));

        Self {
            resolver: AccessResolver::new(pool.clone(), Arc::clone(&cache)),
            subscriptions: SubscriptionEngine::new(pool.clone(), billing),
            pool,
            jwt: Arc::new(jwt),
            cache,
            rate_limiter: Arc::new(RateLimiter::new()),
            sync_guard: Arc::new(SyncGuard::new()),
            notifier,
            event_bus,
        }
    }
}

pub async fn create_app(pool: SqlitePool) -> Result<Router, AppError> {
    let jwt_config = JwtConfig::from_env()?;
    let state = AppState::new(pool, jwt_config);
    Ok(build_router(state))
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_origin(Any)
        .allow_headers(Any);

    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/logout", post(auth::logout))
        .route("/password-reset", post(auth::request_password_reset));

    let building_routes = Router::new()
        .route("/", get(buildings::list_buildings))
        .route("/", post(buildings::create_building))
        .route("/:id", get(buildings::get_building))
        .route("/:id", put(buildings::update_building))
        .route("/:id", delete(buildings::delete_building))
        .route("/:id/units", get(units::list_building_units));

    let unit_routes = Router::new()
        .route("/", post(units::create_unit))
        .route("/:id", get(units::get_unit))
        .route("/:id", put(units::update_unit));

    let event_routes = Router::new()
        .route("/", get(building_events::list_events))
        .route("/", post(building_events::create_event))
        .route("/:id", get(building_events::get_event))
        .route("/:id", put(building_events::update_event))
        .route("/:id", delete(building_events::delete_event));

    let document_routes = Router::new()
        .route("/", get(documents::list_documents))
        .route("/", post(documents::create_document))
        .route("/:id", get(documents::get_document))
        .route("/:id", put(documents::update_document))
        .route("/:id/email", post(documents::email_document));

    let contractor_routes = Router::new()
        .route("/", get(contractors::list_contractors))
        .route("/", post(contractors::create_contractor))
        .route("/:id", get(contractors::get_contractor))
        .route("/:id", put(contractors::update_contractor));

    let organization_routes = Router::new()
        .route("/pm-companies", get(organizations::list_pm_companies))
        .route("/pm-companies", post(organizations::create_pm_company))
        .route("/aoao", get(organizations::list_aoao_organizations))
        .route("/aoao", post(organizations::create_aoao_organization));

    let access_routes = Router::new()
        .route("/grants", get(access::list_grants))
        .route("/grants", post(access::create_grant))
        .route("/grants/:id", delete(access::revoke_grant))
        .route("/me", get(access::my_access))
        .route("/requests", get(access::list_requests))
        .route("/requests", post(access::create_request))
        .route("/requests/:id/approve", post(access::approve_request))
        .route("/requests/:id/reject", post(access::reject_request));

    let subscription_routes = Router::new()
        .route("/me", get(subscriptions::my_subscription))
        .route("/me/start-trial", post(subscriptions::start_my_trial))
        .route("/me/sync", post(subscriptions::sync_my_subscription))
        .route("/users/:user_id/start-trial", post(subscriptions::admin_start_trial));

    let message_routes = Router::new()
        .route("/", get(messages::list_messages))
        .route("/", post(messages::send_message));

    Router::new()
        .route("/api/health", get(health::health))
        .nest("/auth", auth_routes)
        .nest("/buildings", building_routes)
        .nest("/units", unit_routes)
        .nest("/events", event_routes)
        .nest("/documents", document_routes)
        .nest("/contractors", contractor_routes)
        .nest("/organizations", organization_routes)
        .nest("/access", access_routes)
        .nest("/subscriptions", subscription_routes)
        .nest("/messages", message_routes)
        .route("/billing/webhook", post(billing::provider_webhook))
        .route("/admin/sync", post(billing::trigger_sync))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
