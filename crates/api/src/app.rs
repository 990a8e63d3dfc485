use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use domain::services::{
    AccountDirectory, AuthmanReconciler, AuthorizationGate, MembershipService,
    NotificationDispatcher, NotificationOutbox, RosterSource,
};
use domain::store::GroupStore;
use shared::jwt::{JwtConfig, JwtError};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{AllowOrigin, Any, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::config::Config;
use crate::middleware::{metrics_handler, metrics_middleware, require_user_auth, trace_id};
use crate::routes::{groups, health, memberships, sync};

/// Access-token lifetime used when this service mints tokens (tooling only).
const MINTED_TOKEN_EXPIRY_SECS: i64 = 3600;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn GroupStore>,
    pub config: Arc<Config>,
    pub jwt: Arc<JwtConfig>,
    pub service: Arc<MembershipService>,
    pub reconciler: AuthmanReconciler,
    pub outbox: NotificationOutbox,
}

impl AppState {
    /// Wires the domain services on top of a store and the external collaborators.
    ///
    /// Spawns the notification outbox worker, so it must run inside a Tokio runtime.
    pub fn new(
        config: Config,
        store: Arc<dyn GroupStore>,
        roster: Arc<dyn RosterSource>,
        accounts: Arc<dyn AccountDirectory>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Result<Self, JwtError> {
        let jwt = JwtConfig::with_leeway(
            &config.jwt.private_key,
            &config.jwt.public_key,
            MINTED_TOKEN_EXPIRY_SECS,
            config.jwt.leeway_secs,
        )?;

        let (outbox, _worker) = NotificationOutbox::spawn(dispatcher);
        let gate = AuthorizationGate::new(config.authorization_policy());
        let service = MembershipService::new(store.clone(), gate, outbox.clone());
        let reconciler =
            AuthmanReconciler::new(store.clone(), roster, accounts, config.reconciler_config());

        Ok(Self {
            store,
            config: Arc::new(config),
            jwt: Arc::new(jwt),
            service: Arc::new(service),
            reconciler,
            outbox,
        })
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if origins.is_empty() {
        // Development default
        layer.allow_origin(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();
        layer.allow_origin(AllowOrigin::list(origins))
    }
}

pub fn create_app(state: AppState) -> Router {
    let config = state.config.clone();

    // Routes that require an authenticated, non-anonymous caller
    let protected_routes = Router::new()
        .route("/api/v1/groups", post(groups::create_group))
        .route(
            "/api/v1/groups/:group_id",
            put(groups::update_group).delete(groups::delete_group),
        )
        .route("/api/v1/user/groups", get(groups::user_groups))
        .route("/api/v1/groups/:group_id/join", post(memberships::request_join))
        .route(
            "/api/v1/groups/:group_id/membership",
            axum::routing::delete(memberships::leave),
        )
        .route(
            "/api/v1/groups/:group_id/membership/notifications",
            put(memberships::update_notification_preferences),
        )
        .route(
            "/api/v1/groups/:group_id/members",
            get(memberships::list_members).post(memberships::add_member),
        )
        .route(
            "/api/v1/memberships/:membership_id",
            put(memberships::update_membership).delete(memberships::remove_member),
        )
        .route(
            "/api/v1/memberships/:membership_id/decision",
            put(memberships::decide_pending),
        )
        .route(
            "/api/v1/memberships/:membership_id/attended",
            put(memberships::mark_attended),
        )
        .route(
            "/api/v1/groups/:group_id/authman/synchronize",
            post(sync::synchronize_group),
        )
        .route(
            "/api/v1/int/authman/synchronize",
            post(sync::synchronize_all),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_user_auth,
        ));

    // Routes that also serve anonymous readers
    let optional_auth_routes = Router::new()
        .route("/api/v1/groups", get(groups::list_groups))
        .route("/api/v1/groups/:group_id", get(groups::get_group));

    let public_routes = Router::new()
        .route("/api/health", get(health::health_check))
        .route("/api/health/ready", get(health::ready))
        .route("/api/health/live", get(health::live))
        .route("/metrics", get(metrics_handler));

    Router::new()
        .merge(public_routes)
        .merge(optional_auth_routes)
        .merge(protected_routes)
        .layer(CompressionLayer::new())
        .layer(TimeoutLayer::new(Duration::from_secs(
            config.server.request_timeout_secs,
        )))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(trace_id))
        .layer(cors_layer(&config.server.cors_origins))
        .with_state(state)
}
