use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::handlers::{auth, driver, notifications, passenger};
use crate::middleware::auth::auth_middleware;
use crate::middleware::rate_limit::create_public_governor;
use crate::middleware::user_rate_limit::create_user_governor;
use crate::AppState;

pub fn create_router(state: AppState) -> Router {
    // Per-user governor for authenticated routes, per-IP for public ones
    let user_governor = create_user_governor();
    let public_governor = create_public_governor();

    // Public routes (per-IP rate limiting)
    let auth_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .layer(public_governor.clone());

    // Public ride browsing
    let public_routes = Router::new()
        .route("/rides", get(passenger::list_rides))
        .route("/rides/{id}", get(passenger::get_ride))
        .layer(public_governor);

    // Driver routes (requires auth; ownership is checked per ride)
    let driver_routes = Router::new()
        .route("/rides", post(driver::publish_ride))
        .route("/rides", get(driver::my_rides))
        .route("/rides/{id}/requests", get(driver::ride_requests))
        .layer(user_governor.clone())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Booking request lifecycle (requires auth; actor checks live in the
    // coordinator)
    let request_routes = Router::new()
        .route("/", post(passenger::book))
        .route("/", get(passenger::my_requests))
        .route("/{id}/accept", post(driver::accept_request))
        .route("/{id}/reject", post(driver::reject_request))
        .route("/{id}/check-in", post(passenger::check_in))
        .route("/{id}/check-out", post(passenger::check_out))
        .route("/{id}/cancel", post(passenger::cancel))
        .route("/{id}/rating", post(passenger::rate))
        .layer(user_governor.clone())
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Notification inbox (requires auth)
    let notification_routes = Router::new()
        .route("/", get(notifications::list))
        .layer(user_governor)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware));

    // Combine all routes
    Router::new()
        .nest("/api/auth", auth_routes)
        .nest("/api", public_routes)
        .nest("/api/driver", driver_routes)
        .nest("/api/requests", request_routes)
        .nest("/api/notifications", notification_routes)
        .with_state(state)
}
