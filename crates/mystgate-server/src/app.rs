//! Router construction.
//!
//! Every path goes to the dispatcher; middleware handles logging, security
//! headers and navigation URL rewriting.

use std::sync::Arc;

use axum::Router;
use tower::ServiceBuilder;

use crate::handlers;
use crate::middleware::{logging, rewrite, security};
use crate::state::AppState;

/// Create the application router.
pub(crate) fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .fallback(handlers::dispatch::dispatch)
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(logging::log_requests))
                .layer(security::content_type_options_layer())
                .layer(axum::middleware::from_fn_with_state(
                    Arc::clone(&state),
                    rewrite::rewrite_layer,
                )),
        )
        .with_state(state)
}
