pub mod health;
pub mod index;
pub mod query;
pub mod status;

use axum::Router;

use crate::state::AppState;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(index::routes())
        .merge(query::routes())
        .merge(status::routes())
        .with_state(state)
        .merge(crate::openapi::swagger_ui())
}
