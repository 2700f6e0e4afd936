pub mod health;

use axum::Router;

use crate::AppState;

pub fn router(rtc_path: &str) -> Router<AppState> {
    Router::new()
        .merge(health::router())
        .merge(crate::rtc::server::router(rtc_path))
}
