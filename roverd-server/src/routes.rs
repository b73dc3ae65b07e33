use crate::handlers::{apk, autoconfig, mitm};
use crate::state::AppState;
use crate::websocket;
use axum::Router;
use axum::routing::{delete, get, post};
use tower_http::trace::TraceLayer;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", post(mitm::ingest))
        .route("/get_latest_mitm", get(mitm::get_latest))
        .route("/status", get(mitm::status))
        .route("/ws", get(websocket::upgrade))
        .route("/autoconfig/register", post(autoconfig::register))
        .route(
            "/autoconfig/mymac",
            get(autoconfig::get_mac).post(autoconfig::set_mac),
        )
        .route("/autoconfig/{session}/log", post(autoconfig::append_log))
        .route(
            "/autoconfig/{session}/complete",
            delete(autoconfig::complete),
        )
        .route("/autoconfig/{session}/decide", post(autoconfig::decide))
        .route("/autoconfig/{session}/{op}", get(autoconfig::session_op))
        .route("/mad_apk/{apk_type}/{arch}", get(apk::version))
        .route("/mad_apk/{apk_type}/{arch}/download", get(apk::download))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
