//! 路由装配：业务路由、文档、跨域与兜底中间件

use std::any::Any;

use axum::{Router, http::StatusCode, response::IntoResponse, response::Response, routing::get};
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::config::AppConfig;
use crate::cors::build_cors_layer;
use crate::error::ProblemDetails;
use crate::features::{health::health_check, removal};
use crate::openapi::ApiDoc;
use crate::request_id::request_id_middleware;
use crate::state::AppState;

/// 请求处理中出现 panic 时的兜底响应：500 + `Internal server error: <panic>`
fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = format!(
        "Internal server error: {}",
        removal::panic_message(payload.as_ref())
    );
    tracing::error!(detail = %detail, "请求处理发生 panic");
    ProblemDetails::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", detail)
        .into_response()
}

/// 构建完整的应用路由
pub fn build_app(config: &AppConfig, state: AppState) -> Router {
    let api_router = removal::create_removal_router(config.upload.body_limit());

    let mut app = Router::<AppState>::new().route("/health", get(health_check));
    // axum 不允许在根路径 nest，前缀为 "/" 时直接合并
    app = match config.api_prefix() {
        "" => app.merge(api_router),
        prefix => app.nest(prefix, api_router),
    };

    let app = app
        .merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .with_state(state);

    with_service_layers(app, config)
}

/// 全局中间件：兜底 panic、request_id、访问日志、CORS
fn with_service_layers(app: Router, config: &AppConfig) -> Router {
    let mut app = app
        // 先包 catch-panic，再包 request_id：兜底响应也能带上 requestId
        .layer(CatchPanicLayer::custom(panic_response))
        .layer(axum::middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http());

    if let Some(cors) = build_cors_layer(&config.cors) {
        app = app.layer(cors);
    }

    app
}
