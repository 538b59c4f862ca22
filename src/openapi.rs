use utoipa::openapi::server::{ServerBuilder, ServerVariableBuilder};
use utoipa::{Modify, OpenApi};

/// 业务接口挂载在 `config.api.prefix` 下，`/health` 不带前缀，因此提供两个 server。
struct ApiServers;

impl Modify for ApiServers {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let api = ServerBuilder::new()
            .url("{api_prefix}")
            .description(Some("业务接口（默认 /api）"))
            .parameter(
                "api_prefix",
                ServerVariableBuilder::new()
                    .default_value("/api")
                    .description(Some(
                        "业务接口前缀：对应 config.api.prefix（可通过 APP__API__PREFIX 覆盖）",
                    )),
            )
            .build();

        let root = ServerBuilder::new()
            .url("/")
            .description(Some("根路径（/health）"))
            .build();

        openapi.servers = Some(vec![api, root]);
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::features::health::handler::health_check,
        crate::features::removal::handler::remove_background,
    ),
    components(schemas(
        crate::error::ProblemDetails,
        crate::features::removal::RemoveBackgroundForm,
        crate::features::health::handler::HealthResponse,
    )),
    modifiers(&ApiServers),
    tags(
        (name = "Removal", description = "背景去除：上传图片，返回透明背景 PNG。"),
        (name = "Health", description = "健康检查：服务探活。"),
    ),
    info(
        title = "Cutout Backend API",
        version = env!("CARGO_PKG_VERSION"),
        description = "图片背景去除服务（Axum + utoipa）。"
    )
)]
pub struct ApiDoc;
