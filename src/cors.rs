use axum::http::{HeaderValue, Method, header};
use std::time::Duration;
use tower_http::cors::{AllowHeaders, AllowMethods, AllowOrigin, Any, CorsLayer};

use crate::config::CorsConfig;

/// 某一维度的解析结果：任意（`*`）或显式列表
enum Allowed<T> {
    Any,
    List(Vec<T>),
}

impl<T> Allowed<T> {
    fn is_empty(&self) -> bool {
        matches!(self, Allowed::List(v) if v.is_empty())
    }
}

/// 根据配置构建 CORS 中间件。
///
/// 浏览器不接受 `*` 与凭证同时出现，因此 `allow_credentials=true` 时的通配会改为回显请求中的
/// Origin / 方法 / 请求头，效果等同于“允许任意来源且携带凭证”。
pub fn build_cors_layer(cors: &CorsConfig) -> Option<CorsLayer> {
    if !cors.enabled {
        return None;
    }

    let origins = parse_allowed(&cors.allowed_origins, "allowed_origins", |v| {
        HeaderValue::from_str(v).ok()
    });
    if origins.is_empty() {
        tracing::warn!("CORS 已启用但 allowed_origins 为空，已跳过启用");
        return None;
    }
    let methods = parse_allowed(&cors.allowed_methods, "allowed_methods", |v| {
        Method::from_bytes(v.to_ascii_uppercase().as_bytes()).ok()
    });
    let headers = parse_allowed(&cors.allowed_headers, "allowed_headers", |v| {
        header::HeaderName::from_bytes(v.to_ascii_lowercase().as_bytes()).ok()
    });

    let mirror = cors.allow_credentials;
    let mut layer = CorsLayer::new();

    layer = match origins {
        Allowed::Any if mirror => layer.allow_origin(AllowOrigin::mirror_request()),
        Allowed::Any => layer.allow_origin(Any),
        Allowed::List(list) => layer.allow_origin(list),
    };

    layer = match methods {
        Allowed::Any if mirror => layer.allow_methods(AllowMethods::mirror_request()),
        Allowed::Any => layer.allow_methods(Any),
        Allowed::List(list) if !list.is_empty() => layer.allow_methods(list),
        Allowed::List(_) => layer,
    };

    layer = match headers {
        Allowed::Any if mirror => layer.allow_headers(AllowHeaders::mirror_request()),
        Allowed::Any => layer.allow_headers(Any),
        Allowed::List(list) if !list.is_empty() => layer.allow_headers(list),
        Allowed::List(_) => layer,
    };

    if cors.allow_credentials {
        layer = layer.allow_credentials(true);
    }

    if let Some(secs) = cors.max_age_secs
        && secs > 0
    {
        layer = layer.max_age(Duration::from_secs(secs));
    }

    Some(layer)
}

fn parse_allowed<T>(
    values: &[String],
    label: &str,
    parse: impl Fn(&str) -> Option<T>,
) -> Allowed<T> {
    let mut list = Vec::new();
    for raw in values {
        let value = raw.trim();
        if value.is_empty() {
            continue;
        }
        if value == "*" {
            return Allowed::Any;
        }
        match parse(value) {
            Some(v) => list.push(v),
            None => tracing::warn!("CORS {} 含无效值: {}", label, value),
        }
    }
    Allowed::List(list)
}
