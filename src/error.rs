use axum::{
    Json,
    http::{HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// 单次请求未能成功的原因。
///
/// `Display` 文本即响应体中的 `detail`，客户端错误使用固定文案，服务端错误附带诊断信息。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessingFailure {
    /// 声明的内容类型不是 `image/*`
    #[error("File must be an image")]
    InvalidContentType,

    /// 图片字节数超过上限
    #[error("File size must be less than {}", human_size(.limit))]
    PayloadTooLarge {
        /// 生效的上限（字节）
        limit: usize,
    },

    /// 缺少必需的 multipart 字段
    #[error("Field required: {0}")]
    MissingField(String),

    /// multipart 请求体无法解析
    #[error("Invalid multipart payload: {0}")]
    MalformedUpload(String),

    /// 抠图引擎返回失败
    #[error("Error processing image: {0}")]
    EngineFailure(String),

    /// 抠图引擎超时
    #[error("Error processing image: timed out after {secs}s")]
    EngineTimeout {
        /// 生效的超时（秒）
        secs: u64,
    },

    /// 兜底：未分类的内部错误
    #[error("Internal server error: {0}")]
    InternalFailure(String),
}

/// 以最大的整单位描述字节数：5 MiB -> "5MB"。
fn human_size(bytes: &usize) -> String {
    let bytes = *bytes;
    const KIB: usize = 1024;
    const MIB: usize = 1024 * 1024;
    if bytes >= MIB && bytes % MIB == 0 {
        format!("{}MB", bytes / MIB)
    } else if bytes >= KIB && bytes % KIB == 0 {
        format!("{}KB", bytes / KIB)
    } else {
        format!("{bytes} bytes")
    }
}

/// RFC7807 风格的错误响应（Problem Details）。
///
/// `detail` 字段承载人类可读的失败原因，其余字段便于调用方程序化处理。
#[derive(Debug, Serialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProblemDetails {
    /// 问题类型（URI）
    #[serde(rename = "type")]
    #[schema(example = "about:blank")]
    pub type_url: String,

    /// 简短标题
    #[schema(example = "Bad Request")]
    pub title: String,

    /// HTTP 状态码（与响应 status 一致）
    #[schema(example = 400)]
    pub status: u16,

    /// 失败原因
    #[schema(example = "File must be an image")]
    pub detail: String,

    /// 稳定的错误码
    #[schema(example = "INVALID_CONTENT_TYPE")]
    pub code: String,

    /// 请求追踪 ID
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl ProblemDetails {
    pub fn new(status: StatusCode, code: &str, detail: String) -> Self {
        Self {
            type_url: "about:blank".to_string(),
            title: title_for(status).to_string(),
            status: status.as_u16(),
            detail,
            code: code.to_string(),
            request_id: crate::request_id::current_request_id(),
        }
    }
}

impl IntoResponse for ProblemDetails {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut res = Json(self).into_response();
        *res.status_mut() = status;
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static("application/problem+json"),
        );
        res
    }
}

fn title_for(status: StatusCode) -> &'static str {
    match status {
        StatusCode::BAD_REQUEST => "Bad Request",
        StatusCode::UNPROCESSABLE_ENTITY => "Validation Failed",
        StatusCode::GATEWAY_TIMEOUT => "Gateway Timeout",
        StatusCode::INTERNAL_SERVER_ERROR => "Internal Server Error",
        _ => "Error",
    }
}

impl ProcessingFailure {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProcessingFailure::InvalidContentType
            | ProcessingFailure::PayloadTooLarge { .. }
            | ProcessingFailure::MalformedUpload(_) => StatusCode::BAD_REQUEST,
            ProcessingFailure::MissingField(_) => StatusCode::UNPROCESSABLE_ENTITY,
            ProcessingFailure::EngineFailure(_) | ProcessingFailure::InternalFailure(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            ProcessingFailure::EngineTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn stable_code(&self) -> &'static str {
        match self {
            ProcessingFailure::InvalidContentType => "INVALID_CONTENT_TYPE",
            ProcessingFailure::PayloadTooLarge { .. } => "PAYLOAD_TOO_LARGE",
            ProcessingFailure::MissingField(_) => "MISSING_FIELD",
            ProcessingFailure::MalformedUpload(_) => "MALFORMED_UPLOAD",
            ProcessingFailure::EngineFailure(_) => "ENGINE_FAILURE",
            ProcessingFailure::EngineTimeout { .. } => "ENGINE_TIMEOUT",
            ProcessingFailure::InternalFailure(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为调用方的问题（4xx）
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl IntoResponse for ProcessingFailure {
    fn into_response(self) -> Response {
        ProblemDetails::new(self.status_code(), self.stable_code(), self.to_string())
            .into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DEFAULT_MAX_UPLOAD_BYTES;

    #[test]
    fn client_facing_messages_are_fixed() {
        assert_eq!(
            ProcessingFailure::InvalidContentType.to_string(),
            "File must be an image"
        );
        assert_eq!(
            ProcessingFailure::PayloadTooLarge {
                limit: DEFAULT_MAX_UPLOAD_BYTES
            }
            .to_string(),
            "File size must be less than 5MB"
        );
    }

    #[test]
    fn server_messages_carry_detail() {
        assert_eq!(
            ProcessingFailure::EngineFailure("corrupt image data".into()).to_string(),
            "Error processing image: corrupt image data"
        );
        assert_eq!(
            ProcessingFailure::InternalFailure("boom".into()).to_string(),
            "Internal server error: boom"
        );
        assert_eq!(
            ProcessingFailure::EngineTimeout { secs: 30 }.to_string(),
            "Error processing image: timed out after 30s"
        );
    }

    #[test]
    fn size_message_follows_configured_limit() {
        assert_eq!(human_size(&(2 * 1024 * 1024)), "2MB");
        assert_eq!(human_size(&(1536 * 1024)), "1536KB");
        assert_eq!(human_size(&1000), "1000 bytes");
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            ProcessingFailure::InvalidContentType.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ProcessingFailure::MissingField("image".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(
            ProcessingFailure::EngineTimeout { secs: 1 }.status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert!(!ProcessingFailure::EngineFailure("x".into()).is_client_error());
    }
}
