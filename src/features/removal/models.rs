use axum::body::{Body, Bytes};
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// 一次请求中上传的图片，仅存活于该请求内
#[derive(Debug, Clone)]
pub struct UploadedImage {
    /// 客户端声明的内容类型（未做魔数校验）
    pub content_type: String,
    /// 已完整读取的原始字节
    pub bytes: Bytes,
}

impl UploadedImage {
    /// 按实际读取的字节计算，不信任客户端的 Content-Length
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// 去背景后的图片，原样作为响应体返回
#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub bytes: Bytes,
}

impl ProcessedImage {
    pub const MEDIA_TYPE: &'static str = "image/png";

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

impl IntoResponse for ProcessedImage {
    fn into_response(self) -> Response {
        let mut res = Response::new(Body::from(self.bytes));
        *res.status_mut() = StatusCode::OK;
        res.headers_mut().insert(
            header::CONTENT_TYPE,
            HeaderValue::from_static(Self::MEDIA_TYPE),
        );
        res
    }
}

/// OpenAPI 用的上传表单描述
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct RemoveBackgroundForm {
    /// 图片文件，part 的 Content-Type 必须为 image/*
    #[schema(value_type = String, format = Binary)]
    pub image: Vec<u8>,
}
