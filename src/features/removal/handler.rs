use std::time::Instant;

use axum::{
    Router,
    body::Bytes,
    extract::{
        DefaultBodyLimit, Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};

use super::models::{ProcessedImage, UploadedImage};
use super::validator::UploadValidator;
use crate::{error::ProcessingFailure, state::AppState};

/// 上传图片所在的 multipart 字段名
pub const IMAGE_FIELD: &str = "image";

#[utoipa::path(
    post,
    path = "/remove-bg",
    summary = "去除图片背景",
    description = "上传一张图片（multipart 字段 `image`，part 的 Content-Type 必须为 image/*，不超过 5MB），返回去除背景后的透明 PNG。",
    request_body(
        content = super::models::RemoveBackgroundForm,
        content_type = "multipart/form-data"
    ),
    responses(
        (status = 200, description = "透明背景 PNG 字节（Content-Type: image/png）"),
        (status = 400, description = "非图片或超过大小上限", body = crate::error::ProblemDetails),
        (status = 422, description = "缺少 image 字段", body = crate::error::ProblemDetails),
        (status = 500, description = "引擎或内部错误", body = crate::error::ProblemDetails),
        (status = 504, description = "引擎超时", body = crate::error::ProblemDetails)
    ),
    tag = "Removal"
)]
pub async fn remove_background(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Response {
    let started = Instant::now();
    let outcome = match multipart {
        Ok(multipart) => process(&state, multipart).await,
        Err(rejection) => Err(ProcessingFailure::MalformedUpload(rejection.body_text())),
    };
    match outcome {
        Ok((upload, processed)) => {
            tracing::info!(
                engine = state.gateway.engine_name(),
                content_type = %upload.content_type,
                input_bytes = upload.size(),
                output_bytes = processed.size(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "背景去除完成"
            );
            processed.into_response()
        }
        Err(failure) => {
            let elapsed_ms = started.elapsed().as_millis() as u64;
            if failure.is_client_error() {
                tracing::info!(code = failure.stable_code(), elapsed_ms, "上传被拒绝");
            } else {
                tracing::error!(
                    code = failure.stable_code(),
                    elapsed_ms,
                    detail = %failure,
                    "背景去除失败"
                );
            }
            failure.into_response()
        }
    }
}

/// Validating -> Segmenting，首个失败即终止
async fn process(
    state: &AppState,
    multipart: Multipart,
) -> Result<(UploadedImage, ProcessedImage), ProcessingFailure> {
    let upload = read_upload(multipart, &state.validator).await?;
    state
        .validator
        .validate(&upload.content_type, &upload.bytes)?;
    let processed = state.gateway.segment(upload.bytes.clone()).await?;
    Ok((upload, processed))
}

/// 读取 `image` 字段。
///
/// 内容类型在读取任何字节前检查；字节按块累加，一旦超过上限立即中止，
/// 超限的上传不会被完整缓冲。其余字段直接丢弃。
pub async fn read_upload(
    mut multipart: Multipart,
    validator: &UploadValidator,
) -> Result<UploadedImage, ProcessingFailure> {
    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_failure(e, validator))?
    {
        if field.name() != Some(IMAGE_FIELD) {
            continue;
        }

        let content_type = field.content_type().unwrap_or_default().to_string();
        validator.check_content_type(&content_type)?;

        let mut buf = Vec::new();
        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| multipart_failure(e, validator))?
        {
            validator.check_size(buf.len() + chunk.len())?;
            buf.extend_from_slice(&chunk);
        }

        return Ok(UploadedImage {
            content_type,
            bytes: Bytes::from(buf),
        });
    }

    Err(ProcessingFailure::MissingField(IMAGE_FIELD.to_string()))
}

/// 传输层请求体上限触发时同样按“文件过大”处理
fn multipart_failure(err: MultipartError, validator: &UploadValidator) -> ProcessingFailure {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ProcessingFailure::PayloadTooLarge {
            limit: validator.max_upload_bytes(),
        }
    } else {
        ProcessingFailure::MalformedUpload(err.body_text())
    }
}

/// 背景去除路由；`body_limit` 为整个请求体的硬上限
pub fn create_removal_router(body_limit: usize) -> Router<AppState> {
    Router::new()
        .route("/remove-bg", post(remove_background))
        .layer(DefaultBodyLimit::max(body_limit))
}
