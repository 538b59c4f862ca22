use std::sync::Arc;

use crate::config::AppConfig;
use crate::engine::SegmentationEngine;
use crate::features::removal::{SegmentationGateway, UploadValidator};

/// 聚合的应用共享状态。
///
/// 只读：每个请求的可变数据都在请求内部，跨请求共享的只有引擎本身。
#[derive(Clone)]
pub struct AppState {
    pub validator: UploadValidator,
    pub gateway: Arc<SegmentationGateway>,
}

impl AppState {
    pub fn new(validator: UploadValidator, gateway: SegmentationGateway) -> Self {
        Self {
            validator,
            gateway: Arc::new(gateway),
        }
    }

    /// 按配置组装校验器与网关，引擎由调用方注入
    pub fn from_config(config: &AppConfig, engine: Arc<dyn SegmentationEngine>) -> Self {
        let validator = UploadValidator::new(config.upload.max_upload_bytes);
        let gateway = SegmentationGateway::new(
            engine,
            config.engine.effective_parallelism(),
            config.engine.timeout(),
        );
        Self::new(validator, gateway)
    }
}
