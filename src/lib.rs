/// 统一错误处理模块
pub mod error;

/// 配置模块
pub mod config;

/// 抠图引擎接口与内置实现
pub mod engine;

/// 功能聚合模块
pub mod features;

/// 应用状态聚合模块
pub mod state;

/// 路由装配
pub mod app;

/// CORS 中间件构建
pub mod cors;

/// 请求标识中间件
pub mod request_id;

/// OpenAPI 文档
pub mod openapi;

/// 优雅退出管理模块
pub mod shutdown;

// 导出常用类型供外部使用
pub use app::build_app;
pub use config::AppConfig;
pub use engine::{EngineError, LocalMatteEngine, SegmentationEngine};
pub use error::ProcessingFailure;
pub use shutdown::{ShutdownManager, ShutdownReason};
pub use state::AppState;
