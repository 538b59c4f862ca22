//! 抠图引擎接口
//!
//! 引擎是一个阻塞的纯函数：输入上传的原始字节，输出带 alpha 通道的 PNG 字节。
//! 网关只通过 [`SegmentationEngine`] 调用它，具体实现（内置的 [`LocalMatteEngine`]
//! 或基于模型的实现）在启动时注入。

mod local;

use thiserror::Error;

pub use local::LocalMatteEngine;

/// 抠图引擎失败原因。`Display` 文本会原样出现在 `Error processing image: ` 之后。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// 输入无法解码（格式不支持、数据损坏等）
    #[error("{0}")]
    Decode(String),
    /// 结果编码失败
    #[error("{0}")]
    Encode(String),
    /// 图片尺寸超出解码上限
    #[error("image dimensions {width}x{height} exceed the {limit}px limit")]
    Dimensions { width: u32, height: u32, limit: u32 },
    /// 其他引擎内部错误
    #[error("{0}")]
    Failed(String),
}

/// 抠图引擎。
///
/// `segment` 会在阻塞线程池中被多个请求同时调用：实现必须自身线程安全，
/// 若底层资源不可并发使用，需要在实现内部自行串行化。
pub trait SegmentationEngine: Send + Sync + 'static {
    /// 用于日志的引擎名称
    fn name(&self) -> &'static str;

    /// 去除背景，返回 PNG 编码的前景图
    fn segment(&self, input: &[u8]) -> Result<Vec<u8>, EngineError>;
}
