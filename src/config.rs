use config::{Config as ConfigBuilder, ConfigError, Environment, File};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// 全局配置单例
static CONFIG: OnceCell<AppConfig> = OnceCell::new();

/// 默认上传上限：5 MiB
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;

/// 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// 监听地址
    pub host: String,
    /// 监听端口
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 日志级别（未设置 RUST_LOG 时生效）
    pub level: String,
    /// 日志格式：full | compact | json
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "full".to_string(),
        }
    }
}

/// API 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API 路由前缀
    pub prefix: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            prefix: "/api".to_string(),
        }
    }
}

/// 上传限制配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 单个图片字段允许的最大字节数
    #[serde(default = "UploadConfig::default_max_upload_bytes")]
    pub max_upload_bytes: usize,
    /// multipart 边界/头部等额外开销，用于计算整个请求体的硬上限
    #[serde(default = "UploadConfig::default_multipart_overhead")]
    pub multipart_overhead_bytes: usize,
}

impl UploadConfig {
    fn default_max_upload_bytes() -> usize {
        DEFAULT_MAX_UPLOAD_BYTES
    }
    fn default_multipart_overhead() -> usize {
        64 * 1024
    }

    /// 整个请求体的硬上限（传输层）
    pub fn body_limit(&self) -> usize {
        self.max_upload_bytes
            .saturating_add(self.multipart_overhead_bytes)
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: Self::default_max_upload_bytes(),
            multipart_overhead_bytes: Self::default_multipart_overhead(),
        }
    }
}

/// 内置抠图引擎参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatteConfig {
    /// 与背景色的最大通道差，不超过该值的像素视为背景
    #[serde(default = "MatteConfig::default_tolerance")]
    pub tolerance: u8,
    /// 过渡带宽度，落在 (tolerance, tolerance + feather] 内的边缘像素取部分透明
    #[serde(default = "MatteConfig::default_feather")]
    pub feather: u8,
    /// 解码时允许的最大宽/高
    #[serde(default = "MatteConfig::default_max_dimension")]
    pub max_dimension: u32,
    /// 解码器允许分配的最大内存
    #[serde(default = "MatteConfig::default_max_alloc")]
    pub max_alloc_bytes: u64,
}

impl MatteConfig {
    fn default_tolerance() -> u8 {
        32
    }
    fn default_feather() -> u8 {
        16
    }
    fn default_max_dimension() -> u32 {
        8192
    }
    fn default_max_alloc() -> u64 {
        512 * 1024 * 1024
    }
}

impl Default for MatteConfig {
    fn default() -> Self {
        Self {
            tolerance: Self::default_tolerance(),
            feather: Self::default_feather(),
            max_dimension: Self::default_max_dimension(),
            max_alloc_bytes: Self::default_max_alloc(),
        }
    }
}

/// 抠图引擎调度配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 并发推理许可数（0=自动，取 CPU 核心数）
    #[serde(default)]
    pub max_parallel: u32,
    /// 单次推理超时（秒，0=不限制）
    #[serde(default = "EngineConfig::default_timeout")]
    pub timeout_secs: u64,
    /// 内置引擎参数
    #[serde(default)]
    pub matte: MatteConfig,
}

impl EngineConfig {
    fn default_timeout() -> u64 {
        60
    }

    /// 实际生效的并发许可数
    pub fn effective_parallelism(&self) -> usize {
        if self.max_parallel == 0 {
            num_cpus::get().max(1)
        } else {
            self.max_parallel as usize
        }
    }

    /// 推理超时；0 表示不设超时
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_parallel: 0,
            timeout_secs: Self::default_timeout(),
            matte: MatteConfig::default(),
        }
    }
}

/// CORS 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    /// 是否启用 CORS
    #[serde(default = "CorsConfig::default_enabled")]
    pub enabled: bool,
    /// 允许的 Origin 列表（支持 "*" 表示任意）
    #[serde(default = "CorsConfig::wildcard")]
    pub allowed_origins: Vec<String>,
    /// 允许的方法列表（支持 "*" 表示任意）
    #[serde(default = "CorsConfig::wildcard")]
    pub allowed_methods: Vec<String>,
    /// 允许的请求头列表（支持 "*" 表示任意）
    #[serde(default = "CorsConfig::wildcard")]
    pub allowed_headers: Vec<String>,
    /// 是否允许携带凭证（Cookie/Authorization）
    #[serde(default = "CorsConfig::default_allow_credentials")]
    pub allow_credentials: bool,
    /// 预检缓存时间（秒）
    #[serde(default)]
    pub max_age_secs: Option<u64>,
}

impl CorsConfig {
    fn default_enabled() -> bool {
        true
    }

    fn default_allow_credentials() -> bool {
        true
    }

    fn wildcard() -> Vec<String> {
        vec!["*".to_string()]
    }
}

impl Default for CorsConfig {
    fn default() -> Self {
        Self {
            enabled: Self::default_enabled(),
            allowed_origins: Self::wildcard(),
            allowed_methods: Self::wildcard(),
            allowed_headers: Self::wildcard(),
            allow_credentials: Self::default_allow_credentials(),
            max_age_secs: None,
        }
    }
}

/// 优雅退出配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShutdownConfig {
    /// 等待在途请求完成的最长时间（秒）
    #[serde(default = "ShutdownConfig::default_timeout")]
    pub timeout_secs: u64,
}

impl ShutdownConfig {
    fn default_timeout() -> u64 {
        30
    }

    pub fn timeout_duration(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ShutdownConfig {
    fn default() -> Self {
        Self {
            timeout_secs: Self::default_timeout(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub api: ApiConfig,
    /// 上传限制
    #[serde(default)]
    pub upload: UploadConfig,
    /// 抠图引擎
    #[serde(default)]
    pub engine: EngineConfig,
    /// CORS 配置
    #[serde(default)]
    pub cors: CorsConfig,
    /// 优雅退出配置
    #[serde(default)]
    pub shutdown: ShutdownConfig,
}

impl AppConfig {
    /// 从配置文件加载配置，支持环境变量覆盖
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::get_config_path();

        tracing::info!("正在从 {:?} 加载配置文件", config_path);

        Self::from_sources(File::from(config_path), Self::env_source())
    }

    /// 环境变量覆盖，例如：APP__SERVER__PORT、APP__UPLOAD__MAX_UPLOAD_BYTES
    fn env_source() -> Environment {
        Environment::with_prefix("APP")
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
    }

    fn from_sources(
        file: File<config::FileSourceFile, config::FileFormat>,
        env: Environment,
    ) -> Result<Self, ConfigError> {
        let config: Self = ConfigBuilder::builder()
            // 配置文件可缺省，缺省时全部取默认值
            .add_source(file.required(false))
            .add_source(env)
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 校验跨字段约束
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.port == 0 {
            return Err(ConfigError::Message("server.port 不能为 0".to_string()));
        }
        if self.upload.max_upload_bytes == 0 {
            return Err(ConfigError::Message(
                "upload.max_upload_bytes 必须大于 0".to_string(),
            ));
        }
        if !self.api.prefix.starts_with('/') {
            return Err(ConfigError::Message(format!(
                "api.prefix 必须以 / 开头: {}",
                self.api.prefix
            )));
        }
        Ok(())
    }

    /// 获取全局配置单例
    pub fn global() -> &'static AppConfig {
        CONFIG.get().expect("配置未初始化，请先调用 init_global()")
    }

    /// 初始化全局配置
    pub fn init_global() -> Result<(), ConfigError> {
        let config = Self::load()?;
        CONFIG
            .set(config)
            .map_err(|_| ConfigError::Message("配置已经被初始化".to_string()))?;
        Ok(())
    }

    /// 获取配置文件路径（可用 APP_CONFIG_PATH 覆盖）
    fn get_config_path() -> PathBuf {
        std::env::var_os("APP_CONFIG_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("config.toml"))
    }

    /// 获取服务器监听地址
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    /// 去掉末尾 `/` 的 API 前缀，便于拼接路由
    pub fn api_prefix(&self) -> &str {
        let trimmed = self.api.prefix.trim_end_matches('/');
        if trimmed.is_empty() { "" } else { trimmed }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_limits() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.upload.max_upload_bytes, 5_242_880);
        assert_eq!(cfg.upload.body_limit(), 5_242_880 + 65_536);
        assert_eq!(cfg.api_prefix(), "/api");
        assert!(cfg.cors.enabled && cfg.cors.allow_credentials);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_upload_limit() {
        let mut cfg = AppConfig::default();
        cfg.upload.max_upload_bytes = 0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_relative_prefix() {
        let mut cfg = AppConfig::default();
        cfg.api.prefix = "api".to_string();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn engine_timeout_zero_disables() {
        let engine = EngineConfig {
            timeout_secs: 0,
            ..EngineConfig::default()
        };
        assert!(engine.timeout().is_none());
        assert!(engine.effective_parallelism() >= 1);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let cfg: AppConfig = ConfigBuilder::builder()
            .add_source(config::File::from_str(
                "[upload]\nmax_upload_bytes = 1024\n[engine]\ntimeout_secs = 5\n",
                config::FileFormat::Toml,
            ))
            .build()
            .and_then(|c| c.try_deserialize())
            .expect("deserialize config");
        assert_eq!(cfg.upload.max_upload_bytes, 1024);
        assert_eq!(cfg.upload.multipart_overhead_bytes, 65_536);
        assert_eq!(cfg.engine.timeout_secs, 5);
        assert_eq!(cfg.engine.matte.tolerance, 32);
        assert_eq!(cfg.server.port, 8000);
    }

    #[test]
    fn partial_section_keeps_other_keys_default() {
        let cfg: AppConfig = ConfigBuilder::builder()
            .add_source(config::File::from_str(
                "[logging]\nlevel = \"debug\"\n[server]\nhost = \"127.0.0.1\"\n",
                config::FileFormat::Toml,
            ))
            .build()
            .and_then(|c| c.try_deserialize())
            .expect("deserialize config");
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.logging.format, "full");
        assert_eq!(cfg.server.host, "127.0.0.1");
        assert_eq!(cfg.server.port, 8000);
        assert_eq!(cfg.api.prefix, "/api");
    }

    #[test]
    fn port_only_env_override_loads() {
        let vars: config::Map<String, String> =
            [("APP__SERVER__PORT".to_string(), "9000".to_string())]
                .into_iter()
                .collect();
        let cfg = AppConfig::from_sources(
            File::with_name("does-not-exist.toml"),
            AppConfig::env_source().source(Some(vars)),
        )
        .expect("load config");
        assert_eq!(cfg.server.port, 9000);
        assert_eq!(cfg.server.host, "0.0.0.0");
        assert_eq!(cfg.server_addr(), "0.0.0.0:9000");
    }
}
