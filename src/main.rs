use std::future::IntoFuture;
use std::sync::Arc;

use cutout_backend::{
    AppConfig, AppState, LocalMatteEngine, SegmentationEngine, ShutdownManager, build_app,
    config::LoggingConfig,
};

fn init_tracing(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("cutout_backend={0},tower_http={0}", logging.level).into()
    });
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match logging.format.as_str() {
        "json" => builder.json().init(),
        "compact" => builder.compact().init(),
        _ => builder.init(),
    }
}

#[tokio::main]
async fn main() {
    // 配置决定日志格式，加载失败时用默认日志输出错误
    if let Err(e) = AppConfig::init_global() {
        init_tracing(&LoggingConfig::default());
        tracing::error!("Config init failed: {}", e);
        std::process::exit(1);
    }
    let config = AppConfig::global();
    init_tracing(&config.logging);

    let shutdown_manager = ShutdownManager::new();
    if let Err(e) = shutdown_manager.start_signal_handler() {
        tracing::error!("信号处理器启动失败: {}", e);
        std::process::exit(1);
    }

    let engine: Arc<dyn SegmentationEngine> =
        Arc::new(LocalMatteEngine::new(config.engine.matte.clone()));
    tracing::info!(
        engine = engine.name(),
        max_parallel = config.engine.effective_parallelism(),
        timeout_secs = config.engine.timeout_secs,
        max_upload_bytes = config.upload.max_upload_bytes,
        "抠图引擎已就绪"
    );

    let state = AppState::from_config(config, engine);
    let app = build_app(config, state);

    let addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .unwrap_or_else(|e| {
            tracing::error!("Bind address failed {}: {}", addr, e);
            std::process::exit(1);
        });

    tracing::info!("Server: http://{}", addr);
    tracing::info!("Docs: http://{}/docs", addr);
    tracing::info!("Health: http://{}/health", addr);
    tracing::info!("Remove BG: http://{}{}/remove-bg", addr, config.api_prefix());

    let drain_timeout = config.shutdown.timeout_duration();
    let signal_manager = shutdown_manager.clone();
    let server = axum::serve(listener, app).with_graceful_shutdown(async move {
        let reason = signal_manager.wait_for_shutdown().await;
        tracing::info!("接收到退出信号: {:?}，停止接收新连接", reason);
    })
    .into_future();

    // 收到信号后最多等待 drain_timeout 让在途请求完成
    let forced = async {
        shutdown_manager.wait_for_shutdown().await;
        tokio::time::sleep(drain_timeout).await;
    };

    tokio::select! {
        res = server => {
            if let Err(e) = res {
                tracing::error!("服务器运行错误: {}", e);
                std::process::exit(1);
            }
            tracing::info!("服务器已优雅关闭");
        }
        _ = forced => {
            tracing::warn!("优雅退出超时（{}秒），强制退出", config.shutdown.timeout_secs);
        }
    }
}
