use std::any::Any;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Bytes;
use tokio::sync::Semaphore;

use super::models::ProcessedImage;
use crate::engine::{EngineError, SegmentationEngine};
use crate::error::ProcessingFailure;

/// 抠图引擎的唯一调用入口。
///
/// - 每个请求只调用一次引擎，不重试、不缓存
/// - 引擎运行在阻塞线程池，并发数受信号量限制
/// - 引擎的任何失败（错误返回、panic、超时）都在这里转换为 [`ProcessingFailure`]
pub struct SegmentationGateway {
    engine: Arc<dyn SegmentationEngine>,
    permits: Arc<Semaphore>,
    timeout: Option<Duration>,
}

impl SegmentationGateway {
    pub fn new(
        engine: Arc<dyn SegmentationEngine>,
        max_parallel: usize,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            engine,
            permits: Arc::new(Semaphore::new(max_parallel.max(1))),
            timeout,
        }
    }

    pub fn engine_name(&self) -> &'static str {
        self.engine.name()
    }

    /// 超时从排队等待许可开始计算，覆盖“等待 + 推理”的总时长
    pub async fn segment(&self, raw_bytes: Bytes) -> Result<ProcessedImage, ProcessingFailure> {
        let run = self.run(raw_bytes);
        let joined = match self.timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(joined) => joined?,
                Err(_) => {
                    tracing::warn!(
                        engine = self.engine.name(),
                        timeout_secs = limit.as_secs(),
                        "抠图推理超时"
                    );
                    return Err(ProcessingFailure::EngineTimeout {
                        secs: limit.as_secs(),
                    });
                }
            },
            None => run.await?,
        };

        match joined {
            Ok(bytes) => Ok(ProcessedImage {
                bytes: Bytes::from(bytes),
            }),
            Err(e) => Err(ProcessingFailure::EngineFailure(e.to_string())),
        }
    }

    /// 排队获取许可后在阻塞线程池中执行引擎
    async fn run(
        &self,
        raw_bytes: Bytes,
    ) -> Result<Result<Vec<u8>, EngineError>, ProcessingFailure> {
        let wait = Instant::now();
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| ProcessingFailure::InternalFailure(format!("获取推理许可失败: {e}")))?;
        tracing::debug!(
            engine = self.engine.name(),
            wait_ms = wait.elapsed().as_millis() as u64,
            "推理许可已获取"
        );

        let engine = Arc::clone(&self.engine);
        // 许可随阻塞任务一起释放：即使请求已超时返回，未结束的推理仍占用名额
        let task = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            engine.segment(&raw_bytes)
        });

        match task.await {
            Ok(result) => Ok(result),
            Err(join_err) if join_err.is_panic() => Err(ProcessingFailure::EngineFailure(
                panic_message(join_err.into_panic().as_ref()),
            )),
            Err(join_err) => Err(ProcessingFailure::InternalFailure(format!(
                "推理任务被取消: {join_err}"
            ))),
        }
    }
}

/// 从 panic 负载中取出可读信息
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Echo;

    impl SegmentationEngine for Echo {
        fn name(&self) -> &'static str {
            "echo"
        }
        fn segment(&self, input: &[u8]) -> Result<Vec<u8>, EngineError> {
            Ok(input.iter().rev().copied().collect())
        }
    }

    struct Failing;

    impl SegmentationEngine for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }
        fn segment(&self, _: &[u8]) -> Result<Vec<u8>, EngineError> {
            Err(EngineError::Decode("cannot identify image file".into()))
        }
    }

    struct Panicking;

    impl SegmentationEngine for Panicking {
        fn name(&self) -> &'static str {
            "panicking"
        }
        fn segment(&self, _: &[u8]) -> Result<Vec<u8>, EngineError> {
            panic!("model exploded")
        }
    }

    struct Slow {
        delay: Duration,
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    impl SegmentationEngine for Slow {
        fn name(&self) -> &'static str {
            "slow"
        }
        fn segment(&self, input: &[u8]) -> Result<Vec<u8>, EngineError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            std::thread::sleep(self.delay);
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(input.to_vec())
        }
    }

    #[tokio::test]
    async fn passes_engine_output_through() {
        let gw = SegmentationGateway::new(Arc::new(Echo), 2, None);
        let out = gw.segment(Bytes::from_static(b"abc")).await.unwrap();
        assert_eq!(&out.bytes[..], b"cba");
    }

    #[tokio::test]
    async fn engine_error_becomes_engine_failure() {
        let gw = SegmentationGateway::new(Arc::new(Failing), 1, None);
        let err = gw.segment(Bytes::from_static(b"x")).await.unwrap_err();
        assert_eq!(
            err,
            ProcessingFailure::EngineFailure("cannot identify image file".into())
        );
    }

    #[tokio::test]
    async fn engine_panic_is_contained() {
        let gw = SegmentationGateway::new(Arc::new(Panicking), 1, None);
        let err = gw.segment(Bytes::from_static(b"x")).await.unwrap_err();
        assert_eq!(err, ProcessingFailure::EngineFailure("model exploded".into()));
    }

    #[tokio::test]
    async fn slow_engine_times_out() {
        let slow = Slow {
            delay: Duration::from_millis(300),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        };
        let gw = SegmentationGateway::new(Arc::new(slow), 1, Some(Duration::from_millis(20)));
        let err = gw.segment(Bytes::from_static(b"x")).await.unwrap_err();
        assert!(matches!(err, ProcessingFailure::EngineTimeout { .. }));
    }

    #[tokio::test]
    async fn waiting_for_a_permit_counts_toward_timeout() {
        let slow = Arc::new(Slow {
            delay: Duration::from_millis(400),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let gw = Arc::new(SegmentationGateway::new(
            slow.clone(),
            1,
            Some(Duration::from_millis(100)),
        ));

        // 第一个请求超时返回，但推理仍在阻塞线程中持有唯一的许可
        let first = gw.segment(Bytes::from_static(b"a")).await.unwrap_err();
        assert!(matches!(first, ProcessingFailure::EngineTimeout { .. }));

        let started = Instant::now();
        let second = gw.segment(Bytes::from_static(b"b")).await.unwrap_err();
        assert!(matches!(second, ProcessingFailure::EngineTimeout { .. }));
        assert!(started.elapsed() < Duration::from_millis(250));
        assert_eq!(slow.peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn concurrency_is_capped() {
        let slow = Arc::new(Slow {
            delay: Duration::from_millis(30),
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let gw = Arc::new(SegmentationGateway::new(slow.clone(), 2, None));

        let mut handles = Vec::new();
        for _ in 0..6 {
            let gw = gw.clone();
            handles.push(tokio::spawn(async move {
                gw.segment(Bytes::from_static(b"x")).await
            }));
        }
        for h in handles {
            assert!(h.await.unwrap().is_ok());
        }
        assert!(slow.peak.load(Ordering::SeqCst) <= 2);
    }

    #[test]
    fn panic_message_handles_both_payload_kinds() {
        let s: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(s.as_ref()), "static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        assert_eq!(panic_message(owned.as_ref()), "owned");
        let other: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(other.as_ref()), "unknown panic");
    }
}
