use crate::error::ProcessingFailure;

/// 上传校验：先看声明的内容类型，再看字节数。无副作用。
///
/// 内容类型只检查 `image/` 前缀，不嗅探魔数；真正的格式问题交给引擎报告。
#[derive(Debug, Clone, Copy)]
pub struct UploadValidator {
    max_upload_bytes: usize,
}

impl UploadValidator {
    pub fn new(max_upload_bytes: usize) -> Self {
        Self { max_upload_bytes }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    pub fn validate(&self, content_type: &str, raw_bytes: &[u8]) -> Result<(), ProcessingFailure> {
        self.check_content_type(content_type)?;
        self.check_size(raw_bytes.len())
    }

    pub fn check_content_type(&self, content_type: &str) -> Result<(), ProcessingFailure> {
        let declared = content_type.trim_start();
        let is_image = declared
            .get(..6)
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case("image/"));
        if is_image {
            Ok(())
        } else {
            Err(ProcessingFailure::InvalidContentType)
        }
    }

    /// 读取过程中可反复调用，以便超限时立即中止
    pub fn check_size(&self, len: usize) -> Result<(), ProcessingFailure> {
        if len > self.max_upload_bytes {
            Err(ProcessingFailure::PayloadTooLarge {
                limit: self.max_upload_bytes,
            })
        } else {
            Ok(())
        }
    }
}
