use std::collections::VecDeque;
use std::io::Cursor;

use image::ImageError;
use image::{DynamicImage, ImageFormat, ImageReader, Limits, RgbaImage};

use super::{EngineError, SegmentationEngine};
use crate::config::MatteConfig;

/// 基于边框取色的抠图引擎。
///
/// 以四条边像素的逐通道中位数作为背景色，从边框出发做四连通泛洪：
/// 与背景色差值不超过 `tolerance` 的像素完全透明，紧邻该区域且差值落在
/// `tolerance + feather` 内的像素按差值线性取部分透明。不与边框连通的像素保持不变。
///
/// 不持有可变状态，可被任意线程并发调用。
#[derive(Debug, Clone)]
pub struct LocalMatteEngine {
    config: MatteConfig,
}

impl LocalMatteEngine {
    pub fn new(config: MatteConfig) -> Self {
        Self { config }
    }

    fn reader(input: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, EngineError> {
        ImageReader::new(Cursor::new(input))
            .with_guessed_format()
            .map_err(|e| EngineError::Decode(e.to_string()))
    }

    fn decode(&self, input: &[u8]) -> Result<RgbaImage, EngineError> {
        let max = self.config.max_dimension;

        // 先只读头部拿尺寸，超限时给出明确的尺寸信息
        if let Ok((width, height)) = Self::reader(input)?.into_dimensions()
            && (width > max || height > max)
        {
            return Err(EngineError::Dimensions {
                width,
                height,
                limit: max,
            });
        }

        let mut reader = Self::reader(input)?;
        let mut limits = Limits::default();
        limits.max_image_width = Some(max);
        limits.max_image_height = Some(max);
        limits.max_alloc = Some(self.config.max_alloc_bytes);
        reader.limits(limits);

        let img = reader.decode().map_err(|e| match e {
            ImageError::Limits(_) => EngineError::Failed(e.to_string()),
            other => EngineError::Decode(other.to_string()),
        })?;
        Ok(img.into_rgba8())
    }

    fn matte(&self, img: &mut RgbaImage) {
        let (w, h) = img.dimensions();
        if w == 0 || h == 0 {
            return;
        }
        let bg = border_median(img);
        let tol = u16::from(self.config.tolerance);
        let feather = u16::from(self.config.feather);

        let idx = |x: u32, y: u32| (y as usize) * (w as usize) + x as usize;
        let mut visited = vec![false; (w as usize) * (h as usize)];
        let mut queue = VecDeque::new();

        for (x, y) in border_coords(w, h) {
            if !visited[idx(x, y)] && distance(img.get_pixel(x, y).0, bg) <= tol {
                visited[idx(x, y)] = true;
                queue.push_back((x, y));
            }
        }

        while let Some((x, y)) = queue.pop_front() {
            let px = img.get_pixel_mut(x, y);
            px.0[3] = 0;

            for (nx, ny) in neighbours(x, y, w, h) {
                let i = idx(nx, ny);
                if visited[i] {
                    continue;
                }
                let d = distance(img.get_pixel(nx, ny).0, bg);
                if d <= tol {
                    visited[i] = true;
                    queue.push_back((nx, ny));
                } else if feather > 0 && d <= tol + feather {
                    // 过渡带只着色不扩散
                    visited[i] = true;
                    let alpha = (u32::from(d - tol) * 255 / u32::from(feather)) as u8;
                    let p = img.get_pixel_mut(nx, ny);
                    p.0[3] = p.0[3].min(alpha);
                }
            }
        }
    }

    fn encode(img: RgbaImage) -> Result<Vec<u8>, EngineError> {
        let mut out = Vec::new();
        DynamicImage::ImageRgba8(img)
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .map_err(|e| EngineError::Encode(e.to_string()))?;
        Ok(out)
    }
}

impl SegmentationEngine for LocalMatteEngine {
    fn name(&self) -> &'static str {
        "local-matte"
    }

    fn segment(&self, input: &[u8]) -> Result<Vec<u8>, EngineError> {
        let mut img = self.decode(input)?;
        self.matte(&mut img);
        Self::encode(img)
    }
}

/// RGB 通道的最大差值（忽略 alpha）
fn distance(px: [u8; 4], bg: [u8; 3]) -> u16 {
    (0..3)
        .map(|c| u16::from(px[c].abs_diff(bg[c])))
        .max()
        .unwrap_or(0)
}

fn border_coords(w: u32, h: u32) -> impl Iterator<Item = (u32, u32)> {
    let top_bottom = (0..w).flat_map(move |x| [(x, 0), (x, h - 1)]);
    let left_right = (0..h).flat_map(move |y| [(0, y), (w - 1, y)]);
    top_bottom.chain(left_right)
}

fn neighbours(x: u32, y: u32, w: u32, h: u32) -> impl Iterator<Item = (u32, u32)> {
    let candidates = [
        x.checked_sub(1).map(|nx| (nx, y)),
        (x + 1 < w).then_some((x + 1, y)),
        y.checked_sub(1).map(|ny| (x, ny)),
        (y + 1 < h).then_some((x, y + 1)),
    ];
    candidates.into_iter().flatten()
}

fn border_median(img: &RgbaImage) -> [u8; 3] {
    let (w, h) = img.dimensions();
    let mut channels: [Vec<u8>; 3] = Default::default();
    for (x, y) in border_coords(w, h) {
        let px = img.get_pixel(x, y).0;
        for c in 0..3 {
            channels[c].push(px[c]);
        }
    }
    channels.map(|mut values| {
        values.sort_unstable();
        values.get(values.len() / 2).copied().unwrap_or(0)
    })
}
