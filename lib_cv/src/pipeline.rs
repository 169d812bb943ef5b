use std::time::Instant;

use log::debug;
use opencv::{
    Error,
    core::{CV_8UC1, CV_8UC3, Size},
    imgproc,
    prelude::*,
};

use crate::config::{ContrastEstimator, EdgeDetectionConfig, LaplacianFilter};
use crate::edges::{find_zero_crossings, gate_by_contrast};
use crate::filters::{
    GradientNorm, KernelSizing, VarianceKind, difference_of_gaussians, laplacian_of_gaussian,
    local_variance_map, smooth, sobel_contrast_map,
};
use crate::utils::{ChannelKind, PixelColor, overlay_binary_map};

/// Размер окна локального стандартного отклонения
const LOCAL_DEVIATION_WINDOW: i32 = 3;

/// Выделение границ по переходам лапласиана через ноль.
///
/// Хранит буферы между кадрами и пересоздаёт их только при смене размера кадра.
/// Параметры передаются в каждый вызов [`EdgeDetector::process`].
pub struct EdgeDetector {
    output_kind: ChannelKind,
    frame_size: Option<Size>,
    frame_gray: Mat,
    laplacian_zc: Mat,
    frame_overlay: Mat,
}

impl Default for EdgeDetector {
    fn default() -> Self {
        Self::new(ChannelKind::Color)
    }
}

impl EdgeDetector {
    pub fn new(output_kind: ChannelKind) -> Self {
        Self {
            output_kind,
            frame_size: None,
            frame_gray: Mat::default(),
            laplacian_zc: Mat::default(),
            frame_overlay: Mat::default(),
        }
    }

    /// Карта границ последнего обработанного кадра (`CV_8UC1`)
    pub fn edge_map(&self) -> &Mat {
        &self.laplacian_zc
    }

    fn ensure_buffers(&mut self, rows: i32, cols: i32) -> Result<(), Error> {
        let size = Size::new(cols, rows);
        if self.frame_size == Some(size) {
            return Ok(());
        }
        debug!("Создание буферов для кадра {}x{}", cols, rows);
        // Нулевой столбец карты переходов не перезаписывается, поэтому буфер обнуляется
        self.laplacian_zc = Mat::zeros(rows, cols, CV_8UC1)?.to_mat()?;
        let overlay_type = match self.output_kind {
            ChannelKind::Mono => CV_8UC1,
            ChannelKind::Color => CV_8UC3,
        };
        self.frame_overlay = Mat::zeros(rows, cols, overlay_type)?.to_mat()?;
        self.frame_size = Some(size);
        Ok(())
    }

    /// Обрабатывает кадр и возвращает кадр с наложенными границами
    pub fn process(&mut self, frame: &Mat, config: &EdgeDetectionConfig) -> Result<&Mat, Error> {
        let stopwatch = Instant::now();
        config.validate()?;
        let frame_kind = ChannelKind::of(frame)?;
        self.ensure_buffers(frame.rows(), frame.cols())?;

        let gray = match frame_kind {
            ChannelKind::Mono => frame,
            ChannelKind::Color => {
                imgproc::cvt_color_def(frame, &mut self.frame_gray, imgproc::COLOR_BGR2GRAY)?;
                &self.frame_gray
            }
        };

        let smoothed = smooth(gray, config.sigma)?;

        let laplacian = match config.laplacian_filter {
            LaplacianFilter::LoG => laplacian_of_gaussian(&smoothed, config.laplacian_ksize())?,
            LaplacianFilter::DoG => difference_of_gaussians(
                gray,
                config.sigma,
                config.sigma2(),
                KernelSizing::Optimal,
            )?,
        };

        find_zero_crossings(&laplacian, &mut self.laplacian_zc)?;

        let contrast_map = match config.contrast_estimator {
            ContrastEstimator::SobelGradient => sobel_contrast_map(&smoothed, GradientNorm::L2)?,
            ContrastEstimator::LocalStdDeviation => local_variance_map(
                &smoothed,
                LOCAL_DEVIATION_WINDOW,
                VarianceKind::StdDeviation,
            )?,
        };

        gate_by_contrast(
            &mut self.laplacian_zc,
            &contrast_map,
            config.contrast_threshold,
        )?;

        let color = match self.output_kind {
            ChannelKind::Mono => PixelColor::Mono(config.edge_color),
            ChannelKind::Color => config.edge_pixel_color(),
        };
        overlay_binary_map(frame, &self.laplacian_zc, color, &mut self.frame_overlay)?;

        debug!("Кадр обработан за {:?}", stopwatch.elapsed());
        Ok(&self.frame_overlay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, StsUnsupportedFormat};

    #[test]
    fn buffers_follow_frame_size() {
        let mut detector = EdgeDetector::default();
        let config = EdgeDetectionConfig::default();

        let small = Mat::new_rows_cols_with_default(8, 10, CV_8UC3, Scalar::all(90.0)).unwrap();
        let overlay = detector.process(&small, &config).unwrap();
        assert_eq!((overlay.rows(), overlay.cols()), (8, 10));
        assert_eq!(overlay.typ(), CV_8UC3);

        let large = Mat::new_rows_cols_with_default(12, 16, CV_8UC1, Scalar::all(90.0)).unwrap();
        let overlay = detector.process(&large, &config).unwrap();
        assert_eq!((overlay.rows(), overlay.cols()), (12, 16));
        assert_eq!(detector.edge_map().typ(), CV_8UC1);
    }

    #[test]
    fn mono_output_rejects_color_frames() {
        let mut detector = EdgeDetector::new(ChannelKind::Mono);
        let frame = Mat::new_rows_cols_with_default(6, 6, CV_8UC3, Scalar::all(0.0)).unwrap();

        let err = detector
            .process(&frame, &EdgeDetectionConfig::default())
            .unwrap_err();
        assert_eq!(err.code, StsUnsupportedFormat as i32);
    }

    #[test]
    fn invalid_config_is_reported() {
        let mut detector = EdgeDetector::default();
        let frame = Mat::new_rows_cols_with_default(6, 6, CV_8UC1, Scalar::all(0.0)).unwrap();
        let config = EdgeDetectionConfig {
            sigma: -1.0,
            ..Default::default()
        };

        assert!(detector.process(&frame, &config).is_err());
    }
}
