use log::{info, warn};
use opencv::{
    Error,
    core::{FileStorage, FileStorage_Mode, StsBadArg, StsError},
    prelude::*,
};

use crate::utils::PixelColor;

/// Шаг квантования ползунка стандартного отклонения
pub const STD_DEVIATION_STEP: f64 = 0.1;
/// Контраст по дисперсии имеет другую динамику, чем по градиенту, поэтому порог
/// для него масштабируется
pub const STD_DEVIATION_THRESHOLD_SCALE: f64 = 0.1;
/// Отношение стандартных отклонений гауссиан в DoG
pub const DEFAULT_DOG_RATIO: f64 = 1.6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LaplacianFilter {
    /// Лапласиан сглаженного изображения
    LoG,
    /// Разность гауссиан
    DoG,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContrastEstimator {
    /// Норма градиента Собеля (L2)
    SobelGradient,
    /// Локальное стандартное отклонение в окне 3x3
    LocalStdDeviation,
}

/// Параметры выделения границ для одного кадра
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeDetectionConfig {
    pub laplacian_filter: LaplacianFilter,
    /// Стандартное отклонение гауссова сглаживания
    pub sigma: f64,
    /// Полуширина ядра лапласиана (только для LoG)
    pub laplacian_half_width: i32,
    /// sigma2 = sigma * dog_ratio (только для DoG)
    pub dog_ratio: f64,
    pub contrast_estimator: ContrastEstimator,
    /// Порог, применяемый к карте контраста
    pub contrast_threshold: f64,
    /// Цвет границ на полутоновом результате
    pub edge_color: u8,
    /// Цвет границ на цветном результате, B,G,R
    pub edge_color3: [u8; 3],
}

impl Default for EdgeDetectionConfig {
    fn default() -> Self {
        Self {
            laplacian_filter: LaplacianFilter::LoG,
            sigma: 1.0,
            laplacian_half_width: 3,
            dog_ratio: DEFAULT_DOG_RATIO,
            contrast_estimator: ContrastEstimator::SobelGradient,
            contrast_threshold: 128.0,
            edge_color: 255,
            edge_color3: [0, 0, 255],
        }
    }
}

impl EdgeDetectionConfig {
    pub fn laplacian_ksize(&self) -> i32 {
        2 * self.laplacian_half_width + 1
    }

    pub fn sigma2(&self) -> f64 {
        self.sigma * self.dog_ratio
    }

    pub fn edge_pixel_color(&self) -> PixelColor {
        let [b, g, r] = self.edge_color3;
        PixelColor::bgr(b, g, r)
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !(self.sigma > 0.0) {
            return Err(Error::new(
                StsBadArg as i32,
                format!("sigma должна быть положительной, получено {}", self.sigma),
            ));
        }
        if !(self.dog_ratio > 0.0) {
            return Err(Error::new(
                StsBadArg as i32,
                format!("Отношение sigma для DoG должно быть положительным: {}", self.dog_ratio),
            ));
        }
        if !(1..=15).contains(&self.laplacian_half_width) {
            return Err(Error::new(
                StsBadArg as i32,
                format!(
                    "Полуширина ядра лапласиана вне диапазона 1..=15: {}",
                    self.laplacian_half_width
                ),
            ));
        }
        Ok(())
    }
}

/// Описание ползунка: имя и максимальное значение
#[derive(Debug, Clone, Copy)]
pub struct TrackbarSpec {
    pub name: &'static str,
    pub max: i32,
}

pub const LAPLACIAN_FILTER_TRACKBAR: TrackbarSpec = TrackbarSpec {
    name: "LoG | DoG",
    max: 1,
};
pub const STD_DEVIATION_TRACKBAR: TrackbarSpec = TrackbarSpec {
    name: "10*StdDev",
    max: 75,
};
pub const KERNEL_HALF_WIDTH_TRACKBAR: TrackbarSpec = TrackbarSpec {
    name: "Half-width",
    max: 8,
};
pub const CONTRAST_ESTIMATOR_TRACKBAR: TrackbarSpec = TrackbarSpec {
    name: "Grad | Var",
    max: 1,
};
pub const CONTRAST_THRESHOLD_TRACKBAR: TrackbarSpec = TrackbarSpec {
    name: "Threshold",
    max: 255,
};

/// Положения ползунков в том виде, в котором их отдаёт интерфейс
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackbarPositions {
    pub laplacian_filter: i32,
    pub std_deviation: i32,
    pub kernel_half_width: i32,
    pub contrast_estimator: i32,
    pub contrast_threshold: i32,
}

impl TrackbarPositions {
    /// Исправляет недопустимые нулевые значения. Второе значение сообщает,
    /// было ли что-то исправлено.
    pub fn sanitized(&self) -> (Self, bool) {
        let mut fixed = *self;
        if fixed.std_deviation <= 0 {
            warn!("Нулевое стандартное отклонение недопустимо, используется шаг 1");
            fixed.std_deviation = 1;
        }
        if fixed.kernel_half_width <= 0 {
            warn!("Нулевая полуширина ядра недопустима, используется 1");
            fixed.kernel_half_width = 1;
        }
        (fixed, fixed != *self)
    }

    /// Строит конфигурацию по ползункам. Параметры без ползунков берутся из `base`.
    pub fn apply_to(&self, base: &EdgeDetectionConfig) -> EdgeDetectionConfig {
        let contrast_estimator = if self.contrast_estimator == 0 {
            ContrastEstimator::SobelGradient
        } else {
            ContrastEstimator::LocalStdDeviation
        };
        let mut contrast_threshold = self.contrast_threshold as f64;
        if contrast_estimator == ContrastEstimator::LocalStdDeviation {
            contrast_threshold *= STD_DEVIATION_THRESHOLD_SCALE;
        }

        EdgeDetectionConfig {
            laplacian_filter: if self.laplacian_filter == 0 {
                LaplacianFilter::LoG
            } else {
                LaplacianFilter::DoG
            },
            sigma: self.std_deviation as f64 * STD_DEVIATION_STEP,
            laplacian_half_width: self.kernel_half_width,
            contrast_estimator,
            contrast_threshold,
            ..base.clone()
        }
    }

    /// Начальные положения ползунков для заданной конфигурации
    pub fn from_config(config: &EdgeDetectionConfig) -> Self {
        let threshold = match config.contrast_estimator {
            ContrastEstimator::SobelGradient => config.contrast_threshold,
            ContrastEstimator::LocalStdDeviation => {
                config.contrast_threshold / STD_DEVIATION_THRESHOLD_SCALE
            }
        };
        Self {
            laplacian_filter: match config.laplacian_filter {
                LaplacianFilter::LoG => 0,
                LaplacianFilter::DoG => 1,
            },
            std_deviation: ((config.sigma / STD_DEVIATION_STEP).round() as i32)
                .clamp(0, STD_DEVIATION_TRACKBAR.max),
            kernel_half_width: config
                .laplacian_half_width
                .clamp(0, KERNEL_HALF_WIDTH_TRACKBAR.max),
            contrast_estimator: match config.contrast_estimator {
                ContrastEstimator::SobelGradient => 0,
                ContrastEstimator::LocalStdDeviation => 1,
            },
            contrast_threshold: (threshold.round() as i32).clamp(0, CONTRAST_THRESHOLD_TRACKBAR.max),
        }
    }
}

pub fn save_config(path: &str, config: &EdgeDetectionConfig) -> opencv::Result<()> {
    let mut fs = FileStorage::new(path, FileStorage_Mode::WRITE as i32, "")?;

    let filter = match config.laplacian_filter {
        LaplacianFilter::LoG => 0,
        LaplacianFilter::DoG => 1,
    };
    let estimator = match config.contrast_estimator {
        ContrastEstimator::SobelGradient => 0,
        ContrastEstimator::LocalStdDeviation => 1,
    };
    fs.write_i32("laplacian_filter", filter)?;
    fs.write_f64("sigma", config.sigma)?;
    fs.write_i32("laplacian_half_width", config.laplacian_half_width)?;
    fs.write_f64("dog_ratio", config.dog_ratio)?;
    fs.write_i32("contrast_estimator", estimator)?;
    fs.write_f64("contrast_threshold", config.contrast_threshold)?;
    fs.write_i32("edge_color", config.edge_color as i32)?;
    for (name, value) in ["edge_color_b", "edge_color_g", "edge_color_r"]
        .iter()
        .zip(config.edge_color3)
    {
        fs.write_i32(name, value as i32)?;
    }

    fs.release()?;
    info!("Параметры сохранены в {}", path);
    Ok(())
}

fn read_i32(fs: &FileStorage, name: &str, default: i32) -> opencv::Result<i32> {
    let node = fs.get(name)?;
    if node.empty()? {
        return Ok(default);
    }
    node.to_i32()
}

fn read_f64(fs: &FileStorage, name: &str, default: f64) -> opencv::Result<f64> {
    let node = fs.get(name)?;
    if node.empty()? {
        return Ok(default);
    }
    node.to_f64()
}

fn read_u8(fs: &FileStorage, name: &str, default: u8) -> opencv::Result<u8> {
    let value = read_i32(fs, name, default as i32)?;
    u8::try_from(value).map_err(|_| {
        Error::new(
            StsBadArg as i32,
            format!("Значение {} = {} вне диапазона 0..=255", name, value),
        )
    })
}

/// Загружает параметры. Отсутствующие ключи заменяются значениями по умолчанию.
pub fn load_config(path: &str) -> opencv::Result<EdgeDetectionConfig> {
    let fs = FileStorage::new(path, FileStorage_Mode::READ as i32, "")?;
    if !fs.is_opened()? {
        return Err(Error::new(
            StsError as i32,
            format!("Не удалось открыть файл параметров {}", path),
        ));
    }

    let defaults = EdgeDetectionConfig::default();
    let filter = read_i32(&fs, "laplacian_filter", 0)?;
    let estimator = read_i32(&fs, "contrast_estimator", 0)?;
    let config = EdgeDetectionConfig {
        laplacian_filter: if filter == 0 {
            LaplacianFilter::LoG
        } else {
            LaplacianFilter::DoG
        },
        sigma: read_f64(&fs, "sigma", defaults.sigma)?,
        laplacian_half_width: read_i32(
            &fs,
            "laplacian_half_width",
            defaults.laplacian_half_width,
        )?,
        dog_ratio: read_f64(&fs, "dog_ratio", defaults.dog_ratio)?,
        contrast_estimator: if estimator == 0 {
            ContrastEstimator::SobelGradient
        } else {
            ContrastEstimator::LocalStdDeviation
        },
        contrast_threshold: read_f64(&fs, "contrast_threshold", defaults.contrast_threshold)?,
        edge_color: read_u8(&fs, "edge_color", defaults.edge_color)?,
        edge_color3: [
            read_u8(&fs, "edge_color_b", defaults.edge_color3[0])?,
            read_u8(&fs, "edge_color_g", defaults.edge_color3[1])?,
            read_u8(&fs, "edge_color_r", defaults.edge_color3[2])?,
        ],
    };
    config.validate()?;
    Ok(config)
}
