use std::borrow::Cow;

use log::debug;
use opencv::{
    Error,
    core::{
        self, BORDER_DEFAULT, CV_32F, CV_32FC1, CV_8U, Size, StsBadArg, StsUnsupportedFormat,
    },
    imgproc,
    prelude::*,
};

/// Способ выбора размера гауссова ядра
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelSizing {
    /// Размер ядра выбирает OpenCV по sigma
    Auto,
    /// Наименьший достаточный размер: ksize = 2*ceil((sigma - 0.8)/0.3) + 3
    Optimal,
}

/// Норма градиента для карты контраста
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GradientNorm {
    L1,
    L2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarianceKind {
    Variance,
    StdDeviation,
}

/// Размер ядра, который GaussianBlur вычисляет сам при `Size(0, 0)`
pub fn gaussian_kernel_size_auto(sigma: f64, depth: i32) -> i32 {
    let factor = if depth == CV_8U { 3.0 } else { 4.0 };
    ((sigma * factor * 2.0 + 1.0).round() as i32) | 1
}

pub fn gaussian_kernel_size_optimal(sigma: f64) -> i32 {
    // При sigma < 0.5 формула даёт неположительный размер
    ((((sigma - 0.8) / 0.3).ceil() as i32) * 2 + 3).max(1)
}

fn ensure_positive_sigma(sigma: f64) -> Result<(), Error> {
    if !(sigma > 0.0) {
        return Err(Error::new(
            StsBadArg as i32,
            format!("Стандартное отклонение должно быть положительным, получено {}", sigma),
        ));
    }
    Ok(())
}

/// Приводит одноканальное изображение к `CV_32F`, не копируя уже подходящее
fn as_float(field: &Mat) -> Result<Cow<'_, Mat>, Error> {
    if field.channels() != 1 {
        return Err(Error::new(
            StsUnsupportedFormat as i32,
            format!("Ожидается одноканальное изображение, каналов: {}", field.channels()),
        ));
    }
    if field.typ() == CV_32FC1 {
        return Ok(Cow::Borrowed(field));
    }
    let mut converted = Mat::default();
    field.convert_to(&mut converted, CV_32F, 1.0, 0.0)?;
    Ok(Cow::Owned(converted))
}

/// Гауссово сглаживание с автоматическим размером ядра. Результат всегда `CV_32F`.
pub fn smooth(field: &Mat, sigma: f64) -> Result<Mat, Error> {
    ensure_positive_sigma(sigma)?;
    let field = as_float(field)?;
    let mut smoothed = Mat::default();
    // sigma_y по умолчанию равна sigma_x
    imgproc::gaussian_blur_def(&*field, &mut smoothed, Size::new(0, 0), sigma)?;
    Ok(smoothed)
}

/// Лапласиан уже сглаженного поля с апертурой `ksize` (нечётная, от 1 до 31)
pub fn laplacian_of_gaussian(smoothed: &Mat, ksize: i32) -> Result<Mat, Error> {
    if ksize < 1 || ksize > 31 || ksize % 2 == 0 {
        return Err(Error::new(
            StsBadArg as i32,
            format!("Недопустимый размер ядра лапласиана: {}", ksize),
        ));
    }
    let smoothed = as_float(smoothed)?;
    let mut laplacian = Mat::default();
    imgproc::laplacian(
        &*smoothed,
        &mut laplacian,
        CV_32F,
        ksize,
        1.0,
        0.0,
        BORDER_DEFAULT,
    )?;
    Ok(laplacian)
}

/// Разность гауссиан: blur(sigma1) - blur(sigma2).
/// Фильтр линейный, но не сепарабельный, поэтому считается как разность двух размытий.
pub fn difference_of_gaussians(
    field: &Mat,
    sigma1: f64,
    sigma2: f64,
    sizing: KernelSizing,
) -> Result<Mat, Error> {
    ensure_positive_sigma(sigma1)?;
    ensure_positive_sigma(sigma2)?;
    let field = as_float(field)?;

    let (ksize1, ksize2) = match sizing {
        KernelSizing::Auto => {
            debug!(
                "DoG: размеры ядер {} и {} (автоматически)",
                gaussian_kernel_size_auto(sigma1, field.depth()),
                gaussian_kernel_size_auto(sigma2, field.depth())
            );
            (Size::new(0, 0), Size::new(0, 0))
        }
        KernelSizing::Optimal => {
            let k1 = gaussian_kernel_size_optimal(sigma1);
            let k2 = gaussian_kernel_size_optimal(sigma2);
            debug!("DoG: размеры ядер {} и {}", k1, k2);
            (Size::new(k1, k1), Size::new(k2, k2))
        }
    };

    let mut blurred_1 = Mat::default();
    let mut blurred_2 = Mat::default();
    imgproc::gaussian_blur_def(&*field, &mut blurred_1, ksize1, sigma1)?;
    imgproc::gaussian_blur_def(&*field, &mut blurred_2, ksize2, sigma2)?;

    let mut dog = Mat::default();
    core::subtract(&blurred_1, &blurred_2, &mut dog, &core::no_array(), -1)?;
    Ok(dog)
}

/// Карта контраста как норма градиента Собеля
pub fn sobel_contrast_map(field: &Mat, norm: GradientNorm) -> Result<Mat, Error> {
    let field = as_float(field)?;
    let mut grad_x = Mat::default();
    let mut grad_y = Mat::default();
    imgproc::sobel(&*field, &mut grad_x, CV_32F, 1, 0, 3, 1.0, 0.0, BORDER_DEFAULT)?;
    imgproc::sobel(&*field, &mut grad_y, CV_32F, 0, 1, 3, 1.0, 0.0, BORDER_DEFAULT)?;

    match norm {
        GradientNorm::L2 => {
            let mut contrast = Mat::default();
            core::magnitude(&grad_x, &grad_y, &mut contrast)?;
            Ok(contrast)
        }
        GradientNorm::L1 => {
            let mut contrast = Mat::zeros(field.rows(), field.cols(), CV_32FC1)?.to_mat()?;
            for j in 0..field.rows() {
                let p_x = grad_x.at_row::<f32>(j)?;
                let p_y = grad_y.at_row::<f32>(j)?;
                let p_out = contrast.at_row_mut::<f32>(j)?;
                for ((o, &gx), &gy) in p_out.iter_mut().zip(p_x).zip(p_y) {
                    *o = gx.abs() + gy.abs();
                }
            }
            Ok(contrast)
        }
    }
}

/// Локальная дисперсия sigma^2(I) = E(I^2) - (E(I))^2 в окне `ksize` x `ksize`.
/// Среднее считается усредняющим фильтром.
pub fn local_variance_map(field: &Mat, ksize: i32, kind: VarianceKind) -> Result<Mat, Error> {
    if ksize < 1 {
        return Err(Error::new(
            StsBadArg as i32,
            format!("Недопустимый размер окна: {}", ksize),
        ));
    }
    let field = as_float(field)?;
    let window = Size::new(ksize, ksize);

    let mut mean = Mat::default();
    imgproc::blur_def(&*field, &mut mean, window)?;

    let mut squared = Mat::default();
    core::multiply(&*field, &*field, &mut squared, 1.0, -1)?;
    let mut squared_mean = Mat::default();
    imgproc::blur_def(&squared, &mut squared_mean, window)?;

    let mut variance = Mat::zeros(field.rows(), field.cols(), CV_32FC1)?.to_mat()?;
    for j in 0..field.rows() {
        let p_mean = mean.at_row::<f32>(j)?;
        let p_sq_mean = squared_mean.at_row::<f32>(j)?;
        let p_out = variance.at_row_mut::<f32>(j)?;
        for ((o, &m), &m2) in p_out.iter_mut().zip(p_mean).zip(p_sq_mean) {
            // Ошибки округления дают небольшие отрицательные значения
            let var = (m2 - m * m).max(0.0);
            *o = match kind {
                VarianceKind::Variance => var,
                VarianceKind::StdDeviation => var.sqrt(),
            };
        }
    }
    Ok(variance)
}
