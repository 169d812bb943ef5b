use log::trace;
use opencv::{
    Error,
    core::{CV_32FC1, StsUnsupportedFormat},
    prelude::*,
};

use crate::utils::{ensure_binary_map, ensure_same_size};

/// Порог величины перепада при переходе через ноль
const ZERO_CROSSING_THRESHOLD: f32 = 0.0;

/// Индекс соседа слева (или сверху). У нулевого элемента соседом считается следующий.
pub fn neighbor_index(index: usize) -> usize {
    if index == 0 { 1 } else { index - 1 }
}

fn opposite_signs(a: f32, b: f32) -> bool {
    (a > 0.0 && b < 0.0) || (a < 0.0 && b > 0.0)
}

pub fn ensure_scalar_field(field: &Mat) -> Result<(), Error> {
    if field.typ() != CV_32FC1 {
        return Err(Error::new(
            StsUnsupportedFormat as i32,
            format!("Ожидается поле типа CV_32FC1, получен тип {}", field.typ()),
        ));
    }
    Ok(())
}

/// Находит переходы через ноль в одноканальном поле `CV_32F`.
///
/// `out` создаётся вызывающей стороной (`CV_8UC1`, размер `field`). Пиксель получает 255,
/// если значение меняет знак относительно соседа слева или сверху, иначе 0.
/// Нулевой столбец не записывается и сохраняет то, что было в `out`.
pub fn find_zero_crossings(field: &Mat, out: &mut Mat) -> Result<(), Error> {
    ensure_scalar_field(field)?;
    ensure_binary_map(out)?;
    ensure_same_size(field, out, "Поле и карта переходов через ноль")?;

    let nrows = field.rows() as usize;
    let ncols = field.cols() as usize;
    trace!("Поиск переходов через ноль в поле {}x{}", nrows, ncols);

    for j in 0..nrows {
        let p_cur = field.at_row::<f32>(j as i32)?;
        // У поля из одной строки нет соседа по вертикали
        let p_prev = if nrows > 1 {
            Some(field.at_row::<f32>(neighbor_index(j) as i32)?)
        } else {
            None
        };
        let p_out = out.at_row_mut::<u8>(j as i32)?;

        for i in 1..ncols {
            let cur = p_cur[i];
            let w = p_cur[neighbor_index(i)];

            let mut diff = 0.0f32;
            if opposite_signs(cur, w) {
                diff = (cur - w).abs();
            }
            if let Some(prev) = p_prev {
                let n = prev[i];
                if opposite_signs(cur, n) {
                    diff = diff.max((cur - n).abs());
                }
            }
            p_out[i] = if diff > ZERO_CROSSING_THRESHOLD { 255 } else { 0 };
        }
    }
    Ok(())
}

/// Оставляет в карте переходов через ноль только точки, где контраст не ниже `threshold`.
/// Карта `zero_crossings` перезаписывается.
pub fn gate_by_contrast(
    zero_crossings: &mut Mat,
    contrast_map: &Mat,
    threshold: f64,
) -> Result<(), Error> {
    ensure_binary_map(zero_crossings)?;
    ensure_scalar_field(contrast_map)?;
    ensure_same_size(contrast_map, zero_crossings, "Карта контраста и карта переходов")?;

    for j in 0..contrast_map.rows() {
        let p_contrast = contrast_map.at_row::<f32>(j)?;
        let p_zc = zero_crossings.at_row_mut::<u8>(j)?;
        for (zc, &c) in p_zc.iter_mut().zip(p_contrast) {
            let high_contrast: u8 = if c as f64 >= threshold { 255 } else { 0 };
            *zc &= high_contrast;
        }
    }
    Ok(())
}
