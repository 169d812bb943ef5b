use std::cmp::Ordering;

use opencv::{
    Error,
    core::{
        BORDER_CONSTANT, CV_8U, CV_8UC1, Scalar, StsBadArg, StsBadSize, StsUnmatchedFormats,
        StsUnmatchedSizes, StsUnsupportedFormat, Vec3b, copy_make_border, hconcat2,
    },
    prelude::*,
};

/// Количество каналов 8-битного изображения
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelKind {
    /// Полутоновое изображение (один канал)
    Mono,
    /// Цветное изображение, порядок каналов B,G,R
    Color,
}

impl ChannelKind {
    /// Определяет вид изображения. Допускаются только `CV_8UC1` и `CV_8UC3`.
    pub fn of(img: &Mat) -> Result<Self, Error> {
        if img.depth() != CV_8U {
            return Err(Error::new(
                StsUnsupportedFormat as i32,
                format!("Ожидается 8-битное изображение, получена глубина {}", img.depth()),
            ));
        }
        match img.channels() {
            1 => Ok(ChannelKind::Mono),
            3 => Ok(ChannelKind::Color),
            n => Err(Error::new(
                StsUnsupportedFormat as i32,
                format!("Неподдерживаемое количество каналов: {}", n),
            )),
        }
    }
}

/// Цвет пикселя: яркость для полутонового изображения или тройка B,G,R для цветного
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PixelColor {
    Mono(u8),
    Color(Vec3b),
}

impl PixelColor {
    pub fn bgr(b: u8, g: u8, r: u8) -> Self {
        PixelColor::Color(Vec3b::from([b, g, r]))
    }

    pub fn kind(&self) -> ChannelKind {
        match self {
            PixelColor::Mono(_) => ChannelKind::Mono,
            PixelColor::Color(_) => ChannelKind::Color,
        }
    }

    pub fn to_scalar(&self) -> Scalar {
        match *self {
            PixelColor::Mono(v) => Scalar::all(v as f64),
            PixelColor::Color(c) => Scalar::new(c[0] as f64, c[1] as f64, c[2] as f64, 0.0),
        }
    }
}

pub fn ensure_same_size(a: &Mat, b: &Mat, what: &str) -> Result<(), Error> {
    if a.rows() != b.rows() || a.cols() != b.cols() {
        return Err(Error::new(
            StsUnmatchedSizes as i32,
            format!(
                "{}: размеры не совпадают ({}x{} и {}x{})",
                what,
                a.rows(),
                a.cols(),
                b.rows(),
                b.cols()
            ),
        ));
    }
    Ok(())
}

pub fn ensure_binary_map(map: &Mat) -> Result<(), Error> {
    if map.typ() != CV_8UC1 {
        return Err(Error::new(
            StsUnsupportedFormat as i32,
            format!("Бинарная карта должна иметь тип CV_8UC1, получен {}", map.typ()),
        ));
    }
    Ok(())
}

/// Накладывает ненулевые элементы бинарной карты `map` на изображение `base`.
///
/// Результат пишется в `out`, который должен быть заранее создан с нужным количеством
/// каналов и размером `base`. Полутоновое `base` при цветном `out` размножается на три
/// канала. Цветное `base` на полутоновый `out` не накладывается, это ошибка.
/// `color` должен соответствовать количеству каналов `out`.
pub fn overlay_binary_map(
    base: &Mat,
    map: &Mat,
    color: PixelColor,
    out: &mut Mat,
) -> Result<(), Error> {
    let kind_in = ChannelKind::of(base)?;
    let kind_out = ChannelKind::of(out)?;
    ensure_binary_map(map)?;
    ensure_same_size(base, map, "Изображение и бинарная карта")?;
    ensure_same_size(base, out, "Изображение и результат наложения")?;

    match (kind_out, kind_in, color) {
        (ChannelKind::Mono, ChannelKind::Mono, PixelColor::Mono(value)) => {
            for j in 0..base.rows() {
                let p_in = base.at_row::<u8>(j)?;
                let p_map = map.at_row::<u8>(j)?;
                let p_out = out.at_row_mut::<u8>(j)?;
                for ((o, &m), &pixel) in p_out.iter_mut().zip(p_map).zip(p_in) {
                    *o = if m != 0 { value } else { pixel };
                }
            }
        }
        (ChannelKind::Color, ChannelKind::Mono, PixelColor::Color(color3)) => {
            for j in 0..base.rows() {
                let p_in = base.at_row::<u8>(j)?;
                let p_map = map.at_row::<u8>(j)?;
                let p_out = out.at_row_mut::<Vec3b>(j)?;
                for ((o, &m), &pixel) in p_out.iter_mut().zip(p_map).zip(p_in) {
                    *o = if m != 0 {
                        color3
                    } else {
                        Vec3b::from([pixel, pixel, pixel])
                    };
                }
            }
        }
        (ChannelKind::Color, ChannelKind::Color, PixelColor::Color(color3)) => {
            for j in 0..base.rows() {
                let p_in = base.at_row::<Vec3b>(j)?;
                let p_map = map.at_row::<u8>(j)?;
                let p_out = out.at_row_mut::<Vec3b>(j)?;
                for ((o, &m), &pixel) in p_out.iter_mut().zip(p_map).zip(p_in) {
                    *o = if m != 0 { color3 } else { pixel };
                }
            }
        }
        (ChannelKind::Mono, ChannelKind::Color, _) => {
            return Err(Error::new(
                StsUnsupportedFormat as i32,
                "Наложение цветного изображения на полутоновый результат не поддерживается"
                    .to_string(),
            ));
        }
        (_, _, color) => {
            return Err(Error::new(
                StsBadArg as i32,
                format!(
                    "Цвет {:?} не соответствует результату с {:?} каналами",
                    color, kind_out
                ),
            ));
        }
    }
    Ok(())
}

/// Соединяет два изображения по горизонтали. Изображение меньшей высоты дополняется
/// снизу строками цвета `pad_color`.
pub fn vpad_and_hconcat(left: &Mat, right: &Mat, pad_color: PixelColor) -> Result<Mat, Error> {
    if left.empty() || right.empty() {
        return Err(Error::new(
            StsBadSize as i32,
            "Нельзя соединить пустое изображение".to_string(),
        ));
    }
    if left.typ() != right.typ() {
        return Err(Error::new(
            StsUnmatchedFormats as i32,
            format!(
                "Форматы изображений не совпадают: {} канал(ов) и {} канал(ов)",
                left.channels(),
                right.channels()
            ),
        ));
    }

    let value = pad_color.to_scalar();
    let mut padded = Mat::default();

    // Дополняем только нижний край
    let (first, second) = match left.rows().cmp(&right.rows()) {
        Ordering::Greater => {
            copy_make_border(
                right,
                &mut padded,
                0,
                left.rows() - right.rows(),
                0,
                0,
                BORDER_CONSTANT,
                value,
            )?;
            (left, &padded)
        }
        Ordering::Less => {
            copy_make_border(
                left,
                &mut padded,
                0,
                right.rows() - left.rows(),
                0,
                0,
                BORDER_CONSTANT,
                value,
            )?;
            (&padded, right)
        }
        Ordering::Equal => (left, right),
    };

    let mut combined = Mat::default();
    hconcat2(first, second, &mut combined)?;
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::CV_8UC3;

    fn filled(rows: i32, cols: i32, typ: i32, value: Scalar) -> Mat {
        Mat::new_rows_cols_with_default(rows, cols, typ, value).unwrap()
    }

    fn gradient_gray(rows: i32, cols: i32) -> Mat {
        let mut img = filled(rows, cols, CV_8UC1, Scalar::all(0.0));
        for j in 0..rows {
            for i in 0..cols {
                *img.at_2d_mut::<u8>(j, i).unwrap() = (j * cols + i) as u8;
            }
        }
        img
    }

    fn gradient_bgr(rows: i32, cols: i32) -> Mat {
        let mut img = filled(rows, cols, CV_8UC3, Scalar::all(0.0));
        for j in 0..rows {
            for i in 0..cols {
                *img.at_2d_mut::<Vec3b>(j, i).unwrap() =
                    Vec3b::from([i as u8, j as u8, (i + j) as u8]);
            }
        }
        img
    }

    #[test]
    fn channel_kind_rejects_float_and_four_channels() {
        let float = filled(2, 2, opencv::core::CV_32FC1, Scalar::all(0.0));
        let bgra = filled(2, 2, opencv::core::CV_8UC4, Scalar::all(0.0));
        assert!(ChannelKind::of(&float).is_err());
        assert_eq!(
            ChannelKind::of(&bgra).unwrap_err().code,
            StsUnsupportedFormat as i32
        );
        assert_eq!(
            ChannelKind::of(&gradient_bgr(1, 1)).unwrap(),
            ChannelKind::Color
        );
    }

    #[test]
    fn empty_map_copies_gray_into_gray() {
        let base = gradient_gray(4, 5);
        let map = filled(4, 5, CV_8UC1, Scalar::all(0.0));
        let mut out = filled(4, 5, CV_8UC1, Scalar::all(7.0));

        overlay_binary_map(&base, &map, PixelColor::Mono(255), &mut out).unwrap();

        for j in 0..4 {
            assert_eq!(out.at_row::<u8>(j).unwrap(), base.at_row::<u8>(j).unwrap());
        }
    }

    #[test]
    fn empty_map_broadcasts_gray_into_color() {
        let base = gradient_gray(3, 3);
        let map = filled(3, 3, CV_8UC1, Scalar::all(0.0));
        let mut out = filled(3, 3, CV_8UC3, Scalar::all(0.0));

        overlay_binary_map(&base, &map, PixelColor::bgr(0, 0, 255), &mut out).unwrap();

        for j in 0..3 {
            for i in 0..3 {
                let v = *base.at_2d::<u8>(j, i).unwrap();
                assert_eq!(*out.at_2d::<Vec3b>(j, i).unwrap(), Vec3b::from([v, v, v]));
            }
        }
    }

    #[test]
    fn full_map_paints_highlight_everywhere() {
        let base = gradient_bgr(4, 6);
        let map = filled(4, 6, CV_8UC1, Scalar::all(255.0));
        let mut out = filled(4, 6, CV_8UC3, Scalar::all(0.0));
        let red = Vec3b::from([0, 0, 255]);

        overlay_binary_map(&base, &map, PixelColor::Color(red), &mut out).unwrap();

        for j in 0..4 {
            assert!(out.at_row::<Vec3b>(j).unwrap().iter().all(|&p| p == red));
        }
    }

    #[test]
    fn partial_map_keeps_unmasked_color_pixels() {
        let base = gradient_bgr(2, 3);
        let mut map = filled(2, 3, CV_8UC1, Scalar::all(0.0));
        *map.at_2d_mut::<u8>(1, 2).unwrap() = 255;
        let mut out = filled(2, 3, CV_8UC3, Scalar::all(0.0));
        let green = Vec3b::from([0, 255, 0]);

        overlay_binary_map(&base, &map, PixelColor::Color(green), &mut out).unwrap();

        assert_eq!(*out.at_2d::<Vec3b>(1, 2).unwrap(), green);
        assert_eq!(
            *out.at_2d::<Vec3b>(0, 1).unwrap(),
            *base.at_2d::<Vec3b>(0, 1).unwrap()
        );
    }

    #[test]
    fn color_onto_gray_output_is_unsupported() {
        let base = gradient_bgr(2, 2);
        let map = filled(2, 2, CV_8UC1, Scalar::all(0.0));
        let mut out = filled(2, 2, CV_8UC1, Scalar::all(0.0));

        let err = overlay_binary_map(&base, &map, PixelColor::Mono(255), &mut out).unwrap_err();
        assert_eq!(err.code, StsUnsupportedFormat as i32);
    }

    #[test]
    fn highlight_must_match_output_channels() {
        let base = gradient_gray(2, 2);
        let map = filled(2, 2, CV_8UC1, Scalar::all(0.0));
        let mut out = filled(2, 2, CV_8UC3, Scalar::all(0.0));

        let err = overlay_binary_map(&base, &map, PixelColor::Mono(255), &mut out).unwrap_err();
        assert_eq!(err.code, StsBadArg as i32);
    }

    #[test]
    fn overlay_rejects_mismatched_map() {
        let base = gradient_gray(3, 3);
        let map = filled(3, 4, CV_8UC1, Scalar::all(0.0));
        let mut out = filled(3, 3, CV_8UC1, Scalar::all(0.0));

        let err = overlay_binary_map(&base, &map, PixelColor::Mono(255), &mut out).unwrap_err();
        assert_eq!(err.code, StsUnmatchedSizes as i32);
    }

    #[test]
    fn shorter_right_image_is_padded_below() {
        let left = gradient_gray(10, 5);
        let right = filled(6, 4, CV_8UC1, Scalar::all(200.0));

        let combined = vpad_and_hconcat(&left, &right, PixelColor::Mono(0)).unwrap();

        assert_eq!(combined.rows(), 10);
        assert_eq!(combined.cols(), 9);
        for j in 0..10 {
            let row = combined.at_row::<u8>(j).unwrap();
            assert_eq!(&row[..5], left.at_row::<u8>(j).unwrap());
            let expected = if j < 6 { 200 } else { 0 };
            assert!(row[5..].iter().all(|&v| v == expected));
        }
    }

    #[test]
    fn shorter_left_image_is_padded_below() {
        let left = gradient_bgr(2, 2);
        let right = gradient_bgr(4, 3);
        let blue = Vec3b::from([255, 0, 0]);

        let combined = vpad_and_hconcat(&left, &right, PixelColor::Color(blue)).unwrap();

        assert_eq!(combined.rows(), 4);
        assert_eq!(combined.cols(), 5);
        assert_eq!(
            *combined.at_2d::<Vec3b>(1, 1).unwrap(),
            *left.at_2d::<Vec3b>(1, 1).unwrap()
        );
        assert_eq!(*combined.at_2d::<Vec3b>(3, 0).unwrap(), blue);
        assert_eq!(
            *combined.at_2d::<Vec3b>(3, 4).unwrap(),
            *right.at_2d::<Vec3b>(3, 2).unwrap()
        );
    }

    #[test]
    fn concat_rejects_channel_mismatch() {
        let left = gradient_gray(2, 2);
        let right = gradient_bgr(2, 2);

        let err = vpad_and_hconcat(&left, &right, PixelColor::Mono(0)).unwrap_err();
        assert_eq!(err.code, StsUnmatchedFormats as i32);
    }
}
