use std::path::Path;

use lib_cv::config::{
    self, CONTRAST_ESTIMATOR_TRACKBAR, CONTRAST_THRESHOLD_TRACKBAR, KERNEL_HALF_WIDTH_TRACKBAR,
    LAPLACIAN_FILTER_TRACKBAR, STD_DEVIATION_TRACKBAR, TrackbarPositions, TrackbarSpec,
};
use lib_cv::utils::{PixelColor, vpad_and_hconcat};
use lib_cv::{EdgeDetectionConfig, EdgeDetector};
use log::{debug, error, info, warn};
use opencv::core::{StsError, Vector};
use opencv::videoio::{self, VideoCapture};
use opencv::{highgui, imgcodecs, imgproc, prelude::*};

const WINDOW_NAME: &str = "OpenCV Demo | Edge detection > Detected edges";
const DEFAULT_CONFIG_PATH: &str = "edge_detection.yml";
const SIDE_BY_SIDE_TRACKBAR: TrackbarSpec = TrackbarSpec {
    name: "Orig | Edges",
    max: 1,
};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    // Аргументы: [видеофайл] [файл параметров]. Без видеофайла используется камера 0.
    let args: Vec<String> = std::env::args().collect();
    let video_path = args.get(1).map(String::as_str);
    let config_path = args.get(2).map(String::as_str).unwrap_or(DEFAULT_CONFIG_PATH);

    if let Err(e) = run(video_path, config_path) {
        error!("Ошибка при выделении границ: {:?}", e);
        std::process::exit(1);
    }
}

fn open_capture(video_path: Option<&str>) -> opencv::Result<VideoCapture> {
    let cap = match video_path {
        Some(path) => {
            info!("Открытие видеофайла {}", path);
            VideoCapture::from_file(path, videoio::CAP_ANY)?
        }
        None => {
            info!("Открытие камеры по умолчанию");
            VideoCapture::new(0, videoio::CAP_ANY)?
        }
    };
    if !cap.is_opened()? {
        return Err(opencv::Error::new(
            StsError as i32,
            "Не удалось открыть источник видео".to_string(),
        ));
    }
    Ok(cap)
}

fn initial_config(config_path: &str) -> EdgeDetectionConfig {
    if !Path::new(config_path).exists() {
        debug!("Файл параметров {} не найден, используются значения по умолчанию", config_path);
        return EdgeDetectionConfig::default();
    }
    match config::load_config(config_path) {
        Ok(config) => {
            info!("Параметры загружены из {}", config_path);
            config
        }
        Err(e) => {
            warn!("Не получилось загрузить параметры из {}: {}", config_path, e);
            EdgeDetectionConfig::default()
        }
    }
}

fn create_gui(positions: &TrackbarPositions) -> opencv::Result<()> {
    highgui::named_window(WINDOW_NAME, highgui::WINDOW_AUTOSIZE)?;

    let trackbars = [
        (LAPLACIAN_FILTER_TRACKBAR, positions.laplacian_filter),
        (STD_DEVIATION_TRACKBAR, positions.std_deviation),
        (KERNEL_HALF_WIDTH_TRACKBAR, positions.kernel_half_width),
        (CONTRAST_ESTIMATOR_TRACKBAR, positions.contrast_estimator),
        (CONTRAST_THRESHOLD_TRACKBAR, positions.contrast_threshold),
        (SIDE_BY_SIDE_TRACKBAR, 0),
    ];
    for (spec, value) in trackbars {
        highgui::create_trackbar(spec.name, WINDOW_NAME, None, spec.max, None)?;
        highgui::set_trackbar_pos(spec.name, WINDOW_NAME, value)?;
    }
    Ok(())
}

fn read_trackbars() -> opencv::Result<TrackbarPositions> {
    Ok(TrackbarPositions {
        laplacian_filter: highgui::get_trackbar_pos(LAPLACIAN_FILTER_TRACKBAR.name, WINDOW_NAME)?,
        std_deviation: highgui::get_trackbar_pos(STD_DEVIATION_TRACKBAR.name, WINDOW_NAME)?,
        kernel_half_width: highgui::get_trackbar_pos(
            KERNEL_HALF_WIDTH_TRACKBAR.name,
            WINDOW_NAME,
        )?,
        contrast_estimator: highgui::get_trackbar_pos(
            CONTRAST_ESTIMATOR_TRACKBAR.name,
            WINDOW_NAME,
        )?,
        contrast_threshold: highgui::get_trackbar_pos(
            CONTRAST_THRESHOLD_TRACKBAR.name,
            WINDOW_NAME,
        )?,
    })
}

/// Исходный кадр слева, кадр с границами справа
fn side_by_side(frame: &Mat, overlay: &Mat) -> opencv::Result<Mat> {
    if frame.channels() == 1 {
        let mut frame_bgr = Mat::default();
        imgproc::cvt_color_def(frame, &mut frame_bgr, imgproc::COLOR_GRAY2BGR)?;
        return vpad_and_hconcat(&frame_bgr, overlay, PixelColor::bgr(0, 0, 0));
    }
    vpad_and_hconcat(frame, overlay, PixelColor::bgr(0, 0, 0))
}

fn run(video_path: Option<&str>, config_path: &str) -> opencv::Result<()> {
    let mut cap = open_capture(video_path)?;
    let mut config = initial_config(config_path);
    create_gui(&TrackbarPositions::from_config(&config))?;

    let mut detector = EdgeDetector::default();
    let mut frame = Mat::default();
    let mut frame_number: usize = 0;

    loop {
        if !cap.read(&mut frame)? || frame.empty() {
            info!("Видеопоток закончился после {} кадров", frame_number);
            break;
        }

        let (positions, corrected) = read_trackbars()?.sanitized();
        if corrected {
            highgui::set_trackbar_pos(
                STD_DEVIATION_TRACKBAR.name,
                WINDOW_NAME,
                positions.std_deviation,
            )?;
            highgui::set_trackbar_pos(
                KERNEL_HALF_WIDTH_TRACKBAR.name,
                WINDOW_NAME,
                positions.kernel_half_width,
            )?;
        }
        let new_config = positions.apply_to(&config);
        if new_config != config {
            debug!("Новые параметры: {:?}", new_config);
            config = new_config;
        }

        let overlay = detector.process(&frame, &config)?;
        if highgui::get_trackbar_pos(SIDE_BY_SIDE_TRACKBAR.name, WINDOW_NAME)? == 1 {
            highgui::imshow(WINDOW_NAME, &side_by_side(&frame, overlay)?)?;
        } else {
            highgui::imshow(WINDOW_NAME, overlay)?;
        }
        frame_number += 1;

        let key = highgui::wait_key(30)?;
        match key & 0xFF {
            27 | 113 => break, // Escape или q
            32 => {
                let filename = format!("edges_{}.png", frame_number);
                imgcodecs::imwrite(&filename, overlay, &Vector::new())?;
                info!("Кадр сохранён в {}", filename);
            }
            115 => config::save_config(config_path, &config)?, // s
            _ => {}
        }
    }

    highgui::destroy_all_windows()?;
    Ok(())
}
