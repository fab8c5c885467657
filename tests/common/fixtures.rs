#![allow(dead_code)]

use std::path::{Path, PathBuf};

use image::{GrayImage, Luma};
use phenostats::config::QuantileMethod;
use phenostats::{AnalysisConfig, AnalysisError, PlotStatistics, RawRecord};

pub const EPSILON: f64 = 1e-9;

pub fn record(image_id: &str, value: f64) -> RawRecord {
    RawRecord {
        image_id: image_id.to_string(),
        value,
    }
}

pub fn records(rows: &[(&str, f64)]) -> Vec<RawRecord> {
    rows.iter().map(|(id, v)| record(id, *v)).collect()
}

/// Four rows over two plots: plot "1" has an obvious outlier, plot "2" one row
pub fn two_plot_example() -> Vec<RawRecord> {
    records(&[("1-a.jpg", 10.0), ("1-b.jpg", 12.0), ("1-c.jpg", 200.0), ("2-a.jpg", 8.0)])
}

/// Quartiles taken from actual sample values, with three values enough
/// to estimate them
pub fn lower_quartile_config() -> AnalysisConfig {
    AnalysisConfig {
        quantile_method: QuantileMethod::Lower,
        iqr_min_samples: 3,
        ..AnalysisConfig::default()
    }
}

pub fn plot_stats(plot_id: &str, mean: f64, std_dev: f64, cv: f64, entropy: f64) -> PlotStatistics {
    PlotStatistics {
        plot_id: plot_id.to_string(),
        count: 1,
        retained: 1,
        mean,
        std_dev,
        cv,
        entropy,
    }
}

pub fn assert_close(actual: f64, expected: f64) {
    assert!(
        (actual - expected).abs() < EPSILON,
        "expected {}, got {}",
        expected,
        actual
    );
}

/// Writes `contents` to `dir/name` and returns the path
pub fn write_input(dir: &Path, name: &str, contents: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, contents).expect("Failed to write test input");
    path
}

/// Saves a black mask with white rectangles `(x, y, width, height)`
pub fn write_mask(path: &Path, width: u32, height: u32, rects: &[(u32, u32, u32, u32)]) {
    let mut img = GrayImage::from_pixel(width, height, Luma([0u8]));
    for &(x, y, w, h) in rects {
        for py in y..y + h {
            for px in x..x + w {
                img.put_pixel(px, py, Luma([255u8]));
            }
        }
    }
    img.save_with_format(path, image::ImageFormat::Png)
        .expect("Failed to save test mask");
}

/// Finds the library error anywhere in an anyhow chain
pub fn analysis_error(err: &anyhow::Error) -> Option<&AnalysisError> {
    err.chain().find_map(|e| e.downcast_ref::<AnalysisError>())
}
