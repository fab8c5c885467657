//! Object areas from binary mask images.
//!
//! Each file in the directory is the segmentation mask of one source image.
//! Connected groups of non-zero pixels are separate objects, and an object's
//! area is its pixel count.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};

use crate::error::AnalysisError;
use crate::models::RawRecord;

const MASK_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// Pixel counts of the 8-connected foreground components, ordered by label.
/// Components smaller than `min_area` are left out.
pub fn component_areas(mask: &GrayImage, min_area: u32) -> Vec<u32> {
    // Anti-aliased or JPEG masks are not strictly 0/255
    let binary = GrayImage::from_fn(mask.width(), mask.height(), |x, y| {
        if mask.get_pixel(x, y)[0] > 0 { Luma([255u8]) } else { Luma([0u8]) }
    });

    let labeled = connected_components(&binary, Connectivity::Eight, Luma([0u8]));

    let mut regions: BTreeMap<u32, u32> = BTreeMap::new();
    for label in labeled.pixels() {
        let label_val = label[0];
        if label_val == 0 {
            continue; // Background
        }
        *regions.entry(label_val).or_insert(0) += 1;
    }

    regions
        .into_values()
        .filter(|&count| count >= min_area)
        .collect()
}

pub fn measure_mask_file(path: &Path, min_area: u32) -> Result<Vec<u32>, AnalysisError> {
    let img = image::open(path).map_err(|e| AnalysisError::Mask {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(component_areas(&img.to_luma8(), min_area))
}

/// Measure every mask image in `dir`, in file-name order.
///
/// Produces one record per object, with the mask file name as the image id.
pub fn measure_mask_dir(dir: &Path, min_area: u32) -> Result<Vec<RawRecord>, AnalysisError> {
    let entries = std::fs::read_dir(dir).map_err(|e| AnalysisError::Ingestion {
        path: dir.to_path_buf(),
        message: e.to_string(),
    })?;

    let mut files: Vec<PathBuf> = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| AnalysisError::Ingestion {
            path: dir.to_path_buf(),
            message: e.to_string(),
        })?;
        let path = entry.path();
        let is_mask = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| MASK_EXTENSIONS.contains(&ext.to_lowercase().as_str()));
        if path.is_file() && is_mask {
            files.push(path);
        }
    }
    files.sort();

    let mut records = Vec::new();
    for path in &files {
        let image_id = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let areas = measure_mask_file(path, min_area)?;
        tracing::debug!("Measured {}: {} objects", image_id, areas.len());

        records.extend(areas.into_iter().map(|area| RawRecord {
            image_id: image_id.clone(),
            value: f64::from(area),
        }));
    }

    tracing::info!(
        "Measured {} objects in {} mask images from {}",
        records.len(),
        files.len(),
        dir.display()
    );

    Ok(records)
}
