use std::cmp::Ordering;

use crate::error::AnalysisError;

/// Derive the plot id from an image id.
///
/// The plot id is everything before the first `delimiter` in the file name
/// part of `image_id` (directories are ignored, so `field/3-b.jpg` and
/// `3-b.jpg` both belong to plot `3`). A missing delimiter or an empty prefix
/// is a [`AnalysisError::MalformedIdentifier`].
pub fn resolve_plot_id(image_id: &str, delimiter: char) -> Result<String, AnalysisError> {
    let file_name = image_id.rsplit(['/', '\\']).next().unwrap_or(image_id);

    match file_name.split_once(delimiter) {
        Some((prefix, _)) if !prefix.is_empty() => Ok(prefix.to_string()),
        _ => Err(AnalysisError::MalformedIdentifier {
            image_id: image_id.to_string(),
            delimiter,
        }),
    }
}

/// Report ordering for plot ids.
///
/// Purely numeric ids come first in numeric order (`2` before `10`), then all
/// other ids lexically. Ties between numerically equal ids (`01`, `1`) fall
/// back to the string so the order stays total.
pub fn compare_plot_ids(a: &str, b: &str) -> Ordering {
    match (numeric_key(a), numeric_key(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn numeric_key(id: &str) -> Option<u128> {
    if id.is_empty() || !id.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    id.parse().ok()
}
