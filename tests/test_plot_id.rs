//! Plot identifier parsing and report ordering.

use std::cmp::Ordering;

use phenostats::AnalysisError;
use phenostats::analysis::plot_id::{compare_plot_ids, resolve_plot_id};

#[test]
fn test_prefix_before_first_delimiter() {
    assert_eq!(resolve_plot_id("1-a.jpg", '-').unwrap(), "1");
    assert_eq!(resolve_plot_id("12-rep-3.png", '-').unwrap(), "12");
    assert_eq!(resolve_plot_id("A7_north_2.jpg", '_').unwrap(), "A7");
}

#[test]
fn test_directories_are_ignored() {
    assert_eq!(resolve_plot_id("field-2024/3-b.jpg", '-').unwrap(), "3");
    assert_eq!(resolve_plot_id(r"C:\field-2024\4-c.jpg", '-').unwrap(), "4");
}

#[test]
fn test_missing_delimiter_is_malformed() {
    let err = resolve_plot_id("IMG_0001.jpg", '-').unwrap_err();
    match err {
        AnalysisError::MalformedIdentifier { image_id, delimiter } => {
            assert_eq!(image_id, "IMG_0001.jpg");
            assert_eq!(delimiter, '-');
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_empty_prefix_is_malformed() {
    assert!(resolve_plot_id("-a.jpg", '-').is_err());
    assert!(resolve_plot_id("", '-').is_err());
}

#[test]
fn test_numeric_ids_sort_numerically_before_text() {
    let mut ids = vec!["10", "b", "2", "1", "a", "02"];
    ids.sort_by(|a, b| compare_plot_ids(a, b));
    assert_eq!(ids, vec!["1", "02", "2", "10", "a", "b"]);
}

#[test]
fn test_comparison_is_consistent() {
    assert_eq!(compare_plot_ids("2", "10"), Ordering::Less);
    assert_eq!(compare_plot_ids("10", "1a"), Ordering::Less);
    assert_eq!(compare_plot_ids("1a", "2"), Ordering::Greater);
    assert_eq!(compare_plot_ids("7", "7"), Ordering::Equal);
}
