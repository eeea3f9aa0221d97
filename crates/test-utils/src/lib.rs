//! Shared test utilities for the raster-engine workspace.
//!
//! This crate provides common testing infrastructure including:
//! - Prebuilt raster fixtures (headers, masks, datasets)
//! - Approximate-equality assertion macros
//!
//! # Usage
//!
//! Add to your crate's `Cargo.toml`:
//!
//! ```toml
//! [dev-dependencies]
//! test-utils = { path = "../test-utils" }
//! ```
//!
//! Then import in your tests:
//!
//! ```ignore
//! use test_utils::{fixtures, assert_approx_eq};
//! ```

pub mod fixtures;

// Re-export commonly used items at the crate root
pub use fixtures::*;

/// Macro for approximate floating-point equality assertions.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_approx_eq;
///
/// assert_approx_eq!(1.0001_f64, 1.0_f64, 0.001_f64); // passes
/// assert_approx_eq!(1.1_f32, 1.0_f32, 0.001_f32);    // fails
/// ```
#[macro_export]
macro_rules! assert_approx_eq {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left: f64 = $left as f64;
        let right: f64 = $right as f64;
        let epsilon: f64 = $epsilon as f64;
        let diff = (left - right).abs();
        if diff > epsilon {
            panic!(
                "assertion failed: `(left ≈ right)`\n  left: `{:?}`,\n right: `{:?}`,\n  diff: `{:?}` > epsilon `{:?}`",
                left, right, diff, epsilon
            );
        }
    }};
}

/// Macro for approximate equality of coordinate pairs.
///
/// # Usage
///
/// ```ignore
/// use test_utils::assert_coords_approx_eq;
///
/// assert_coords_approx_eq!((1.0001, 2.0001), (1.0, 2.0), 0.001);
/// ```
#[macro_export]
macro_rules! assert_coords_approx_eq {
    (($x1:expr, $y1:expr), ($x2:expr, $y2:expr), $epsilon:expr) => {{
        $crate::assert_approx_eq!($x1, $x2, $epsilon);
        $crate::assert_approx_eq!($y1, $y2, $epsilon);
    }};
}

/// Macro asserting two datasets hold the same values at every valid cell.
///
/// Compares headers structurally, then every layer value within
/// `epsilon`. Use an epsilon of `0.0` for integer-typed rasters.
#[macro_export]
macro_rules! assert_datasets_match {
    ($left:expr, $right:expr, $epsilon:expr) => {{
        let left = &$left;
        let right = &$right;
        assert_eq!(left.header(), right.header(), "headers differ");
        assert_eq!(left.index(), right.index(), "valid cell sets differ");
        for layer in 0..left.layer_count() {
            let lhs = left.layer(layer).unwrap();
            let rhs = right.layer(layer).unwrap();
            for (ordinal, (a, b)) in lhs.iter().zip(rhs.iter()).enumerate() {
                let diff = (a - b).abs();
                if diff > $epsilon as f64 {
                    panic!(
                        "layer {} ordinal {}: `{:?}` vs `{:?}`, diff `{:?}` > epsilon `{:?}`",
                        layer, ordinal, a, b, diff, $epsilon
                    );
                }
            }
        }
    }};
}

#[cfg(test)]
mod tests {
    #[test]
    fn test_assert_approx_eq_passes() {
        assert_approx_eq!(1.0001, 1.0, 0.001);
        assert_approx_eq!(0.0, 0.0, 0.0001);
        assert_approx_eq!(-5.5, -5.500001, 0.0001);
    }

    #[test]
    #[should_panic(expected = "assertion failed")]
    fn test_assert_approx_eq_fails() {
        assert_approx_eq!(1.1, 1.0, 0.001);
    }

    #[test]
    fn test_assert_coords_approx_eq_passes() {
        assert_coords_approx_eq!((1.0001, 2.0001), (1.0, 2.0), 0.001);
    }

    #[test]
    fn test_assert_datasets_match_on_fixture() {
        let dataset = crate::fixtures::pattern_dataset(2);
        assert_datasets_match!(dataset, dataset.clone(), 0.0);
    }

    #[test]
    #[should_panic(expected = "ordinal")]
    fn test_assert_datasets_match_detects_difference() {
        let left = crate::fixtures::pattern_dataset(1);
        let mut right = left.clone();
        right.set_value(0, 0, 0, 999.0).unwrap();
        assert_datasets_match!(left, right, 1e-9);
    }
}
