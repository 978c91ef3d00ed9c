//! Per-item metric computed at Process and Analysis nodes.
//!
//! `HashMetric` is a deterministic placeholder for real raster statistics:
//! a pure function of (item id, kernel id), identical across runs and hosts.

/// Computes one scalar per (item, kernel) pair.
pub trait MetricComputer: Send + Sync {
    fn compute(&self, item_id: &str, kernel_id: &str) -> f64;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct HashMetric;

impl HashMetric {
    /// Kernel ids containing `veg` (case-sensitive) land in a higher base
    /// range than every other kernel, `ndvi_generator` included.
    fn range(kernel_id: &str) -> (f64, f64) {
        if kernel_id.contains("veg") {
            (0.42, 0.5)
        } else {
            (0.15, 0.7)
        }
    }
}

impl MetricComputer for HashMetric {
    fn compute(&self, item_id: &str, kernel_id: &str) -> f64 {
        let hash = string_hash(&format!("{}_{}", item_id, kernel_id));
        let normalized = (hash % 1000.0).abs() / 1000.0;
        let (base, span) = Self::range(kernel_id);
        ((base + normalized * span) * 1000.0).round() / 1000.0
    }
}

/// `h = c + ((h << 5) - h)` over UTF-16 code units. The shift truncates to
/// i32 while the subtraction keeps full precision, so `h` is carried as f64.
fn string_hash(key: &str) -> f64 {
    key.encode_utf16().fold(0.0_f64, |h, c| {
        let shifted = ((h as i64) as i32).wrapping_shl(5);
        f64::from(c) + (f64::from(shifted) - h)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_matches_reference_values() {
        assert_eq!(string_hash(""), 0.0);
        assert_eq!(string_hash("a"), 97.0);
        // 97 * 31 + 98
        assert_eq!(string_hash("ab"), 3105.0);
    }

    #[test]
    fn metric_is_pure() {
        let m = HashMetric;
        let a = m.compute("COPERNICUS/S2_SR/20240105T_T50RKV", "veg_mask");
        for _ in 0..10 {
            assert_eq!(m.compute("COPERNICUS/S2_SR/20240105T_T50RKV", "veg_mask"), a);
        }
    }

    #[test]
    fn metric_stays_in_kernel_range() {
        let m = HashMetric;
        for i in 0..200 {
            let id = format!("scene-{}", i);
            let veg = m.compute(&id, "veg_mask");
            assert!((0.42..=0.92).contains(&veg), "{} -> {}", id, veg);
            let generic = m.compute(&id, "mode_extract");
            assert!((0.15..=0.85).contains(&generic), "{} -> {}", id, generic);
        }
    }

    #[test]
    fn only_veg_ids_use_the_vegetation_range() {
        assert_eq!(HashMetric::range("veg_mask"), (0.42, 0.5));
        assert_eq!(HashMetric::range("wf_custom_veg2"), (0.42, 0.5));
        assert_eq!(HashMetric::range("ndvi_generator"), (0.15, 0.7));
        assert_eq!(HashMetric::range("VEG_upper"), (0.15, 0.7));
        assert_eq!(HashMetric::range("default"), (0.15, 0.7));
    }

    #[test]
    fn metric_has_three_decimals() {
        let v = HashMetric.compute("x", "default");
        assert_eq!((v * 1000.0).round() / 1000.0, v);
    }
}
