//! Built-in system kernels. Immutable, always valid, never persisted by the registry.

use sentinel_core::AlgorithmKernel;

pub const NDVI_GENERATOR: &str = "ndvi_generator";
pub const NDWI_GENERATOR: &str = "ndwi_generator";
pub const VEG_MASK: &str = "veg_mask";
pub const MODE_EXTRACT: &str = "mode_extract";

const NDVI_CODE: &str = "\
// Kernel: NDVI index\n\
// Input: surface reflectance scene.\n\
var ndvi = image.normalizedDifference(['B8', 'B4']).rename('NDVI');\n\
return ndvi;";

const NDWI_CODE: &str = "\
// Kernel: NDWI water index\n\
// Input: surface reflectance scene.\n\
var ndwi = image.normalizedDifference(['B3', 'B8']).rename('NDWI');\n\
return ndwi;";

const VEG_MASK_CODE: &str = "\
// Algorithm: Vegetation Area Extraction\n\
// Input: NDVI single-band image from the export stage.\n\
// Logic: keep pixels where value > 0.4.\n\
var processed = inputImage.updateMask(inputImage.gt(0.4));\n\
return processed;";

const MODE_EXTRACT_CODE: &str = "\
// Algorithm: Histogram Mode Extraction\n\
// Input: single-band image from the export stage.\n\
// Logic: most frequent value of the non-zero pixels.\n\
var stats = inputImage.updateMask(inputImage.neq(0)).reduceRegion({\n\
  reducer: ee.Reducer.mode(),\n\
  geometry: geometry,\n\
  scale: 10,\n\
  maxPixels: 1e9\n\
});\n\
return stats;";

pub fn builtin_kernels() -> Vec<AlgorithmKernel> {
    vec![
        AlgorithmKernel::system(
            NDVI_GENERATOR,
            "NDVI Generator",
            "Normalised difference vegetation index from B8/B4.",
            NDVI_CODE,
        ),
        AlgorithmKernel::system(
            NDWI_GENERATOR,
            "NDWI Generator",
            "Normalised difference water index from B3/B8.",
            NDWI_CODE,
        ),
        AlgorithmKernel::system(
            VEG_MASK,
            "Vegetation Area Extractor",
            "Masks an NDVI band to pixels above 0.4.",
            VEG_MASK_CODE,
        ),
        AlgorithmKernel::system(
            MODE_EXTRACT,
            "Hist Mode Extractor",
            "Histogram mode of the non-zero pixels of a single-band image.",
            MODE_EXTRACT_CODE,
        ),
    ]
}

pub fn is_builtin(id: &str) -> bool {
    matches!(id, NDVI_GENERATOR | NDWI_GENERATOR | VEG_MASK | MODE_EXTRACT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_are_system_and_valid() {
        let kernels = builtin_kernels();
        assert_eq!(kernels.len(), 4);
        for k in &kernels {
            assert!(k.is_system(), "{}", k.id);
            assert!(k.is_selectable(), "{}", k.id);
            assert!(is_builtin(&k.id));
            assert!(!k.code.is_empty());
        }
        assert!(!is_builtin("wf_custom_1"));
    }
}
