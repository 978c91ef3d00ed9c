//! sentinel-registry — kernel catalog, audit gate and built-in kernels.

pub mod audit;
pub mod builtin;
pub mod registry;

pub use audit::{AuditGate, AuditPort, AuditVerdict, RawVerdict, UNAVAILABLE_REASON};
pub use builtin::{
    builtin_kernels, is_builtin, MODE_EXTRACT, NDVI_GENERATOR, NDWI_GENERATOR, VEG_MASK,
};
pub use registry::{AlgorithmRegistry, KernelRecord, PersistOutcome, KERNEL_COLLECTION};
