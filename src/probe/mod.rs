// Probes run inside a job step; their output is checked afterwards
pub mod affinity;
pub mod gpu_binding;
pub mod java_memory;

pub use affinity::{AffinityMeasure, AffinityProbe};
