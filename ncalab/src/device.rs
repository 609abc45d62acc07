//! Compute device and backend selection.
//!
//! Backends are compile-time choices in burn, so the CPU path is always
//! available and the GPU path sits behind the `wgpu` cargo feature. The
//! [`DefaultBackend`] alias is what the CLI and the task runners train on.

use burn::tensor::backend::Backend;

#[cfg(not(feature = "wgpu"))]
use burn::backend::ndarray::NdArrayDevice;
#[cfg(feature = "wgpu")]
use burn::backend::wgpu::WgpuDevice;

/// CPU training backend.
pub type CpuBackend = burn::backend::Autodiff<burn::backend::NdArray>;

/// GPU training backend.
#[cfg(feature = "wgpu")]
pub type GpuBackend = burn::backend::Autodiff<burn::backend::Wgpu>;

/// Backend used by the task runners: GPU when compiled in, CPU otherwise.
#[cfg(feature = "wgpu")]
pub type DefaultBackend = GpuBackend;
/// Backend used by the task runners: GPU when compiled in, CPU otherwise.
#[cfg(not(feature = "wgpu"))]
pub type DefaultBackend = CpuBackend;

/// A requested compute device, as it arrives from a CLI flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceRequest {
    Cpu,
    Gpu { index: usize },
}

/// Resolve a [`DeviceRequest`] against the compiled backend.
///
/// Asking for a GPU without the `wgpu` feature logs a warning and falls
/// back to the CPU device rather than failing the run.
pub fn compute_device(request: DeviceRequest) -> <DefaultBackend as Backend>::Device {
    #[cfg(feature = "wgpu")]
    {
        match request {
            DeviceRequest::Cpu => WgpuDevice::Cpu,
            DeviceRequest::Gpu { index } => {
                tracing::info!(index, "selecting discrete GPU");
                WgpuDevice::DiscreteGpu(index)
            }
        }
    }
    #[cfg(not(feature = "wgpu"))]
    {
        if let DeviceRequest::Gpu { index } = request {
            tracing::warn!(
                index,
                "GPU requested but the wgpu feature is not enabled; falling back to CPU"
            );
        }
        NdArrayDevice::Cpu
    }
}

/// Device for the default backend with no preference expressed.
pub fn default_device() -> <DefaultBackend as Backend>::Device {
    compute_device(DeviceRequest::Cpu)
}

/// Human-readable description of the resolved device, for startup logs.
pub fn describe(request: DeviceRequest) -> String {
    match request {
        DeviceRequest::Cpu => "cpu".to_string(),
        DeviceRequest::Gpu { index } => {
            if cfg!(feature = "wgpu") {
                format!("gpu:{index}")
            } else {
                format!("cpu (gpu:{index} unavailable)")
            }
        }
    }
}

/// Seed the backend's random sources for a reproducible run.
pub fn fix_random_seed<B: Backend>(seed: u64) {
    B::seed(seed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_device_resolves() {
        // Mostly a compile-time check that the aliases line up.
        let _device = default_device();
        let _also = compute_device(DeviceRequest::Gpu { index: 0 });
    }

    #[test]
    fn test_describe() {
        assert_eq!(describe(DeviceRequest::Cpu), "cpu");
        let gpu = describe(DeviceRequest::Gpu { index: 1 });
        assert!(gpu.contains("1"));
    }
}
