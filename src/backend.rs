//! Backend selection - CUDA (preferred) or NdArray (CPU fallback)
//!
//! The backend is fixed at compile time and the device is chosen once at
//! startup. Inference backends carry no autodiff wrapper, so no gradient
//! state is recorded and dropout layers are inert.

#[cfg(feature = "cuda")]
pub type InferenceBackend = burn_cuda::Cuda;

#[cfg(not(feature = "cuda"))]
pub type InferenceBackend = burn_ndarray::NdArray<f32>;

/// Get the default device for the compiled backend
pub fn default_device() -> <InferenceBackend as burn::tensor::backend::Backend>::Device {
    <InferenceBackend as burn::tensor::backend::Backend>::Device::default()
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    #[cfg(feature = "cuda")]
    {
        "CUDA (GPU)"
    }

    #[cfg(not(feature = "cuda"))]
    {
        "NdArray (CPU)"
    }
}
