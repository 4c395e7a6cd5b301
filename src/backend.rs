//! Backend selection
//!
//! Batches are produced on the host and turned into tensors of the default
//! backend when a consumer asks for them.

#[cfg(feature = "ndarray")]
pub type DefaultBackend = burn::backend::NdArray;

#[cfg(not(feature = "ndarray"))]
compile_error!("The ndarray backend feature must be enabled");

/// Get the default device
pub fn default_device() -> <DefaultBackend as burn::tensor::backend::Backend>::Device {
    <DefaultBackend as burn::tensor::backend::Backend>::Device::default()
}

/// Get a human-readable name for the current backend
pub fn backend_name() -> &'static str {
    "NdArray (CPU)"
}
