use thiserror::Error;

/// Failures surfaced during solver bring-up. Nothing here is expected at
/// per-frame step time; a backend failure mid-frame is fatal for that frame
/// and propagated, never retried.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("field allocation rejected: {width}x{height}")]
    Allocation { width: usize, height: usize },

    #[error("kernel '{kernel}' rejected by backend: {reason}")]
    KernelCompilation { kernel: String, reason: String },

    #[error("requested texel precision unavailable: {0}")]
    UnsupportedPrecision(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[cfg(feature = "gpu")]
    #[error("no suitable GPU adapter found")]
    NoAdapter,

    #[cfg(feature = "gpu")]
    #[error("device request failed: {0}")]
    Device(String),
}
