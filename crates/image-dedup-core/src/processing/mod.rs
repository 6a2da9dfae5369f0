// Core modules
mod crypto_hash;

pub mod file_validation;
pub mod perceptual;
pub mod progress;

// Expose cryptographic hash calculations
pub use crypto_hash::*;

// Expose perceptual fingerprints
pub use perceptual::{
    fingerprint, fingerprint_from_file, flatten_alpha, Fingerprint, FINGERPRINT_BITS,
};

pub use progress::{ChannelProgress, NoProgress, ProgressSink, ProgressTracker, ScanEvent};
