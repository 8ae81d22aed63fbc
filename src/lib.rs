//! Centinela - dataset integrity and data-poisoning detection for ML pipelines
//!
//! This library provides independent detectors that flag samples or
//! distributions likely to have been tampered with before or during model
//! training: spectral signature analysis over learned feature
//! representations, feature-wise distribution drift checks, and canary
//! token generation for membership probing.
//!
//! Detectors only score and flag; they never remove or mutate the
//! underlying dataset.

pub mod canary;
pub mod drift;
pub mod spectral;

pub use canary::{CanaryGenerator, CanaryInjector, InjectionStrategy};
pub use drift::{Correction, DriftDetector, DriftReport};
pub use spectral::SpectralSignatureDetector;
