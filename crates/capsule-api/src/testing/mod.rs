//! Testing utilities for module and host developers
//!
//! Mocks record their lifecycle through a shared [`LifecycleProbe`] and can
//! be cloned into descriptor factories while the test keeps a handle on the
//! counters.

pub mod helpers;
pub mod mocks;

pub use helpers::{CollectingListener, LifecycleProbe};
pub use mocks::{
    MockCapability, MockConnectionManager, MockConverter, MockProcessor, MockResponse, MockSource,
};
