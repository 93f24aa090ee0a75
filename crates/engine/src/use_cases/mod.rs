//! Use cases - orchestration over the infrastructure ports.

pub mod extraction;

pub use extraction::ExtractStatistics;
