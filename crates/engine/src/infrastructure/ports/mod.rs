//! Port traits for infrastructure boundaries.
//!
//! These are the only abstractions in the engine. Everything else is concrete types.
//! Ports exist for:
//! - Text generation (could swap Ollama -> any completion backend)
//! - Prompt protocol and response parsing (host-specific wording)
//! - Clock (for testing)

mod error;
mod external;
mod testing;

// =============================================================================
// External Service Ports
// =============================================================================
pub use external::{
    BatchKind, GenerationMeta, GenerationPort, GenerationResponse, PromptBuilderPort,
    PromptRequest, RepairTemplate, ResponseParserPort,
};

// =============================================================================
// Testability Ports
// =============================================================================
pub use testing::ClockPort;

// =============================================================================
// Error Types
// =============================================================================
pub use error::GenerationError;

// =============================================================================
// Mock Exports (for testing)
// =============================================================================
#[cfg(test)]
pub use external::{MockGenerationPort, MockResponseParserPort};
#[cfg(test)]
pub use testing::MockClockPort;
