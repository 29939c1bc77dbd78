//! Render error taxonomy
//!
//! Every failure inside a frame is local: the affected draw, light or blit is
//! skipped and logged, and the rest of the frame carries on.

use thiserror::Error;

/// Errors raised by the render core and its GPU backends.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    /// A mesh, shader program, texture or shadow target could not be found.
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),

    /// A shadow-casting light whose parameters cannot produce a shadow map.
    #[error("invalid light configuration for '{light}': {reason}")]
    InvalidLightConfiguration { light: String, reason: String },

    /// A command was issued against GPU state that was never established.
    #[error("render state corrupted: {0}")]
    StateCorruption(String),

    /// Surface acquisition or presentation failed.
    #[error("surface error: {0}")]
    Surface(String),
}

impl RenderError {
    pub fn missing(what: impl Into<String>) -> Self {
        RenderError::ResourceUnavailable(what.into())
    }

    pub fn invalid_light(light: &str, reason: impl Into<String>) -> Self {
        RenderError::InvalidLightConfiguration {
            light: light.to_string(),
            reason: reason.into(),
        }
    }
}

pub type RenderResult<T> = Result<T, RenderError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = RenderError::missing("mesh #4");
        assert_eq!(err.to_string(), "resource unavailable: mesh #4");

        let err = RenderError::invalid_light("sun", "direction has zero length");
        assert_eq!(
            err.to_string(),
            "invalid light configuration for 'sun': direction has zero length"
        );
    }
}
