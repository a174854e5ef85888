use tracing::Span;

use crate::error::ReaderError;

pub const DEFAULT_MAX_BUFFERED_BYTES: usize = 4096;
pub const DEFAULT_MAX_BUFFERED_LINES: usize = 8;
pub const DEFAULT_WORKER_NAME: &str = "line-reader";

/// Buffer ceilings. The worker stops pulling only when both are reached.
///
/// A zero ceiling is always reached, which turns the other one into a hard cap. With
/// `max_buffered_lines == 0`, a line longer than `max_buffered_bytes` can only be drained with
/// `get_char`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ReaderLimits {
    pub max_buffered_bytes: usize,
    pub max_buffered_lines: usize,
}

impl Default for ReaderLimits {
    fn default() -> Self {
        Self {
            max_buffered_bytes: DEFAULT_MAX_BUFFERED_BYTES,
            max_buffered_lines: DEFAULT_MAX_BUFFERED_LINES,
        }
    }
}

impl ReaderLimits {
    /// Caps bytes only: with a zero line ceiling the line condition is always met.
    pub fn bytes_only(max_buffered_bytes: usize) -> Self {
        Self {
            max_buffered_bytes,
            max_buffered_lines: 0,
        }
    }

    pub(crate) fn validate(&self) -> Result<(), ReaderError> {
        if self.max_buffered_bytes == 0 && self.max_buffered_lines == 0 {
            return Err(ReaderError::InvalidConfig(
                "max_buffered_bytes and max_buffered_lines cannot both be zero".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ReaderConfig {
    pub limits: ReaderLimits,
    /// Thread name given to the background worker.
    pub worker_name: String,
    /// Parent span for everything the worker logs.
    pub span: Span,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            limits: ReaderLimits::default(),
            worker_name: DEFAULT_WORKER_NAME.to_string(),
            span: Span::current(),
        }
    }
}

impl ReaderConfig {
    pub fn builder() -> ReaderConfigBuilder {
        ReaderConfigBuilder::default()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReaderConfigBuilder {
    pub(crate) limits: ReaderLimits,
    pub(crate) worker_name: Option<String>,
    pub(crate) span: Option<Span>,
}

impl ReaderConfigBuilder {
    pub fn max_buffered_bytes(mut self, bytes: usize) -> Self {
        self.limits.max_buffered_bytes = bytes;
        self
    }

    pub fn max_buffered_lines(mut self, lines: usize) -> Self {
        self.limits.max_buffered_lines = lines;
        self
    }

    pub fn limits(mut self, limits: ReaderLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn worker_name(mut self, name: impl Into<String>) -> Self {
        self.worker_name = Some(name.into());
        self
    }

    pub fn span(mut self, span: Span) -> Self {
        self.span = Some(span);
        self
    }

    pub fn build(self) -> Result<ReaderConfig, ReaderError> {
        self.limits.validate()?;
        Ok(ReaderConfig {
            limits: self.limits,
            worker_name: self
                .worker_name
                .unwrap_or_else(|| DEFAULT_WORKER_NAME.to_string()),
            span: self.span.unwrap_or_else(Span::current),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_small_and_nonzero() {
        let config = ReaderConfig::builder().build().unwrap();
        assert_eq!(config.limits.max_buffered_bytes, 4096);
        assert_eq!(config.limits.max_buffered_lines, 8);
        assert_eq!(config.worker_name, "line-reader");
    }

    #[test]
    fn both_limits_zero_is_rejected() {
        let err = ReaderConfig::builder()
            .max_buffered_bytes(0)
            .max_buffered_lines(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, ReaderError::InvalidConfig(_)), "{err:?}");

        let config = ReaderConfig::builder()
            .limits(ReaderLimits::bytes_only(4))
            .build()
            .unwrap();
        assert_eq!(config.limits.max_buffered_lines, 0);
    }

    #[cfg(feature = "serde")]
    #[test]
    fn limits_deserialize_with_defaults_for_missing_fields() {
        let limits: ReaderLimits = serde_json::from_str(r#"{"max_buffered_bytes":16}"#).unwrap();
        assert_eq!(limits.max_buffered_bytes, 16);
        assert_eq!(limits.max_buffered_lines, DEFAULT_MAX_BUFFERED_LINES);
    }
}
