//! Snapshot error types.

/// Errors that can occur while decoding a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
  /// The input ended before a value could be read.
  #[error("snapshot truncated: needed {needed} bytes, {remaining} remaining")]
  Truncated { needed: usize, remaining: usize },

  /// A length prefix was negative.
  #[error("negative length prefix: {length}")]
  NegativeLength { length: i32 },

  /// A length-prefixed string was not valid UTF-8.
  #[error("invalid utf-8 in snapshot: {source}")]
  InvalidUtf8 {
    #[from]
    source: std::string::FromUtf8Error,
  },

  /// A boolean or nullable flag was neither 0 nor 1.
  #[error("invalid flag value: {value}")]
  InvalidFlag { value: i32 },

  /// An enum ordinal did not name a known variant.
  #[error("ordinal {ordinal} out of range for {type_name}")]
  InvalidOrdinal {
    ordinal: i32,
    type_name: &'static str,
  },

  /// JSON-encoded state could not be decoded.
  #[error("invalid snapshot json: {source}")]
  Json {
    #[from]
    source: serde_json::Error,
  },

  /// Decoded bytes were well formed but rejected by the workflow.
  #[error("invalid snapshot: {message}")]
  Invalid { message: String },
}

impl SnapshotError {
  /// Build an [`SnapshotError::Invalid`] from any message.
  pub fn invalid(message: impl Into<String>) -> Self {
    Self::Invalid {
      message: message.into(),
    }
  }
}
