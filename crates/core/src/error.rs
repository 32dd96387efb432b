/// Result alias that carries the custom [`TactileError`] type.
pub type Result<T> = std::result::Result<T, TactileError>;

/// Common error type for the core crate.
///
/// The per-tick control path never fails; errors only surface from
/// configuration loading and from setters that refuse an incompatible
/// combination of options.
#[derive(Debug, thiserror::Error)]
pub enum TactileError {
    /// Free-form message for conditions without a dedicated variant.
    #[error("{0}")]
    Message(String),
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// The configuration document could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_json::Error),
    /// A setting was refused because it conflicts with another active mode.
    /// The previous value is left in place.
    #[error("incompatible configuration: {0}")]
    Incompatible(&'static str),
}

impl TactileError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }
}
