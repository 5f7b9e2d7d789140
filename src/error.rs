//! Error handling for the pi_gpiod daemon.

/// A specialized `Result` type for pi_gpiod operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

/// The main error type for pi_gpiod operations.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A caller supplied a bad bank, bank value or request parameter
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Unknown handler command
    #[error("Not found: {0}")]
    NotFound(String),

    /// GPIO operation failed
    #[error("GPIO error: {0}")]
    Gpio(String),

    /// Network operation failed
    #[error("Network error: {0}")]
    Network(String),

    /// Web server error
    #[error("Web server error: {0}")]
    WebServer(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Generic system error
    #[error("System error: {0}")]
    System(String),
}

impl ServiceError {
    /// Create a new invalid argument error
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create a new not found error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new GPIO error
    pub fn gpio_error(msg: impl Into<String>) -> Self {
        Self::Gpio(msg.into())
    }

    /// Create a new network error
    pub fn network_error(msg: impl Into<String>) -> Self {
        Self::Network(msg.into())
    }

    /// Create a new web server error
    pub fn web_server_error(msg: impl Into<String>) -> Self {
        Self::WebServer(msg.into())
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new generic system error
    #[allow(clippy::self_named_constructors)]
    pub fn system_error(msg: impl Into<String>) -> Self {
        Self::System(msg.into())
    }

    /// Short, stable name of the error category. Used in JSON error reports.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "Io",
            Self::Json(_) => "Json",
            Self::InvalidArgument(_) => "InvalidArgument",
            Self::NotFound(_) => "NotFound",
            Self::Gpio(_) => "Gpio",
            Self::Network(_) => "Network",
            Self::WebServer(_) => "WebServer",
            Self::Config(_) => "Config",
            Self::System(_) => "System",
        }
    }
}
