/// Errors that can occur while dispatching a notification.
///
/// The Alerter records the `Display` text of these errors on error Alerts,
/// so messages are written for operators.
///
/// # Examples
///
/// ```rust
/// use vigil_notify::error::NotifyError;
///
/// let err = NotifyError::NotConfigured("sms".to_string());
/// assert!(err.to_string().contains("channel not configured"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    /// No channel of this type is configured on the server.
    #[error("Notify: {0} channel not configured")]
    NotConfigured(String),

    /// Channel configuration is missing a required field or contains an invalid value.
    #[error("Notify: invalid channel configuration: {0}")]
    InvalidConfig(String),

    /// The recipient detail (phone, email, app key) could not be used.
    #[error("Notify: invalid recipient '{0}'")]
    InvalidRecipient(String),

    /// An HTTP request to an external notification endpoint failed.
    #[error("Notify: HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    /// SMTP transport error when sending email.
    #[error("Notify: SMTP error: {0}")]
    SmtpError(String),

    /// The external API returned a non-success response.
    #[error("Notify: API error from {service}: status={status}, body={body}")]
    ApiError {
        service: String,
        status: u16,
        body: String,
    },
}

/// Convenience `Result` alias for notification operations.
pub type Result<T> = std::result::Result<T, NotifyError>;
