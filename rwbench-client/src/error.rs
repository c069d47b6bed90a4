use thiserror::Error;

/// Errors returned by [`ObjectClient`](crate::ObjectClient) implementations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// A request to an S3-compatible service failed.
    ///
    /// These can be network errors encountered when sending the request, but also errors
    /// returned by the service itself.
    #[error("s3 error: {context}")]
    S3 {
        /// What the client was doing when the error occurred.
        context: String,
        /// The underlying error from the S3 library.
        #[source]
        cause: ::s3::error::S3Error,
    },

    /// Any other error, which might be specific to a client or to a certain operation.
    #[error("client error: {context}")]
    Generic {
        /// What the client was doing when the error occurred.
        context: String,
        /// The underlying error.
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl ClientError {
    pub(crate) fn s3(context: impl Into<String>, cause: ::s3::error::S3Error) -> Self {
        Self::S3 {
            context: context.into(),
            cause,
        }
    }

    /// Creates a [`ClientError::Generic`] from any error type.
    pub fn generic<E>(context: impl Into<String>, cause: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Generic {
            context: context.into(),
            cause: cause.into(),
        }
    }
}

/// Result type for client operations.
pub type ClientResult<T> = Result<T, ClientError>;
