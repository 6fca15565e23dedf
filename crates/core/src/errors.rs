use thiserror::Error;

/// Machine-checkable failure classes shared by both handlers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    MalformedInput,
    UnparseableAction,
    InvalidShape,
    UnknownActionType,
    InvalidAmount,
    MissingProduct,
    InvalidAccountId,
    ProviderError,
    ServiceError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MalformedInput => "malformed_input",
            Self::UnparseableAction => "unparseable_action",
            Self::InvalidShape => "invalid_shape",
            Self::UnknownActionType => "unknown_action_type",
            Self::InvalidAmount => "invalid_amount",
            Self::MissingProduct => "missing_product",
            Self::InvalidAccountId => "invalid_account_id",
            Self::ProviderError => "provider_error",
            Self::ServiceError => "service_error",
        }
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InputError {
    #[error("Invalid JSON in request body")]
    InvalidJson,
    #[error("Request body must be a JSON object")]
    NotAnObject,
    #[error("Missing '{0}' in request body")]
    MissingField(&'static str),
    #[error("Invalid '{0}' in request body")]
    InvalidField(&'static str),
    #[error("Invalid payment request")]
    InvalidQuery,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("Invalid payment request format: {0}")]
    Unparseable(String),
    #[error("Invalid payment request format: Payment data must be a dictionary")]
    InvalidShape,
    #[error("Invalid payment request format: Invalid payment type")]
    UnknownActionType,
    #[error("Invalid payment request format: Invalid amount format")]
    InvalidAmount,
    #[error("Invalid payment request format: Product name is required")]
    MissingProduct,
    #[error("Invalid payment request format: Invalid account ID format")]
    InvalidAccountId,
}

impl ActionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unparseable(_) => ErrorKind::UnparseableAction,
            Self::InvalidShape => ErrorKind::InvalidShape,
            Self::UnknownActionType => ErrorKind::UnknownActionType,
            Self::InvalidAmount => ErrorKind::InvalidAmount,
            Self::MissingProduct => ErrorKind::MissingProduct,
            Self::InvalidAccountId => ErrorKind::InvalidAccountId,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
    RateLimited,
    Authentication,
    ResourceMissing,
    InvalidRequest,
    Card,
    Api,
    Transport,
    Decode,
}

/// A failure reported by (or while talking to) the payment provider.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
    pub code: Option<String>,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), code: None }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    /// Whether the caller should correct the request rather than retry it.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self.kind,
            ProviderErrorKind::ResourceMissing
                | ProviderErrorKind::InvalidRequest
                | ProviderErrorKind::Card
        )
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error(transparent)]
    Input(#[from] InputError),
    #[error(transparent)]
    Action(#[from] ActionError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("Invalid or non-existent account ID: {account_id}")]
    UnknownAccount { account_id: String },
    #[error("Payment failed: {reason}")]
    PaymentIncomplete { payment_intent_id: String, status: String, reason: String },
    #[error("agent failure: {0}")]
    Agent(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
    #[error("{0}")]
    Internal(String),
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Input(_) => ErrorKind::MalformedInput,
            Self::Action(error) => error.kind(),
            Self::Provider(_) | Self::PaymentIncomplete { .. } => ErrorKind::ProviderError,
            Self::UnknownAccount { .. } => ErrorKind::InvalidAccountId,
            Self::Agent(_) | Self::Configuration(_) | Self::Internal(_) => ErrorKind::ServiceError,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            Self::Input(_)
            | Self::Action(_)
            | Self::UnknownAccount { .. }
            | Self::PaymentIncomplete { .. } => 400,
            Self::Provider(error) if error.is_client_error() => 400,
            Self::Provider(_) | Self::Agent(_) | Self::Configuration(_) | Self::Internal(_) => 500,
        }
    }

    /// Failures that are neither the caller's nor a collaborator's fault.
    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Configuration(_) | Self::Internal(_))
    }

    /// Payment-related failures, as opposed to interpretation or content failures.
    pub fn is_payment_failure(&self) -> bool {
        matches!(self, Self::Provider(_) | Self::PaymentIncomplete { .. } | Self::UnknownAccount { .. })
    }

    pub fn user_message(&self) -> String {
        match self {
            Self::Provider(error) => match error.kind {
                ProviderErrorKind::RateLimited => {
                    "Rate limit reached. Please try again later.".to_string()
                }
                ProviderErrorKind::Authentication => "Invalid Stripe API key.".to_string(),
                ProviderErrorKind::ResourceMissing => "Invalid resource ID.".to_string(),
                _ => error.to_string(),
            },
            other => other.to_string(),
        }
    }
}
