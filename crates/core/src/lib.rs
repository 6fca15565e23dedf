pub mod config;
pub mod domain;
pub mod envelope;
pub mod errors;
pub mod extract;
pub mod validate;

pub use config::{AppConfig, ConfigError, ConfigOverrides, LoadOptions};
pub use domain::action::{Action, Amount};
pub use domain::customer::{Address, CustomerInfo};
pub use domain::outcome::{DispatchOutcome, SummaryOutcome};
pub use domain::request::{CorrelationId, PaymentRequest, SummaryRequest};
pub use envelope::{payment_response, summary_response, ResponseEnvelope};
pub use errors::{
    ActionError, ErrorKind, InputError, ProviderError, ProviderErrorKind, ServiceError,
};
pub use extract::extract_action_object;
pub use validate::validate_action;
