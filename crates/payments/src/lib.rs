pub mod dispatch;
pub mod memory;
pub mod provider;
pub mod stripe;

pub use dispatch::ActionDispatcher;
pub use memory::InMemoryPaymentProvider;
pub use provider::{PaymentProvider, ProviderOperation};
pub use stripe::StripeClient;
