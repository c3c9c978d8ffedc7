// Service exports
pub mod memory;
pub mod notifier;
pub mod postgres;
pub mod retry;
pub mod store;

pub use memory::InMemoryStore;
pub use notifier::{LogNotifier, NotificationDispatcher, Notifier, NotifyError, WebhookNotifier};
pub use postgres::PostgresStore;
pub use retry::{RetryPolicy, RetryingStore};
pub use store::{StateStore, StoreError};
