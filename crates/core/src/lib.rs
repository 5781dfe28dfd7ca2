pub mod channels;
pub mod config;
pub mod error;
pub mod event_bus;
pub mod source;
pub mod types;

pub use config::AppConfig;
pub use error::{CrmError, CrmResult};
pub use source::{CustomerSource, Dataset, ReceiptStore};
