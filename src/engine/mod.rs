//! Price-resolution engine: fallback chains, rate selection, valuation,
//! alerting, and the scheduled refresh loop that ties them together.

pub mod cache;
pub mod chain;
pub mod rates;
pub mod valuation;
pub mod alert;
pub mod pricing;
pub mod scheduler;
pub mod service;

pub use pricing::{PriceSources, PricingEngine};
pub use service::{Command, CommandError, EngineService, PreferenceUpdate, ServiceHandle};
