//! Provider abstractions.
//!
//! This module contains:
//! - The `DataProvider` trait every upstream source implements
//! - `ProviderCounters`, the request/error counters a provider owns
//! - The timed call shim the orchestrators use to invoke providers
//!
//! # Architecture
//!
//! The provider system is designed to be:
//! - **Provider-agnostic**: orchestrators only see the trait
//! - **Extensible**: aggregators implement the same trait, so a composed
//!   provider can be registered wherever a single one can
//! - **Resilient**: every call goes through [`call_provider`], which enforces
//!   the declared timeout and turns errors into failed results

mod counters;
mod invoke;
mod traits;

#[cfg(test)]
pub(crate) mod testing;

pub use counters::{ProviderCounters, ProviderStats};
pub use invoke::{call_provider, call_provider_owned, CallOutcome};
pub use traits::{DataProvider, DEFAULT_PROVIDER_TIMEOUT};

pub(crate) use invoke::elapsed_ms;
