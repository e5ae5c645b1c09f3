//! Market data ingestion: provider abstraction, the Finnhub REST provider, and the
//! rate-bounded fetch client that paces every outbound call.
//!
//! The client enforces two limits at once: a minimum spacing between consecutive
//! calls and a hard ceiling on calls inside a rolling window. Neither survives the
//! process; callers that run repeatedly must size their batches so the spacing alone
//! keeps them under the provider's published limit.

pub mod client;
pub mod errors;
pub mod models;
pub mod providers;
