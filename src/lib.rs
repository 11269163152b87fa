//! # authrelay
//!
//! `authrelay` bridges synchronous login requests to an asynchronous
//! credential-checking worker through a message broker, so that callers never
//! wait on the authentication backend.
//!
//! ## Core Modules
//!
//! - `broker`: in-process broker with TTL-bounded queues, consumers and acks.
//! - `publisher`: deadline-bounded publishing of requests and results.
//! - `worker`: the sequential request consumer.
//! - `auth`: credential validators (static pair, remote identity provider)
//!   and a stub identity provider.
//! - `transport`: HTTP ingress and the response-queue reply router.
//! - `config`: loading settings from files and the environment.
//! - `relay`: wiring all of the above into one running pipeline.
//! - `utils`: error types and logging setup.

pub mod auth;
pub mod broker;
pub mod config;
pub mod publisher;
pub mod relay;
pub mod transport;
pub mod utils;
pub mod worker;

#[cfg(test)]
mod test_support;

#[cfg(test)]
mod tests;
