//! The `transport` module is the relay's outer surface: the HTTP ingress
//! that turns login calls into request-queue messages, and the reply router
//! that listens on the response queue.

pub mod http;
pub mod replies;
