//! Core library for the conversational tutoring backend.
//!
//! Two components make up the functional core:
//!
//! - [`session`]: the session store, mapping thread identifiers to ordered
//!   conversation histories with per-thread serialization.
//! - [`tutor`]: the stateless agent that turns (history, message) into a
//!   reply plus a structured slide, via [`llm_client`] and [`slide`].
//!
//! The HTTP surface lives in the `tutor-api` service crate and calls into
//! this library with a message and a thread identifier.

pub mod llm_client;
pub mod session;
pub mod slide;
pub mod tutor;
