//! Theke core library: reading-application internals for bibles and books.
//!
//! The crate provides the URI model used to address every screen and
//! document, biblical reference parsing, a SQLite catalog of the documents
//! offered by the installed content modules, and a navigator that turns a
//! URI into render-ready content. Module content itself comes from a
//! [`backend::Backend`] implementation supplied by the host application.

pub mod backend;
pub mod config;
pub mod errors;
pub mod indexer;
pub mod models;
pub mod navigator;
pub mod query;
pub mod reference;
pub mod store;
pub mod uri;

#[cfg(test)]
mod test_support;

pub use errors::{ThekeError, ThekeResult};
pub use navigator::Navigator;
pub use reference::{Reference, ReferenceResolver};
pub use uri::Uri;
