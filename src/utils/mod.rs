//! The `utils` module provides a collection of shared definitions used across
//! the `relaymq` application: the error taxonomy and the logging bootstrap.

pub mod error;
pub mod logging;
