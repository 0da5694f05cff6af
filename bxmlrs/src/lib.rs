//! Android APK metadata and binary resource decoder.
//!
//! Ties together a ZIP envelope reader, a binary-XML (AXML) decoder for
//! `AndroidManifest.xml`, and a compiled resource table (ARSC) decoder
//! behind the [`apk::ApkFacade`] entry point.

pub mod apk;
pub mod arsc;
pub mod attributes;
pub mod axml;
pub mod chunk;
pub mod error;
pub mod logger;
pub mod string_pool;
pub mod value;
pub mod zip_reader;

pub use apk::ApkFacade;
pub use error::{Error, Result};
