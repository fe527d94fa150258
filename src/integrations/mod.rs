//! Thin HTTP clients for the third-party services the app talks to.

pub mod google;
pub mod llm;
pub mod sap;
pub mod storage;
