pub mod enrichment;
pub mod entities;
pub mod error;
pub mod services;
pub mod stix;
pub mod storage;
pub mod templates;
pub mod utils;

#[cfg(test)]
mod fixtures;
