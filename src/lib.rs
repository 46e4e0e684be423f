//! Climate model output discovery: search CMIP5/CMIP6/CORDEX datasets by
//! metadata facet and reconcile local holdings against the ESGF federated
//! search index.

pub mod collection;
pub mod config;
pub mod domain;
pub mod error;
pub mod esgf;
pub mod local;
pub mod output;
pub mod table;
pub mod vocab;
