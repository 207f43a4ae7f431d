//! Per-domain Android signing configuration.
//!
//! Given an app URL, derive the domain, a reverse-DNS package name and the
//! keystore credentials, generate the keystore once, and cache the result
//! in a JSON document so repeated builds for a domain are identical.

pub mod config;
pub mod domain;
pub mod error;
pub mod keystore;
pub mod store;
pub mod utils;

pub use config::{MissingToolPolicy, PathStyle, Settings};
pub use domain::{domain_to_package_name, url_to_domain};
pub use error::{Error, Result};
pub use keystore::{KeystoreProvisioner, KeystoreState, Provisioned};
pub use store::{ConfigStore, DomainConfig};
