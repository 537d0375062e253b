//! RFC 8461 MTA-STS policy discovery: DNS TXT lookup, conditional HTTPS
//! policy fetch, and policy parsing.
//!
//! This crate is deliberately stateless: it knows how to answer "what is
//! the current MTA-STS policy for this domain, given what I last saw" but
//! holds no cache of its own. See the `sts-cache` crate for the caching
//! and single-flight layer built on top of it.

pub mod dns;
pub mod domain;
pub mod fetcher;
pub mod policy;
pub mod resolver;

pub use domain::Domain;
pub use fetcher::{HttpGetter, ReqwestGetter};
pub use policy::{PolicyBody, PolicyMode};
pub use resolver::{resolve, FetchResult};
