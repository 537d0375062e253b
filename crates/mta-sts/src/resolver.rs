use crate::dns::{lookup_policy_id, TxtLookup};
use crate::fetcher::{HttpGetter, HttpOutcome};
use crate::policy::PolicyBody;
use dns_resolver::Resolver;
use std::sync::Arc;
use std::time::Duration;

/// Result of a single MTA-STS resolution attempt for a domain.
#[derive(Debug, Clone)]
pub enum FetchResult {
    /// A new or replacement policy was retrieved.
    Valid(String, Arc<PolicyBody>),
    /// The cached policy id is still current; HTTPS was not re-fetched.
    NotChanged,
    /// No STS policy exists for this domain.
    None,
    /// Transient failure; the caller must not evict an existing cache entry.
    FetchError,
}

/// Resolve `domain`'s MTA-STS policy against the DNS TXT + HTTPS chain
/// described in RFC 8461 §3, clamped to an overall `timeout`.
///
/// This function holds no cache of its own: it is a pure function of its
/// inputs plus the external resolver/getter it is handed.
pub async fn resolve(
    domain: &str,
    latest_pol_id: Option<&str>,
    resolver: &dyn Resolver,
    getter: &dyn HttpGetter,
    timeout: Duration,
) -> FetchResult {
    match tokio::time::timeout(
        timeout,
        resolve_inner(domain, latest_pol_id, resolver, getter),
    )
    .await
    {
        Ok(result) => result,
        Err(_) => {
            tracing::debug!(domain, ?timeout, "mta-sts resolution timed out");
            FetchResult::FetchError
        }
    }
}

async fn resolve_inner(
    domain: &str,
    latest_pol_id: Option<&str>,
    resolver: &dyn Resolver,
    getter: &dyn HttpGetter,
) -> FetchResult {
    let record = match lookup_policy_id(domain, resolver).await {
        TxtLookup::Found(record) => record,
        TxtLookup::Absent => return FetchResult::None,
        TxtLookup::Failed(err) => {
            tracing::debug!(domain, %err, "mta-sts TXT lookup failed");
            return FetchResult::FetchError;
        }
    };

    if latest_pol_id == Some(record.id.as_str()) {
        return FetchResult::NotChanged;
    }

    let url = format!("https://mta-sts.{domain}/.well-known/mta-sts.txt");
    let body = match getter.http_get(&url).await {
        HttpOutcome::Ok(body) => body,
        HttpOutcome::NotFound => return FetchResult::None,
        HttpOutcome::Failed(err) => {
            tracing::debug!(domain, %err, "mta-sts HTTPS fetch failed");
            return FetchResult::FetchError;
        }
    };

    match PolicyBody::parse(&body) {
        Ok(policy) => FetchResult::Valid(record.id, Arc::new(policy)),
        Err(err) => {
            tracing::debug!(domain, %err, "mta-sts policy failed to parse");
            FetchResult::None
        }
    }
}
