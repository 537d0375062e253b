use async_trait::async_trait;
use hickory_resolver::proto::op::response_code::ResponseCode;
use hickory_resolver::proto::ProtoErrorKind;
use hickory_resolver::TokioResolver;
use std::collections::BTreeMap;
use std::sync::Mutex;
use thiserror::Error;

/// Failure modes of a DNS lookup, collapsed down to the two outcomes the
/// MTA-STS fetcher cares about: a definitive "nothing there" vs. a
/// transient failure that should not be treated as an absence of policy.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum DnsError {
    #[error("invalid DNS name: {0}")]
    InvalidName(String),
    #[error("no TXT record for {0}")]
    NxDomain(String),
    #[error("DNS resolution failed: {0}")]
    ResolveFailed(String),
}

impl DnsError {
    /// True for an authoritative "no such record" response; false for
    /// anything that looks like a transient or server-side failure.
    pub fn is_absent(&self) -> bool {
        matches!(self, DnsError::NxDomain(_))
    }
}

#[async_trait]
pub trait Resolver: Send + Sync + 'static {
    /// Resolve the TXT record set for `name`, concatenating the strings of
    /// each record (but not across records) the way
    /// `hickory_resolver::proto::rr::rdata::TXT` chunks a single record.
    async fn resolve_txt(&self, name: &str) -> Result<Vec<String>, DnsError>;
}

pub struct HickoryResolver {
    inner: TokioResolver,
}

impl HickoryResolver {
    pub fn new() -> Result<Self, hickory_resolver::ResolveError> {
        Ok(Self {
            inner: TokioResolver::builder_tokio()?.build(),
        })
    }
}

#[async_trait]
impl Resolver for HickoryResolver {
    async fn resolve_txt(&self, name: &str) -> Result<Vec<String>, DnsError> {
        let query = hickory_resolver::Name::from_utf8(name)
            .map_err(|err| DnsError::InvalidName(format!("invalid name {name}: {err}")))?;

        match self.inner.txt_lookup(query).await {
            Ok(lookup) => Ok(lookup
                .iter()
                .map(|txt| {
                    txt.iter()
                        .map(|chunk| String::from_utf8_lossy(chunk))
                        .collect::<String>()
                })
                .collect()),
            Err(err) => match err.proto().map(|err| err.kind()) {
                Some(ProtoErrorKind::NoRecordsFound { response_code, .. }) => {
                    if *response_code == ResponseCode::NXDomain
                        || *response_code == ResponseCode::NoError
                    {
                        Err(DnsError::NxDomain(name.to_string()))
                    } else {
                        Err(DnsError::ResolveFailed(format!(
                            "{name}: server responded {response_code}"
                        )))
                    }
                }
                _ => Err(DnsError::ResolveFailed(format!(
                    "failed to query DNS for {name}: {err}"
                ))),
            },
        }
    }
}

/// An in-memory resolver for tests: pre-seed TXT answers or force a
/// `ResolveFailed` for a given name without touching the network.
#[derive(Default)]
pub struct TestResolver {
    txt: Mutex<BTreeMap<String, Vec<String>>>,
    servfail: Mutex<Vec<String>>,
}

impl TestResolver {
    pub fn with_txt(self, name: &str, value: impl Into<String>) -> Self {
        self.with_txt_multiple(name, vec![value.into()])
    }

    pub fn with_txt_multiple(self, name: &str, values: Vec<String>) -> Self {
        self.txt.lock().unwrap().insert(name.to_string(), values);
        self
    }

    pub fn with_servfail(self, name: &str) -> Self {
        self.servfail.lock().unwrap().push(name.to_string());
        self
    }
}

#[async_trait]
impl Resolver for TestResolver {
    async fn resolve_txt(&self, name: &str) -> Result<Vec<String>, DnsError> {
        if self.servfail.lock().unwrap().iter().any(|n| n == name) {
            return Err(DnsError::ResolveFailed(format!("{name}: SERVFAIL")));
        }
        match self.txt.lock().unwrap().get(name) {
            Some(values) => Ok(values.clone()),
            None => Err(DnsError::NxDomain(name.to_string())),
        }
    }
}
