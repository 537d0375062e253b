//! RFC 8461 §3.3 HTTPS policy fetch: GET
//! `https://mta-sts.<domain>/.well-known/mta-sts.txt` with redirects
//! disabled and strict certificate validation (delegated to `reqwest`'s
//! default, which validates against the platform's Web PKI trust store
//! and sets SNI to the request host).

use futures::future::BoxFuture;

/// Outcome of the HTTPS GET, already classified for the resolver: a 404
/// is kept distinct from other non-200 statuses and from transport errors.
pub enum HttpOutcome {
    Ok(String),
    NotFound,
    Failed(String),
}

pub trait HttpGetter: Sync + Send {
    fn http_get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, HttpOutcome>;
}

pub struct ReqwestGetter {
    client: reqwest::Client,
}

impl ReqwestGetter {
    /// No client-level request timeout is set here: the per-zone timeout
    /// configured for a domain is enforced once, as the overall deadline
    /// `resolver::resolve` wraps around the whole TXT+HTTPS chain via
    /// `tokio::time::timeout`. A fixed client-level timeout here would
    /// either cap that configurable deadline below what an operator asked
    /// for, or sit below it uselessly; letting the outer timeout cancel
    /// the in-flight request (which `reqwest` handles by dropping the
    /// future) is the single source of truth for how long a fetch may run.
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self {
            client: reqwest::Client::builder()
                // <https://datatracker.ietf.org/doc/html/rfc8461#section-3.3>
                // HTTP redirects MUST NOT be followed
                .redirect(reqwest::redirect::Policy::none())
                .build()?,
        })
    }
}

impl HttpGetter for ReqwestGetter {
    fn http_get<'a>(&'a self, url: &'a str) -> BoxFuture<'a, HttpOutcome> {
        Box::pin(async move {
            let response = match self.client.get(url).send().await {
                Ok(response) => response,
                Err(err) => return HttpOutcome::Failed(format!("{err:#}")),
            };

            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return HttpOutcome::NotFound;
            }
            if status != reqwest::StatusCode::OK {
                return HttpOutcome::Failed(format!("GET {url}: unexpected status {status}"));
            }

            // <https://datatracker.ietf.org/doc/html/rfc8461#section-3.2>
            // senders SHOULD validate that the media type is "text/plain"
            // to guard against web servers that let untrusted users host
            // non-text content at that path.
            let content_type = match response.headers().get(reqwest::header::CONTENT_TYPE) {
                Some(value) => value,
                None => return HttpOutcome::Failed("missing Content-Type header".to_string()),
            };
            let content_type = match content_type.to_str() {
                Ok(value) => value,
                Err(err) => return HttpOutcome::Failed(format!("invalid Content-Type: {err}")),
            };
            let ct = content_type
                .split_once(';')
                .map(|(ct, _)| ct)
                .unwrap_or(content_type)
                .trim();
            if ct != "text/plain" {
                return HttpOutcome::Failed(format!(
                    "Content-Type must be text/plain, got {content_type}"
                ));
            }

            match response.text().await {
                Ok(body) => HttpOutcome::Ok(body),
                Err(err) => HttpOutcome::Failed(format!("{err:#}")),
            }
        })
    }
}
