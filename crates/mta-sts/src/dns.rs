//! RFC 8461 §3.1 TXT record discovery: `_mta-sts.<domain>` must hold a
//! single logical record of the form `v=STSv1; id=<token>;`.

use dns_resolver::{DnsError, Resolver};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxtRecord {
    pub id: String,
}

/// Outcome of the TXT discovery step, already classified the way the
/// fetcher needs it: a malformed or absent record collapses to `Absent`
/// (policy `None`), while a DNS-level failure is kept distinct so the
/// caller can report `FetchError` instead.
#[derive(Debug)]
pub enum TxtLookup {
    Found(TxtRecord),
    Absent,
    Failed(DnsError),
}

pub async fn lookup_policy_id(policy_domain: &str, resolver: &dyn Resolver) -> TxtLookup {
    let name = format!("_mta-sts.{policy_domain}");
    let chunks = match resolver.resolve_txt(&name).await {
        Ok(chunks) => chunks,
        Err(err) if err.is_absent() => return TxtLookup::Absent,
        Err(err) => return TxtLookup::Failed(err),
    };

    let txt = chunks.join("");
    let mut fields: BTreeMap<String, String> = BTreeMap::new();
    for pair in txt.split(';') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let Some((key, value)) = pair.split_once('=') else {
            return TxtLookup::Absent;
        };
        fields.insert(key.trim().to_string(), value.trim().to_string());
    }

    if fields.get("v").map(String::as_str) != Some("STSv1") {
        return TxtLookup::Absent;
    }

    match fields.remove("id") {
        Some(id) if !id.is_empty() => TxtLookup::Found(TxtRecord { id }),
        _ => TxtLookup::Absent,
    }
}
