use std::fmt;

/// A normalized recipient domain: lowercased, trailing dot stripped.
///
/// `Domain::parse` also applies the non-recipient guard from RFC 8461's
/// point of view (a socketmap `<zone> <domain>` lookup is never made for a
/// bracketed literal, a multi-label IPv6/port suffix, or a bare subdomain
/// wildcard) so that callers never construct a `Domain` for input that
/// cannot have an MTA-STS policy.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Domain(String);

impl Domain {
    pub fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if raw.is_empty() || raw.starts_with('.') || raw.starts_with('[') || raw.contains(':') {
            return None;
        }
        let normalized = raw.trim_end_matches('.').to_ascii_lowercase();
        if normalized.is_empty() {
            return None;
        }
        Some(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
