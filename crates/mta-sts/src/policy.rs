use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolicyMode {
    Enforce,
    Testing,
    None,
}

/// A parsed `mta-sts.txt` policy document (RFC 8461 §3.2).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyBody {
    pub mode: PolicyMode,
    pub mx: Vec<String>,
    pub max_age: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("policy line is not `key: value`: {0:?}")]
    Malformed(String),
    #[error("policy is missing a `version` field")]
    MissingVersion,
    #[error("policy has an incompatible STS version")]
    IncompatibleVersion,
    #[error("policy is missing a `mode` field")]
    MissingMode,
    #[error("policy has an invalid `mode` field")]
    InvalidMode,
    #[error("policy mode=enforce/testing requires at least one `mx` field")]
    MissingMx,
    #[error("policy is missing a `max_age` field")]
    MissingMaxAge,
    #[error("policy `max_age` is not a valid positive integer: {0}")]
    InvalidMaxAge(String),
}

impl PolicyBody {
    pub fn parse(data: &str) -> Result<Self, PolicyError> {
        let mut fields: BTreeMap<String, Vec<String>> = BTreeMap::new();

        for line in data.lines() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line
                .split_once(':')
                .ok_or_else(|| PolicyError::Malformed(line.to_string()))?;
            fields
                .entry(key.trim().to_string())
                .or_default()
                .push(value.trim().to_string());
        }

        let version = fields.remove("version").ok_or(PolicyError::MissingVersion)?;
        if version.len() != 1 || version[0] != "STSv1" {
            return Err(PolicyError::IncompatibleVersion);
        }

        let mode = match fields.remove("mode") {
            None => return Err(PolicyError::MissingMode),
            Some(mode) if mode.len() == 1 => match mode[0].as_str() {
                "enforce" => PolicyMode::Enforce,
                "testing" => PolicyMode::Testing,
                "none" => PolicyMode::None,
                _ => return Err(PolicyError::InvalidMode),
            },
            _ => return Err(PolicyError::InvalidMode),
        };

        let mut mx = match fields.remove("mx") {
            None if mode == PolicyMode::None => vec![],
            None => return Err(PolicyError::MissingMx),
            Some(v) if mode == PolicyMode::None => v,
            Some(v) if v.is_empty() => return Err(PolicyError::MissingMx),
            Some(v) => v,
        };
        mx.iter_mut().for_each(|entry| *entry = entry.to_lowercase());

        let max_age: u64 = match fields.remove("max_age") {
            None => return Err(PolicyError::MissingMaxAge),
            Some(v) if v.len() == 1 => v[0]
                .parse()
                .map_err(|_| PolicyError::InvalidMaxAge(v[0].clone()))?,
            Some(v) => return Err(PolicyError::InvalidMaxAge(v.join(","))),
        };
        // RFC 8461 max_age is a positive integer; a zero value can never
        // be live, so reject it as malformed rather than caching a policy
        // that is stale from the instant it's inserted.
        if max_age == 0 {
            return Err(PolicyError::InvalidMaxAge("0".to_string()));
        }

        Ok(Self { mode, mx, max_age })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SAMPLE_POLICY: &str =
        "version: STSv1 \nmode: enforce\nmx: mail.example.com\r\nmx:\t*.example.net\nmx: backupmx.example.com\nmax_age: 604800";

    #[test]
    fn parse_policy() {
        k9::snapshot!(
            PolicyBody::parse(SAMPLE_POLICY).unwrap(),
            r#"
PolicyBody {
    mode: Enforce,
    mx: [
        "mail.example.com",
        "*.example.net",
        "backupmx.example.com",
    ],
    max_age: 604800,
}
"#
        );
    }

    #[test]
    fn mode_none_allows_missing_mx() {
        let policy = PolicyBody::parse("version: STSv1\nmode: none\nmax_age: 86400").unwrap();
        assert_eq!(policy.mode, PolicyMode::None);
        assert!(policy.mx.is_empty());
    }

    #[test]
    fn enforce_without_mx_is_rejected() {
        let err = PolicyBody::parse("version: STSv1\nmode: enforce\nmax_age: 86400").unwrap_err();
        assert_eq!(err, PolicyError::MissingMx);
    }

    #[test]
    fn zero_max_age_is_rejected() {
        let err =
            PolicyBody::parse("version: STSv1\nmode: enforce\nmx: a\nmax_age: 0").unwrap_err();
        assert_eq!(err, PolicyError::InvalidMaxAge("0".to_string()));
    }

    #[test]
    fn bad_version_is_rejected() {
        let err =
            PolicyBody::parse("version: STSv2\nmode: enforce\nmx: a\nmax_age: 1").unwrap_err();
        assert_eq!(err, PolicyError::IncompatibleVersion);
    }

    #[test]
    fn malformed_line_is_rejected() {
        let err = PolicyBody::parse("not-a-kv-line").unwrap_err();
        assert!(matches!(err, PolicyError::Malformed(_)));
    }
}
