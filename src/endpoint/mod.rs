use std::fmt;

use thiserror::Error;
use url::Url;

const API_KEY_PARAM: &str = "apikey";

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("ingestion host is empty")]
    EmptyHost,

    #[error("ingestion host does not form a valid URL: {0}")]
    InvalidUrl(String),
}

/// Destination URL for every delivery, carrying hostname, tags and API key
/// as query parameters. Computed once at startup and never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointTarget(Url);

impl EndpointTarget {
    /// Build `https://<host>?hostname=<h>&tags=<t>&apikey=<k>`.
    ///
    /// A bare host gets `https://` prepended. A host that already names an
    /// `http` or `https` scheme is used as given. Query values are
    /// form-urlencoded, so the same inputs always produce the same bytes.
    pub fn build(
        host: &str,
        token: &str,
        tags: &str,
        hostname: &str,
    ) -> Result<Self, EndpointError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(EndpointError::EmptyHost);
        }

        let base = if host.starts_with("https://") || host.starts_with("http://") {
            host.to_owned()
        } else {
            format!("https://{host}")
        };

        let mut url = Url::parse(&base).map_err(|_| EndpointError::InvalidUrl(base.clone()))?;
        url.query_pairs_mut()
            .append_pair("hostname", hostname)
            .append_pair("tags", tags)
            .append_pair(API_KEY_PARAM, token);

        Ok(Self(url))
    }

    pub fn url(&self) -> &Url {
        &self.0
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// The URL with the API key masked, for log output.
    pub fn redacted(&self) -> String {
        let mut url = self.0.clone();
        let pairs: Vec<(String, String)> = self
            .0
            .query_pairs()
            .map(|(k, v)| {
                let v = if k == API_KEY_PARAM { "***".into() } else { v };
                (k.into_owned(), v.into_owned())
            })
            .collect();
        url.query_pairs_mut().clear().extend_pairs(pairs);
        url.into()
    }
}

impl fmt::Display for EndpointTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}
