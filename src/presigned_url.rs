//! Opaque presigned url.
//!
//! The query string of a presigned url carries the signature, the expiry and
//! the signed header list. Any edit to it invalidates the capability, so the
//! value is parsed once for validation and never exposed mutably afterwards.
use crate::error::{Error, Result};
use reqwest::Url;
use std::{fmt, str::FromStr};

#[derive(Clone, PartialEq, Eq)]
pub struct PresignedUrl {
    raw: String,
    url: Url,
}

impl PresignedUrl {
    /// Accept an `https` url as handed out by the signer.
    pub fn parse(raw: &str) -> Result<Self> {
        Self::parse_with(raw, &["https"])
    }

    /// Like [`PresignedUrl::parse`] but also accepts plain `http`, for local
    /// endpoints such as a MinIO instance on the loopback interface.
    pub fn parse_insecure(raw: &str) -> Result<Self> {
        Self::parse_with(raw, &["https", "http"])
    }

    fn parse_with(raw: &str, schemes: &[&str]) -> Result<Self> {
        if raw.is_empty() {
            return Err(Error::InvalidUrl("url is empty".to_string()));
        }
        let url = Url::parse(raw).map_err(|err| Error::InvalidUrl(err.to_string()))?;
        if !schemes.contains(&url.scheme()) {
            return Err(Error::InvalidUrl(format!(
                "scheme {} is not allowed",
                url.scheme()
            )));
        }
        if url.host_str().map_or(true, str::is_empty) {
            return Err(Error::InvalidUrl("url has no host".to_string()));
        }
        // What goes on the wire is the parsed form. Refuse anything the
        // parser would rewrite (dot segments, case, escaping, default ports).
        if url.as_str() != raw {
            return Err(Error::InvalidUrl(
                "url is not in canonical form, it would be sent rewritten".to_string(),
            ));
        }
        Ok(Self {
            raw: raw.to_string(),
            url,
        })
    }

    /// The url exactly as it was supplied.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn scheme(&self) -> &str {
        self.url.scheme()
    }

    pub fn host(&self) -> &str {
        self.url.host_str().unwrap_or_default()
    }

    pub fn path(&self) -> &str {
        self.url.path()
    }

    pub(crate) fn to_url(&self) -> Url {
        self.url.clone()
    }
}

impl FromStr for PresignedUrl {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PresignedUrl {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

// Display and Debug never print the query, it is a bearer credential.
impl fmt::Display for PresignedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}://{}", self.scheme(), self.host())?;
        if let Some(port) = self.url.port() {
            write!(f, ":{}", port)?;
        }
        f.write_str(self.path())?;
        if self.url.query().is_some() {
            f.write_str("?<redacted>")?;
        }
        Ok(())
    }
}

impl fmt::Debug for PresignedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PresignedUrl")
            .field(&format_args!("{}", self))
            .finish()
    }
}
