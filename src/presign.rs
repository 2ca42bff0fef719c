//! Presigned url generation, for callers that hold storage credentials.
//!
//! Signing is delegated to `rust-s3`; the uploader itself never sees
//! credentials.
use crate::{
    error::{Error, Result},
    presigned_url::PresignedUrl,
};
use s3::{bucket::Bucket, creds::Credentials, region::Region};
use serde::{Deserialize, Serialize};

const DEFAULT_EXPIRY: &str = "1h";
const DEFAULT_REGION: &str = "us-east-1";
// SigV4 query signatures are valid for at most a week.
const MAX_EXPIRY_SECS: u64 = 7 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Put,
}

impl std::str::FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "PUT" => Ok(Self::Put),
            _ => Err(Error::UnsupportedMethod(s.to_string())),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PresignParams {
    pub endpoint: String,
    pub region: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: Option<String>,
    /// `bucket/object`
    pub target: String,
    pub expiry: Option<String>,
    pub method: Option<String>,
}

/// Split `bucket/object`. The object key may itself contain slashes.
pub fn parse_target(target: &str) -> Result<(&str, &str)> {
    match target.split_once('/') {
        Some((bucket, object)) if !bucket.is_empty() && !object.is_empty() => {
            Ok((bucket, object))
        }
        _ => Err(Error::InvalidTarget(target.to_string())),
    }
}

/// Parse `90s`, `15m`, `1h`, `24h`, `7d` into seconds.
pub fn parse_expiry(expiry: &str) -> Result<u32> {
    let invalid = || Error::InvalidExpiry(expiry.to_string());
    let expiry = expiry.trim();
    let split = expiry
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(invalid)?;
    let (value, unit) = expiry.split_at(split);
    let value: u64 = value.parse().map_err(|_| invalid())?;
    let multiplier = match unit {
        "s" => 1,
        "m" => 60,
        "h" => 60 * 60,
        "d" => 24 * 60 * 60,
        _ => return Err(invalid()),
    };
    let secs = value.checked_mul(multiplier).ok_or_else(invalid)?;
    if secs == 0 || secs > MAX_EXPIRY_SECS {
        return Err(invalid());
    }
    u32::try_from(secs).map_err(|_| invalid())
}

pub async fn presign(params: &PresignParams) -> Result<PresignedUrl> {
    let (bucket_name, object) = parse_target(&params.target)?;
    let method: Method = params.method.as_deref().unwrap_or("GET").parse()?;
    let expiry_secs = parse_expiry(params.expiry.as_deref().unwrap_or(DEFAULT_EXPIRY))?;

    let region = Region::Custom {
        region: params
            .region
            .clone()
            .unwrap_or_else(|| DEFAULT_REGION.to_string()),
        endpoint: params.endpoint.trim_end_matches('/').to_string(),
    };
    let credentials = Credentials::new(
        Some(params.access_key_id.as_str()),
        Some(params.secret_access_key.as_str()),
        None,
        params.session_token.as_deref(),
        None,
    )
    .map_err(|err| Error::Presign(err.to_string()))?;
    let bucket = Bucket::new(bucket_name, region, credentials)
        .map_err(|err| Error::Presign(err.to_string()))?
        .with_path_style();

    let path = format!("/{}", object);
    let url = match method {
        Method::Get => bucket.presign_get(&path, expiry_secs, None).await,
        Method::Put => bucket.presign_put(&path, expiry_secs, None, None).await,
    }
    .map_err(|err| Error::Presign(err.to_string()))?;

    if params.endpoint.starts_with("http://") {
        PresignedUrl::parse_insecure(&url)
    } else {
        PresignedUrl::parse(&url)
    }
}
