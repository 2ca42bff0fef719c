use crate::{
    error::{Error, Result},
    presigned_url::PresignedUrl,
};
use bytes::Bytes;
use reqwest::{header::HeaderMap, Client, StatusCode};
use std::path::Path;
use tokio::{fs::File, io::AsyncWriteExt};

#[derive(Debug, Clone)]
pub struct DownloadResult {
    status: StatusCode,
    headers: HeaderMap,
    /// response body of a non-2xx answer, empty on success
    error_body: Bytes,
    bytes_written: u64,
}

impl DownloadResult {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn error_body(&self) -> &Bytes {
        &self.error_body
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }
}

#[derive(Debug, Clone, Default)]
pub struct Downloader {
    client: Client,
}

impl Downloader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// GET `url` into `dest`. The destination is only created once the
    /// endpoint answered with a 2xx status.
    pub async fn download(
        &self,
        url: &PresignedUrl,
        dest: impl AsRef<Path>,
    ) -> Result<DownloadResult> {
        let dest = dest.as_ref();
        let mut resp = self
            .client
            .get(url.to_url())
            .send()
            .await
            .map_err(Error::transport)?;
        let status = resp.status();
        let headers = resp.headers().clone();
        if !status.is_success() {
            let error_body = resp.bytes().await.map_err(Error::transport)?;
            return Ok(DownloadResult {
                status,
                headers,
                error_body,
                bytes_written: 0,
            });
        }

        let mut file = File::create(dest)
            .await
            .map_err(|err| Error::resource(dest, err))?;
        let mut byte_count = 0_u64;
        while let Some(bytes) = resp.chunk().await.map_err(Error::transport)? {
            file.write_all(&bytes)
                .await
                .map_err(|err| Error::resource(dest, err))?;
            byte_count += bytes.len() as u64;
        }
        file.flush().await.map_err(|err| Error::resource(dest, err))?;
        Ok(DownloadResult {
            status,
            headers,
            error_body: Bytes::new(),
            bytes_written: byte_count,
        })
    }
}
