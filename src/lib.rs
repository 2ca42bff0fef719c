//! simple presigned url upload client
//!
//! The core is [`Uploader::upload`]: one streamed PUT of a local file to a
//! presigned url. The free functions below wrap it, together with
//! [`download`] and [`presign`], behind a blocking interface that takes json
//! params.
use flexi_logger::{Duplicate, FileSpec, Logger, LoggerHandle};
use log::{error, info};
use std::{
    sync::{Mutex, MutexGuard},
    time::Instant,
};
use tokio::runtime::Handle;

pub mod basic;
pub mod download;
pub mod error;
pub mod presign;
pub mod presigned_url;
pub mod upload;

pub use basic::{InitParams, ProgressCallback, TransferParams};
pub use download::{DownloadResult, Downloader};
pub use error::{Error, Result, TransportErrorKind};
pub use presign::PresignParams;
pub use presigned_url::PresignedUrl;
pub use upload::{FileHandle, UploadResult, Uploader};

static RUNTIME: Mutex<Option<tokio::runtime::Runtime>> = Mutex::new(None);
static LOGGER: Mutex<Option<LoggerHandle>> = Mutex::new(None);

/// init logger and tokio runtime
/// run this function before any other functions
/// # Arguments
/// * `params` - json, see [`InitParams`]
/// ** `log_path` - directory for log files, log to stderr if empty
pub fn init(params: &str) -> Result<()> {
    let params = serde_json::from_str::<InitParams>(params)?;
    init_logger(&params)?;
    let mut runtime = lock(&RUNTIME, "runtime")?;
    if runtime.is_some() {
        return Ok(());
    }
    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(Error::Runtime)?;
    *runtime = Some(rt);
    Ok(())
}

fn init_logger(params: &InitParams) -> Result<()> {
    let mut logger = lock(&LOGGER, "logger")?;
    if logger.is_some() {
        return Ok(());
    }
    let builder = Logger::try_with_env_or_str("info")?;
    let builder = if params.log_path.is_empty() {
        builder.log_to_stderr()
    } else {
        builder
            .log_to_file(FileSpec::default().directory(&params.log_path))
            .duplicate_to_stderr(Duplicate::Warn)
    };
    *logger = Some(builder.start()?);
    Ok(())
}

/// uninit tokio runtime
/// run this function to shutdown
pub fn uninit() {
    if let Ok(mut runtime) = RUNTIME.lock() {
        if let Some(rt) = runtime.take() {
            rt.shutdown_background();
        }
    }
    // the logger stays installed, the log facade can only be set once
    if let Ok(logger) = LOGGER.lock() {
        if let Some(handle) = logger.as_ref() {
            handle.flush();
        }
    }
}

fn lock<'a, T>(mutex: &'a Mutex<T>, name: &'static str) -> Result<MutexGuard<'a, T>> {
    mutex.lock().map_err(|_| Error::LockPoisoned(name))
}

fn runtime_handle() -> Result<Handle> {
    let runtime = lock(&RUNTIME, "runtime")?;
    runtime
        .as_ref()
        .map(|rt| rt.handle().clone())
        .ok_or(Error::RuntimeNotInitialized)
}

/// Upload a file to a presigned url, blocking until the storage endpoint
/// answered or the transfer failed.
/// # Arguments
/// * `params` - json, see [`TransferParams`]
/// ** `url` - the presigned PUT url
/// ** `file_path` - the file to upload
/// ** `allow_http` - accept plain http urls
/// ** `connect_timeout_secs` - connect timeout, 30s if not set
/// ** `timeout_secs` - timeout for the whole request, none if not set
/// * `progress_callback` - called with the percentage of the file sent
/// # Return
/// The endpoint's answer. A non-2xx status is returned, not raised.
pub fn upload(params: &str, progress_callback: Option<ProgressCallback>) -> Result<UploadResult> {
    let handle = runtime_handle()?;
    let params = serde_json::from_str::<TransferParams>(params)?;
    let url = params.presigned_url()?;
    let uploader = Uploader::new(basic::create_http_client(&params)?);
    let started = Instant::now();
    let (uploader, url_ref, file_path) = (&uploader, &url, &params.file_path);
    let result = handle.block_on(async move {
        let source = FileHandle::open(file_path).await?;
        match progress_callback {
            Some(progress_callback) => {
                uploader
                    .upload_with_progress(url_ref, source, progress_callback)
                    .await
            }
            None => uploader.upload(url_ref, source).await,
        }
    });
    match &result {
        Ok(result) => info!(
            "put {} finished: status {}, {} bytes in {:.2}s",
            url,
            result.status(),
            result.bytes_sent(),
            started.elapsed().as_secs_f64()
        ),
        Err(err) => error!("put {} failed: {}", url, err),
    }
    result
}

/// Download a presigned GET url into `file_path`.
/// # Arguments
/// * `params` - json, see [`TransferParams`]
pub fn download(params: &str) -> Result<DownloadResult> {
    let handle = runtime_handle()?;
    let params = serde_json::from_str::<TransferParams>(params)?;
    let url = params.presigned_url()?;
    let downloader = Downloader::new(basic::create_http_client(&params)?);
    let result = handle.block_on(downloader.download(&url, &params.file_path));
    match &result {
        Ok(result) => info!(
            "get {} finished: status {}, {} bytes",
            url,
            result.status(),
            result.bytes_written()
        ),
        Err(err) => error!("get {} failed: {}", url, err),
    }
    result
}

/// Generate a presigned url.
/// # Arguments
/// * `params` - json, see [`PresignParams`]
/// ** `endpoint` - storage endpoint, e.g. `https://storage.example.com:9443`
/// ** `target` - `bucket/object`
/// ** `method` - `GET` or `PUT`, default `GET`
/// ** `expiry` - e.g. `15m`, `24h`, default `1h`
pub fn presign(params: &str) -> Result<PresignedUrl> {
    let handle = runtime_handle()?;
    let params = serde_json::from_str::<PresignParams>(params)?;
    let result = handle.block_on(presign::presign(&params));
    if let Err(err) = &result {
        error!("presign {} failed: {}", params.target, err);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::{env, io::Write};

    #[test]
    fn test_init_rejects_bad_params() {
        assert!(matches!(init("not json"), Err(Error::Params(_))));
    }

    #[test]
    fn test_poisoned_lock_is_reported() {
        let mutex = std::sync::Arc::new(Mutex::new(0_u32));
        let poisoner = mutex.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.lock().unwrap();
            panic!("poison");
        })
        .join();
        assert!(matches!(
            lock(&*mutex, "runtime"),
            Err(Error::LockPoisoned("runtime"))
        ));
        assert!(lock(&Mutex::new(0_u32), "logger").is_ok());
    }

    #[test]
    fn test_upload_missing_file() {
        init(&json!({ "log_path": "" }).to_string()).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let params = json!({
            "url": "https://storage.example.com/mybucket/report.pdf?X-Amz-Signature=abc",
            "file_path": dir.path().join("missing.pdf"),
        });
        let err = upload(&params.to_string(), None).unwrap_err();
        assert!(err.is_resource());

        let params = json!({
            "url": "http://storage.example.com/mybucket/report.pdf?X-Amz-Signature=abc",
            "file_path": dir.path().join("missing.pdf"),
        });
        assert!(matches!(
            upload(&params.to_string(), None),
            Err(Error::InvalidUrl(_))
        ));
    }

    fn env_params() -> Option<(String, String, String, String)> {
        Some((
            env::var("S3_ENDPOINT").ok()?,
            env::var("S3_ACCESS_KEY_ID").ok()?,
            env::var("S3_SECRET_ACCESS_KEY").ok()?,
            env::var("S3_BUCKET").ok()?,
        ))
    }

    #[test]
    #[ignore]
    fn test() {
        let (endpoint, access_key_id, secret_access_key, bucket) =
            env_params().expect("S3_ENDPOINT, S3_ACCESS_KEY_ID, S3_SECRET_ACCESS_KEY, S3_BUCKET");
        init(&json!({ "log_path": "" }).to_string()).unwrap();
        let allow_http = endpoint.starts_with("http://");
        let presign_params = |method: &str, expiry: &str| {
            json!({
                "endpoint": endpoint,
                "access_key_id": access_key_id,
                "secret_access_key": secret_access_key,
                "target": format!("{}/report.pdf", bucket),
                "method": method,
                "expiry": expiry,
            })
            .to_string()
        };

        let content: Vec<u8> = (0..10 * 1024 * 1024).map(|i| (i * 31 % 256) as u8).collect();
        let mut source = tempfile::NamedTempFile::new().unwrap();
        source.write_all(&content).unwrap();
        source.flush().unwrap();
        let dir = tempfile::tempdir().unwrap();
        let downloaded = dir.path().join("report.pdf");

        println!("uploading begin");
        let put_url = presign(&presign_params("PUT", "15m")).unwrap();
        let result = upload(
            &json!({
                "url": put_url.as_str(),
                "file_path": source.path(),
                "allow_http": allow_http,
            })
            .to_string(),
            None,
        )
        .unwrap();
        assert_eq!(result.status().as_u16(), 200);
        println!("uploading finished");

        println!("downloading begin");
        let get_url = presign(&presign_params("GET", "15m")).unwrap();
        let result = download(
            &json!({
                "url": get_url.as_str(),
                "file_path": &downloaded,
                "allow_http": allow_http,
            })
            .to_string(),
        )
        .unwrap();
        assert!(result.is_success());
        assert_eq!(std::fs::read(&downloaded).unwrap(), content);
        println!("downloading finished");

        let expired_url = presign(&json!({
            "endpoint": endpoint,
            "access_key_id": access_key_id,
            "secret_access_key": secret_access_key,
            "target": format!("{}/expired.pdf", bucket),
            "method": "PUT",
            "expiry": "1s",
        })
        .to_string())
        .unwrap();
        std::thread::sleep(std::time::Duration::from_secs(2));
        let result = upload(
            &json!({
                "url": expired_url.as_str(),
                "file_path": source.path(),
                "allow_http": allow_http,
            })
            .to_string(),
            None,
        )
        .unwrap();
        assert_eq!(result.status().as_u16(), 403);
        uninit();
    }
}
