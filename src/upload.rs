use crate::{
    basic::{ProgressCallback, ProgressTracker},
    error::{Error, Result},
    presigned_url::PresignedUrl,
};
use bytes::{Bytes, BytesMut};
use futures::stream;
use reqwest::{
    header::{HeaderMap, CONTENT_LENGTH},
    Body, Client, StatusCode,
};
use std::{
    io::{self, SeekFrom},
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};
use tokio::{
    fs::File,
    io::{AsyncReadExt, AsyncSeekExt},
};

const CHUNK_SIZE: usize = 64 * 1024;

/// A local file opened for a single upload.
///
/// The handle is consumed by [`Uploader::upload`]; the file is closed when the
/// request body is dropped, whichever way the request ends.
#[derive(Debug)]
pub struct FileHandle {
    file: File,
    path: PathBuf,
    len: u64,
}

impl FileHandle {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .await
            .map_err(|err| Error::resource(path, err))?;
        Self::from_file(file, path).await
    }

    /// Adopt an open file. Everything from the current position to the end is
    /// sent.
    pub async fn from_file(mut file: File, path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let metadata = match file.metadata().await {
            Ok(metadata) => metadata,
            Err(err) => return Err(Error::resource(path, err)),
        };
        if !metadata.is_file() {
            return Err(Error::resource(
                path,
                io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
            ));
        }
        let position = match file.seek(SeekFrom::Current(0)).await {
            Ok(position) => position,
            Err(err) => return Err(Error::resource(path, err)),
        };
        Ok(Self {
            file,
            path,
            len: metadata.len().saturating_sub(position),
        })
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// What the storage endpoint answered. Any status is a valid result, callers
/// decide what a non-2xx status means for them.
#[derive(Debug, Clone)]
pub struct UploadResult {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
    bytes_sent: u64,
}

impl UploadResult {
    /// Only a 2xx status means the object is stored.
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn bytes_sent(&self) -> u64 {
        self.bytes_sent
    }
}

#[derive(Debug, Clone, Default)]
pub struct Uploader {
    client: Client,
}

impl Uploader {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// PUT the whole of `source` to `url` in one request.
    pub async fn upload(&self, url: &PresignedUrl, source: FileHandle) -> Result<UploadResult> {
        self.put_object(url, source, None).await
    }

    pub async fn upload_with_progress(
        &self,
        url: &PresignedUrl,
        source: FileHandle,
        progress_callback: ProgressCallback,
    ) -> Result<UploadResult> {
        self.put_object(url, source, Some(progress_callback)).await
    }

    /// Open `path` and upload it. A missing or unreadable file fails here,
    /// before any connection is made.
    pub async fn upload_file(
        &self,
        url: &PresignedUrl,
        path: impl AsRef<Path>,
    ) -> Result<UploadResult> {
        let source = FileHandle::open(path).await?;
        self.upload(url, source).await
    }

    async fn put_object(
        &self,
        url: &PresignedUrl,
        source: FileHandle,
        progress_callback: Option<ProgressCallback>,
    ) -> Result<UploadResult> {
        let FileHandle {
            mut file,
            path,
            len,
        } = source;
        // An empty body is never polled, so check for late writes up front.
        if len == 0 {
            if let Err(err) = ensure_exhausted(&mut file).await {
                return Err(Error::resource(path, err));
            }
        }
        let read_failure: Arc<Mutex<Option<io::Error>>> = Arc::new(Mutex::new(None));
        let body = file_body(file, len, read_failure.clone(), progress_callback.clone());

        // Content-Length is the only header added. Presigned PUTs are refused
        // with chunked transfer encoding and the signer did not sign a
        // content type.
        let sent = self
            .client
            .put(url.to_url())
            .header(CONTENT_LENGTH, len.to_string())
            .body(body)
            .send()
            .await;
        let response = match sent {
            Ok(response) => response,
            Err(err) => {
                let read_failure = read_failure.lock().ok().and_then(|mut slot| slot.take());
                return Err(match read_failure {
                    Some(read_err) => Error::resource(path, read_err),
                    None => Error::transport(err),
                });
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        let body = response.bytes().await.map_err(Error::transport)?;
        if len == 0 {
            if let Some(progress_callback) = progress_callback {
                progress_callback(100.0);
            }
        }
        Ok(UploadResult {
            status,
            headers,
            body,
            bytes_sent: len,
        })
    }
}

async fn ensure_exhausted(file: &mut File) -> io::Result<()> {
    let mut extra = [0_u8; 1];
    if file.read(&mut extra).await? != 0 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "file grew during upload",
        ));
    }
    Ok(())
}

struct FileBody {
    file: File,
    len: u64,
    sent: u64,
    progress_tracker: Option<ProgressTracker>,
}

impl FileBody {
    /// Read the next chunk, never past `len`. The last chunk is only released
    /// once the file is known to end there, so a file that changed size since
    /// it was opened can not be sent truncated.
    async fn next_chunk(&mut self) -> io::Result<Option<Bytes>> {
        let remaining = self.len - self.sent;
        if remaining == 0 {
            return Ok(None);
        }
        let mut buf = BytesMut::zeroed(remaining.min(CHUNK_SIZE as u64) as usize);
        let n = self.file.read(&mut buf).await?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "file shrank during upload",
            ));
        }
        buf.truncate(n);
        self.sent += n as u64;
        if self.sent == self.len {
            ensure_exhausted(&mut self.file).await?;
        }
        if let Some(tracker) = self.progress_tracker.as_mut() {
            tracker.track(n as u64);
        }
        Ok(Some(buf.freeze()))
    }
}

fn file_body(
    file: File,
    len: u64,
    read_failure: Arc<Mutex<Option<io::Error>>>,
    progress_callback: Option<ProgressCallback>,
) -> Body {
    let state = FileBody {
        file,
        len,
        sent: 0,
        progress_tracker: progress_callback.map(|callback| ProgressTracker::new(len, callback)),
    };
    let stream = stream::unfold(Some(state), move |state| {
        let read_failure = read_failure.clone();
        async move {
            let mut state = state?;
            match state.next_chunk().await {
                Ok(Some(chunk)) => Some((Ok(chunk), Some(state))),
                Ok(None) => None,
                Err(err) => {
                    let kind = err.kind();
                    if let Ok(mut slot) = read_failure.lock() {
                        *slot = Some(err);
                    }
                    Some((
                        Err(io::Error::new(kind, "reading upload source failed")),
                        None,
                    ))
                }
            }
        }
    });
    Body::wrap_stream(stream)
}
