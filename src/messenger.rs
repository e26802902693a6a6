use std::{
    collections::HashMap,
    fmt::Debug,
    io::Cursor,
    ops::DerefMut,
    sync::{
        atomic::{AtomicI32, Ordering},
        Arc,
    },
};

use parking_lot::{Mutex, RwLock};
use thiserror::Error;
use tokio::{
    io::{AsyncRead, AsyncWrite, ReadHalf, WriteHalf},
    sync::{
        oneshot::{channel, Sender},
        Mutex as AsyncMutex,
    },
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::protocol::{
    api_key::ApiKey,
    api_version::{ApiVersion, ApiVersionRange},
    frame::{AsyncMessageRead, AsyncMessageWrite, ReadFrameError, WriteFrameError},
    messages::{
        ApiVersionsRequest, ReadVersionedError, ReadVersionedType, RequestBody, RequestHeader,
        ResponseHeader, WriteVersionedError, WriteVersionedType,
    },
    primitives::TaggedFields,
    traits::ReadType,
};

#[derive(Debug)]
struct Response {
    #[allow(dead_code)]
    header: ResponseHeader,
    data: Cursor<Vec<u8>>,
}

#[derive(Debug)]
struct ActiveRequest {
    channel: Sender<Result<Response, RequestError>>,
    use_tagged_fields_in_response: bool,
}

#[derive(Debug)]
enum MessengerState {
    /// Currently active requests by correlation ID.
    ///
    /// An active request is one that got prepared or sent but the response wasn't received yet.
    RequestMap(HashMap<i32, ActiveRequest>),

    /// One or our streams died and we are unable to process any more requests.
    Poison(Arc<RequestError>),
}

impl MessengerState {
    fn poison(&mut self, err: RequestError) -> Arc<RequestError> {
        match self {
            Self::RequestMap(map) => {
                let err = Arc::new(err);

                // inform all active requests
                for (_correlation_id, active_request) in map.drain() {
                    // it's OK if the other side is gone
                    active_request
                        .channel
                        .send(Err(RequestError::Poisoned(Arc::clone(&err))))
                        .ok();
                }

                *self = Self::Poison(Arc::clone(&err));
                err
            }
            Self::Poison(e) => {
                // already poisoned, keep the first error
                Arc::clone(e)
            }
        }
    }
}

/// A connection to a single broker.
///
/// Note that this is not a connection pool, one messenger maps to exactly one TCP (or TLS) stream. Requests may be
/// issued concurrently, responses are matched to their request by correlation ID.
pub struct Messenger<RW> {
    /// The half of the stream that we use to send data TO the broker.
    ///
    /// This will be used by [`request`](Self::request) to queue up messages.
    stream_write: Arc<AsyncMutex<WriteHalf<RW>>>,

    /// Client ID sent in every request header.
    client_id: Arc<str>,

    /// The next correlation ID.
    ///
    /// This is used to map responses to active requests.
    correlation_id: AtomicI32,

    /// Version ranges that we think are supported by the broker.
    ///
    /// This needs to be bootstrapped by [`sync_versions`](Self::sync_versions).
    version_ranges: RwLock<HashMap<ApiKey, ApiVersionRange>>,

    /// Current stream state.
    ///
    /// Note that this and `stream_write` are separate struct to allow sending and receiving data concurrently.
    state: Arc<Mutex<MessengerState>>,

    /// Join handle for the background worker that fetches responses.
    join_handle: JoinHandle<()>,
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum RequestError {
    #[error("Cannot find matching version for: {api_key:?}")]
    NoVersionMatch { api_key: ApiKey },

    #[error("Cannot write data: {0}")]
    WriteError(#[from] WriteVersionedError),

    #[error("Cannot write versioned data: {0}")]
    WriteMessageError(#[from] WriteFrameError),

    #[error("Cannot read data: {0}")]
    ReadError(#[from] ReadVersionedError),

    #[error("Cannot read versioned data: {0}")]
    ReadFramedMessageError(#[from] ReadFrameError),

    #[error("Connection is poisoned: {0}")]
    Poisoned(Arc<RequestError>),

    #[error(
        "Data left at the end of the message. Got {message_size} bytes but only read {read} bytes. \
        api_key={api_key:?} api_version={api_version}"
    )]
    TooMuchData {
        message_size: u64,
        read: u64,
        api_key: ApiKey,
        api_version: ApiVersion,
    },

    #[error("Cannot read/write data: {0}")]
    IO(#[from] std::io::Error),
}

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum SyncVersionsError {
    #[error("Did not find a version for ApiVersion that works with that broker")]
    NoWorkingVersion,

    #[error("Request error: {0}")]
    RequestError(#[from] RequestError),
}

impl<RW> Messenger<RW>
where
    RW: AsyncRead + AsyncWrite + Send + 'static,
{
    pub fn new(stream: RW, max_message_size: usize, client_id: Arc<str>) -> Self {
        let (stream_read, stream_write) = tokio::io::split(stream);
        let state = Arc::new(Mutex::new(MessengerState::RequestMap(HashMap::default())));
        let state_captured = Arc::clone(&state);

        let join_handle = tokio::spawn(Self::read_loop(
            stream_read,
            max_message_size,
            state_captured,
        ));

        Self {
            stream_write: Arc::new(AsyncMutex::new(stream_write)),
            client_id,
            correlation_id: AtomicI32::new(0),
            version_ranges: RwLock::new(HashMap::new()),
            state,
            join_handle,
        }
    }

    async fn read_loop(
        mut stream_read: ReadHalf<RW>,
        max_message_size: usize,
        state: Arc<Mutex<MessengerState>>,
    ) {
        loop {
            let msg = match stream_read.read_message(max_message_size).await {
                Ok(msg) => msg,
                Err(e) => {
                    // the stream is unusable from here on, error out all pending and future requests
                    state
                        .lock()
                        .poison(RequestError::ReadFramedMessageError(e));
                    return;
                }
            };

            let mut cursor = Cursor::new(msg);

            // peek the correlation ID, the header version depends on the request it belongs to
            let correlation_id = match i32::read(&mut cursor) {
                Ok(id) => id,
                Err(e) => {
                    state.lock().poison(RequestError::ReadError(e.into()));
                    return;
                }
            };
            cursor.set_position(0);

            let active_request = match state.lock().deref_mut() {
                MessengerState::RequestMap(map) => map.remove(&correlation_id),
                MessengerState::Poison(_) => return,
            };

            let Some(active_request) = active_request else {
                warn!(correlation_id, "Got response for unknown request");
                continue;
            };

            let header_version = if active_request.use_tagged_fields_in_response {
                ApiVersion(1)
            } else {
                ApiVersion(0)
            };

            let res = ResponseHeader::read_versioned(&mut cursor, header_version)
                .map(|header| Response {
                    header,
                    data: cursor,
                })
                .map_err(RequestError::from);

            // we don't care if the other side is gone
            active_request.channel.send(res).ok();
        }
    }

    /// The stream died, every further request fails.
    pub fn is_poisoned(&self) -> bool {
        matches!(*self.state.lock(), MessengerState::Poison(_))
    }

    /// Replace the version ranges the broker is assumed to support.
    fn set_version_ranges(&self, ranges: HashMap<ApiKey, ApiVersionRange>) {
        *self.version_ranges.write() = ranges;
    }

    pub async fn request<R>(&self, msg: R) -> Result<R::ResponseBody, RequestError>
    where
        R: RequestBody + Send + WriteVersionedType<Vec<u8>>,
        R::ResponseBody: ReadVersionedType<Cursor<Vec<u8>>>,
    {
        let body_api_version = self
            .version_ranges
            .read()
            .get(&R::API_KEY)
            .and_then(|range_server| range_server.highest_common(&R::API_VERSION_RANGE))
            .ok_or(RequestError::NoVersionMatch {
                api_key: R::API_KEY,
            })?;

        // determine if our request and response headers shall contain tagged fields
        let use_tagged_fields_in_request =
            body_api_version >= R::FIRST_TAGGED_FIELD_IN_REQUEST_VERSION;
        let use_tagged_fields_in_response =
            body_api_version >= R::FIRST_TAGGED_FIELD_IN_RESPONSE_VERSION;

        // Correlation ID so that we can de-multiplex the responses.
        let correlation_id = self.correlation_id.fetch_add(1, Ordering::SeqCst);

        let header = RequestHeader {
            request_api_key: R::API_KEY,
            request_api_version: body_api_version,
            correlation_id,
            client_id: Some(String::from(self.client_id.as_ref())),
            tagged_fields: Some(TaggedFields::default()),
        };
        let header_version = if use_tagged_fields_in_request {
            ApiVersion(2)
        } else {
            ApiVersion(1)
        };

        let mut buf = Vec::new();
        header.write_versioned(&mut buf, header_version)?;
        msg.write_versioned(&mut buf, body_api_version)?;

        let (tx, rx) = channel();

        // remove the request from the map if this future gets dropped before the response arrived
        let _cleanup = CleanupRequestStateOnDrop {
            state: Arc::clone(&self.state),
            correlation_id,
        };

        match self.state.lock().deref_mut() {
            MessengerState::RequestMap(map) => {
                map.insert(
                    correlation_id,
                    ActiveRequest {
                        channel: tx,
                        use_tagged_fields_in_response,
                    },
                );
            }
            MessengerState::Poison(e) => {
                return Err(RequestError::Poisoned(Arc::clone(e)));
            }
        }

        self.send_message(buf).await?;

        let mut response = rx.await.map_err(|_| {
            RequestError::IO(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "connection reader stopped",
            ))
        })??;

        let body = R::ResponseBody::read_versioned(&mut response.data, body_api_version)?;

        // check if we fully consumed the message, otherwise there might be a bug in our protocol code
        let read_bytes = response.data.position();
        let message_bytes = response.data.into_inner().len() as u64;
        if read_bytes != message_bytes {
            return Err(RequestError::TooMuchData {
                message_size: message_bytes,
                read: read_bytes,
                api_key: R::API_KEY,
                api_version: body_api_version,
            });
        }

        Ok(body)
    }

    async fn send_message(&self, msg: Vec<u8>) -> Result<(), RequestError> {
        match self.send_message_inner(msg).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // a partially written message leaves the stream in an undefined state
                let e = self.state.lock().poison(e);
                Err(RequestError::Poisoned(e))
            }
        }
    }

    async fn send_message_inner(&self, msg: Vec<u8>) -> Result<(), RequestError> {
        let stream_write = Arc::clone(&self.stream_write);

        // run the write in its own task so that a cancelled request can't leave half a frame on the wire
        tokio::spawn(async move {
            let mut stream_write = stream_write.lock().await;
            stream_write.write_message(&msg).await
        })
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;

        Ok(())
    }

    /// Ask the broker which API versions it supports.
    ///
    /// Older brokers reject newer `ApiVersions` requests, so versions are tried from the highest one down.
    pub async fn sync_versions(&self) -> Result<(), SyncVersionsError> {
        let range = ApiVersionsRequest::API_VERSION_RANGE;

        for upper_bound in (range.min().0..=range.max().0).rev() {
            self.set_version_ranges(HashMap::from([(
                ApiKey::ApiVersions,
                ApiVersionRange::new(upper_bound, upper_bound),
            )]));

            let body = ApiVersionsRequest {
                client_software_name: Some(String::from(env!("CARGO_PKG_NAME"))),
                client_software_version: Some(String::from(env!("CARGO_PKG_VERSION"))),
                tagged_fields: Some(TaggedFields::default()),
            };

            match self.request(body).await {
                Ok(response) => {
                    if let Some(e) = response.error_code {
                        debug!(
                            %e,
                            version=upper_bound,
                            "Got error during version sync, cannot use version for ApiVersionRequest",
                        );
                        continue;
                    }

                    let mut ranges = HashMap::with_capacity(response.api_keys.len());
                    for api_key in response.api_keys {
                        match api_key.range() {
                            Some(range) => {
                                ranges.insert(api_key.api_key, range);
                            }
                            None => {
                                warn!(
                                    api_key=?api_key.api_key,
                                    min_version=%api_key.min_version,
                                    max_version=%api_key.max_version,
                                    "Broker reported an empty version range, ignoring API",
                                );
                            }
                        }
                    }

                    debug!(
                        versions=%sorted_ranges_repr(&ranges),
                        "Detected supported broker versions",
                    );
                    self.set_version_ranges(ranges);
                    return Ok(());
                }
                Err(RequestError::ReadError(e)) => {
                    debug!(
                        %e,
                        version=upper_bound,
                        "Cannot read ApiVersionResponse for version",
                    );
                    continue;
                }
                Err(e @ RequestError::TooMuchData { .. }) => {
                    debug!(
                        %e,
                        version=upper_bound,
                        "Cannot read ApiVersionResponse for version",
                    );
                    continue;
                }
                Err(e) => {
                    return Err(SyncVersionsError::RequestError(e));
                }
            }
        }

        Err(SyncVersionsError::NoWorkingVersion)
    }
}

impl<RW> Debug for Messenger<RW> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Messenger")
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl<RW> Drop for Messenger<RW> {
    fn drop(&mut self) {
        self.join_handle.abort();
    }
}

fn sorted_ranges_repr(ranges: &HashMap<ApiKey, ApiVersionRange>) -> String {
    let mut ranges: Vec<_> = ranges.iter().map(|(key, range)| (*key, *range)).collect();
    ranges.sort_by_key(|(key, _range)| *key);
    let ranges: Vec<_> = ranges
        .into_iter()
        .map(|(key, range)| format!("{key:?}: {range}"))
        .collect();
    ranges.join(", ")
}

struct CleanupRequestStateOnDrop {
    state: Arc<Mutex<MessengerState>>,
    correlation_id: i32,
}

impl Drop for CleanupRequestStateOnDrop {
    fn drop(&mut self) {
        if let MessengerState::RequestMap(map) = self.state.lock().deref_mut() {
            map.remove(&self.correlation_id);
        }
    }
}
