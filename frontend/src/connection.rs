//! Data sources backed by the ground-station HTTP API
//!
//! The engine only sees [`DataSource`]; the HTTP plumbing sits behind
//! [`HttpTransport`] so hosts can plug in a browser fetch, reqwest or a test
//! double.

use crate::error::FetchError;
use crate::items::{SourceTag, TimedItem};
use crate::visualizer::timeline::time_domain::{TimeMs, ViewRange};
use futures::future::{FutureExt, LocalBoxFuture};
use serde::de::DeserializeOwned;
use shared::{ErrorResponse, EventRecord, PredictResponse, ScheduleEntry};
use std::cell::Cell;
use std::rc::Rc;

/// Query timestamp format understood by the backend.
pub const QUERY_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Produces the items of one kind overlapping a time window. Completes with
/// the full result in one response.
pub trait DataSource {
    fn source_tag(&self) -> SourceTag;

    fn fetch_items(&self, window: ViewRange) -> LocalBoxFuture<'static, Result<Vec<TimedItem>, FetchError>>;
}

/// Whether the user currently holds a credential. While it does not,
/// coordinators stay off the network.
pub trait CredentialGate {
    fn has_credential(&self) -> bool;
}

/// Credential flag flipped by the host.
#[derive(Debug, Default)]
pub struct StaticCredential {
    present: Cell<bool>,
}

impl StaticCredential {
    pub fn new(present: bool) -> Self {
        StaticCredential {
            present: Cell::new(present),
        }
    }

    pub fn set(&self, present: bool) {
        self.present.set(present);
    }
}

impl CredentialGate for StaticCredential {
    fn has_credential(&self) -> bool {
        self.present.get()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

pub trait HttpTransport {
    /// Issues a GET for `path_and_query` relative to the API base URL.
    /// Only transport failures are errors; any HTTP status is a response.
    fn get(&self, path_and_query: &str) -> LocalBoxFuture<'static, Result<HttpResponse, FetchError>>;
}

fn format_query_time(time: TimeMs) -> Result<String, FetchError> {
    time.to_datetime()
        .map(|datetime| datetime.format(QUERY_TIME_FORMAT).to_string())
        .ok_or_else(|| FetchError::InvalidRequest(format!("{}ms is out of range", time.0)))
}

pub fn range_query(path: &str, window: ViewRange) -> Result<String, FetchError> {
    Ok(format!(
        "{path}?start={}&end={}",
        format_query_time(window.start)?,
        format_query_time(window.end)?
    ))
}

/// Maps a response to `T`, translating HTTP failures into [`FetchError`].
pub fn decode_response<T: DeserializeOwned>(response: HttpResponse) -> Result<T, FetchError> {
    match response.status {
        401 | 403 => Err(FetchError::Unauthorized),
        _ if response.is_success() => Ok(serde_json::from_str(&response.body)?),
        status => {
            let message = match serde_json::from_str::<ErrorResponse>(&response.body) {
                Ok(ErrorResponse {
                    error,
                    message: Some(message),
                }) => format!("{error}: {message}"),
                Ok(ErrorResponse { error, .. }) => error,
                Err(_) => response.body.trim().to_string(),
            };
            Err(FetchError::Server { status, message })
        }
    }
}

fn get_json<T: DeserializeOwned + 'static>(
    transport: &Rc<dyn HttpTransport>,
    path: &str,
    window: ViewRange,
) -> LocalBoxFuture<'static, Result<T, FetchError>> {
    let request = match range_query(path, window) {
        Ok(path_and_query) => transport.get(&path_and_query),
        Err(error) => return futures::future::ready(Err(error)).boxed_local(),
    };
    async move { decode_response(request.await?) }.boxed_local()
}

/// `GET {path}?start&end` returning schedule rows.
pub struct ScheduleSource {
    transport: Rc<dyn HttpTransport>,
    path: String,
}

impl ScheduleSource {
    pub fn new(transport: Rc<dyn HttpTransport>, path: impl Into<String>) -> Self {
        ScheduleSource {
            transport,
            path: path.into(),
        }
    }
}

impl DataSource for ScheduleSource {
    fn source_tag(&self) -> SourceTag {
        SourceTag::Schedule
    }

    fn fetch_items(&self, window: ViewRange) -> LocalBoxFuture<'static, Result<Vec<TimedItem>, FetchError>> {
        get_json::<Vec<ScheduleEntry>>(&self.transport, &self.path, window)
            .map(|rows| Ok(rows?.into_iter().map(TimedItem::from).collect()))
            .boxed_local()
    }
}

/// `GET {path}?start&end` returning predicted passes.
pub struct PassSource {
    transport: Rc<dyn HttpTransport>,
    path: String,
}

impl PassSource {
    pub fn new(transport: Rc<dyn HttpTransport>, path: impl Into<String>) -> Self {
        PassSource {
            transport,
            path: path.into(),
        }
    }
}

impl DataSource for PassSource {
    fn source_tag(&self) -> SourceTag {
        SourceTag::Pass
    }

    fn fetch_items(&self, window: ViewRange) -> LocalBoxFuture<'static, Result<Vec<TimedItem>, FetchError>> {
        get_json::<PredictResponse>(&self.transport, &self.path, window)
            .map(|response| Ok(response?.passes.into_iter().map(TimedItem::from).collect()))
            .boxed_local()
    }
}

/// `GET {path}?start&end` returning generic event records.
pub struct EventSource {
    transport: Rc<dyn HttpTransport>,
    path: String,
}

impl EventSource {
    pub fn new(transport: Rc<dyn HttpTransport>, path: impl Into<String>) -> Self {
        EventSource {
            transport,
            path: path.into(),
        }
    }
}

impl DataSource for EventSource {
    fn source_tag(&self) -> SourceTag {
        SourceTag::Event
    }

    fn fetch_items(&self, window: ViewRange) -> LocalBoxFuture<'static, Result<Vec<TimedItem>, FetchError>> {
        get_json::<Vec<EventRecord>>(&self.transport, &self.path, window)
            .map(|rows| Ok(rows?.into_iter().map(TimedItem::from).collect()))
            .boxed_local()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct CannedTransport {
        response: HttpResponse,
        requested: RefCell<Vec<String>>,
    }

    impl CannedTransport {
        fn new(status: u16, body: &str) -> Rc<Self> {
            Rc::new(CannedTransport {
                response: HttpResponse {
                    status,
                    body: body.to_string(),
                },
                requested: RefCell::new(Vec::new()),
            })
        }
    }

    impl HttpTransport for CannedTransport {
        fn get(&self, path_and_query: &str) -> LocalBoxFuture<'static, Result<HttpResponse, FetchError>> {
            self.requested.borrow_mut().push(path_and_query.to_string());
            futures::future::ready(Ok(self.response.clone())).boxed_local()
        }
    }

    fn window() -> ViewRange {
        ViewRange::parse("2025-01-01T00:00:00Z", "2025-01-01T06:30:00Z").unwrap()
    }

    #[tokio::test]
    async fn schedule_source_formats_query_and_decodes() {
        let transport = CannedTransport::new(
            200,
            r#"[{"id":"night","state":"awaiting_approval","start":"2025-01-01T01:00:00Z","end":"2025-01-01T02:00:00Z"}]"#,
        );
        let source = ScheduleSource::new(transport.clone(), "/api/schedules");

        let items = source.fetch_items(window()).await.unwrap();

        assert_eq!(
            transport.requested.borrow().as_slice(),
            ["/api/schedules?start=2025-01-01T00:00:00Z&end=2025-01-01T06:30:00Z"]
        );
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].status(), Some("awaiting_approval"));
    }

    #[tokio::test]
    async fn pass_source_unwraps_predict_response() {
        let transport = CannedTransport::new(
            200,
            r#"{"passes":[{"satellite":"ISS","norad_id":25544,"aos":"2025-01-01T01:00:00Z","los":"2025-01-01T01:10:00Z","tca":"2025-01-01T01:05:00Z","max_elevation_deg":61.2,"aos_azimuth_deg":200.0,"los_azimuth_deg":40.0,"duration_seconds":600}],"satellite_count":1}"#,
        );
        let items = PassSource::new(transport, "/api/predict")
            .fetch_items(window())
            .await
            .unwrap();
        assert_eq!(items[0].source_tag(), SourceTag::Pass);
        assert_eq!(items[0].id(), "25544-1735693200000");
    }

    #[tokio::test]
    async fn maps_http_failures() {
        let unauthorized = CannedTransport::new(401, "");
        assert_eq!(
            ScheduleSource::new(unauthorized, "/api/schedules").fetch_items(window()).await,
            Err(FetchError::Unauthorized)
        );

        let server = CannedTransport::new(500, r#"{"error":"internal","message":"tle cache missing"}"#);
        assert_eq!(
            PassSource::new(server, "/api/predict").fetch_items(window()).await,
            Err(FetchError::Server {
                status: 500,
                message: "internal: tle cache missing".to_string()
            })
        );

        let garbage = CannedTransport::new(200, "<html>");
        assert!(matches!(
            EventSource::new(garbage, "/api/events").fetch_items(window()).await,
            Err(FetchError::Decode(_))
        ));
    }

    #[test]
    fn credential_flag_toggles() {
        let credential = StaticCredential::new(false);
        assert!(!credential.has_credential());
        credential.set(true);
        assert!(credential.has_credential());
    }
}
