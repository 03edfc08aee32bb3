//! Web request collaborator.

use bytes::Bytes;

use crate::scheduler::Scheduler;

/// A request issued from script space.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

/// A completed response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Bytes,
}

/// Completion handed to [`WebRequest::perform`]. Invoked exactly once,
/// with either the response or a transport-level error description.
pub type RequestCallback = Box<dyn FnOnce(Result<HttpResponse, String>) + Send>;

/// Fetches a resource asynchronously.
///
/// The engine delivers failures into script space as an `error` field
/// on the response object, so implementations should report transport
/// errors through the callback rather than panicking. Retry policy, if
/// any, belongs to the implementation.
pub trait WebRequest: Send + Sync {
    fn perform(&self, request: HttpRequest, done: RequestCallback);
}

impl<T: WebRequest + ?Sized> WebRequest for std::sync::Arc<T> {
    fn perform(&self, request: HttpRequest, done: RequestCallback) {
        (**self).perform(request, done)
    }
}

/// Default web request implementation.
///
/// Runs a blocking `reqwest` GET on the scheduler, keeping network I/O
/// off the script thread.
pub struct DefaultWebRequest {
    scheduler: Scheduler,
}

impl DefaultWebRequest {
    pub fn new(scheduler: Scheduler) -> Self {
        Self { scheduler }
    }
}

impl WebRequest for DefaultWebRequest {
    fn perform(&self, request: HttpRequest, done: RequestCallback) {
        self.scheduler.spawn(Box::new(move || {
            done(execute_fetch(request));
        }));
    }
}

fn execute_fetch(request: HttpRequest) -> Result<HttpResponse, String> {
    let client = reqwest::blocking::Client::new();

    let mut req_builder = client.get(&request.url);
    for (key, value) in &request.headers {
        req_builder = req_builder.header(key, value);
    }

    let response = req_builder
        .send()
        .map_err(|e| format!("Request failed: {}", e))?;

    let status = response.status().as_u16();

    let mut headers = Vec::new();
    for (key, value) in response.headers() {
        if let Ok(value_str) = value.to_str() {
            headers.push((key.to_string(), value_str.to_string()));
        }
    }

    let body = response
        .bytes()
        .map_err(|e| format!("Failed to read body: {}", e))?;

    Ok(HttpResponse {
        status,
        headers,
        body,
    })
}
