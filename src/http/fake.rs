//! In-memory transport for tests

use std::collections::VecDeque;
use std::sync::Mutex;

use super::{parse_header_lines, HttpRequest, HttpResponse, Transport, TransportError};

/// Canned responses served in order; records every request.
///
/// An `Err(reason)` entry simulates a transport failure.
#[derive(Default)]
pub struct FakeTransport {
    responses: Mutex<VecDeque<Result<HttpResponse, String>>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl FakeTransport {
    pub fn new(responses: Vec<Result<HttpResponse, String>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::default(),
        }
    }

    pub fn push(&self, responses: Vec<Result<HttpResponse, String>>) {
        self.responses.lock().unwrap().extend(responses);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for FakeTransport {
    async fn perform(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        self.requests.lock().unwrap().push(request.clone());
        let next = self
            .responses
            .lock()
            .unwrap()
            .pop_front()
            .expect("unexpected request");
        next.map_err(|reason| TransportError::InvalidHeader {
            name: request.url,
            reason,
        })
    }
}

/// Canned response from raw header lines and Netscape jar lines.
pub fn ok(
    status: u16,
    body: &str,
    header_lines: &[&str],
    jar: &[&str],
) -> Result<HttpResponse, String> {
    Ok(HttpResponse {
        status,
        body: body.to_string(),
        headers: parse_header_lines(header_lines),
        cookie_jar: jar.iter().map(|l| l.to_string()).collect(),
    })
}
