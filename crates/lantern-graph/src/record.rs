//! Recorded page-load input
//!
//! The network request log and the main-thread task list captured from one
//! real page load. These are produced outside this crate and consumed by
//! [`crate::PageGraphBuilder`].

use serde::{Deserialize, Serialize};

/// Resource type reported by the browser for a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Document,
    Script,
    Stylesheet,
    Image,
    Font,
    Media,
    Xhr,
    Fetch,
    #[default]
    #[serde(other)]
    Other,
}

/// Application protocol of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Protocol {
    #[default]
    #[serde(rename = "h1", alias = "http/1.1", alias = "http/1.0")]
    H1,
    #[serde(rename = "h2")]
    H2,
    #[serde(rename = "h3", alias = "quic")]
    H3,
}

impl Protocol {
    /// Whether several requests can share one connection concurrently
    #[inline]
    #[must_use]
    pub fn supports_multiplexing(self) -> bool {
        matches!(self, Protocol::H2 | Protocol::H3)
    }
}

/// Category of a top-level main-thread task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TaskKind {
    ScriptEvaluation,
    ParseHtml,
    Layout,
    Paint,
    #[default]
    #[serde(other)]
    Other,
}

impl TaskKind {
    /// Tasks that evaluate or parse a downloaded resource
    #[must_use]
    pub fn consumes_resource(self) -> bool {
        matches!(self, TaskKind::ScriptEvaluation | TaskKind::ParseHtml)
    }

    /// Style, layout and paint work
    #[must_use]
    pub fn is_render(self) -> bool {
        matches!(self, TaskKind::Layout | TaskKind::Paint)
    }
}

fn default_true() -> bool {
    true
}

/// One entry of the network log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkRequest {
    pub request_id: String,
    pub url: String,
    /// Derived from `url` when absent
    #[serde(default)]
    pub origin: Option<String>,
    #[serde(default)]
    pub resource_type: ResourceType,
    #[serde(default)]
    pub transfer_size: u64,
    #[serde(default)]
    pub protocol: Protocol,
    /// URL of the document or script that issued the request
    #[serde(default)]
    pub initiator_url: Option<String>,
    /// Request id of the initiator, when the log knows it exactly
    #[serde(default)]
    pub initiator_request_id: Option<String>,
    /// Request id of the previous hop when this request is a redirect target
    #[serde(default)]
    pub redirect_source: Option<String>,
    #[serde(default = "default_true")]
    pub is_connection_reusable: bool,
    #[serde(default)]
    pub server_response_time_ms: f64,
    pub start_time_ms: f64,
    pub end_time_ms: f64,
}

impl NetworkRequest {
    /// Minimal record, mostly for tests and fixtures
    #[must_use]
    pub fn new(
        request_id: impl Into<String>,
        url: impl Into<String>,
        start_ms: f64,
        end_ms: f64,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            url: url.into(),
            origin: None,
            resource_type: ResourceType::Other,
            transfer_size: 0,
            protocol: Protocol::H1,
            initiator_url: None,
            initiator_request_id: None,
            redirect_source: None,
            is_connection_reusable: true,
            server_response_time_ms: 0.0,
            start_time_ms: start_ms,
            end_time_ms: end_ms,
        }
    }

    #[must_use]
    pub fn with_resource_type(mut self, resource_type: ResourceType) -> Self {
        self.resource_type = resource_type;
        self
    }

    #[must_use]
    pub fn with_transfer_size(mut self, bytes: u64) -> Self {
        self.transfer_size = bytes;
        self
    }

    #[must_use]
    pub fn with_initiator_url(mut self, url: impl Into<String>) -> Self {
        self.initiator_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_initiator_request(mut self, request_id: impl Into<String>) -> Self {
        self.initiator_request_id = Some(request_id.into());
        self
    }

    #[must_use]
    pub fn with_redirect_source(mut self, request_id: impl Into<String>) -> Self {
        self.redirect_source = Some(request_id.into());
        self
    }

    #[must_use]
    pub fn with_server_response_time(mut self, ms: f64) -> Self {
        self.server_response_time_ms = ms;
        self
    }

    #[must_use]
    pub fn with_protocol(mut self, protocol: Protocol) -> Self {
        self.protocol = protocol;
        self
    }
}

/// One top-level main-thread task from the trace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceTask {
    pub start_time_ms: f64,
    pub duration_ms: f64,
    #[serde(default)]
    pub attributed_url: Option<String>,
    #[serde(default)]
    pub kind: TaskKind,
    /// Request ids sent while this task was running
    #[serde(default)]
    pub initiated_requests: Vec<String>,
    #[serde(default)]
    pub timers_installed: Vec<u64>,
    #[serde(default)]
    pub timers_fired: Vec<u64>,
}

impl TraceTask {
    #[must_use]
    pub fn new(start_ms: f64, duration_ms: f64, kind: TaskKind) -> Self {
        Self {
            start_time_ms: start_ms,
            duration_ms,
            attributed_url: None,
            kind,
            initiated_requests: Vec::new(),
            timers_installed: Vec::new(),
            timers_fired: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_attribution(mut self, url: impl Into<String>) -> Self {
        self.attributed_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn with_initiated_request(mut self, request_id: impl Into<String>) -> Self {
        self.initiated_requests.push(request_id.into());
        self
    }

    #[must_use]
    pub fn with_timer_installed(mut self, timer_id: u64) -> Self {
        self.timers_installed.push(timer_id);
        self
    }

    #[must_use]
    pub fn with_timer_fired(mut self, timer_id: u64) -> Self {
        self.timers_fired.push(timer_id);
        self
    }

    #[must_use]
    pub fn end_time_ms(&self) -> f64 {
        self.start_time_ms + self.duration_ms
    }

    /// Whether the task was running at `time_ms` (inclusive bounds)
    #[must_use]
    pub fn contains(&self, time_ms: f64) -> bool {
        self.start_time_ms <= time_ms && time_ms <= self.end_time_ms()
    }
}

/// A recorded page load: network log plus main-thread tasks
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageLoad {
    #[serde(default)]
    pub requests: Vec<NetworkRequest>,
    #[serde(default)]
    pub tasks: Vec<TraceTask>,
}
