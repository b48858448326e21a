//! HTTP access logging middleware
//!
//! Emits one line per request in the configured [`LogFormat`] and writes it to the
//! [`LogStream`](super::LogStream), so access lines reach every log transport.

use std::net::SocketAddr;
use std::time::Instant;

use axum::body::HttpBody;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, Version};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, Utc};
use colored::Colorize;

use super::format::LogFormat;
use super::stream::RequestLogOptions;

/// Everything an access line may show about one request/response pair
#[derive(Debug, Clone)]
pub struct AccessRecord {
    pub remote_addr: Option<String>,
    pub date: DateTime<Utc>,
    pub method: String,
    pub url: String,
    pub http_version: &'static str,
    pub status: u16,
    pub content_length: Option<u64>,
    pub referrer: Option<String>,
    pub user_agent: Option<String>,
    pub response_time_ms: f64,
}

fn or_dash(value: Option<&str>) -> &str {
    value.filter(|v| !v.is_empty()).unwrap_or("-")
}

fn header_value(headers: &HeaderMap, name: header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

fn http_version(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2.0",
        Version::HTTP_3 => "3.0",
        _ => "1.1",
    }
}

impl AccessRecord {
    /// Render the record in the given format
    pub fn format(&self, format: LogFormat) -> String {
        let addr = or_dash(self.remote_addr.as_deref());
        let length = self
            .content_length
            .map(|l| l.to_string())
            .unwrap_or_else(|| "-".to_string());
        let time = format!("{:.3}", self.response_time_ms);

        match format {
            LogFormat::Combined => format!(
                "{} - - [{}] \"{} {} HTTP/{}\" {} {} \"{}\" \"{}\"",
                addr,
                self.clf_date(),
                self.method,
                self.url,
                self.http_version,
                self.status,
                length,
                or_dash(self.referrer.as_deref()),
                or_dash(self.user_agent.as_deref()),
            ),
            LogFormat::Common => format!(
                "{} - - [{}] \"{} {} HTTP/{}\" {} {}",
                addr,
                self.clf_date(),
                self.method,
                self.url,
                self.http_version,
                self.status,
                length,
            ),
            LogFormat::Dev => format!(
                "{} {} {} {} ms - {}",
                self.method,
                self.url,
                self.colored_status(),
                time,
                length
            ),
            LogFormat::Short => format!(
                "{} - {} {} HTTP/{} {} {} - {} ms",
                addr, self.method, self.url, self.http_version, self.status, length, time
            ),
            LogFormat::Tiny => format!(
                "{} {} {} {} - {} ms",
                self.method, self.url, self.status, length, time
            ),
        }
    }

    fn clf_date(&self) -> String {
        self.date.format("%d/%b/%Y:%H:%M:%S %z").to_string()
    }

    fn colored_status(&self) -> String {
        let status = self.status.to_string();
        match self.status {
            500.. => status.red().to_string(),
            400..=499 => status.yellow().to_string(),
            300..=399 => status.cyan().to_string(),
            200..=299 => status.green().to_string(),
            _ => status,
        }
    }
}

/// Middleware writing one access line per request
pub async fn log_requests(
    State(options): State<RequestLogOptions>,
    request: Request,
    next: Next,
) -> Response {
    let started = Instant::now();
    let date = Utc::now();

    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string());
    let method = request.method().to_string();
    let url = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str().to_string())
        .unwrap_or_else(|| request.uri().path().to_string());
    let version = http_version(request.version());
    let referrer = header_value(request.headers(), header::REFERER);
    let user_agent = header_value(request.headers(), header::USER_AGENT);

    let response = next.run(request).await;

    let content_length = header_value(response.headers(), header::CONTENT_LENGTH)
        .and_then(|v| v.parse().ok())
        .or_else(|| response.body().size_hint().exact());

    let record = AccessRecord {
        remote_addr,
        date,
        method,
        url,
        http_version: version,
        status: response.status().as_u16(),
        content_length,
        referrer,
        user_agent,
        response_time_ms: started.elapsed().as_secs_f64() * 1000.0,
    };

    options.stream.write_line(&record.format(options.format));

    response
}
