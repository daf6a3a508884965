//! HTTP ingest API
//!
//! Routes:
//! - `POST /telemetry`: ingest one JSON or CBOR payload
//! - `GET /latest`: latest row of every table
//! - `GET /series?limit=N`: humidity and mold-risk timeline
//! - `GET /alerts?limit=N`: newest alerts
//! - `GET /health`: service identity
//!
//! Routing lives in [`ApiServer::handle`], which never touches the socket.

use std::io::Read;

use log::{debug, error, info, warn};
use serde::Serialize;
use serde_json::json;
use tiny_http::{Header, Request, Response, Server};

use crate::error::TelemetryError;
use crate::pipeline::IngestProcessor;
use crate::schema::{PayloadCodec, SCHEMA_VERSION};
use crate::{PRODUCER_NAME, VERSION};

const DEFAULT_SERIES_LIMIT: usize = 300;
const DEFAULT_ALERTS_LIMIT: usize = 50;

/// Response produced by the router
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl ApiResponse {
    fn json<T: Serialize>(status: u16, value: &T) -> Self {
        match serde_json::to_vec(value) {
            Ok(body) => Self { status, body },
            Err(e) => Self::detail(500, &e.to_string()),
        }
    }

    fn detail(status: u16, message: &str) -> Self {
        let body = json!({ "detail": message }).to_string().into_bytes();
        Self { status, body }
    }

    /// Body parsed as JSON (for tests and clients)
    pub fn json_body(&self) -> Result<serde_json::Value, TelemetryError> {
        Ok(serde_json::from_slice(&self.body)?)
    }
}

/// HTTP front end over an [`IngestProcessor`]
pub struct ApiServer {
    processor: IngestProcessor,
}

impl ApiServer {
    pub fn new(processor: IngestProcessor) -> Self {
        Self { processor }
    }

    pub fn processor(&self) -> &IngestProcessor {
        &self.processor
    }

    /// Route one request
    pub fn handle(
        &mut self,
        method: &str,
        url: &str,
        content_type: Option<&str>,
        body: &[u8],
    ) -> ApiResponse {
        let (path, query) = url.split_once('?').unwrap_or((url, ""));
        let method = method.to_ascii_uppercase();

        match (path, method.as_str()) {
            ("/telemetry", "POST") => self.post_telemetry(content_type, body),
            ("/latest", "GET") => ApiResponse::json(200, &self.processor.store().latest()),
            ("/series", "GET") => match limit_param(query, DEFAULT_SERIES_LIMIT) {
                Ok(limit) => ApiResponse::json(200, &self.processor.store().series(limit)),
                Err(msg) => ApiResponse::detail(422, &msg),
            },
            ("/alerts", "GET") => match limit_param(query, DEFAULT_ALERTS_LIMIT) {
                Ok(limit) => ApiResponse::json(200, &self.processor.store().alerts(limit)),
                Err(msg) => ApiResponse::detail(422, &msg),
            },
            ("/health", "GET") => ApiResponse::json(
                200,
                &json!({
                    "status": "ok",
                    "producer": PRODUCER_NAME,
                    "version": VERSION,
                    "instance_id": self.processor.instance_id().to_string(),
                    "schema": SCHEMA_VERSION,
                }),
            ),
            ("/telemetry" | "/latest" | "/series" | "/alerts" | "/health", _) => {
                ApiResponse::detail(405, "Method Not Allowed")
            }
            _ => ApiResponse::detail(404, "Not Found"),
        }
    }

    fn post_telemetry(&mut self, content_type: Option<&str>, body: &[u8]) -> ApiResponse {
        let codec = PayloadCodec::from_content_type(content_type.unwrap_or_default());
        match self.processor.ingest_bytes(body, codec) {
            Ok(response) => ApiResponse::json(200, &response),
            Err(e) => {
                let status = error_status(&e);
                if status >= 500 {
                    error!("ingest failed: {e}");
                } else {
                    warn!("rejected telemetry ({status}): {e}");
                }
                ApiResponse::detail(status, &e.to_string())
            }
        }
    }

    /// Bind `addr` and serve until the listener closes
    pub fn serve(&mut self, addr: &str) -> Result<(), TelemetryError> {
        let server = Server::http(addr)
            .map_err(|e| TelemetryError::Transport(format!("cannot bind {addr}: {e}")))?;
        info!("listening on http://{addr}");
        self.run(&server, None);
        Ok(())
    }

    /// Answer requests from `server`, stopping after `max_requests` if given
    pub fn run(&mut self, server: &Server, max_requests: Option<usize>) {
        let mut served = 0usize;
        for request in server.incoming_requests() {
            self.respond(request);
            served += 1;
            if max_requests.is_some_and(|max| served >= max) {
                break;
            }
        }
    }

    fn respond(&mut self, mut request: Request) {
        let method = request.method().as_str().to_string();
        let url = request.url().to_string();
        let content_type = request
            .headers()
            .iter()
            .find(|h| h.field.equiv("Content-Type"))
            .map(|h| h.value.as_str().to_string());

        let mut body = Vec::new();
        let reply = match request.as_reader().read_to_end(&mut body) {
            Ok(_) => self.handle(&method, &url, content_type.as_deref(), &body),
            Err(e) => ApiResponse::detail(400, &format!("unreadable body: {e}")),
        };
        debug!("{method} {url} -> {}", reply.status);

        let mut response = Response::from_data(reply.body).with_status_code(reply.status);
        if let Ok(header) = Header::from_bytes("Content-Type", "application/json") {
            response = response.with_header(header);
        }
        if let Err(e) = request.respond(response) {
            warn!("failed to send response for {method} {url}: {e}");
        }
    }
}

fn error_status(e: &TelemetryError) -> u16 {
    match e {
        TelemetryError::ParseError(_)
        | TelemetryError::JsonError(_)
        | TelemetryError::CborError(_) => 400,
        TelemetryError::Validation(_) | TelemetryError::UnknownScenario(_) => 422,
        _ => 500,
    }
}

fn limit_param(query: &str, default: usize) -> Result<usize, String> {
    for pair in query.split('&') {
        if let Some(("limit", value)) = pair.split_once('=') {
            return value
                .parse::<usize>()
                .map_err(|_| format!("limit must be a non-negative integer, got {value:?}"));
        }
    }
    Ok(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{payload_at, sample_payload};
    use crate::types::LatestSnapshot;
    use pretty_assertions::assert_eq;

    fn server() -> ApiServer {
        ApiServer::new(IngestProcessor::in_memory())
    }

    fn post_json(api: &mut ApiServer, body: &[u8]) -> ApiResponse {
        api.handle("POST", "/telemetry", Some("application/json"), body)
    }

    #[test]
    fn test_post_json_and_cbor() {
        let mut api = server();
        let json = PayloadCodec::Json.encode(&sample_payload()).unwrap();
        let response = post_json(&mut api, &json);
        assert_eq!(response.status, 200);
        assert_eq!(response.json_body().unwrap()["status"], "ok");

        let cbor = PayloadCodec::Cbor.encode(&payload_at(1, 22.0, 46.0)).unwrap();
        let response = api.handle("POST", "/telemetry", Some("application/cbor"), &cbor);
        assert_eq!(response.status, 200);
        assert_eq!(api.processor().store().counts().raw, 2);
    }

    #[test]
    fn test_decode_failure_is_400() {
        let mut api = server();
        let response = post_json(&mut api, b"{\"ts\": 1}");
        assert_eq!(response.status, 400);
        assert!(response.json_body().unwrap()["detail"].is_string());
    }

    #[test]
    fn test_validation_failure_is_422() {
        let mut api = server();
        let mut payload = sample_payload();
        payload.building_id = "  ".to_string();
        let body = PayloadCodec::Json.encode(&payload).unwrap();

        assert_eq!(post_json(&mut api, &body).status, 422);
    }

    #[test]
    fn test_latest_empty_then_filled() {
        let mut api = server();
        let empty = api.handle("GET", "/latest", None, b"").json_body().unwrap();
        assert!(empty["raw"].is_null());
        assert!(empty["alert"].is_null());

        let body = PayloadCodec::Json.encode(&sample_payload()).unwrap();
        post_json(&mut api, &body);
        let latest = api.handle("GET", "/latest", None, b"").json_body().unwrap();
        assert_eq!(latest["raw"]["payload"]["air_node_id"], "AIR-001");
        assert_eq!(latest["prediction"]["horizon_min"], 60);
    }

    #[test]
    fn test_latest_with_missing_reading_reads_back() {
        let mut api = server();
        let mut payload = sample_payload();
        payload.water_ph = f64::NAN;
        let cbor = PayloadCodec::Cbor.encode(&payload).unwrap();
        let response = api.handle("POST", "/telemetry", Some("application/cbor"), &cbor);
        assert_eq!(response.status, 200);

        let latest = api.handle("GET", "/latest", None, b"");
        let snapshot: LatestSnapshot = serde_json::from_slice(&latest.body).unwrap();
        let raw = snapshot.raw.unwrap();
        assert!(raw.payload.water_ph.is_nan());
        assert_eq!(raw.payload.air_rh_pct, 45.0);
        assert_eq!(snapshot.feature.unwrap().qc_flags.missing["water_ph"], true);
    }

    #[test]
    fn test_series_limit() {
        let mut api = server();
        for i in 0..5 {
            let body = PayloadCodec::Json.encode(&payload_at(i, 22.0, 45.0)).unwrap();
            post_json(&mut api, &body);
        }

        let series = api.handle("GET", "/series?limit=2", None, b"").json_body().unwrap();
        assert_eq!(series.as_array().unwrap().len(), 2);
        let series = api.handle("GET", "/series", None, b"").json_body().unwrap();
        assert_eq!(series.as_array().unwrap().len(), 5);
        assert_eq!(api.handle("GET", "/series?limit=x", None, b"").status, 422);
    }

    #[test]
    fn test_health() {
        let mut api = server();
        let health = api.handle("GET", "/health", None, b"").json_body().unwrap();
        assert_eq!(health["status"], "ok");
        assert_eq!(health["producer"], PRODUCER_NAME);
        assert_eq!(health["schema"], SCHEMA_VERSION);
    }

    #[test]
    fn test_unknown_route_and_method() {
        let mut api = server();
        assert_eq!(api.handle("GET", "/nope", None, b"").status, 404);
        assert_eq!(api.handle("GET", "/telemetry", None, b"").status, 405);
        assert_eq!(api.handle("DELETE", "/alerts", None, b"").status, 405);
    }

    #[test]
    fn test_limit_param() {
        assert_eq!(limit_param("", 50), Ok(50));
        assert_eq!(limit_param("foo=1&limit=7", 50), Ok(7));
        assert!(limit_param("limit=-1", 50).is_err());
    }
}
