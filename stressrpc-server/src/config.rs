use std::time::Duration;

/// Largest request body accepted, in bytes. JSON-encoded payloads are several times larger
/// than their raw size, so this sits well above `MAX_PAYLOAD_SIZE`.
pub const MAX_REQUEST_BODY: usize = 64 * 1024 * 1024;

/// Longest per-response delay a streaming request may ask for.
pub const MAX_RESPONSE_INTERVAL: Duration = Duration::from_secs(10);

/// Port the `stressrpc-server` binary listens on when none is given.
pub const DEFAULT_PORT: u16 = 8080;
