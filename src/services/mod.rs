/// Event names and the snapshot/delta fan-out.
pub mod broadcast;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Race commands, reads and startup recovery.
pub mod race_service;
/// Server-Sent Events streaming service.
pub mod sse_service;
/// WebSocket connection and message handling service.
pub mod websocket_service;
