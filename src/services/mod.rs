/// Lobby countdown tasks.
pub mod countdown;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Read-only lobby projections served over HTTP.
pub mod lobby_query_service;
/// Periodic removal of abandoned lobbies.
pub mod lobby_reaper;
/// Lobby protocol: event handling and disconnects.
pub mod lobby_service;
/// Background writer for the durable mirror.
pub mod mirror;
/// Mirror store connection supervisor with backoff.
pub mod storage_supervisor;
/// WebSocket connection and message handling service.
pub mod websocket_service;
