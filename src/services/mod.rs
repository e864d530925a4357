/// Join code generation and normalization.
pub mod code_generator;
/// OpenAPI documentation generation.
pub mod documentation;
/// Answer grading.
pub mod evaluator;
/// Health check service.
pub mod health_service;
/// Bearer token resolution.
pub mod identity;
/// Leaderboard ranking.
pub mod leaderboard;
/// Participations and answers with their uniqueness rules.
pub mod ledger;
/// Session lifecycle orchestration and event publication.
pub mod session_service;
/// WebSocket connection and command handling.
pub mod websocket_service;
