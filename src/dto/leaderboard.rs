use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

/// One ranked line of a session leaderboard.
#[derive(Debug, Clone, Serialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    /// 1-based, distinct even for tied scores.
    pub rank: usize,
    pub user_id: Uuid,
    pub user_name: String,
    pub score: u32,
}
