use crate::{dao::models::ParticipationEntity, dto::leaderboard::LeaderboardEntry};

/// Rank participations by score; ties keep join order, ranks stay distinct.
///
/// `participations` must be given in join order, as returned by the store.
pub fn compute(participations: &[ParticipationEntity]) -> Vec<LeaderboardEntry> {
    let mut ranked: Vec<&ParticipationEntity> = participations.iter().collect();
    ranked.sort_by(|a, b| b.score.cmp(&a.score));

    ranked
        .into_iter()
        .enumerate()
        .map(|(index, participation)| LeaderboardEntry {
            rank: index + 1,
            user_id: participation.user_id,
            user_name: participation.user_name.clone(),
            score: participation.score,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::time::SystemTime;

    use uuid::Uuid;

    use super::*;

    fn participation(name: &str, score: u32) -> ParticipationEntity {
        ParticipationEntity {
            id: Uuid::new_v4(),
            session_id: Uuid::nil(),
            user_id: Uuid::new_v4(),
            user_name: name.into(),
            score,
            joined_at: SystemTime::now(),
        }
    }

    #[test]
    fn orders_by_score_with_stable_ties() {
        let joined = vec![
            participation("early", 10),
            participation("top", 30),
            participation("late", 10),
            participation("zero", 0),
        ];

        let board = compute(&joined);
        let names: Vec<_> = board.iter().map(|entry| entry.user_name.as_str()).collect();
        assert_eq!(names, ["top", "early", "late", "zero"]);
        let ranks: Vec<_> = board.iter().map(|entry| entry.rank).collect();
        assert_eq!(ranks, [1, 2, 3, 4]);
    }

    #[test]
    fn empty_session_has_empty_leaderboard() {
        assert!(compute(&[]).is_empty());
    }
}
