//! Turning raw narrative events into a trustworthy regulation timeline.

use tracing::debug;

use super::{GoalCredit, MatchSide, RegulationOutcome};
use crate::models::{CommentaryEvent, EventKind, ResultSource, Score, Side, REGULATION_MINUTES};
use crate::narrative::RawEvent;

/// Normalize raw events and close regulation with a full-time line.
///
/// Events past minute 90 are dropped, minutes below 1 are clamped to 1 and
/// the result is stably sorted by minute. A goal whose team matches neither
/// side becomes narrative. The score is counted from goal events only.
pub fn build(
    raw: Vec<RawEvent>,
    home: &MatchSide,
    away: &MatchSide,
    source: ResultSource,
) -> RegulationOutcome {
    let total = raw.len();
    let mut kept: Vec<(u32, RawEvent)> = raw
        .into_iter()
        .filter(|e| e.minute <= REGULATION_MINUTES as i64)
        .map(|e| (e.minute.max(1) as u32, e))
        .collect();
    kept.sort_by_key(|(minute, _)| *minute);

    if kept.len() < total {
        debug!("Dropped {} events past minute {}", total - kept.len(), REGULATION_MINUTES);
    }

    let mut score = Score::default();
    let mut goal_credits = Vec::new();
    let mut events = Vec::with_capacity(kept.len() + 1);

    for (minute, raw) in kept {
        let side = if home.answers_to(&raw.team) {
            Some((Side::Home, home))
        } else if away.answers_to(&raw.team) {
            Some((Side::Away, away))
        } else {
            None
        };

        let kind = EventKind::from_tag(&raw.kind);
        let event = match (kind, side) {
            (EventKind::Goal, Some((side, team))) => {
                score.add(side);

                if let Some(name) = &raw.player {
                    if let Some((player_id, player_name)) = team.find_player(name) {
                        goal_credits.push(GoalCredit {
                            team_id: team.team_id.clone(),
                            player_id: player_id.clone(),
                            player_name: player_name.clone(),
                            minute,
                        });
                    } else {
                        debug!("Scorer {} is not on the {} roster", name, team.label);
                    }
                }

                let description = if raw.description.trim().is_empty() {
                    format!(
                        "GOAL! {} scores for {}!",
                        raw.player.as_deref().unwrap_or("Player"),
                        team.label
                    )
                } else {
                    raw.description
                };

                CommentaryEvent::goal(minute, team.team_id.clone(), raw.player, description)
            }
            (EventKind::Goal, None) => {
                debug!("Goal at {}' credited to unknown team '{}'", minute, raw.team);
                CommentaryEvent::narrative(minute, describe(&raw))
            }
            (kind, side) => {
                let mut event = CommentaryEvent::narrative(minute, describe(&raw));
                event.kind = kind;
                event.player = raw.player;
                event.team = side.map(|(_, team)| team.team_id.clone());
                event
            }
        };

        events.push(event);
    }

    events.push(CommentaryEvent::narrative(
        REGULATION_MINUTES,
        format!("Full-time! {} {} {}", home.label, score, away.label),
    ));

    RegulationOutcome {
        events,
        score,
        source,
        goal_credits,
    }
}

fn describe(raw: &RawEvent) -> String {
    if raw.description.trim().is_empty() {
        match (&raw.player, raw.kind.trim()) {
            (Some(player), kind) if !kind.is_empty() => format!("{} ({})", kind, player),
            (_, kind) if !kind.is_empty() => kind.to_string(),
            _ => "Play continues.".to_string(),
        }
    } else {
        raw.description.clone()
    }
}
