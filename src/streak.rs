//! Daily streak bookkeeping.
//!
//! A day is "banked" once `last_completed_date` falls on it. Toggling tasks on
//! and off within one day never moves the counter more than once: completing
//! again on a banked day is a no-op, and falling out of completion on a banked
//! day un-banks it without touching the counter. A missed day is never acted
//! on directly; the next completion simply starts over at 1.

use chrono::{DateTime, Utc};

use crate::{
    clock::Clock,
    model::{all_completed, ListUpdate, Todo, TodoList},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreakState {
    pub current_streak: u32,
    pub last_completed_date: Option<DateTime<Utc>>,
}

impl StreakState {
    pub fn of(list: &TodoList) -> Self {
        StreakState {
            current_streak: list.current_streak,
            last_completed_date: list.last_completed_date,
        }
    }

    pub fn differs_from(&self, list: &TodoList) -> bool {
        *self != StreakState::of(list)
    }

    /// The partial update that persists this state.
    pub fn to_update(self) -> ListUpdate {
        ListUpdate {
            current_streak: Some(self.current_streak),
            last_completed_date: Some(self.last_completed_date),
            ..ListUpdate::default()
        }
    }
}

/// Computes the streak fields `list` should carry given its tasks at `now`.
pub fn next_streak_state(
    list: &TodoList,
    todos: &[Todo],
    now: DateTime<Utc>,
    clock: &dyn Clock,
) -> StreakState {
    let current = StreakState::of(list);
    let today = clock.date_key_of(&now);
    let last = list
        .last_completed_date
        .as_ref()
        .map(|date| clock.date_key_of(date));

    if all_completed(todos) {
        if last == Some(today) {
            return current;
        }
        let current_streak = if last == Some(today.pred()) {
            list.current_streak.saturating_add(1)
        } else {
            1
        };
        StreakState {
            current_streak,
            last_completed_date: Some(now),
        }
    } else if last == Some(today) {
        StreakState {
            last_completed_date: None,
            ..current
        }
    } else {
        current
    }
}
