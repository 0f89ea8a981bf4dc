//! Per-user learning progress, achievements and study streaks.
//!
//! Each user's record is stored at `progress.{username}`; a missing record
//! reads as [`UserProgress::default`].

use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::error::AppError;
use crate::events::{ACHIEVEMENT_EARNED, EventBus, PROGRESS_UPDATED};
use crate::state::{KeyPath, KeyPathStore};

pub const PROGRESS_ROOT: &str = "progress";

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Achievement {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

pub const FIRST_LOGIN: &str = "first_login";
pub const FIRST_LESSON: &str = "lesson_1";
pub const STREAK_7: &str = "streak_7";
pub const STREAK_30: &str = "streak_30";

pub const ACHIEVEMENTS: &[Achievement] = &[
    Achievement { id: FIRST_LOGIN, name: "Welcome!", description: "First time logging in" },
    Achievement { id: FIRST_LESSON, name: "Getting Started", description: "Complete first lesson" },
    Achievement { id: STREAK_7, name: "Week Warrior", description: "7 day study streak" },
    Achievement { id: STREAK_30, name: "Monthly Master", description: "30 day study streak" },
];

pub fn achievement(id: &str) -> Option<&'static Achievement> {
    ACHIEVEMENTS.iter().find(|a| a.id == id)
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserProgress {
    pub level: String,
    pub completed_lessons: u64,
    pub total_points: u64,
    pub study_streak: u64,
    /// Unix milliseconds of the previous sign-in.
    pub last_login_date: Option<i64>,
    pub achievements: Vec<String>,
    pub total_minutes: u64,
}

impl Default for UserProgress {
    fn default() -> Self {
        Self {
            level: "Beginner".to_string(),
            completed_lessons: 0,
            total_points: 0,
            study_streak: 0,
            last_login_date: None,
            achievements: Vec::new(),
            total_minutes: 0,
        }
    }
}

pub struct Progress {
    store: Rc<KeyPathStore>,
    events: Rc<EventBus>,
    points_per_level: u64,
}

impl Progress {
    pub fn new(store: Rc<KeyPathStore>, events: Rc<EventBus>, points_per_level: u64) -> Self {
        Self { store, events, points_per_level: points_per_level.max(1) }
    }

    /// Store path of `username`'s record; errors for names that are not a
    /// single path segment.
    pub fn record_path(username: &str) -> Result<KeyPath, AppError> {
        KeyPath::from_segments([PROGRESS_ROOT, username])
    }

    pub fn get_user_progress(&self, username: &str) -> Result<UserProgress, AppError> {
        let path = Self::record_path(username)?;
        match self.store.get_path(&path) {
            None | Some(serde_json::Value::Null) => Ok(UserProgress::default()),
            Some(value) => serde_json::from_value(value).map_err(|e| AppError::Value {
                path: path.to_dotted(),
                message: e.to_string(),
            }),
        }
    }

    /// Apply `update` to the user's record, store it and emit
    /// `progress:updated`.
    pub fn update_progress<F>(&self, username: &str, update: F) -> Result<UserProgress, AppError>
    where
        F: FnOnce(&mut UserProgress),
    {
        let path = Self::record_path(username)?;
        let mut progress = self.get_user_progress(username)?;
        update(&mut progress);
        let value = serde_json::to_value(&progress).map_err(|e| AppError::Value {
            path: path.to_dotted(),
            message: e.to_string(),
        })?;
        self.store.set_path(&path, value.clone())?;
        self.events
            .emit(PROGRESS_UPDATED, &json!({ "username": username, "progress": value }));
        Ok(progress)
    }

    /// Record `achievement_id` for the user. Returns `false` when it was
    /// already earned.
    pub fn award_achievement(&self, username: &str, achievement_id: &str) -> Result<bool, AppError> {
        if self.get_user_progress(username)?.achievements.iter().any(|a| a == achievement_id) {
            return Ok(false);
        }
        self.update_progress(username, |p| p.achievements.push(achievement_id.to_string()))?;
        info!(username, achievement = achievement_id, "achievement earned");
        self.events.emit(
            ACHIEVEMENT_EARNED,
            &json!({ "username": username, "achievementId": achievement_id }),
        );
        Ok(true)
    }

    /// Streak the user would have when signing in at `now`.
    ///
    /// Whole days since the previous sign-in: 0 keeps the streak, 1 extends
    /// it, anything else (including a clock that went backwards) restarts
    /// at 1. A first sign-in counts as day 1.
    pub fn calculate_streak(&self, username: &str, now: DateTime<Utc>) -> Result<u64, AppError> {
        let progress = self.get_user_progress(username)?;
        let Some(last) = progress.last_login_date else {
            return Ok(1);
        };
        let days = (now.timestamp_millis() - last).div_euclid(DAY_MS);
        Ok(match days {
            0 => progress.study_streak,
            1 => progress.study_streak + 1,
            _ => 1,
        })
    }

    /// Percentage of the way to the next level, capped at 100.
    pub fn level_progress(&self, progress: &UserProgress) -> u64 {
        (progress.total_points.saturating_mul(100) / self.points_per_level).min(100)
    }

    pub fn points_per_level(&self) -> u64 {
        self.points_per_level
    }
}
