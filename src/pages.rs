//! Page loaders and the lesson catalog.
//!
//! Each loader renders a plain-text page from store data and records a page
//! view. [`AppContext`](crate::app::AppContext) registers them with the
//! router under the names in [`PAGES`].

use std::fmt::Write as _;

use crate::analytics::Analytics;
use crate::auth::{Auth, User};
use crate::error::AppError;
use crate::progress::{Progress, achievement};

pub const LOGIN: &str = "login";
pub const DASHBOARD: &str = "dashboard";
pub const LISTENING: &str = "listening";
pub const READING: &str = "reading";
pub const PROGRESS: &str = "progress";

/// Pages reachable after sign-in, in menu order.
pub const PAGES: &[&str] = &[DASHBOARD, LISTENING, READING, PROGRESS];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LessonKind {
    Listening,
    Reading,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lesson {
    pub id: &'static str,
    pub kind: LessonKind,
    pub title: &'static str,
    pub summary: &'static str,
}

pub const LESSONS: &[Lesson] = &[
    Lesson {
        id: "listening_1",
        kind: LessonKind::Listening,
        title: "Lesson 1: Introductions",
        summary: "Learn basic greetings and introductions",
    },
    Lesson {
        id: "listening_2",
        kind: LessonKind::Listening,
        title: "Lesson 2: Small Talk",
        summary: "Common conversation starters",
    },
    Lesson {
        id: "reading_1",
        kind: LessonKind::Reading,
        title: "Story 1: The New Neighbor",
        summary: "A1 Level - 500 words",
    },
    Lesson {
        id: "reading_2",
        kind: LessonKind::Reading,
        title: "Story 2: At the Coffee Shop",
        summary: "A2 Level - 650 words",
    },
];

pub fn lesson(id: &str) -> Option<&'static Lesson> {
    LESSONS.iter().find(|l| l.id == id)
}

fn signed_in(auth: &Auth) -> Result<User, AppError> {
    auth.current_user()
        .ok_or_else(|| AppError::Auth("no user is signed in".into()))
}

pub fn login(academy_name: &str) -> String {
    format!("{academy_name}\n\nSign in with `academy login <username> <password>`.\n")
}

pub fn dashboard(auth: &Auth, progress: &Progress, analytics: &Analytics) -> Result<String, AppError> {
    let user = signed_in(auth)?;
    let p = progress.get_user_progress(&user.username)?;
    analytics.track_page_view(DASHBOARD)?;

    let mut out = format!("Welcome back, {}!\n\n", user.username);
    let _ = writeln!(out, "  Lessons completed  {}", p.completed_lessons);
    let _ = writeln!(out, "  Day streak         {}", p.study_streak);
    let _ = writeln!(out, "  Total points       {}", p.total_points);
    let _ = writeln!(out, "  Current level      {}", p.level);
    out.push_str("\nContinue with `open listening` or `open reading`.\n");
    Ok(out)
}

fn lesson_hub(
    heading: &str,
    page: &str,
    kind: LessonKind,
    analytics: &Analytics,
) -> Result<String, AppError> {
    analytics.track_page_view(page)?;
    let mut out = format!("{heading}\n\n");
    for l in LESSONS.iter().filter(|l| l.kind == kind) {
        let _ = writeln!(out, "  [{}] {}\n      {}", l.id, l.title, l.summary);
    }
    Ok(out)
}

pub fn listening(analytics: &Analytics) -> Result<String, AppError> {
    lesson_hub("Listening Practice", LISTENING, LessonKind::Listening, analytics)
}

pub fn reading(analytics: &Analytics) -> Result<String, AppError> {
    lesson_hub("Reading Practice", READING, LessonKind::Reading, analytics)
}

pub fn progress(auth: &Auth, progress: &Progress, analytics: &Analytics) -> Result<String, AppError> {
    let user = signed_in(auth)?;
    let p = progress.get_user_progress(&user.username)?;
    analytics.track_page_view(PROGRESS)?;

    let percent = progress.level_progress(&p);
    let filled = (percent / 5) as usize;
    let mut out = String::from("Your Progress\n\n");
    let _ = writeln!(out, "Current level: {}", p.level);
    let _ = writeln!(out, "[{}{}] {percent}%", "#".repeat(filled), ".".repeat(20 - filled));
    let _ = writeln!(out, "{}/{} points to next level\n", p.total_points, progress.points_per_level());
    let _ = writeln!(out, "Study time:   {} minutes", p.total_minutes);
    let _ = writeln!(out, "Achievements: {}", p.achievements.len());
    for id in &p.achievements {
        match achievement(id) {
            Some(a) => {
                let _ = writeln!(out, "  * {} ({})", a.name, a.description);
            }
            None => {
                let _ = writeln!(out, "  * {id}");
            }
        }
    }
    let _ = writeln!(out, "Streak:       {} days", p.study_streak);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::rc::Rc;

    use crate::auth::hash_password;
    use crate::config::AuthConfig;
    use crate::events::EventBus;
    use crate::progress::FIRST_LOGIN;
    use crate::router::Router;
    use crate::state::KeyPathStore;

    struct Fixture {
        _router: Rc<Router>,
        auth: Auth,
        progress: Progress,
        analytics: Analytics,
    }

    fn fixture() -> Fixture {
        let store = Rc::new(KeyPathStore::in_memory("test"));
        let events = Rc::new(EventBus::new());
        let router = Rc::new(Router::new(events.clone()));
        let config = AuthConfig {
            users: BTreeMap::from([("alex".to_string(), hash_password("teacher"))]),
            email_domain: "academy.com".into(),
        };
        Fixture {
            auth: Auth::new(&config, store.clone(), events.clone()),
            progress: Progress::new(store.clone(), events, 1000),
            analytics: Analytics::new(store, Rc::downgrade(&router), 100),
            _router: router,
        }
    }

    #[test]
    fn catalog_lookup() {
        assert_eq!(lesson("reading_2").map(|l| l.kind), Some(LessonKind::Reading));
        assert!(lesson("writing_1").is_none());
    }

    #[test]
    fn dashboard_requires_user() {
        let f = fixture();
        assert!(matches!(dashboard(&f.auth, &f.progress, &f.analytics), Err(AppError::Auth(_))));
        assert!(f.analytics.stored_events().is_empty());
    }

    #[test]
    fn dashboard_shows_stats_and_tracks_view() {
        let f = fixture();
        f.auth.login("alex", "teacher").unwrap();
        f.progress.update_progress("alex", |p| p.total_points = 120).unwrap();

        let text = dashboard(&f.auth, &f.progress, &f.analytics).unwrap();

        assert!(text.starts_with("Welcome back, alex!"));
        assert!(text.contains("Total points       120"));
        let events = f.analytics.stored_events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0]["properties"]["page"], DASHBOARD);
    }

    #[test]
    fn hubs_list_only_their_lessons() {
        let f = fixture();
        let text = listening(&f.analytics).unwrap();
        assert!(text.contains("listening_1") && text.contains("listening_2"));
        assert!(!text.contains("reading_1"));

        let text = reading(&f.analytics).unwrap();
        assert!(text.contains("The New Neighbor"));
    }

    #[test]
    fn progress_page_names_achievements() {
        let f = fixture();
        f.auth.login("alex", "teacher").unwrap();
        f.progress.award_achievement("alex", FIRST_LOGIN).unwrap();
        f.progress.update_progress("alex", |p| p.total_points = 250).unwrap();

        let text = progress(&f.auth, &f.progress, &f.analytics).unwrap();

        assert!(text.contains("[#####...............] 25%"));
        assert!(text.contains("250/1000 points"));
        assert!(text.contains("Welcome! (First time logging in)"));
    }
}
