//! Application context: owns the store, bus, router and services and wires
//! them together.
//!
//! Services hold `Rc` handles to the shared store and bus; nothing is
//! global. The router's auth middleware lets the `login` page through and
//! blocks every other page while no user is signed in.

use std::rc::Rc;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{Map, json};
use tracing::info;

use crate::analytics::Analytics;
use crate::auth::{Auth, User};
use crate::config::{Config, StorageBackend};
use crate::error::AppError;
use crate::events::{EventBus, LESSON_COMPLETED};
use crate::pages::{self, Lesson};
use crate::progress::{FIRST_LESSON, FIRST_LOGIN, Progress, STREAK_7, STREAK_30, UserProgress};
use crate::router::{Navigation, Router};
use crate::state::{FileStorage, KeyPathStore, MemoryStorage, Storage};

/// Build the storage backend named by `config.store`.
pub fn storage_for(config: &Config) -> Result<Arc<dyn Storage>, AppError> {
    match config.store.backend {
        StorageBackend::File => Ok(Arc::new(FileStorage::open(&config.store.dir)?)),
        StorageBackend::Memory => Ok(Arc::new(MemoryStorage::new())),
    }
}

pub struct AppContext {
    config: Config,
    store: Rc<KeyPathStore>,
    events: Rc<EventBus>,
    router: Rc<Router>,
    auth: Rc<Auth>,
    analytics: Rc<Analytics>,
    progress: Rc<Progress>,
}

impl AppContext {
    pub fn new(config: Config, storage: Arc<dyn Storage>) -> Self {
        let store = Rc::new(KeyPathStore::open(storage, &config.store.key));
        let events = Rc::new(EventBus::new());
        let router = Rc::new(Router::new(events.clone()));
        let auth = Rc::new(Auth::new(&config.auth, store.clone(), events.clone()));
        let analytics = Rc::new(Analytics::new(
            store.clone(),
            Rc::downgrade(&router),
            config.analytics.max_events,
        ));
        let progress = Rc::new(Progress::new(
            store.clone(),
            events.clone(),
            config.progress.points_per_level,
        ));

        // A session restored from storage keeps attributing events.
        if let Some(user) = auth.current_user() {
            analytics.set_user(Some(user.username));
        }

        let ctx = Self { config, store, events, router, auth, analytics, progress };
        ctx.install_routes();
        ctx
    }

    /// Open the storage named in `config` and build the context over it.
    pub fn open(config: Config) -> Result<Self, AppError> {
        let storage = storage_for(&config)?;
        info!(backend = storage.kind(), key = %config.store.key, "opening state store");
        Ok(Self::new(config, storage))
    }

    fn install_routes(&self) {
        let auth = self.auth.clone();
        self.router
            .use_middleware(move |page| page == pages::LOGIN || auth.is_logged_in());

        let name = self.config.academy_name.clone();
        self.router.register(pages::LOGIN, move || Ok(pages::login(&name)));

        let (auth, progress, analytics) =
            (self.auth.clone(), self.progress.clone(), self.analytics.clone());
        self.router.register(pages::DASHBOARD, move || {
            pages::dashboard(&auth, &progress, &analytics)
        });

        let analytics = self.analytics.clone();
        self.router
            .register(pages::LISTENING, move || pages::listening(&analytics));

        let analytics = self.analytics.clone();
        self.router.register(pages::READING, move || pages::reading(&analytics));

        let (auth, progress, analytics) =
            (self.auth.clone(), self.progress.clone(), self.analytics.clone());
        self.router.register(pages::PROGRESS, move || {
            pages::progress(&auth, &progress, &analytics)
        });
    }

    /// Sign in, then record the login for analytics and progress.
    pub fn login(&self, username: &str, password: &str) -> Result<User, AppError> {
        // The username keys the progress record; refuse it before anything
        // is written.
        Progress::record_path(&username.trim().to_lowercase())?;
        let user = self.auth.login(username, password)?;
        self.analytics.set_user(Some(user.username.clone()));
        self.analytics.track("login", Map::new())?;
        self.record_login(&user.username, Utc::now())?;
        Ok(user)
    }

    /// Update the study streak and login achievements as of `now`.
    /// Returns the new streak.
    pub fn record_login(&self, username: &str, now: DateTime<Utc>) -> Result<u64, AppError> {
        let streak = self.progress.calculate_streak(username, now)?;
        self.progress.update_progress(username, |p| {
            p.study_streak = streak;
            p.last_login_date = Some(now.timestamp_millis());
        })?;
        self.progress.award_achievement(username, FIRST_LOGIN)?;
        if streak >= 7 {
            self.progress.award_achievement(username, STREAK_7)?;
        }
        if streak >= 30 {
            self.progress.award_achievement(username, STREAK_30)?;
        }
        Ok(streak)
    }

    pub fn logout(&self) -> Result<(), AppError> {
        self.auth.logout()?;
        self.analytics.track("logout", Map::new())?;
        self.analytics.set_user(None);
        Ok(())
    }

    fn require_user(&self) -> Result<User, AppError> {
        self.auth
            .current_user()
            .ok_or_else(|| AppError::Auth("sign in first".into()))
    }

    fn find_lesson(lesson_id: &str) -> Result<&'static Lesson, AppError> {
        pages::lesson(lesson_id)
            .ok_or_else(|| AppError::Lesson(format!("unknown lesson '{lesson_id}'")))
    }

    pub fn start_lesson(&self, lesson_id: &str) -> Result<&'static Lesson, AppError> {
        self.require_user()?;
        let lesson = Self::find_lesson(lesson_id)?;
        self.analytics.track_lesson_start(lesson_id)?;
        Ok(lesson)
    }

    /// Credit a completed lesson scored `score` percent.
    pub fn complete_lesson(&self, lesson_id: &str, score: u8) -> Result<UserProgress, AppError> {
        if score > 100 {
            return Err(AppError::Lesson(format!("score {score} is out of range 0..=100")));
        }
        let user = self.require_user()?;
        Self::find_lesson(lesson_id)?;

        self.analytics.track_lesson_complete(lesson_id, score)?;
        let minutes = self.config.progress.lesson_minutes;
        self.progress.update_progress(&user.username, |p| {
            p.completed_lessons += 1;
            p.total_points += u64::from(score);
            p.total_minutes += minutes;
        })?;
        self.progress.award_achievement(&user.username, FIRST_LESSON)?;
        info!(username = %user.username, lesson = lesson_id, score, "lesson completed");
        self.events.emit(
            LESSON_COMPLETED,
            &json!({ "username": user.username, "lessonId": lesson_id, "score": score }),
        );
        self.progress.get_user_progress(&user.username)
    }

    pub fn navigate(&self, page: &str) -> Navigation {
        self.router.navigate(page)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &KeyPathStore {
        &self.store
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn auth(&self) -> &Auth {
        &self.auth
    }

    pub fn analytics(&self) -> &Analytics {
        &self.analytics
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }
}
