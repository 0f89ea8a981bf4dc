//! Usage analytics kept in the state store.
//!
//! Every tracked event is logged and appended to the `analytics` array in
//! the store; only the newest `max_events` entries are retained.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use chrono::Utc;
use serde_json::{Map, Value, json};
use tracing::info;
use uuid::Uuid;

use crate::error::AppError;
use crate::router::Router;
use crate::state::KeyPathStore;

/// Store path of the retained event log.
pub const ANALYTICS_PATH: &str = "analytics";

pub const PAGE_VIEW: &str = "page_view";
pub const LESSON_START: &str = "lesson_start";
pub const LESSON_COMPLETE: &str = "lesson_complete";

pub struct Analytics {
    store: Rc<KeyPathStore>,
    router: Weak<Router>,
    max_events: usize,
    user_id: RefCell<Option<String>>,
    /// Events tracked by this process, unbounded by `max_events`.
    session: RefCell<Vec<Value>>,
}

impl Analytics {
    pub fn new(store: Rc<KeyPathStore>, router: Weak<Router>, max_events: usize) -> Self {
        Self {
            store,
            router,
            max_events,
            user_id: RefCell::new(None),
            session: RefCell::new(Vec::new()),
        }
    }

    pub fn set_user(&self, user_id: Option<String>) {
        *self.user_id.borrow_mut() = user_id;
    }

    pub fn user(&self) -> Option<String> {
        self.user_id.borrow().clone()
    }

    /// Record `event` with `properties`, stamped with the user, the time and
    /// the page. An explicit `page` property wins over the router's current
    /// page.
    pub fn track(&self, event: &str, mut properties: Map<String, Value>) -> Result<Value, AppError> {
        let page = match properties.get("page") {
            Some(page) => page.clone(),
            None => self
                .router
                .upgrade()
                .and_then(|r| r.current_page())
                .map_or(Value::Null, Value::String),
        };
        properties.insert("userId".into(), self.user().map_or(Value::Null, Value::String));
        properties.insert("timestamp".into(), json!(Utc::now().timestamp_millis()));
        properties.insert("page".into(), page);

        let record = json!({
            "id": Uuid::now_v7().to_string(),
            "event": event,
            "properties": properties,
        });
        info!(event, user = ?self.user(), "analytics");
        self.session.borrow_mut().push(record.clone());

        let mut stored = match self.store.get(ANALYTICS_PATH)? {
            Some(Value::Array(events)) => events,
            _ => Vec::new(),
        };
        stored.push(record.clone());
        let excess = stored.len().saturating_sub(self.max_events);
        stored.drain(..excess);
        self.store.set(ANALYTICS_PATH, Value::Array(stored))?;
        Ok(record)
    }

    pub fn track_page_view(&self, page: &str) -> Result<Value, AppError> {
        self.track(PAGE_VIEW, props([("page", json!(page))]))
    }

    pub fn track_lesson_start(&self, lesson_id: &str) -> Result<Value, AppError> {
        self.track(LESSON_START, props([("lessonId", json!(lesson_id))]))
    }

    pub fn track_lesson_complete(&self, lesson_id: &str, score: u8) -> Result<Value, AppError> {
        self.track(
            LESSON_COMPLETE,
            props([("lessonId", json!(lesson_id)), ("score", json!(score))]),
        )
    }

    /// Events tracked since this process started.
    pub fn session_events(&self) -> Vec<Value> {
        self.session.borrow().clone()
    }

    /// Events currently retained in the store.
    pub fn stored_events(&self) -> Vec<Value> {
        match self.store.get(ANALYTICS_PATH) {
            Ok(Some(Value::Array(events))) => events,
            _ => Vec::new(),
        }
    }
}

fn props<const N: usize>(pairs: [(&str, Value); N]) -> Map<String, Value> {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}
