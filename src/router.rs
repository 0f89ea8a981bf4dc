//! Named page router with navigation middleware.
//!
//! Pages are registered by name with a loader that produces their content.
//! `navigate` resolves the name, runs every middleware in registration
//! order (the first `false` blocks), invokes the loader, records the
//! current page and emits `page:loaded`.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::AppError;
use crate::events::{EventBus, PAGE_LOADED};

type Loader = Rc<dyn Fn() -> Result<String, AppError>>;
type Middleware = Rc<dyn Fn(&str) -> bool>;

/// Outcome of [`Router::navigate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    Loaded { page: String, content: String },
    NotFound { page: String },
    /// A middleware refused the navigation.
    Blocked { page: String },
    /// The loader returned an error; the current page is unchanged.
    Failed { page: String, error: String },
}

pub struct Router {
    routes: RefCell<BTreeMap<String, Loader>>,
    middleware: RefCell<Vec<Middleware>>,
    current: RefCell<Option<String>>,
    events: Rc<EventBus>,
}

impl Router {
    pub fn new(events: Rc<EventBus>) -> Self {
        Self {
            routes: RefCell::new(BTreeMap::new()),
            middleware: RefCell::new(Vec::new()),
            current: RefCell::new(None),
            events,
        }
    }

    /// Register (or replace) the loader for `name`.
    pub fn register<F>(&self, name: &str, loader: F)
    where
        F: Fn() -> Result<String, AppError> + 'static,
    {
        debug!(page = name, "route registered");
        self.routes.borrow_mut().insert(name.to_string(), Rc::new(loader));
    }

    pub fn use_middleware<F>(&self, middleware: F)
    where
        F: Fn(&str) -> bool + 'static,
    {
        self.middleware.borrow_mut().push(Rc::new(middleware));
    }

    pub fn navigate(&self, page: &str) -> Navigation {
        let loader = self.routes.borrow().get(page).cloned();
        let Some(loader) = loader else {
            warn!(page, "page not found");
            return Navigation::NotFound { page: page.to_string() };
        };

        let middleware: Vec<Middleware> = self.middleware.borrow().clone();
        if !middleware.iter().all(|allow| allow(page)) {
            info!(page, "navigation blocked");
            return Navigation::Blocked { page: page.to_string() };
        }

        // Set before loading so loaders (and analytics they trigger) see the
        // page being opened; restored if the loader fails.
        let previous = self.current.replace(Some(page.to_string()));
        match loader() {
            Ok(content) => {
                info!(page, "page loaded");
                self.events.emit(PAGE_LOADED, &Value::String(page.to_string()));
                Navigation::Loaded { page: page.to_string(), content }
            }
            Err(e) => {
                *self.current.borrow_mut() = previous;
                warn!(page, error = %e, "failed to load page");
                Navigation::Failed { page: page.to_string(), error: e.to_string() }
            }
        }
    }

    pub fn current_page(&self) -> Option<String> {
        self.current.borrow().clone()
    }

    /// Registered page names, sorted.
    pub fn pages(&self) -> Vec<String> {
        self.routes.borrow().keys().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn router() -> (Rc<EventBus>, Router) {
        let bus = Rc::new(EventBus::new());
        let router = Router::new(bus.clone());
        router.register("dashboard", || Ok("welcome".to_string()));
        router.register("login", || Ok("sign in".to_string()));
        (bus, router)
    }

    #[test]
    fn navigate_loads_and_emits() {
        let (bus, router) = router();
        let loaded = Rc::new(RefCell::new(Vec::new()));
        let l = loaded.clone();
        bus.on(PAGE_LOADED, move |p| l.borrow_mut().push(p.clone()));

        let nav = router.navigate("dashboard");

        assert_eq!(
            nav,
            Navigation::Loaded { page: "dashboard".into(), content: "welcome".into() }
        );
        assert_eq!(router.current_page().as_deref(), Some("dashboard"));
        assert_eq!(*loaded.borrow(), vec![Value::String("dashboard".into())]);
    }

    #[test]
    fn unknown_page_skips_middleware() {
        let (_, router) = router();
        let calls = Rc::new(Cell::new(0));
        let c = calls.clone();
        router.use_middleware(move |_| {
            c.set(c.get() + 1);
            true
        });
        assert_eq!(router.navigate("nowhere"), Navigation::NotFound { page: "nowhere".into() });
        assert_eq!(calls.get(), 0);
        assert_eq!(router.current_page(), None);
    }

    #[test]
    fn middleware_can_block() {
        let (_, router) = router();
        router.use_middleware(|page| page == "login");
        assert_eq!(router.navigate("dashboard"), Navigation::Blocked { page: "dashboard".into() });
        assert!(matches!(router.navigate("login"), Navigation::Loaded { .. }));
        assert_eq!(router.current_page().as_deref(), Some("login"));
    }

    #[test]
    fn first_refusal_stops_the_chain() {
        let (_, router) = router();
        let later = Rc::new(Cell::new(false));
        let l = later.clone();
        router.use_middleware(|_| false);
        router.use_middleware(move |_| {
            l.set(true);
            true
        });
        router.navigate("dashboard");
        assert!(!later.get());
    }

    #[test]
    fn loader_failure_keeps_previous_page() {
        let (_, router) = router();
        router.register("broken", || Err(AppError::Page("boom".into())));
        router.navigate("dashboard");
        let nav = router.navigate("broken");
        assert!(matches!(nav, Navigation::Failed { ref error, .. } if error.contains("boom")));
        assert_eq!(router.current_page().as_deref(), Some("dashboard"));
    }

    #[test]
    fn loader_sees_its_own_page_as_current() {
        let bus = Rc::new(EventBus::new());
        let router = Rc::new(Router::new(bus));
        let r = Rc::downgrade(&router);
        router.register("reading", move || {
            Ok(r.upgrade().and_then(|r| r.current_page()).unwrap_or_default())
        });
        assert_eq!(
            router.navigate("reading"),
            Navigation::Loaded { page: "reading".into(), content: "reading".into() }
        );
    }

    #[test]
    fn pages_are_sorted() {
        let (_, router) = router();
        assert_eq!(router.pages(), vec!["dashboard".to_string(), "login".to_string()]);
    }
}
