//! Copy-on-write route tables.
//!
//! Writers serialize on a mutex, build a new vector and publish it with a
//! single atomic swap. Readers load the current snapshot without locking and
//! keep iterating it even if a writer publishes a newer one meanwhile.

use std::sync::Arc;

use arc_swap::ArcSwap;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::{RouteConfigError, RouteResult};
use crate::params::Params;
use crate::route::{Protocol, Route};

/// A list published as immutable snapshots.
#[derive(Debug)]
pub struct CowList<T> {
    items: ArcSwap<Vec<T>>,
    write: Mutex<()>,
}

impl<T: Clone> CowList<T> {
    /// Creates an empty list.
    #[must_use]
    pub fn new() -> Self {
        Self {
            items: ArcSwap::from_pointee(Vec::new()),
            write: Mutex::new(()),
        }
    }

    /// Returns the current snapshot.
    #[must_use]
    pub fn load(&self) -> Arc<Vec<T>> {
        self.items.load_full()
    }

    /// Appends an item.
    pub fn push(&self, item: T) {
        // The closure cannot fail.
        let _ = self.update(|items| {
            items.push(item);
            Ok::<(), std::convert::Infallible>(())
        });
    }

    /// Applies `f` to a copy of the list and publishes the copy.
    ///
    /// Nothing is published when `f` fails.
    pub fn update<R, E>(&self, f: impl FnOnce(&mut Vec<T>) -> Result<R, E>) -> Result<R, E> {
        let _guard = self.write.lock();
        let mut next = Vec::clone(&self.items.load());
        let result = f(&mut next)?;
        self.items.store(Arc::new(next));
        Ok(result)
    }

    /// Number of items in the current snapshot.
    #[must_use]
    pub fn len(&self) -> usize {
        self.items.load().len()
    }

    /// True if the current snapshot is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.items.load().is_empty()
    }
}

impl<T: Clone> Default for CowList<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Routes ordered by weight, most specific first.
///
/// # Example
///
/// ```rust
/// use kestrel_router::{Protocol, Route, RouteTable};
///
/// let table = RouteTable::new();
/// table.insert(Route::new("/{id}", Protocol::Http, "by-id").unwrap(), true).unwrap();
/// table.insert(Route::new("/static", Protocol::Http, "static").unwrap(), true).unwrap();
///
/// let (route, _) = table.resolve(Protocol::Http, "/static").unwrap();
/// assert_eq!(*route.endpoint(), "static");
///
/// let (route, params) = table.resolve(Protocol::Http, "/other").unwrap();
/// assert_eq!(*route.endpoint(), "by-id");
/// assert_eq!(params.get_str("id"), Some("other"));
/// ```
#[derive(Debug)]
pub struct RouteTable<T> {
    routes: CowList<Arc<Route<T>>>,
}

impl<T> RouteTable<T> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            routes: CowList::new(),
        }
    }

    /// Inserts a route and re-sorts the table.
    ///
    /// With `check_existing`, a route with the same template and protocol as
    /// an existing one is rejected.
    pub fn insert(&self, route: Route<T>, check_existing: bool) -> RouteResult<Arc<Route<T>>> {
        let route = Arc::new(route);
        self.routes.update(|routes| {
            if check_existing
                && routes.iter().any(|r| {
                    r.template() == route.template() && r.protocol() == route.protocol()
                })
            {
                return Err(RouteConfigError::DuplicateRoute {
                    template: route.template().to_string(),
                    protocol: route.protocol(),
                });
            }
            routes.push(Arc::clone(&route));
            routes.sort_by(|a, b| a.sort_order(b));
            Ok(())
        })?;
        debug!(
            template = %route.template(),
            protocol = %route.protocol(),
            name = %route.name(),
            "route registered"
        );
        Ok(route)
    }

    /// Returns the current ordered snapshot.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Vec<Arc<Route<T>>>> {
        self.routes.load()
    }

    /// Finds the first route matching `protocol` and `path`.
    #[must_use]
    pub fn resolve(&self, protocol: Protocol, path: &str) -> Option<(Arc<Route<T>>, Params)> {
        self.snapshot().iter().find_map(|route| {
            route
                .matches(protocol, path)
                .map(|params| (Arc::clone(route), params))
        })
    }

    /// Finds a route by its reverse-lookup name.
    #[must_use]
    pub fn find_by_name(&self, name: &str) -> Option<Arc<Route<T>>> {
        self.snapshot().iter().find(|r| r.name() == name).cloned()
    }

    /// Number of routes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    /// True if no routes are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

impl<T> Default for RouteTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(templates: &[&str]) -> RouteTable<String> {
        let table = RouteTable::new();
        for t in templates {
            table
                .insert(Route::new(t, Protocol::Http, (*t).to_string()).unwrap(), true)
                .unwrap();
        }
        table
    }

    fn resolved(table: &RouteTable<String>, path: &str) -> Option<String> {
        table
            .resolve(Protocol::Http, path)
            .map(|(route, _)| route.endpoint().clone())
    }

    #[test]
    fn test_static_wins_over_param() {
        let table = table(&["/{id}", "/static"]);
        assert_eq!(resolved(&table, "/static").as_deref(), Some("/static"));
        assert_eq!(resolved(&table, "/other").as_deref(), Some("/{id}"));
    }

    #[test]
    fn test_literal_suffix_wins_over_param() {
        let table = table(&["/{a}/{b}", "/{a}/literal"]);
        assert_eq!(resolved(&table, "/x/literal").as_deref(), Some("/{a}/literal"));
        assert_eq!(resolved(&table, "/x/y").as_deref(), Some("/{a}/{b}"));
    }

    #[test]
    fn test_one_and_two_segment_params() {
        let table = table(&["/{greetings}", "/{greetings}/{name}"]);
        assert_eq!(resolved(&table, "/a/b").as_deref(), Some("/{greetings}/{name}"));
        assert_eq!(resolved(&table, "/a").as_deref(), Some("/{greetings}"));
    }

    #[test]
    fn test_conversion_failure_falls_through() {
        let table = table(&["/items/{id:int}", "/items/{slug}"]);
        let (route, params) = table.resolve(Protocol::Http, "/items/abc").unwrap();
        assert_eq!(route.template(), "/items/{slug}");
        assert_eq!(params.get_str("slug"), Some("abc"));
    }

    #[test]
    fn test_no_match() {
        let table = table(&["/a"]);
        assert!(resolved(&table, "/b").is_none());
    }

    #[test]
    fn test_protocol_filter() {
        let table = RouteTable::new();
        table
            .insert(Route::new("/feed", Protocol::WebSocket, ()).unwrap(), true)
            .unwrap();
        assert!(table.resolve(Protocol::Http, "/feed").is_none());
        assert!(table.resolve(Protocol::WebSocket, "/feed").is_some());
    }

    #[test]
    fn test_duplicate_rejected() {
        let table = table(&["/a"]);
        let err = table
            .insert(Route::new("/a", Protocol::Http, "again".to_string()).unwrap(), true)
            .unwrap_err();
        assert!(matches!(err, RouteConfigError::DuplicateRoute { .. }));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_duplicate_allowed_when_unchecked() {
        let table = table(&["/a"]);
        table
            .insert(Route::new("/a", Protocol::Http, "again".to_string()).unwrap(), false)
            .unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_same_template_other_protocol_is_not_duplicate() {
        let table = table(&["/a"]);
        table
            .insert(Route::new("/a", Protocol::WebSocket, "ws".to_string()).unwrap(), true)
            .unwrap();
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_snapshot_is_stable_across_insert() {
        let table = table(&["/a"]);
        let before = table.snapshot();
        table
            .insert(Route::new("/b", Protocol::Http, "/b".to_string()).unwrap(), true)
            .unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(table.snapshot().len(), 2);
    }

    #[test]
    fn test_find_by_name() {
        let table = RouteTable::new();
        table
            .insert(
                Route::new("/users/{id:int}", Protocol::Http, ())
                    .unwrap()
                    .with_name("user"),
                true,
            )
            .unwrap();
        let route = table.find_by_name("user").unwrap();
        assert_eq!(route.url([("id", 3_i64)]).unwrap(), "/users/3");
        assert!(table.find_by_name("missing").is_none());
    }

    #[test]
    fn test_cow_list_update_failure_publishes_nothing() {
        let list = CowList::new();
        list.push(1);
        let result: Result<(), &str> = list.update(|items| {
            items.push(2);
            Err("nope")
        });
        assert!(result.is_err());
        assert_eq!(*list.load(), vec![1]);
    }
}
