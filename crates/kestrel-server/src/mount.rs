//! Sub-applications mounted under a path prefix.

use std::fmt;
use std::sync::Arc;

use http::uri::{PathAndQuery, Uri};
use kestrel_core::RootPath;
use kestrel_router::{CowList, RouteConfigError, RouteResult};

use crate::connection::Application;

/// An application served under `prefix`.
#[derive(Clone)]
pub struct Mount {
    prefix: String,
    app: Arc<dyn Application>,
}

impl Mount {
    /// Normalized prefix, without a trailing slash. The root mount is `""`.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The mounted application.
    pub fn app(&self) -> &Arc<dyn Application> {
        &self.app
    }

    /// Path left for the sub-application, or `None` if `path` is not under
    /// this mount.
    ///
    /// The prefix must end on a segment boundary: `/app` takes `/app` and
    /// `/app/x` but not `/apple`.
    pub fn strip<'a>(&self, path: &'a str) -> Option<&'a str> {
        let rest = path.strip_prefix(self.prefix.as_str())?;
        if rest.is_empty() {
            Some("/")
        } else if rest.starts_with('/') {
            Some(rest)
        } else {
            None
        }
    }
}

impl fmt::Debug for Mount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mount").field("prefix", &self.prefix).finish_non_exhaustive()
    }
}

/// Mounts, longest prefix first.
#[derive(Debug, Default)]
pub struct MountTable {
    mounts: CowList<Mount>,
}

impl MountTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mount `app` under `prefix`, replacing any app already there.
    pub fn insert(&self, prefix: &str, app: Arc<dyn Application>) -> RouteResult<()> {
        let prefix = normalize(prefix)?;
        tracing::debug!(prefix = %prefix, "application mounted");
        self.mounts.update(|mounts| {
            mounts.retain(|m| m.prefix != prefix);
            mounts.push(Mount { prefix, app });
            mounts.sort_by(|a, b| b.prefix.len().cmp(&a.prefix.len()));
            Ok::<(), RouteConfigError>(())
        })
    }

    /// Find the mount that owns `path`, with the forwarded remainder.
    pub fn resolve(&self, path: &str) -> Option<(Mount, String)> {
        self.mounts.load().iter().find_map(|mount| {
            mount
                .strip(path)
                .map(|rest| (mount.clone(), rest.to_string()))
        })
    }

    /// Number of mounts.
    pub fn len(&self) -> usize {
        self.mounts.len()
    }

    /// True if nothing is mounted.
    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty()
    }
}

fn normalize(prefix: &str) -> RouteResult<String> {
    if !prefix.starts_with('/') {
        return Err(RouteConfigError::MissingLeadingSlash {
            template: prefix.to_string(),
        });
    }
    if prefix.contains(|c: char| c == '{' || c == '}') {
        return Err(RouteConfigError::malformed(
            prefix,
            "mount prefixes cannot contain parameters",
        ));
    }
    Ok(prefix.trim_end_matches('/').to_string())
}

/// Rewrite `parts` for a sub-application: the path becomes `rest` (the query
/// is kept) and the stripped prefix is appended to [`RootPath`].
pub(crate) fn forward(parts: &mut http::request::Parts, prefix: &str, rest: &str) -> Result<(), String> {
    let path_and_query = match parts.uri.query() {
        Some(query) => format!("{rest}?{query}"),
        None => rest.to_string(),
    };
    let mut uri_parts = parts.uri.clone().into_parts();
    uri_parts.path_and_query =
        Some(PathAndQuery::try_from(path_and_query).map_err(|e| e.to_string())?);
    parts.uri = Uri::from_parts(uri_parts).map_err(|e| e.to_string())?;

    let root = parts
        .extensions
        .get::<RootPath>()
        .map(|r| format!("{}{prefix}", r.0))
        .unwrap_or_else(|| prefix.to_string());
    parts.extensions.insert(RootPath(root));
    Ok(())
}
