use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tracing::debug;

/// How much of the tree under a path to drop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevalidateScope {
    /// Only the page at exactly this path
    Page,
    /// The path and every page nested below it
    Layout,
}

/// Rendered public pages keyed by request path
#[derive(Debug, Default)]
pub struct PageCache {
    pages: RwLock<HashMap<String, String>>,
    revalidations: AtomicU64,
}

impl PageCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached HTML for `path`, rendering and storing it on a miss
    pub async fn get_or_render<F>(&self, path: &str, render: F) -> String
    where
        F: FnOnce() -> String,
    {
        if let Some(html) = self.pages.read().await.get(path) {
            return html.clone();
        }

        let html = render();
        self.pages
            .write()
            .await
            .entry(path.to_string())
            .or_insert(html)
            .clone()
    }

    /// Drop cached pages so the next request re-renders them. Returns how many were dropped.
    pub async fn revalidate_path(&self, path: &str, scope: RevalidateScope) -> usize {
        let mut pages = self.pages.write().await;
        let before = pages.len();

        match scope {
            RevalidateScope::Page => {
                pages.remove(path);
            }
            RevalidateScope::Layout => {
                let prefix = format!("{}/", path.trim_end_matches('/'));
                pages.retain(|cached, _| cached != path && !cached.starts_with(&prefix));
            }
        }

        let dropped = before - pages.len();
        self.revalidations.fetch_add(1, Ordering::Relaxed);
        debug!("Revalidated {} ({:?}): {} page(s) dropped", path, scope, dropped);
        dropped
    }

    pub async fn contains(&self, path: &str) -> bool {
        self.pages.read().await.contains_key(path)
    }

    /// Number of revalidation requests served so far
    pub fn revalidation_count(&self) -> u64 {
        self.revalidations.load(Ordering::Relaxed)
    }
}
