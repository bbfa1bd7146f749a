use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;

use crate::strategies::{PluginSource, StrategyHandler, StrategyPlugin};

use super::dispatch::KNOWN_APPROACHES;

pub struct RegisteredStrategy {
    pub slug: String,
    pub handler: StrategyHandler,
}

/// Extension strategy registry. Lookups read an immutable snapshot;
/// `reload` rebuilds the whole map from the link-time descriptors plus
/// programmatic registrations and swaps it in atomically, so in-flight
/// requests keep resolving against the snapshot they started with.
#[derive(Clone)]
pub struct StrategyRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    snapshot: ArcSwap<HashMap<String, Arc<RegisteredStrategy>>>,
    local: Mutex<Vec<(String, StrategyHandler)>>,
}

impl StrategyRegistry {
    /// Empty registry, then a first reload picking up every link-time
    /// descriptor.
    pub fn load() -> Self {
        let registry = Self {
            inner: Arc::new(RegistryInner {
                snapshot: ArcSwap::from_pointee(HashMap::new()),
                local: Mutex::new(Vec::new()),
            }),
        };
        registry.reload();
        registry
    }

    /// Register a strategy on this registry instance. Overrides any
    /// bundled or link-time entry of the same slug from the next snapshot
    /// on.
    pub fn register_local(&self, slug: &str, handler: StrategyHandler) {
        if let Ok(mut local) = self.inner.local.lock() {
            local.push((slug.to_string(), handler));
        }
        self.reload();
    }

    /// Rebuild the snapshot: bundled descriptors first, then local
    /// descriptors, then programmatic registrations — later sources
    /// override earlier ones per slug. A bad descriptor is logged and
    /// skipped, never fatal for the rest.
    pub fn reload(&self) {
        let mut map: HashMap<String, Arc<RegisteredStrategy>> = HashMap::new();

        for source in [PluginSource::Bundled, PluginSource::Local] {
            for plugin in inventory::iter::<StrategyPlugin> {
                if plugin.source != source {
                    continue;
                }
                insert_entry(&mut map, plugin.slug, plugin.entry.to_handler(), source);
            }
        }
        if let Ok(local) = self.inner.local.lock() {
            for (slug, handler) in local.iter() {
                insert_entry(&mut map, slug, handler.clone(), PluginSource::Local);
            }
        }

        if map.is_empty() {
            log::warn!("no extension strategies registered; built-in approaches remain available");
        } else {
            let mut slugs: Vec<&str> = map.keys().map(String::as_str).collect();
            slugs.sort_unstable();
            log::info!("extension strategies registered: {}", slugs.join(", "));
        }

        self.inner.snapshot.store(Arc::new(map));
        super::metrics::record_registry_reload();
    }

    pub fn resolve(&self, slug: &str) -> Option<Arc<RegisteredStrategy>> {
        self.inner.snapshot.load().get(slug).cloned()
    }

    pub fn contains(&self, slug: &str) -> bool {
        self.inner.snapshot.load().contains_key(slug)
    }
}

fn insert_entry(
    map: &mut HashMap<String, Arc<RegisteredStrategy>>,
    slug: &str,
    handler: StrategyHandler,
    source: PluginSource,
) {
    let slug = slug.trim();
    if slug.is_empty() {
        log::warn!("skipping {source:?} extension with empty slug");
        return;
    }
    if KNOWN_APPROACHES.contains(&slug) {
        // 中文注释：内置 slug 在解析与分发里优先命中，同名扩展永远不可达；注册期直接拒绝，避免静默死插件。
        log::warn!("skipping {source:?} extension '{slug}': collides with a built-in approach");
        return;
    }
    let replaced = map.insert(
        slug.to_string(),
        Arc::new(RegisteredStrategy {
            slug: slug.to_string(),
            handler,
        }),
    );
    if replaced.is_some() {
        log::info!("overriding extension '{slug}' with {source:?} entry");
    }
}
