use std::collections::BTreeSet;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::debug;

use crate::index::{LinkKind, extract_links};
use crate::namespace::{NamespaceTable, PageTitle};
use crate::parameters::ResetTargets;

/// The document that embeds the directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentDocument {
    pub title: PageTitle,
    pub edit_protected: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PostRenderHook {
    /// Drop links, templates, categories and images flagged for reset after the page is rendered.
    EndReset,
    /// Drop exactly the links recorded from directive output after the page is rendered.
    EndEliminate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheDecision {
    Disabled,
    Expires { seconds: u64 },
}

/// Narrow view of the embedding document and its renderer.
pub trait Host {
    fn current_document(&self) -> &CurrentDocument;
    fn disable_cache(&mut self);
    fn set_cache_expiry(&mut self, seconds: u64);
    fn register_post_render_hook(&mut self, hook: PostRenderHook);
}

/// Host that only records what the pipeline asked of it.
#[derive(Debug, Clone, Serialize)]
pub struct RecordingHost {
    pub document: CurrentDocument,
    pub cache: Option<CacheDecision>,
    pub hooks: Vec<PostRenderHook>,
}

impl RecordingHost {
    pub fn new(document: CurrentDocument) -> Self {
        Self {
            document,
            cache: None,
            hooks: Vec::new(),
        }
    }
}

impl Host for RecordingHost {
    fn current_document(&self) -> &CurrentDocument {
        &self.document
    }

    fn disable_cache(&mut self) {
        self.cache = Some(CacheDecision::Disabled);
    }

    fn set_cache_expiry(&mut self, seconds: u64) {
        self.cache = Some(CacheDecision::Expires { seconds });
    }

    fn register_post_render_hook(&mut self, hook: PostRenderHook) {
        if !self.hooks.contains(&hook) {
            self.hooks.push(hook);
        }
    }
}

/// Links produced by directive output, kept for the post-render hooks.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreatedLinks {
    pub resets: ResetTargets,
    pub links: Option<BTreeSet<String>>,
    pub templates: Option<BTreeSet<String>>,
    pub categories: Option<BTreeSet<String>>,
    pub images: Option<BTreeSet<String>>,
}

#[derive(Debug, Default)]
struct SharedInner {
    transclusion_path: BTreeSet<String>,
    created_links: CreatedLinks,
}

/// State shared by every invocation rendered for one document. Owned by the caller.
#[derive(Debug, Default)]
pub struct SharedState {
    inner: Mutex<SharedInner>,
}

impl SharedState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SharedInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark a document as being transcluded. Returns `false` when it already was.
    pub fn enter_transclusion(&self, title: &str) -> bool {
        self.lock().transclusion_path.insert(title.to_string())
    }

    pub fn leave_transclusion(&self, title: &str) {
        self.lock().transclusion_path.remove(title);
    }

    pub fn is_transcluding(&self, title: &str) -> bool {
        self.lock().transclusion_path.contains(title)
    }

    pub fn created_links(&self) -> CreatedLinks {
        self.lock().created_links.clone()
    }

    fn update_created_links<F>(&self, update: F)
    where
        F: FnOnce(&mut CreatedLinks),
    {
        update(&mut self.lock().created_links);
    }
}

/// Register post-render hooks for `reset`/`eliminate` and record what they need to know.
pub fn apply_end_resets(
    mut reset: ResetTargets,
    mut eliminate: ResetTargets,
    function_mode: bool,
    output: &str,
    namespaces: &NamespaceTable,
    host: &mut dyn Host,
    shared: &SharedState,
) {
    if function_mode {
        // Parser functions cannot eliminate these; a reset is the closest equivalent.
        for (eliminated, resets) in [
            (&mut eliminate.templates, &mut reset.templates),
            (&mut eliminate.categories, &mut reset.categories),
            (&mut eliminate.images, &mut reset.images),
        ] {
            if *eliminated {
                *resets = true;
                *eliminated = false;
            }
        }
    } else {
        shared.update_created_links(|created| {
            created.resets.merge(ResetTargets {
                links: false,
                ..reset
            });
        });
    }

    if !function_mode || reset.links {
        if reset.links {
            shared.update_created_links(|created| created.resets.links = true);
        }
        host.register_post_render_hook(PostRenderHook::EndReset);
    }

    if eliminate.any() {
        host.register_post_render_hook(PostRenderHook::EndEliminate);
        let found = extract_links(output, namespaces);
        let collect = |kind: LinkKind| {
            found
                .iter()
                .filter(|link| link.kind == kind)
                .map(|link| link.target.prefixed())
                .collect::<BTreeSet<_>>()
        };
        shared.update_created_links(|created| {
            if eliminate.links {
                created.links = Some(collect(LinkKind::Page));
            }
            if eliminate.templates {
                created.templates = Some(collect(LinkKind::Template));
            }
            if eliminate.categories {
                created.categories = Some(collect(LinkKind::Category));
            }
            if eliminate.images {
                created.images = Some(collect(LinkKind::File));
            }
        });
    }
    debug!(?reset, ?eliminate, function_mode, "applied end resets");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> RecordingHost {
        RecordingHost::new(CurrentDocument {
            title: NamespaceTable::default().parse_title("Main Page").expect("title"),
            edit_protected: false,
        })
    }

    fn targets(links: bool, templates: bool, categories: bool, images: bool) -> ResetTargets {
        ResetTargets {
            links,
            templates,
            categories,
            images,
        }
    }

    #[test]
    fn tag_mode_records_resets_and_registers_end_reset() {
        let namespaces = NamespaceTable::default();
        let shared = SharedState::new();
        let mut host = host();
        apply_end_resets(
            targets(true, true, false, false),
            ResetTargets::default(),
            false,
            "",
            &namespaces,
            &mut host,
            &shared,
        );
        assert_eq!(host.hooks, vec![PostRenderHook::EndReset]);
        assert_eq!(shared.created_links().resets, targets(true, true, false, false));
    }

    #[test]
    fn function_mode_degrades_eliminate_to_reset() {
        let namespaces = NamespaceTable::default();
        let shared = SharedState::new();
        let mut host = host();
        apply_end_resets(
            ResetTargets::default(),
            targets(false, true, true, false),
            true,
            "{{Infobox}} [[Category:People]]",
            &namespaces,
            &mut host,
            &shared,
        );
        assert!(host.hooks.is_empty());
        assert_eq!(shared.created_links(), CreatedLinks::default());
    }

    #[test]
    fn eliminate_records_links_found_in_output() {
        let namespaces = NamespaceTable::default();
        let shared = SharedState::new();
        let mut host = host();
        apply_end_resets(
            ResetTargets::default(),
            targets(true, true, false, true),
            false,
            "* [[Alpha]]\n* [[Beta|b]] {{Infobox}} [[File:Map.png]]",
            &namespaces,
            &mut host,
            &shared,
        );
        assert_eq!(
            host.hooks,
            vec![PostRenderHook::EndReset, PostRenderHook::EndEliminate]
        );
        let created = shared.created_links();
        assert_eq!(
            created.links,
            Some(BTreeSet::from(["Alpha".to_string(), "Beta".to_string()]))
        );
        assert_eq!(
            created.templates,
            Some(BTreeSet::from(["Template:Infobox".to_string()]))
        );
        assert_eq!(created.categories, None);
        assert_eq!(
            created.images,
            Some(BTreeSet::from(["File:Map.png".to_string()]))
        );
    }

    #[test]
    fn transclusion_path_detects_reentry() {
        let shared = SharedState::new();
        assert!(shared.enter_transclusion("Main Page"));
        assert!(!shared.enter_transclusion("Main Page"));
        assert!(shared.is_transcluding("Main Page"));
        shared.leave_transclusion("Main Page");
        assert!(!shared.is_transcluding("Main Page"));
    }

    #[test]
    fn recording_host_keeps_last_cache_decision() {
        let mut host = host();
        host.disable_cache();
        host.set_cache_expiry(60);
        host.register_post_render_hook(PostRenderHook::EndReset);
        host.register_post_render_hook(PostRenderHook::EndReset);
        assert_eq!(host.cache, Some(CacheDecision::Expires { seconds: 60 }));
        assert_eq!(host.hooks.len(), 1);
    }
}
