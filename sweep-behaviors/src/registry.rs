use crate::{
    AutoScroll, Behavior, BehaviorError, BehaviorOptions, DeathImitatesLanguage, InstagramUser,
};
use std::sync::Arc;
use sweep_config::SweepConfig;
use sweep_core::Dom;
use tracing::{debug, info};

/// Ordered set of site behaviors plus the auto-scroll fallback.
///
/// [`select`](Self::select) returns the first behavior whose match pattern
/// accepts the URL. The fallback is never removed by filtering.
pub struct BehaviorRegistry<D: Dom> {
    behaviors: Vec<Arc<dyn Behavior<D>>>,
    fallback: Arc<dyn Behavior<D>>,
}

impl<D: Dom> BehaviorRegistry<D> {
    pub fn new(fallback: Arc<dyn Behavior<D>>) -> Self {
        Self {
            behaviors: Vec::new(),
            fallback,
        }
    }

    /// Every built-in behavior, configured with `opts`.
    pub fn with_defaults(opts: BehaviorOptions) -> Result<Self, BehaviorError> {
        let mut registry = Self::new(Arc::new(AutoScroll::new(opts)?));
        registry.register(Arc::new(InstagramUser::new(opts)?));
        registry.register(Arc::new(DeathImitatesLanguage::new(opts)?));
        Ok(registry)
    }

    pub fn register(&mut self, behavior: Arc<dyn Behavior<D>>) {
        debug!(target: "sweep.behavior", name = behavior.metadata().name, "registered behavior");
        self.behaviors.push(behavior);
    }

    /// Drop site behaviors the config turns off.
    pub fn retain_enabled(&mut self, config: &SweepConfig) {
        self.behaviors.retain(|b| {
            let keep = config.is_enabled(b.metadata().name);
            if !keep {
                info!(target: "sweep.behavior", name = b.metadata().name, "behavior disabled by config");
            }
            keep
        });
    }

    /// Behavior for `url`, falling back to auto scroll.
    pub fn select(&self, url: &str) -> Arc<dyn Behavior<D>> {
        let chosen = self
            .behaviors
            .iter()
            .find(|b| b.metadata().matches(url))
            .unwrap_or(&self.fallback);
        debug!(target: "sweep.behavior", url, name = chosen.metadata().name, "selected behavior");
        chosen.clone()
    }

    pub fn by_name(&self, name: &str) -> Option<Arc<dyn Behavior<D>>> {
        self.behaviors
            .iter()
            .chain(std::iter::once(&self.fallback))
            .find(|b| b.metadata().name == name)
            .cloned()
    }

    /// Names in selection order, fallback last.
    pub fn names(&self) -> Vec<&'static str> {
        self.behaviors
            .iter()
            .chain(std::iter::once(&self.fallback))
            .map(|b| b.metadata().name)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sweep_config::BehaviorToggle;
    use sweep_core::test_utils::FakeDom;

    fn registry() -> BehaviorRegistry<FakeDom> {
        BehaviorRegistry::with_defaults(BehaviorOptions::fast()).unwrap()
    }

    #[test]
    fn picks_the_first_matching_site() {
        let registry = registry();
        assert_eq!(
            registry.select("https://www.instagram.com/someone").metadata().name,
            InstagramUser::NAME
        );
        assert_eq!(
            registry
                .select("https://deathimitateslanguage.harmvandendorpel.com/")
                .metadata()
                .name,
            DeathImitatesLanguage::NAME
        );
    }

    #[test]
    fn unknown_pages_get_auto_scroll() {
        assert_eq!(
            registry().select("https://example.com/feed").metadata().name,
            AutoScroll::NAME
        );
    }

    #[test]
    fn lookup_by_name_includes_the_fallback() {
        let registry = registry();
        assert!(registry.by_name(AutoScroll::NAME).is_some());
        assert!(registry.by_name(InstagramUser::NAME).is_some());
        assert!(registry.by_name("nope").is_none());
        assert_eq!(
            registry.names(),
            vec![InstagramUser::NAME, DeathImitatesLanguage::NAME, AutoScroll::NAME]
        );
    }

    #[test]
    fn disabled_behaviors_are_skipped() {
        let mut registry = registry();
        let config = SweepConfig {
            behaviors: vec![BehaviorToggle {
                name: InstagramUser::NAME.to_string(),
                enabled: false,
            }],
            ..SweepConfig::default()
        };
        registry.retain_enabled(&config);
        assert_eq!(
            registry.select("https://www.instagram.com/someone").metadata().name,
            AutoScroll::NAME
        );
        assert_eq!(registry.names().len(), 2);
    }
}
