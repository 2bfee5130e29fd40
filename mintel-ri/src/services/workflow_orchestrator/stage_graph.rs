//! Stage dependency graph
//!
//! Stages form a DAG. Sequential mode walks `StageId::ALL` (a topological order);
//! parallel mode runs each layer of `layers()` concurrently.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StageId {
    Competitors,
    Serp,
    Keywords,
    Sentiment,
    Crawl,
    DomainAnalytics,
    Backlinks,
    OnPage,
    PageSpeed,
    Business,
    News,
    Contacts,
    Aggregation,
    Synthesis,
    PersistReport,
}

impl StageId {
    /// Canonical execution order
    pub const ALL: [StageId; 15] = [
        StageId::Competitors,
        StageId::Serp,
        StageId::Keywords,
        StageId::Sentiment,
        StageId::Crawl,
        StageId::DomainAnalytics,
        StageId::Backlinks,
        StageId::OnPage,
        StageId::PageSpeed,
        StageId::Business,
        StageId::News,
        StageId::Contacts,
        StageId::Aggregation,
        StageId::Synthesis,
        StageId::PersistReport,
    ];

    /// Data collection stages (vendor adapters)
    pub const COLLECTION: [StageId; 12] = [
        StageId::Competitors,
        StageId::Serp,
        StageId::Keywords,
        StageId::Sentiment,
        StageId::Crawl,
        StageId::DomainAnalytics,
        StageId::Backlinks,
        StageId::OnPage,
        StageId::PageSpeed,
        StageId::Business,
        StageId::News,
        StageId::Contacts,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageId::Competitors => "competitors",
            StageId::Serp => "serp",
            StageId::Keywords => "keywords",
            StageId::Sentiment => "sentiment",
            StageId::Crawl => "crawl",
            StageId::DomainAnalytics => "domain_analytics",
            StageId::Backlinks => "backlinks",
            StageId::OnPage => "onpage",
            StageId::PageSpeed => "pagespeed",
            StageId::Business => "business",
            StageId::News => "news",
            StageId::Contacts => "contacts",
            StageId::Aggregation => "aggregation",
            StageId::Synthesis => "synthesis",
            StageId::PersistReport => "persist_report",
        }
    }

    /// Stages that must finish before this one starts
    pub fn deps(&self) -> &'static [StageId] {
        match self {
            StageId::Competitors
            | StageId::Keywords
            | StageId::Sentiment
            | StageId::Crawl
            | StageId::OnPage
            | StageId::PageSpeed
            | StageId::News
            | StageId::Contacts => &[],
            StageId::Serp | StageId::Backlinks | StageId::Business => &[StageId::Competitors],
            StageId::DomainAnalytics => &[StageId::Competitors, StageId::Serp],
            StageId::Aggregation => &StageId::COLLECTION,
            StageId::Synthesis => &[StageId::Aggregation],
            StageId::PersistReport => &[StageId::Synthesis],
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Group stages into layers: every stage's dependencies sit in earlier layers.
/// Within a layer, stages keep canonical order.
pub fn layers() -> Vec<Vec<StageId>> {
    let mut placed: Vec<StageId> = Vec::new();
    let mut layers = Vec::new();

    while placed.len() < StageId::ALL.len() {
        let layer: Vec<StageId> = StageId::ALL
            .iter()
            .copied()
            .filter(|stage| !placed.contains(stage))
            .filter(|stage| stage.deps().iter().all(|dep| placed.contains(dep)))
            .collect();

        // The graph is static and acyclic, so every pass places at least one stage
        if layer.is_empty() {
            break;
        }
        placed.extend(layer.iter().copied());
        layers.push(layer);
    }

    layers
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(stage: StageId) -> usize {
        StageId::ALL.iter().position(|s| *s == stage).unwrap()
    }

    #[test]
    fn test_canonical_order_is_topological() {
        for stage in StageId::ALL {
            for dep in stage.deps() {
                assert!(
                    position(*dep) < position(stage),
                    "{} runs before its dependency {}",
                    stage,
                    dep
                );
            }
        }
    }

    #[test]
    fn test_layers_cover_every_stage_once() {
        let flattened: Vec<StageId> = layers().into_iter().flatten().collect();
        assert_eq!(flattened.len(), StageId::ALL.len());
        for stage in StageId::ALL {
            assert_eq!(flattened.iter().filter(|s| **s == stage).count(), 1);
        }
    }

    #[test]
    fn test_layers_respect_every_edge() {
        let layers = layers();
        let layer_of = |stage: StageId| layers.iter().position(|l| l.contains(&stage)).unwrap();

        for stage in StageId::ALL {
            for dep in stage.deps() {
                assert!(layer_of(*dep) < layer_of(stage), "{} not after {}", stage, dep);
            }
        }
    }

    #[test]
    fn test_expected_layering() {
        let layers = layers();
        assert_eq!(layers.len(), 6);
        assert!(layers[0].contains(&StageId::Competitors));
        assert!(layers[0].contains(&StageId::PageSpeed));
        assert_eq!(layers[1], vec![StageId::Serp, StageId::Backlinks, StageId::Business]);
        assert_eq!(layers[2], vec![StageId::DomainAnalytics]);
        assert_eq!(layers[5], vec![StageId::PersistReport]);
    }
}
