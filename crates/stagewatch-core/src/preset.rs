//! Stage layouts for common resources.

use crate::deps::DependencyMap;
use crate::tracker::Stage;

pub const READY: &str = "Ready";
pub const CONFIGURATIONS_READY: &str = "ConfigurationsReady";
pub const ROUTES_READY: &str = "RoutesReady";

/// Stages, dependencies and terminal condition for one kind of resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServicePreset {
    pub header: String,
    pub stages: Vec<Stage>,
    pub dependencies: DependencyMap,
    pub terminal: String,
}

/// Deploying a service: a revision is created, then traffic is routed to it.
///
/// Stage order matches the order the conditions normally complete in, so
/// terminals that only redraw the last line still read top to bottom.
pub fn service_stages() -> ServicePreset {
    ServicePreset {
        header: "Deploying...".to_string(),
        stages: vec![
            Stage::new(CONFIGURATIONS_READY, "Creating Revision..."),
            Stage::new(ROUTES_READY, "Routing traffic..."),
        ],
        dependencies: DependencyMap::new().with(ROUTES_READY, [CONFIGURATIONS_READY]),
        terminal: READY.to_string(),
    }
}
