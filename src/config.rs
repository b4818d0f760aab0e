//! Per-manifold configuration of the transition engine.

/// Tunables consulted by chart and frame resolution.
#[derive(Clone, Debug, PartialEq)]
pub struct GeometryConfig {
    /// Maximum number of registered edges a derived transition may compose.
    pub max_path_depth: usize,
    /// Whether automatically derived inverse transitions are checked by composition.
    pub verify_inversions: bool,
    /// Whether derived expressions and components are simplified before caching.
    pub simplify_derived: bool,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            max_path_depth: 8,
            verify_inversions: true,
            simplify_derived: true,
        }
    }
}

impl GeometryConfig {
    /// Builds a configuration from environment variables, falling back to the defaults.
    ///
    /// Recognised variables: `SYM_MANIFOLDS_MAX_PATH_DEPTH`,
    /// `SYM_MANIFOLDS_VERIFY_INVERSIONS` and `SYM_MANIFOLDS_SIMPLIFY_DERIVED`.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let max_path_depth = std::env::var("SYM_MANIFOLDS_MAX_PATH_DEPTH")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .filter(|depth| *depth > 0)
            .unwrap_or(defaults.max_path_depth);

        let verify_inversions = std::env::var("SYM_MANIFOLDS_VERIFY_INVERSIONS")
            .ok()
            .map(|v| parse_flag(&v))
            .unwrap_or(defaults.verify_inversions);

        let simplify_derived = std::env::var("SYM_MANIFOLDS_SIMPLIFY_DERIVED")
            .ok()
            .map(|v| parse_flag(&v))
            .unwrap_or(defaults.simplify_derived);

        Self {
            max_path_depth,
            verify_inversions,
            simplify_derived,
        }
    }

    pub fn with_max_path_depth(mut self, depth: usize) -> Self {
        self.max_path_depth = depth.max(1);
        self
    }

    pub fn with_verify_inversions(mut self, verify: bool) -> Self {
        self.verify_inversions = verify;
        self
    }

    pub fn with_simplify_derived(mut self, simplify: bool) -> Self {
        self.simplify_derived = simplify;
        self
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(value, "0" | "false" | "False" | "off" | "OFF" | "no")
}
