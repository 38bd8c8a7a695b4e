//! Container configuration
//!
//! ```rust
//! use component_factory::{Container, ContainerConfig};
//!
//! let container = Container::with_config(
//!     ContainerConfig::default()
//!         .with_circular_references(false)
//!         .with_definition_overriding(false),
//! );
//! assert!(!container.config().allow_circular_references);
//! ```

/// Behaviour switches for a [`Container`](crate::Container).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerConfig {
    /// Registering a second descriptor under an existing name replaces it
    pub allow_definition_overriding: bool,
    /// Singletons may receive early references to singletons still in creation
    pub allow_circular_references: bool,
    /// Keep a wrapped singleton even if dependents already hold its raw form
    pub allow_raw_injection_despite_wrapping: bool,
    /// Ties between constructors of the same weight pick the first instead of failing
    pub lenient_constructor_resolution: bool,
    /// Type matching may create factory components to learn their product type
    pub allow_eager_init: bool,
    /// Collections of candidates are sorted by order, then priority
    pub order_collections: bool,
    /// Initial capacity of the descriptor and singleton maps
    pub initial_capacity: usize,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            allow_definition_overriding: true,
            allow_circular_references: true,
            allow_raw_injection_despite_wrapping: false,
            lenient_constructor_resolution: false,
            allow_eager_init: true,
            order_collections: true,
            initial_capacity: 16,
        }
    }
}

impl ContainerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_definition_overriding(mut self, allow: bool) -> Self {
        self.allow_definition_overriding = allow;
        self
    }

    pub fn with_circular_references(mut self, allow: bool) -> Self {
        self.allow_circular_references = allow;
        self
    }

    pub fn with_raw_injection_despite_wrapping(mut self, allow: bool) -> Self {
        self.allow_raw_injection_despite_wrapping = allow;
        self
    }

    pub fn with_lenient_constructor_resolution(mut self, lenient: bool) -> Self {
        self.lenient_constructor_resolution = lenient;
        self
    }

    pub fn with_eager_init(mut self, allow: bool) -> Self {
        self.allow_eager_init = allow;
        self
    }

    pub fn with_ordered_collections(mut self, ordered: bool) -> Self {
        self.order_collections = ordered;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ContainerConfig::default();
        assert!(config.allow_definition_overriding);
        assert!(config.allow_circular_references);
        assert!(!config.allow_raw_injection_despite_wrapping);
        assert!(!config.lenient_constructor_resolution);
        assert!(config.allow_eager_init);
        assert!(config.order_collections);
    }

    #[test]
    fn test_builder() {
        let config = ContainerConfig::new()
            .with_circular_references(false)
            .with_lenient_constructor_resolution(true)
            .with_capacity(128);
        assert!(!config.allow_circular_references);
        assert!(config.lenient_constructor_resolution);
        assert_eq!(config.initial_capacity, 128);
    }
}
