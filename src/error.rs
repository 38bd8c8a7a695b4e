//! Error types for component creation and resolution

use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Error type returned by user callbacks (constructors, setters, init and
/// destroy methods, factory beans, hooks).
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Lifecycle phase in which a component failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    BeforeInstantiation,
    Instantiation,
    DescriptorProcessing,
    PropertyPopulation,
    Initialization,
    FactoryProduct,
    Destruction,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::BeforeInstantiation => "before instantiation",
            Phase::Instantiation => "instantiation",
            Phase::DescriptorProcessing => "merged descriptor processing",
            Phase::PropertyPopulation => "property population",
            Phase::Initialization => "initialization",
            Phase::FactoryProduct => "factory product creation",
            Phase::Destruction => "destruction",
        };
        f.write_str(s)
    }
}

/// Errors that can occur while registering, resolving or creating components
#[derive(Error, Debug, Clone)]
pub enum DiError {
    /// No descriptor registered under the name
    #[error("No component named '{name}' is registered")]
    NoSuchDescriptor { name: String },

    /// Descriptor is malformed or cannot be used as requested
    #[error("Invalid descriptor for component '{name}': {reason}")]
    InvalidDescriptor { name: String, reason: String },

    /// No candidate matched a dependency
    #[error("No qualifying component of type '{type_name}' available{}", at(injection_point))]
    NoSuchCandidate {
        type_name: String,
        injection_point: Option<String>,
    },

    /// More than one candidate matched a single-valued dependency
    #[error(
        "No unique component of type '{type_name}' available: expected single matching component but found {}: {}",
        candidates.len(),
        candidates.join(", ")
    )]
    NoUniqueCandidate {
        type_name: String,
        candidates: Vec<String>,
    },

    /// No constructor or factory method can be satisfied
    #[error("Error creating component '{name}': {reason}")]
    NoMatchingExecutable { name: String, reason: String },

    /// Several constructors or factory methods match equally well
    #[error(
        "Error creating component '{name}': ambiguous constructor or factory method matches found: {}",
        candidates.join(", ")
    )]
    AmbiguousExecutable {
        name: String,
        candidates: Vec<String>,
    },

    /// A dependency of the component could not be satisfied
    #[error(
        "Unsatisfied dependency expressed through {injection_point} of component '{name}' (expected '{expected}'): {reason}"
    )]
    UnsatisfiedDependency {
        name: String,
        injection_point: String,
        expected: String,
        reason: String,
        #[source]
        cause: Option<Box<DiError>>,
    },

    /// A singleton was requested while it is being created and no early
    /// reference was available
    #[error(
        "Component '{name}' is currently in creation: unresolvable circular reference ({})",
        chain.join(" -> ")
    )]
    CircularReference { name: String, chain: Vec<String> },

    /// A prototype re-entered its own creation
    #[error(
        "Prototype component '{name}' is currently in creation: unresolvable circular reference ({})",
        chain.join(" -> ")
    )]
    CircularPrototypeReference { name: String, chain: Vec<String> },

    /// The raw instance was injected into other components before it got wrapped
    #[error(
        "Component '{name}' has been injected into other components [{}] in its raw version as part of a circular reference, but has eventually been wrapped",
        dependents.join(", ")
    )]
    RawReferenceEscaped { name: String, dependents: Vec<String> },

    /// A user callback failed during a lifecycle phase
    #[error("Error creating component '{name}' during {phase}: {reason}")]
    CreationFailed {
        name: String,
        phase: Phase,
        reason: String,
        #[source]
        source: Option<Arc<dyn std::error::Error + Send + Sync + 'static>>,
    },

    /// The instance is not of the requested type
    #[error("Component '{name}' is expected to be of type '{expected}' but was actually of type '{actual}'")]
    TypeMismatch {
        name: String,
        expected: String,
        actual: String,
    },

    /// Name or singleton already taken
    #[error("Cannot register '{name}': {reason}")]
    AlreadyRegistered { name: String, reason: String },

    /// Container is locked and cannot be modified
    #[error("Container is locked - cannot register new components")]
    Locked,

    /// The container behind a deferred provider was dropped
    #[error("Container has been dropped")]
    ContainerDropped,

    /// A value could not be converted to the required type
    #[error("Cannot convert value of type '{found}' to required type '{expected}'{}", detail(reason))]
    Conversion {
        expected: String,
        found: String,
        reason: Option<String>,
    },

    /// Internal error
    #[error("Internal DI error: {0}")]
    Internal(String),
}

fn at(point: &Option<String>) -> String {
    match point {
        Some(p) => format!(" for {p}"),
        None => String::new(),
    }
}

fn detail(reason: &Option<String>) -> String {
    match reason {
        Some(r) => format!(": {r}"),
        None => String::new(),
    }
}

impl DiError {
    #[inline]
    pub fn no_such_descriptor(name: impl Into<String>) -> Self {
        Self::NoSuchDescriptor { name: name.into() }
    }

    #[inline]
    pub fn invalid(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDescriptor {
            name: name.into(),
            reason: reason.into(),
        }
    }

    #[inline]
    pub fn no_such_candidate(type_name: impl Into<String>, injection_point: Option<&str>) -> Self {
        Self::NoSuchCandidate {
            type_name: type_name.into(),
            injection_point: injection_point.map(String::from),
        }
    }

    #[inline]
    pub fn no_unique_candidate(type_name: impl Into<String>, candidates: Vec<String>) -> Self {
        Self::NoUniqueCandidate {
            type_name: type_name.into(),
            candidates,
        }
    }

    /// Wrap a dependency failure with the injection point that needed it.
    pub fn unsatisfied(
        name: impl Into<String>,
        injection_point: impl Into<String>,
        expected: impl Into<String>,
        cause: DiError,
    ) -> Self {
        Self::UnsatisfiedDependency {
            name: name.into(),
            injection_point: injection_point.into(),
            expected: expected.into(),
            reason: cause.to_string(),
            cause: Some(Box::new(cause)),
        }
    }

    /// A dependency that was never provided (no underlying error).
    pub fn unsatisfied_reason(
        name: impl Into<String>,
        injection_point: impl Into<String>,
        expected: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::UnsatisfiedDependency {
            name: name.into(),
            injection_point: injection_point.into(),
            expected: expected.into(),
            reason: reason.into(),
            cause: None,
        }
    }

    /// Wrap a user callback error.
    pub fn creation_failed(name: impl Into<String>, phase: Phase, err: impl Into<BoxError>) -> Self {
        let err: BoxError = err.into();
        Self::CreationFailed {
            name: name.into(),
            phase,
            reason: err.to_string(),
            source: Some(Arc::from(err)),
        }
    }

    /// A creation failure with a plain message.
    pub fn creation_message(name: impl Into<String>, phase: Phase, reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            name: name.into(),
            phase,
            reason: reason.into(),
            source: None,
        }
    }

    #[inline]
    pub fn type_mismatch(
        name: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch {
            name: name.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    #[inline]
    pub fn already_registered(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::AlreadyRegistered {
            name: name.into(),
            reason: reason.into(),
        }
    }

    #[inline]
    pub fn conversion(expected: impl Into<String>, found: impl Into<String>) -> Self {
        Self::Conversion {
            expected: expected.into(),
            found: found.into(),
            reason: None,
        }
    }

    /// Attach lifecycle context to an error raised while creating `name`.
    ///
    /// Errors that already name this component pass through unchanged.
    pub fn in_phase(self, name: &str, phase: Phase) -> Self {
        if self.component_name() == Some(name) {
            return self;
        }
        Self::CreationFailed {
            name: name.to_string(),
            phase,
            reason: self.to_string(),
            source: Some(Arc::new(self)),
        }
    }

    /// Name of the component the error is about, if any.
    pub fn component_name(&self) -> Option<&str> {
        match self {
            Self::NoSuchDescriptor { name }
            | Self::InvalidDescriptor { name, .. }
            | Self::NoMatchingExecutable { name, .. }
            | Self::AmbiguousExecutable { name, .. }
            | Self::UnsatisfiedDependency { name, .. }
            | Self::CircularReference { name, .. }
            | Self::CircularPrototypeReference { name, .. }
            | Self::RawReferenceEscaped { name, .. }
            | Self::CreationFailed { name, .. }
            | Self::TypeMismatch { name, .. }
            | Self::AlreadyRegistered { name, .. } => Some(name),
            _ => None,
        }
    }

    /// The innermost container error in a chain of wrapped failures.
    pub fn root_cause(&self) -> &DiError {
        match self {
            Self::UnsatisfiedDependency {
                cause: Some(cause), ..
            } => cause.root_cause(),
            Self::CreationFailed {
                source: Some(source),
                ..
            } => match source.downcast_ref::<DiError>() {
                Some(inner) => inner.root_cause(),
                None => self,
            },
            _ => self,
        }
    }

    /// Whether the failure was caused by an unresolvable circular reference.
    pub fn is_circular(&self) -> bool {
        matches!(
            self.root_cause(),
            Self::CircularReference { .. } | Self::CircularPrototypeReference { .. }
        )
    }
}

/// Result type alias for DI operations
pub type Result<T> = std::result::Result<T, DiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_walks_wrappers() {
        let circular = DiError::CircularReference {
            name: "a".into(),
            chain: vec!["a".into(), "b".into()],
        };
        let wrapped = DiError::unsatisfied("b", "property 'a'", "A", circular);
        let outer = wrapped.in_phase("a", Phase::PropertyPopulation);

        assert!(matches!(outer, DiError::CreationFailed { .. }));
        assert!(matches!(outer.root_cause(), DiError::CircularReference { .. }));
        assert!(outer.is_circular());
    }

    #[test]
    fn test_in_phase_passes_through_same_component() {
        let err = DiError::invalid("a", "abstract");
        let err = err.in_phase("a", Phase::Instantiation);
        assert!(matches!(err, DiError::InvalidDescriptor { .. }));
    }

    #[test]
    fn test_messages_name_component_and_point() {
        let err = DiError::unsatisfied_reason("server", "property 'port'", "i64", "required property not set");
        let msg = err.to_string();
        assert!(msg.contains("server"));
        assert!(msg.contains("property 'port'"));
        assert!(msg.contains("i64"));

        let err = DiError::no_such_candidate("Repo", Some("parameter 0 of new"));
        assert!(err.to_string().contains("for parameter 0 of new"));
    }

    #[test]
    fn test_creation_failed_keeps_source() {
        let io = std::io::Error::other("disk gone");
        let err = DiError::creation_failed("db", Phase::Initialization, io);
        assert_eq!(err.component_name(), Some("db"));
        assert!(std::error::Error::source(&err).is_some());
        let cloned = err.clone();
        assert_eq!(cloned.to_string(), err.to_string());
    }
}
