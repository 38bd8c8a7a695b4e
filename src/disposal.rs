//! Destruction adapters
//!
//! Collects every way a component can ask to be torn down (interface
//! callback, named or inferred destroy method, destruction hooks) into one
//! [`DisposableAdapter`] that runs them in order.

use crate::class::{ComponentClass, DESTROY_CALLBACK, MethodCallback};
use crate::descriptor::INFER_METHOD;
use crate::error::{DiError, Phase, Result};
use crate::hooks::ComponentPostProcessor;
use crate::merge::MergedDescriptor;
use crate::provider::Instance;
use crate::scope::DestructionCallback;
use std::fmt;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, warn};

/// Method names tried, in order, when the destroy method is inferred.
const INFERRED_METHODS: [&str; 2] = ["close", "shutdown"];

pub(crate) struct DisposableAdapter {
    name: String,
    /// Object as created by its class; class callbacks run against it
    raw: Instance,
    /// Object as handed out; destruction hooks see it
    exposed: Instance,
    callback: Option<MethodCallback>,
    method: Option<(String, MethodCallback)>,
    hooks: Vec<Arc<dyn ComponentPostProcessor>>,
}

impl DisposableAdapter {
    /// Build an adapter, or `None` when nothing needs to run on destruction.
    ///
    /// `class` is the class of the created object, which differs from the
    /// declared one for factory-method products. A destroy method configured
    /// by name that the class does not declare is an error; an inferred one
    /// that is missing is not.
    pub(crate) fn for_component(
        name: &str,
        raw: &Instance,
        exposed: &Instance,
        class: Option<&Arc<ComponentClass>>,
        merged: &MergedDescriptor,
        hooks: &[Arc<dyn ComponentPostProcessor>],
    ) -> Result<Option<Self>> {
        let callback = class.and_then(|c| c.destroy_callback().cloned());

        let method = match (merged.destroy_method_name(), class) {
            (Some(INFER_METHOD), Some(class)) => INFERRED_METHODS
                .iter()
                .find_map(|m| class.method(m).map(|cb| (m.to_string(), cb.clone()))),
            (Some(method), _) if method == DESTROY_CALLBACK && callback.is_some() => None,
            (Some(method), Some(class)) => match class.method(method) {
                Some(cb) => Some((method.to_string(), cb.clone())),
                None => {
                    return Err(DiError::invalid(
                        name,
                        format!("destroy method '{method}' is not declared on {}", class.name()),
                    ));
                }
            },
            (Some(method), None) if method != INFER_METHOD => {
                return Err(DiError::invalid(
                    name,
                    format!("destroy method '{method}' configured without a component class"),
                ));
            }
            _ => None,
        };

        let hooks: Vec<_> = hooks
            .iter()
            .filter(|h| h.requires_destruction(exposed))
            .cloned()
            .collect();

        if callback.is_none() && method.is_none() && hooks.is_empty() {
            return Ok(None);
        }

        Ok(Some(Self {
            name: name.to_string(),
            raw: raw.clone(),
            exposed: exposed.clone(),
            callback,
            method,
            hooks,
        }))
    }

    #[inline]
    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    /// Run hooks, then the interface callback, then the destroy method.
    ///
    /// Every step runs even if an earlier one failed; the first failure is returned.
    pub(crate) fn destroy(self) -> Result<()> {
        #[cfg(feature = "logging")]
        debug!(
            target: "component_factory",
            component = %self.name,
            hooks = self.hooks.len(),
            "Destroying component"
        );

        let mut first: Option<DiError> = None;
        let mut record = |err: DiError| {
            #[cfg(feature = "logging")]
            warn!(target: "component_factory", error = %err, "Destruction step failed");
            if first.is_none() {
                first = Some(err);
            }
        };

        for hook in &self.hooks {
            if let Err(err) = hook.before_destruction(&self.exposed, &self.name) {
                record(DiError::creation_failed(&self.name, Phase::Destruction, err));
            }
        }
        if let Some(callback) = &self.callback {
            if let Err(err) = callback(&self.raw) {
                record(DiError::creation_failed(&self.name, Phase::Destruction, err));
            }
        }
        if let Some((_, method)) = &self.method {
            if let Err(err) = method(&self.raw) {
                record(DiError::creation_failed(&self.name, Phase::Destruction, err));
            }
        }

        match first {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Adapter as a scope destruction callback; failures are logged.
    pub(crate) fn into_callback(self) -> DestructionCallback {
        Box::new(move || {
            let _outcome = self.destroy();
            #[cfg(feature = "logging")]
            if let Err(err) = _outcome {
                warn!(target: "component_factory", error = %err, "Scoped component destruction failed");
            }
        })
    }
}

impl fmt::Debug for DisposableAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DisposableAdapter")
            .field("name", &self.name)
            .field("callback", &self.callback.is_some())
            .field("method", &self.method.as_ref().map(|(m, _)| m))
            .field("hooks", &self.hooks.len())
            .finish()
    }
}
