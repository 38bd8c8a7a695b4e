//! Constructor and factory-method selection
//!
//! Picks the executable to create a component with, builds its argument
//! array from configured values and autowired dependencies, and caches the
//! outcome on the merged descriptor so later creations skip the search.
//!
//! Candidates are tried public first, then most parameters first. Every
//! satisfiable candidate gets a type-difference weight; the lowest wins.

use crate::class::{Executable, ExecutableKind, Parameter, Visibility};
use crate::container::Container;
use crate::context::CreationContext;
use crate::descriptor::{ArgSpec, AutowireMode};
use crate::error::{DiError, Phase, Result};
use crate::merge::{MergedDescriptor, PreparedArg};
use crate::provider::Instance;
use crate::resolver::DependencyRequirement;
use crate::value::{Literal, ParamType, Value};
use std::cmp::Reverse;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Weight of an argument array that does not fit its parameters.
const UNASSIGNABLE: i64 = i32::MAX as i64;
/// Bonus for arguments whose configured form already fits without conversion.
const RAW_BONUS: i64 = 1024;

/// Configured argument values, resolved once per selection.
struct ConfiguredArgs {
    indexed: Vec<(usize, ArgSpec, Value)>,
    generic: Vec<(ArgSpec, Value)>,
}

impl ConfiguredArgs {
    fn argument_count(&self) -> usize {
        let indexed = self.indexed.iter().map(|(i, _, _)| i + 1).max().unwrap_or(0);
        indexed + self.generic.len()
    }
}

/// Arguments built for one candidate.
struct ArgsHolder {
    raw: Vec<Value>,
    converted: Vec<Value>,
    prepared: Vec<PreparedArg>,
    resolve_necessary: bool,
}

impl ArgsHolder {
    fn with_capacity(n: usize) -> Self {
        Self {
            raw: Vec::with_capacity(n),
            converted: Vec::with_capacity(n),
            prepared: Vec::with_capacity(n),
            resolve_necessary: false,
        }
    }
}

fn injection_point(executable: &Executable, param: &Parameter) -> String {
    match &param.name {
        Some(name) => format!("parameter {} ('{}') of {}", param.index, name, executable.signature()),
        None => format!("parameter {} of {}", param.index, executable.signature()),
    }
}

fn hint_matches(spec: &ArgSpec, param: &Parameter) -> bool {
    spec.type_hint.as_ref().is_none_or(|t| *t == param.param_type)
        && spec
            .name
            .as_ref()
            .is_none_or(|n| param.name.as_deref().is_none_or(|pn| pn == n))
}

fn parse_bool(s: &str) -> Option<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "true" | "on" | "yes" | "1" => Some(true),
        "false" | "off" | "no" | "0" => Some(false),
        _ => None,
    }
}

impl Container {
    /// Create `name` through the best matching constructor.
    ///
    /// `hook_candidates` overrides the class's declared constructors.
    pub(crate) fn autowire_constructor(
        &self,
        name: &str,
        merged: &MergedDescriptor,
        hook_candidates: Option<Vec<Arc<Executable>>>,
        explicit: Option<&[Value]>,
        ctx: &mut CreationContext,
    ) -> Result<Instance> {
        let class = merged
            .class()
            .ok_or_else(|| DiError::invalid(name, "no component class to construct"))?;

        if explicit.is_none() {
            if let Some(instance) = self.instantiate_cached(name, merged, None, ctx)? {
                return Ok(instance);
            }
        }

        let autowiring = hook_candidates.is_some() || merged.autowire_mode() == AutowireMode::Constructor;
        let candidates: Vec<Arc<Executable>> = hook_candidates
            .unwrap_or_else(|| class.constructors().to_vec())
            .into_iter()
            .filter(|c| merged.is_non_public_access_allowed() || c.visibility() == Visibility::Public)
            .collect();

        if candidates.is_empty() {
            return Err(DiError::NoMatchingExecutable {
                name: name.to_string(),
                reason: format!("no constructor declared on {}", class.name()),
            });
        }

        let (executable, args) = self.select(name, merged, candidates, explicit, autowiring, ctx)?;
        self.invoke(name, &executable, None, args)
    }

    /// Create `name` through its static or instance factory method.
    pub(crate) fn instantiate_using_factory_method(
        &self,
        name: &str,
        merged: &MergedDescriptor,
        explicit: Option<&[Value]>,
        ctx: &mut CreationContext,
    ) -> Result<Instance> {
        let method = merged
            .factory_method_name()
            .ok_or_else(|| DiError::invalid(name, "no factory method configured"))?;

        let (target, owner) = match merged.factory_component_name() {
            Some(factory) => {
                let factory = self.canonical_name(factory);
                if factory == name {
                    return Err(DiError::invalid(
                        name,
                        "factory component reference points back to the same component",
                    ));
                }
                let instance = self.do_get(&factory, ctx)?;
                self.inner.registry.register_dependent(&factory, name);
                let owner = self
                    .inner
                    .classes
                    .get(instance.type_key())
                    .or_else(|| self.find_merged(&factory).and_then(|m| m.class().cloned()))
                    .ok_or_else(|| {
                        DiError::invalid(name, format!("class of factory component '{factory}' is unknown"))
                    })?;
                (Some(instance), owner)
            }
            None => {
                let owner = merged
                    .class()
                    .cloned()
                    .ok_or_else(|| DiError::invalid(name, "static factory method needs a component class"))?;
                (None, owner)
            }
        };

        if explicit.is_none() {
            if let Some(instance) = self.instantiate_cached(name, merged, target.as_ref(), ctx)? {
                return Ok(instance);
            }
        }

        let is_static = target.is_none();
        let candidates: Vec<Arc<Executable>> = owner
            .factory_methods_named(method)
            .filter(|m| m.is_static() == is_static)
            .filter(|m| merged.is_non_public_access_allowed() || m.visibility() == Visibility::Public)
            .cloned()
            .collect();

        if candidates.is_empty() {
            return Err(DiError::NoMatchingExecutable {
                name: name.to_string(),
                reason: format!(
                    "no matching factory method: {} factory method '{method}' on {}",
                    if is_static { "static" } else { "instance" },
                    owner.name()
                ),
            });
        }

        let autowiring = merged.autowire_mode() == AutowireMode::Constructor || !merged.has_constructor_args();
        let (executable, args) = self.select(name, merged, candidates, explicit, autowiring, ctx)?;
        self.invoke(name, &executable, target.as_ref(), args)
    }

    /// Create `name` through its zero-argument constructor.
    pub(crate) fn instantiate_default(&self, name: &str, merged: &MergedDescriptor) -> Result<Instance> {
        let class = merged
            .class()
            .ok_or_else(|| DiError::invalid(name, "no component class to construct"))?;
        let constructor = class
            .default_constructor()
            .filter(|c| merged.is_non_public_access_allowed() || c.visibility() == Visibility::Public)
            .cloned()
            .ok_or_else(|| DiError::NoMatchingExecutable {
                name: name.to_string(),
                reason: format!("no default constructor found on {}", class.name()),
            })?;
        {
            let mut cache = merged.cache.lock();
            cache.executable = Some(Arc::clone(&constructor));
            cache.arguments_resolved = false;
        }
        self.invoke(name, &constructor, None, Vec::new())
    }

    /// Reuse a cached selection, re-resolving whatever the template marks.
    fn instantiate_cached(
        &self,
        name: &str,
        merged: &MergedDescriptor,
        target: Option<&Instance>,
        ctx: &mut CreationContext,
    ) -> Result<Option<Instance>> {
        // copy out; never hold the cache lock while resolving
        let cached = {
            let cache = merged.cache.lock();
            match (&cache.executable, cache.arguments_resolved) {
                (Some(executable), true) => Some((
                    Arc::clone(executable),
                    cache.resolved_args.clone(),
                    cache.prepared_args.clone(),
                )),
                _ => None,
            }
        };
        let Some((executable, resolved, prepared)) = cached else {
            return Ok(None);
        };

        #[cfg(feature = "logging")]
        trace!(
            target: "component_factory",
            component = name,
            executable = %executable.signature(),
            "Reusing resolved executable"
        );

        let args = match resolved {
            Some(args) => args,
            None => self.resolve_prepared(name, &executable, prepared.unwrap_or_default(), ctx)?,
        };
        self.invoke(name, &executable, target, args).map(Some)
    }

    fn resolve_prepared(
        &self,
        name: &str,
        executable: &Executable,
        prepared: Vec<PreparedArg>,
        ctx: &mut CreationContext,
    ) -> Result<Vec<Value>> {
        executable
            .params()
            .iter()
            .zip(prepared)
            .map(|(param, slot)| match slot {
                PreparedArg::Ready(value) => Ok(value),
                PreparedArg::Spec(spec) => {
                    let value = self.resolve_value_spec(name, &spec, ctx)?;
                    self.convert_value(name, value, &param.param_type)
                        .map_err(|e| DiError::unsatisfied(name, injection_point(executable, param), param.param_type.to_string(), e))
                }
                PreparedArg::Autowired => self.autowire_parameter(name, executable, param, ctx),
            })
            .collect()
    }

    fn autowire_parameter(
        &self,
        name: &str,
        executable: &Executable,
        param: &Parameter,
        ctx: &mut CreationContext,
    ) -> Result<Value> {
        let point = injection_point(executable, param);
        let mut requirement = DependencyRequirement::new(param.param_type.clone()).at(point.clone());
        if let Some(param_name) = &param.name {
            requirement = requirement.named(param_name.clone());
        }
        self.resolve(&requirement, Some(name), ctx)
            .map_err(|e| DiError::unsatisfied(name, point, param.param_type.to_string(), e))
    }

    /// Resolve the configured argument specs once, before trying candidates.
    fn resolve_configured(&self, name: &str, merged: &MergedDescriptor, ctx: &mut CreationContext) -> Result<ConfiguredArgs> {
        let args = merged.constructor_args();
        let mut indexed = Vec::with_capacity(args.indexed().len());
        for (index, spec) in args.indexed() {
            let value = self
                .resolve_value_spec(name, &spec.value, ctx)
                .map_err(|e| DiError::unsatisfied(name, format!("constructor argument {index}"), "argument", e))?;
            indexed.push((*index, spec.clone(), value));
        }
        let mut generic = Vec::with_capacity(args.generic().len());
        for (i, spec) in args.generic().iter().enumerate() {
            let value = self
                .resolve_value_spec(name, &spec.value, ctx)
                .map_err(|e| DiError::unsatisfied(name, format!("generic constructor argument {i}"), "argument", e))?;
            generic.push((spec.clone(), value));
        }
        Ok(ConfiguredArgs { indexed, generic })
    }

    /// The shared selection loop for constructors and factory methods.
    fn select(
        &self,
        name: &str,
        merged: &MergedDescriptor,
        mut candidates: Vec<Arc<Executable>>,
        explicit: Option<&[Value]>,
        autowiring: bool,
        ctx: &mut CreationContext,
    ) -> Result<(Arc<Executable>, Vec<Value>)> {
        // a lone no-arg candidate needs no matching
        if candidates.len() == 1 && explicit.is_none() && !merged.has_constructor_args() {
            let only = &candidates[0];
            if only.parameter_count() == 0 {
                let mut cache = merged.cache.lock();
                cache.executable = Some(Arc::clone(only));
                cache.arguments_resolved = true;
                cache.resolved_args = Some(Vec::new());
                cache.prepared_args = None;
                return Ok((Arc::clone(only), Vec::new()));
            }
        }

        candidates.sort_by_key(|c| (c.visibility(), Reverse(c.parameter_count())));

        let configured = match explicit {
            Some(_) => None,
            None => Some(self.resolve_configured(name, merged, ctx)?),
        };
        let min_args = match (explicit, &configured) {
            (Some(values), _) => values.len(),
            (None, Some(configured)) => configured.argument_count(),
            (None, None) => 0,
        };
        let lenient = merged.is_lenient(self.inner.config.lenient_constructor_resolution);

        let mut best: Option<(Arc<Executable>, ArgsHolder, i64)> = None;
        let mut ambiguous: Vec<Arc<Executable>> = Vec::new();
        let mut last_failure: Option<DiError> = None;

        for candidate in &candidates {
            let count = candidate.parameter_count();
            if let Some((_, holder, _)) = &best {
                if holder.converted.len() > count {
                    break;
                }
            }
            if count < min_args {
                continue;
            }

            let holder = match (explicit, &configured) {
                (Some(values), _) => {
                    if values.len() != count {
                        continue;
                    }
                    match self.explicit_holder(name, candidate, values) {
                        Ok(holder) => holder,
                        Err(err) => {
                            last_failure = Some(err);
                            continue;
                        }
                    }
                }
                (None, Some(configured)) => {
                    match self.create_argument_array(name, candidate, configured, autowiring, ctx) {
                        Ok(holder) => holder,
                        Err(err) => {
                            #[cfg(feature = "logging")]
                            trace!(
                                target: "component_factory",
                                component = name,
                                executable = %candidate.signature(),
                                error = %err,
                                "Candidate rejected"
                            );
                            last_failure = Some(err);
                            continue;
                        }
                    }
                }
                (None, None) => continue,
            };

            let weight = self.type_difference_weight(candidate.params(), &holder);
            match &best {
                Some((_, _, min)) if weight > *min => {}
                Some((current, _, min)) if weight == *min => {
                    let distinct = current.parameter_count() == count && !current.same_params(candidate);
                    if distinct {
                        if ambiguous.is_empty() {
                            ambiguous.push(Arc::clone(current));
                        }
                        ambiguous.push(Arc::clone(candidate));
                    }
                }
                _ => {
                    best = Some((Arc::clone(candidate), holder, weight));
                    ambiguous.clear();
                }
            }
        }

        let Some((executable, holder, _)) = best else {
            return Err(last_failure.unwrap_or_else(|| DiError::NoMatchingExecutable {
                name: name.to_string(),
                reason: format!(
                    "could not resolve a matching constructor or factory method among [{}] (specify index, type or name for simple arguments to avoid ambiguity)",
                    candidates.iter().map(|c| c.signature()).collect::<Vec<_>>().join(", ")
                ),
            }));
        };

        if !ambiguous.is_empty() && !lenient {
            return Err(DiError::AmbiguousExecutable {
                name: name.to_string(),
                candidates: ambiguous.iter().map(|c| c.signature()).collect(),
            });
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "component_factory",
            component = name,
            executable = %executable.signature(),
            "Selected executable"
        );

        if explicit.is_none() {
            let mut cache = merged.cache.lock();
            cache.executable = Some(Arc::clone(&executable));
            cache.arguments_resolved = true;
            if holder.resolve_necessary {
                cache.resolved_args = None;
                cache.prepared_args = Some(holder.prepared);
            } else {
                cache.resolved_args = Some(holder.converted.clone());
                cache.prepared_args = None;
            }
        }

        Ok((executable, holder.converted))
    }

    fn explicit_holder(&self, name: &str, executable: &Executable, values: &[Value]) -> Result<ArgsHolder> {
        let mut holder = ArgsHolder::with_capacity(values.len());
        for (param, value) in executable.params().iter().zip(values) {
            let converted = self
                .convert_value(name, value.clone(), &param.param_type)
                .map_err(|e| DiError::unsatisfied(name, injection_point(executable, param), param.param_type.to_string(), e))?;
            holder.raw.push(value.clone());
            holder.converted.push(converted);
        }
        Ok(holder)
    }

    /// Match every parameter to an indexed value, an unused generic value, or
    /// (when autowiring) a resolved dependency.
    fn create_argument_array(
        &self,
        name: &str,
        executable: &Executable,
        configured: &ConfiguredArgs,
        autowiring: bool,
        ctx: &mut CreationContext,
    ) -> Result<ArgsHolder> {
        let count = executable.parameter_count();
        let mut holder = ArgsHolder::with_capacity(count);
        let mut used = vec![false; configured.generic.len()];

        for param in executable.params() {
            let found = self.configured_value(param, configured, &mut used, autowiring, count);

            match found {
                Some((spec, value)) => {
                    let converted = self
                        .convert_value(name, value.clone(), &param.param_type)
                        .map_err(|e| {
                            DiError::unsatisfied(name, injection_point(executable, param), param.param_type.to_string(), e)
                        })?;
                    if spec.value.needs_resolution() {
                        holder.resolve_necessary = true;
                        holder.prepared.push(PreparedArg::Spec(spec.value.clone()));
                    } else {
                        holder.prepared.push(PreparedArg::Ready(converted.clone()));
                    }
                    holder.raw.push(value);
                    holder.converted.push(converted);
                }
                None if !autowiring => {
                    return Err(DiError::unsatisfied_reason(
                        name,
                        injection_point(executable, param),
                        param.param_type.to_string(),
                        "ambiguous argument values; did you specify the correct component references as arguments?",
                    ));
                }
                None => {
                    let value = self.autowire_parameter(name, executable, param, ctx)?;
                    holder.resolve_necessary = true;
                    holder.prepared.push(PreparedArg::Autowired);
                    holder.raw.push(value.clone());
                    holder.converted.push(value);
                }
            }
        }
        Ok(holder)
    }

    /// Configured value for `param`: by index, then the first fitting unused generic value.
    fn configured_value<'a>(
        &self,
        param: &Parameter,
        configured: &'a ConfiguredArgs,
        used: &mut [bool],
        autowiring: bool,
        param_count: usize,
    ) -> Option<(&'a ArgSpec, Value)> {
        if let Some((_, spec, value)) = configured
            .indexed
            .iter()
            .find(|(i, spec, _)| *i == param.index && hint_matches(spec, param))
        {
            return Some((spec, value.clone()));
        }

        let fitting = configured.generic.iter().enumerate().position(|(i, (spec, value))| {
            !used[i]
                && hint_matches(spec, param)
                && (spec.type_hint.is_some()
                    || spec.name.is_some()
                    || self.value_weight(&param.param_type, value).is_some())
        });
        // untyped leftovers are tried when not autowiring or when the counts line up
        let index = fitting.or_else(|| {
            (!autowiring || param_count == configured.argument_count())
                .then(|| used.iter().position(|u| !u))
                .flatten()
                .filter(|i| {
                    let (spec, _) = &configured.generic[*i];
                    spec.type_hint.is_none() && spec.name.is_none()
                })
        })?;
        used[index] = true;
        let (spec, value) = &configured.generic[index];
        Some((spec, value.clone()))
    }

    // -------------------------------------------------------------------------
    // Weights and conversion
    // -------------------------------------------------------------------------

    fn type_difference_weight(&self, params: &[Parameter], holder: &ArgsHolder) -> i64 {
        let converted = self.args_weight(params, &holder.converted);
        let raw = self.args_weight(params, &holder.raw) - RAW_BONUS;
        converted.min(raw)
    }

    fn args_weight(&self, params: &[Parameter], values: &[Value]) -> i64 {
        let mut total = 0i64;
        for (param, value) in params.iter().zip(values) {
            match self.value_weight(&param.param_type, value) {
                Some(w) => total += i64::from(w),
                None => return UNASSIGNABLE,
            }
        }
        total
    }

    /// Inheritance distance from `value` to `param`; `None` when not assignable as is.
    pub(crate) fn value_weight(&self, param: &ParamType, value: &Value) -> Option<u32> {
        match (param, value) {
            (ParamType::Optional(_) | ParamType::List(_) | ParamType::Map(_), Value::Null) => Some(0),
            (ParamType::Optional(inner), value) => self.value_weight(inner, value),
            (param, Value::Literal(literal)) => param.accepts_literal(literal).then_some(0),
            (ParamType::Bean(key), Value::Bean(instance)) => {
                if instance.is_null() {
                    Some(0)
                } else {
                    self.inner.classes.distance(instance.type_key(), *key)
                }
            }
            (ParamType::List(inner), Value::List(items)) => items
                .iter()
                .try_fold(0, |acc, item| self.value_weight(inner, item).map(|w| acc.max(w))),
            (ParamType::Map(inner), Value::Map(entries)) => entries
                .iter()
                .try_fold(0, |acc, (_, item)| self.value_weight(inner, item).map(|w| acc.max(w))),
            (ParamType::Provider(_), Value::Provider(_)) => Some(0),
            _ => None,
        }
    }

    /// Convert a resolved value to the shape `param` expects.
    pub(crate) fn convert_value(&self, name: &str, value: Value, param: &ParamType) -> Result<Value> {
        let mismatch = |value: &Value, reason: Option<String>| DiError::Conversion {
            expected: param.to_string(),
            found: value.describe(),
            reason,
        };

        match (param, value) {
            (_, Value::Null) => Ok(Value::Null),
            (ParamType::Optional(inner), value) => self.convert_value(name, value, inner),
            (ParamType::Str, Value::Literal(literal)) => Ok(Value::Literal(Literal::Str(literal.to_string()))),
            (ParamType::Int, Value::Literal(Literal::Int(n))) => Ok(Value::from(n)),
            (ParamType::Int, Value::Literal(Literal::Str(s))) => s
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|e| mismatch(&Value::from(s.as_str()), Some(e.to_string()))),
            (ParamType::Float, Value::Literal(Literal::Float(n))) => Ok(Value::from(n)),
            (ParamType::Float, Value::Literal(Literal::Int(n))) => Ok(Value::from(n as f64)),
            (ParamType::Float, Value::Literal(Literal::Str(s))) => s
                .trim()
                .parse::<f64>()
                .map(Value::from)
                .map_err(|e| mismatch(&Value::from(s.as_str()), Some(e.to_string()))),
            (ParamType::Bool, Value::Literal(Literal::Bool(b))) => Ok(Value::from(b)),
            (ParamType::Bool, Value::Literal(Literal::Str(s))) => parse_bool(&s)
                .map(Value::from)
                .ok_or_else(|| mismatch(&Value::from(s.as_str()), Some(format!("'{s}' is not a boolean")))),
            (ParamType::Bean(key), Value::Bean(instance)) => {
                if instance.is_null() || instance.type_key() == *key {
                    return Ok(Value::Bean(instance));
                }
                self.inner
                    .classes
                    .adapt(&instance, *key)
                    .map(Value::Bean)
                    .ok_or_else(|| DiError::type_mismatch(name, key.name(), instance.type_name()))
            }
            (ParamType::List(inner), Value::List(items)) => items
                .into_iter()
                .map(|item| self.convert_value(name, item, inner))
                .collect::<Result<Vec<_>>>()
                .map(Value::List),
            (ParamType::List(inner), single) if !matches!(single, Value::Map(_)) => {
                Ok(Value::List(vec![self.convert_value(name, single, inner)?]))
            }
            (ParamType::Map(inner), Value::Map(entries)) => entries
                .into_iter()
                .map(|(k, v)| self.convert_value(name, v, inner).map(|v| (k, v)))
                .collect::<Result<Vec<_>>>()
                .map(Value::Map),
            (ParamType::Provider(_), Value::Provider(p)) => Ok(Value::Provider(p)),
            (_, other) => Err(mismatch(&other, None)),
        }
    }

    fn invoke(
        &self,
        name: &str,
        executable: &Executable,
        target: Option<&Instance>,
        args: Vec<Value>,
    ) -> Result<Instance> {
        match executable.invoke(target, args) {
            Ok(Some(instance)) => Ok(instance),
            Ok(None) if executable.kind() != ExecutableKind::Constructor => Ok(Instance::null()),
            Ok(None) => Err(DiError::creation_message(
                name,
                Phase::Instantiation,
                format!("constructor {} produced nothing", executable.signature()),
            )),
            Err(err) => Err(DiError::creation_failed(name, Phase::Instantiation, err)),
        }
    }
}
