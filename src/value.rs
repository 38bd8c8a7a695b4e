//! Parameter types, resolved values and typed extraction
//!
//! Constructors, factory methods and setters declare their parameters as
//! [`ParamType`]s. The engine resolves each one to a [`Value`], and the
//! [`Injected`] trait turns a value back into the Rust type the closure asked
//! for.

use crate::error::{DiError, Result};
use crate::provider::{Instance, TypeKey};
use crate::resolver::ObjectProvider;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// A configured literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl Literal {
    pub fn kind(&self) -> &'static str {
        match self {
            Literal::Str(_) => "String",
            Literal::Int(_) => "i64",
            Literal::Float(_) => "f64",
            Literal::Bool(_) => "bool",
        }
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Str(s) => f.write_str(s),
            Literal::Int(n) => write!(f, "{n}"),
            Literal::Float(n) => write!(f, "{n}"),
            Literal::Bool(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::Str(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::Str(s)
    }
}

impl From<i64> for Literal {
    fn from(n: i64) -> Self {
        Literal::Int(n)
    }
}

impl From<i32> for Literal {
    fn from(n: i32) -> Self {
        Literal::Int(n as i64)
    }
}

impl From<f64> for Literal {
    fn from(n: f64) -> Self {
        Literal::Float(n)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Bool(b)
    }
}

/// Declared type of a parameter or property.
///
/// Wrappers nest: `Optional(List(Bean(k)))` is an optional list of `k`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ParamType {
    Str,
    Int,
    Float,
    Bool,
    Bean(TypeKey),
    Optional(Box<ParamType>),
    Provider(Box<ParamType>),
    List(Box<ParamType>),
    Map(Box<ParamType>),
}

impl ParamType {
    #[inline]
    pub fn bean<T: ?Sized + 'static>() -> Self {
        ParamType::Bean(TypeKey::of::<T>())
    }

    /// Literal-like types are never autowired by name or type.
    pub fn is_simple(&self) -> bool {
        match self {
            ParamType::Str | ParamType::Int | ParamType::Float | ParamType::Bool => true,
            ParamType::Optional(inner) | ParamType::List(inner) | ParamType::Map(inner) => {
                inner.is_simple()
            }
            ParamType::Bean(_) | ParamType::Provider(_) => false,
        }
    }

    #[inline]
    pub fn is_multiple(&self) -> bool {
        matches!(self, ParamType::List(_) | ParamType::Map(_))
    }

    /// Innermost component type, if any.
    pub fn element_key(&self) -> Option<TypeKey> {
        match self {
            ParamType::Bean(key) => Some(*key),
            ParamType::Optional(inner)
            | ParamType::Provider(inner)
            | ParamType::List(inner)
            | ParamType::Map(inner) => inner.element_key(),
            _ => None,
        }
    }

    /// Depth of wrapper nesting.
    pub fn nesting_level(&self) -> usize {
        match self {
            ParamType::Optional(inner)
            | ParamType::Provider(inner)
            | ParamType::List(inner)
            | ParamType::Map(inner) => 1 + inner.nesting_level(),
            _ => 0,
        }
    }

    pub(crate) fn accepts_literal(&self, literal: &Literal) -> bool {
        matches!(
            (self, literal),
            (ParamType::Str, Literal::Str(_))
                | (ParamType::Int, Literal::Int(_))
                | (ParamType::Float, Literal::Float(_))
                | (ParamType::Bool, Literal::Bool(_))
        )
    }
}

impl fmt::Display for ParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamType::Str => f.write_str("String"),
            ParamType::Int => f.write_str("i64"),
            ParamType::Float => f.write_str("f64"),
            ParamType::Bool => f.write_str("bool"),
            ParamType::Bean(key) => f.write_str(key.name()),
            ParamType::Optional(inner) => write!(f, "Option<{inner}>"),
            ParamType::Provider(inner) => write!(f, "Provider<{inner}>"),
            ParamType::List(inner) => write!(f, "Vec<{inner}>"),
            ParamType::Map(inner) => write!(f, "BTreeMap<String, {inner}>"),
        }
    }
}

/// A resolved argument or property value.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Literal(Literal),
    Bean(Instance),
    List(Vec<Value>),
    /// Entries keep registration order.
    Map(Vec<(String, Value)>),
    Provider(ObjectProvider),
}

impl Value {
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Short description of the value's shape, for error messages.
    pub fn describe(&self) -> String {
        match self {
            Value::Null => "null".into(),
            Value::Literal(l) => l.kind().into(),
            Value::Bean(inst) => inst.type_name().into(),
            Value::List(_) => "list".into(),
            Value::Map(_) => "map".into(),
            Value::Provider(_) => "provider".into(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Literal(a), Value::Literal(b)) => a == b,
            (Value::Bean(a), Value::Bean(b)) => a.ptr_eq(b) && a.type_key() == b.type_key(),
            (Value::List(a), Value::List(b)) => a == b,
            (Value::Map(a), Value::Map(b)) => a == b,
            _ => false,
        }
    }
}

macro_rules! impl_value_from_literal {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(literal: $t) -> Self {
                    Value::Literal(literal.into())
                }
            }
        )*
    };
}

impl_value_from_literal!(&str, String, i64, i32, f64, bool);

impl From<Literal> for Value {
    fn from(literal: Literal) -> Self {
        Value::Literal(literal)
    }
}

impl From<Instance> for Value {
    fn from(instance: Instance) -> Self {
        Value::Bean(instance)
    }
}

/// A Rust type that can receive a resolved value.
///
/// Implemented for the literal types, `Arc<T>` (including `Arc<dyn Trait>`),
/// `Option`, `Vec`, `BTreeMap<String, _>` and [`Provider`](crate::Provider).
pub trait Injected: Sized {
    fn param_type() -> ParamType;

    fn from_value(value: Value) -> Result<Self>;
}

impl Injected for String {
    fn param_type() -> ParamType {
        ParamType::Str
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Literal(Literal::Str(s)) => Ok(s),
            other => Err(DiError::conversion("String", other.describe())),
        }
    }
}

macro_rules! impl_injected_int {
    ($($t:ty),*) => {
        $(
            impl Injected for $t {
                fn param_type() -> ParamType {
                    ParamType::Int
                }

                fn from_value(value: Value) -> Result<Self> {
                    match value {
                        Value::Literal(Literal::Int(n)) => <$t>::try_from(n).map_err(|e| DiError::Conversion {
                            expected: stringify!($t).into(),
                            found: "i64".into(),
                            reason: Some(e.to_string()),
                        }),
                        other => Err(DiError::conversion(stringify!($t), other.describe())),
                    }
                }
            }
        )*
    };
}

impl_injected_int!(i64, i32, i16, u64, u32, u16, usize);

impl Injected for f64 {
    fn param_type() -> ParamType {
        ParamType::Float
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Literal(Literal::Float(n)) => Ok(n),
            other => Err(DiError::conversion("f64", other.describe())),
        }
    }
}

impl Injected for f32 {
    fn param_type() -> ParamType {
        ParamType::Float
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Literal(Literal::Float(n)) => Ok(n as f32),
            other => Err(DiError::conversion("f32", other.describe())),
        }
    }
}

impl Injected for bool {
    fn param_type() -> ParamType {
        ParamType::Bool
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Literal(Literal::Bool(b)) => Ok(b),
            other => Err(DiError::conversion("bool", other.describe())),
        }
    }
}

impl<T: ?Sized + Send + Sync + 'static> Injected for Arc<T> {
    fn param_type() -> ParamType {
        ParamType::bean::<T>()
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Bean(inst) => inst
                .cast::<T>()
                .ok_or_else(|| DiError::conversion(std::any::type_name::<T>(), inst.type_name())),
            other => Err(DiError::conversion(std::any::type_name::<T>(), other.describe())),
        }
    }
}

impl<X: Injected> Injected for Option<X> {
    fn param_type() -> ParamType {
        ParamType::Optional(Box::new(X::param_type()))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(None),
            Value::Bean(inst) if inst.is_null() => Ok(None),
            other => X::from_value(other).map(Some),
        }
    }
}

impl<X: Injected> Injected for Vec<X> {
    fn param_type() -> ParamType {
        ParamType::List(Box::new(X::param_type()))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Vec::new()),
            Value::List(items) => items.into_iter().map(X::from_value).collect(),
            other => Err(DiError::conversion("list", other.describe())),
        }
    }
}

impl<X: Injected> Injected for BTreeMap<String, X> {
    fn param_type() -> ParamType {
        ParamType::Map(Box::new(X::param_type()))
    }

    fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(BTreeMap::new()),
            Value::Map(entries) => entries
                .into_iter()
                .map(|(k, v)| X::from_value(v).map(|x| (k, x)))
                .collect(),
            other => Err(DiError::conversion("map", other.describe())),
        }
    }
}

/// Argument array handed to an executable.
#[derive(Debug, Default)]
pub struct Args {
    values: Vec<Value>,
}

impl Args {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Move the value at `index` out as `X`.
    pub fn take<X: Injected>(&mut self, index: usize) -> Result<X> {
        let len = self.values.len();
        let slot = self
            .values
            .get_mut(index)
            .ok_or_else(|| DiError::Internal(format!("argument {index} requested but only {len} resolved")))?;
        X::from_value(std::mem::replace(slot, Value::Null))
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_param_types_inferred() {
        assert_eq!(String::param_type(), ParamType::Str);
        assert_eq!(<Option<i32>>::param_type(), ParamType::Optional(Box::new(ParamType::Int)));
        assert_eq!(
            <Vec<Arc<String>>>::param_type(),
            ParamType::List(Box::new(ParamType::bean::<String>()))
        );
        assert!(<Vec<String>>::param_type().is_simple());
        assert!(!<Arc<String>>::param_type().is_simple());
    }

    #[test]
    fn test_args_take() {
        let mut args = Args::new(vec![Value::from("x"), Value::from(5i64), Value::Null]);
        let name: String = args.take(0).unwrap();
        let port: u16 = args.take(1).unwrap();
        let missing: Option<String> = args.take(2).unwrap();
        assert_eq!(name, "x");
        assert_eq!(port, 5);
        assert_eq!(missing, None);
        assert!(args.take::<String>(7).is_err());
    }

    #[test]
    fn test_take_past_end_reports_count() {
        let mut args = Args::new(vec![Value::from("x")]);
        match args.take::<String>(3) {
            Err(DiError::Internal(message)) => assert!(message.contains("only 1 resolved"), "{message}"),
            other => panic!("expected an internal error, got {other:?}"),
        }
    }

    #[test]
    fn test_int_out_of_range() {
        let mut args = Args::new(vec![Value::from(-1i64)]);
        assert!(matches!(args.take::<u32>(0), Err(DiError::Conversion { .. })));
    }

    #[test]
    fn test_bean_extraction() {
        let inst = Instance::new(String::from("hello"));
        let mut args = Args::new(vec![Value::Bean(inst)]);
        let s: Arc<String> = args.take(0).unwrap();
        assert_eq!(s.as_str(), "hello");
    }

    #[test]
    fn test_nesting_and_element() {
        let t = <Option<Vec<Arc<String>>>>::param_type();
        assert_eq!(t.nesting_level(), 2);
        assert_eq!(t.element_key(), Some(TypeKey::of::<String>()));
    }
}
