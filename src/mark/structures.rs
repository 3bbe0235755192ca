//! Mark records, the decorator wrapper and the attached-mark attribute.

use crate::error::{ConstructionError, MarkError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub type Kwargs = BTreeMap<String, Value>;

/// Named metadata attached to a test function or suite.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Mark {
    name: String,
    #[serde(default)]
    args: Vec<Value>,
    #[serde(default)]
    kwargs: Kwargs,
}

impl Mark {
    pub fn new(name: impl Into<String>, args: Vec<Value>, kwargs: Kwargs) -> Self {
        Self {
            name: name.into(),
            args,
            kwargs,
        }
    }

    /// A mark with no arguments.
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(name, Vec::new(), Kwargs::new())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    pub fn kwargs(&self) -> &Kwargs {
        &self.kwargs
    }

    /// Merge `other` into a new mark: args are concatenated, and `other`'s
    /// kwargs win on key collisions. Both marks must share a name.
    pub fn combined_with(&self, other: &Mark) -> Result<Mark, MarkError> {
        if self.name != other.name {
            return Err(MarkError::NameMismatch {
                left: self.name.clone(),
                right: other.name.clone(),
            });
        }
        Ok(self.merged(other))
    }

    fn merged(&self, other: &Mark) -> Mark {
        let mut args = self.args.clone();
        args.extend(other.args.iter().cloned());

        let mut kwargs = self.kwargs.clone();
        kwargs.extend(other.kwargs.iter().map(|(k, v)| (k.clone(), v.clone())));

        Mark::new(self.name.clone(), args, kwargs)
    }
}

impl fmt::Display for Mark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self
            .args
            .iter()
            .map(Value::to_string)
            .chain(self.kwargs.iter().map(|(k, v)| format!("{k}={v}")))
            .collect();
        write!(f, "{}({})", self.name, parts.join(", "))
    }
}

/// Something marks can be attached to: a test function or a test suite.
pub trait Markable {
    /// Name used when the target is stored as plain mark data.
    fn target_name(&self) -> &str;

    fn mark_attr(&self) -> Option<&MarkAttr>;

    fn set_mark_attr(&mut self, attr: MarkAttr);
}

/// One entry of an attached-mark attribute before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkEntry {
    Mark(Mark),
    Decorator(MarkDecorator),
    /// Anything that is not mark-shaped, e.g. malformed external metadata.
    Value(Value),
}

impl MarkEntry {
    fn unwrap_mark(&self) -> Result<Mark, ConstructionError> {
        match self {
            MarkEntry::Mark(mark) => Ok(mark.clone()),
            MarkEntry::Decorator(decorator) => Ok(decorator.mark().clone()),
            MarkEntry::Value(value) => Err(ConstructionError::InvalidMark(value.to_string())),
        }
    }
}

impl From<Mark> for MarkEntry {
    fn from(mark: Mark) -> Self {
        MarkEntry::Mark(mark)
    }
}

impl From<MarkDecorator> for MarkEntry {
    fn from(decorator: MarkDecorator) -> Self {
        MarkEntry::Decorator(decorator)
    }
}

impl From<Value> for MarkEntry {
    /// `{"name": ..}` objects are marks, `{"mark": {..}}` objects are
    /// decorators, everything else is kept as an opaque value.
    fn from(value: Value) -> Self {
        if let Value::Object(map) = &value {
            if map.len() == 1 {
                if let Some(inner) = map.get("mark") {
                    if let Ok(mark) = serde_json::from_value::<Mark>(inner.clone()) {
                        return MarkEntry::Decorator(MarkDecorator::new(mark));
                    }
                }
            }
            if let Ok(mark) = serde_json::from_value::<Mark>(value.clone()) {
                return MarkEntry::Mark(mark);
            }
        }
        MarkEntry::Value(value)
    }
}

/// The attached-mark attribute of a [`Markable`] target.
///
/// Readers accept a single entry or a sequence; writers always store a
/// sequence. Sequences are shared by reference between a suite and the
/// suites derived from it until one of them is written to.
#[derive(Debug, Clone, PartialEq)]
pub enum MarkAttr {
    Single(MarkEntry),
    Sequence(Arc<Vec<MarkEntry>>),
}

impl MarkAttr {
    pub fn from_marks(marks: Vec<Mark>) -> Self {
        MarkAttr::Sequence(Arc::new(marks.into_iter().map(MarkEntry::Mark).collect()))
    }

    fn entries(&self) -> &[MarkEntry] {
        match self {
            MarkAttr::Single(entry) => std::slice::from_ref(entry),
            MarkAttr::Sequence(entries) => entries,
        }
    }
}

impl From<Value> for MarkAttr {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => {
                MarkAttr::Sequence(Arc::new(items.into_iter().map(MarkEntry::from).collect()))
            }
            other => MarkAttr::Single(MarkEntry::from(other)),
        }
    }
}

/// Unwrap decorators and reject anything that is not a mark.
pub fn normalize_mark_list(entries: &[MarkEntry]) -> Result<Vec<Mark>, ConstructionError> {
    entries.iter().map(MarkEntry::unwrap_mark).collect()
}

/// The marks stored on `target`, normalized to a list.
pub fn get_unpacked_marks<T: Markable + ?Sized>(target: &T) -> Result<Vec<Mark>, ConstructionError> {
    match target.mark_attr() {
        Some(attr) => normalize_mark_list(attr.entries()),
        None => Ok(Vec::new()),
    }
}

/// Append `mark` to the marks stored on `target`.
///
/// Always writes a fresh sequence, so a sequence shared with another
/// target is left untouched.
pub fn store_mark<T: Markable + ?Sized>(target: &mut T, mark: Mark) -> Result<(), ConstructionError> {
    let mut marks = get_unpacked_marks(target)?;
    marks.push(mark);
    target.set_mark_attr(MarkAttr::from_marks(marks));
    Ok(())
}

/// A positional argument to [`MarkDecorator::call`].
#[derive(Debug)]
pub enum MarkArg<T> {
    Value(Value),
    Target(T),
}

/// What [`MarkDecorator::call`] produced.
#[derive(Debug)]
pub enum Applied<T> {
    /// The mark was attached and the target handed back.
    Target(T),
    /// The arguments were merged into a new decorator.
    Decorator(MarkDecorator),
}

/// Attaches a [`Mark`] to targets, or derives new decorators with more
/// arguments. Never mutated in place.
///
/// A decorator cannot store a single target as its only positional argument
/// through [`call`](Self::call); that shape always attaches. Use
/// [`with_args`](Self::with_args) to store such data explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkDecorator {
    mark: Mark,
}

impl MarkDecorator {
    pub fn new(mark: Mark) -> Self {
        Self { mark }
    }

    pub fn mark(&self) -> &Mark {
        &self.mark
    }

    pub fn name(&self) -> &str {
        self.mark.name()
    }

    pub fn args(&self) -> &[Value] {
        self.mark.args()
    }

    pub fn kwargs(&self) -> &Kwargs {
        self.mark.kwargs()
    }

    /// A new decorator with `args` and `kwargs` merged into this one's mark.
    pub fn with_args(&self, args: Vec<Value>, kwargs: Kwargs) -> MarkDecorator {
        let extra = Mark::new(self.name(), args, kwargs);
        MarkDecorator::new(self.mark.merged(&extra))
    }

    /// Attach this decorator's mark to `target` and return it.
    pub fn apply<T: Markable>(&self, mut target: T) -> Result<T, ConstructionError> {
        store_mark(&mut target, self.mark.clone())?;
        Ok(target)
    }

    /// Decorator-call dispatch: a lone target with no keyword arguments is
    /// marked and returned, anything else is merged into a new decorator.
    pub fn call<T: Markable>(
        &self,
        args: Vec<MarkArg<T>>,
        kwargs: Kwargs,
    ) -> Result<Applied<T>, ConstructionError> {
        let args = match <[MarkArg<T>; 1]>::try_from(args) {
            Ok([MarkArg::Target(target)]) if kwargs.is_empty() => {
                return self.apply(target).map(Applied::Target);
            }
            Ok([single]) => vec![single],
            Err(args) => args,
        };

        let values = args
            .into_iter()
            .map(|arg| match arg {
                MarkArg::Value(value) => value,
                MarkArg::Target(target) => Value::String(target.target_name().to_string()),
            })
            .collect();

        Ok(Applied::Decorator(self.with_args(values, kwargs)))
    }
}

impl fmt::Display for MarkDecorator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<MarkDecorator {}>", self.mark)
    }
}
