//! Test marks: metadata attached to test functions and suites.
//!
//! [`MarkFactory`] hands out [`MarkDecorator`]s by name; decorators attach
//! [`Mark`]s to [`Markable`] targets, where collection picks them up as node
//! markers.

mod expression;
mod structures;

pub use expression::MarkExpression;
pub use structures::{
    get_unpacked_marks, normalize_mark_list, store_mark, Applied, Kwargs, Mark, MarkArg,
    MarkAttr, MarkDecorator, MarkEntry, Markable,
};

use crate::error::MarkError;
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, OnceLock, PoisonError};

/// Markers that are always known, even with strict marker checking.
pub const BUILTIN_MARKERS: &[&str] = &[
    "filterwarnings",
    "parametrize",
    "skip",
    "skipif",
    "usefixtures",
    "xfail",
];

/// Produces decorators by mark name.
///
/// Decorators are created on first request and cached. [`MarkFactory::global`]
/// serves test code that needs no registered markers.
#[derive(Debug, Default)]
pub struct MarkFactory {
    markers: HashSet<String>,
    strict: bool,
    cache: Mutex<HashMap<String, MarkDecorator>>,
}

impl MarkFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory aware of registered `markers`.
    ///
    /// Entries may carry a description after a colon (`"slow: long tests"`).
    /// With `strict`, looking up an unregistered name fails.
    pub fn with_markers<I, S>(markers: I, strict: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let markers = markers
            .into_iter()
            .filter_map(|line| marker_name(line.as_ref()))
            .collect();

        Self {
            markers,
            strict,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The process-wide default factory: no registered markers, not strict.
    pub fn global() -> &'static MarkFactory {
        static GLOBAL: OnceLock<MarkFactory> = OnceLock::new();
        GLOBAL.get_or_init(MarkFactory::new)
    }

    pub fn from_config(config: &crate::config::Config) -> Self {
        Self::with_markers(&config.markers, config.strict_markers)
    }

    /// The decorator for `name`.
    pub fn get(&self, name: &str) -> Result<MarkDecorator, MarkError> {
        if name.is_empty() {
            return Err(MarkError::EmptyName);
        }
        if name.starts_with('_') {
            return Err(MarkError::ReservedName(name.to_string()));
        }
        if self.strict && !self.is_known(name) {
            return Err(MarkError::UnknownMarker(name.to_string()));
        }

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(cache
            .entry(name.to_string())
            .or_insert_with(|| MarkDecorator::new(Mark::named(name)))
            .clone())
    }

    pub fn is_known(&self, name: &str) -> bool {
        BUILTIN_MARKERS.contains(&name) || self.markers.contains(name)
    }

    pub fn skip(&self) -> MarkDecorator {
        self.builtin("skip")
    }

    pub fn xfail(&self) -> MarkDecorator {
        self.builtin("xfail")
    }

    fn builtin(&self, name: &str) -> MarkDecorator {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        cache
            .entry(name.to_string())
            .or_insert_with(|| MarkDecorator::new(Mark::named(name)))
            .clone()
    }
}

fn marker_name(line: &str) -> Option<String> {
    let name = line.split([':', '(']).next().unwrap_or_default().trim();
    (!name.is_empty()).then(|| name.to_string())
}
