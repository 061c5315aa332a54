//! Per-executor cache of compiled programs
//!
//! Compilation is a pure function of the source text, so identical sources
//! share one `Arc<CompiledProgram>`. Failed compilations are never stored.

use crate::isa::{compile, CompileError, CompiledProgram};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Compiled programs keyed by their exact source text
///
/// ```
/// use kiln_backends::program_cache::ProgramCache;
///
/// let cache = ProgramCache::new();
/// let source = r#"{"symbol": {"0": {"Variable": "U32"}}, "operation": [{"WorkerId": 0}]}"#;
///
/// let first = cache.get_or_compile(source).unwrap();
/// let second = cache.get_or_compile(source).unwrap();
/// assert!(std::sync::Arc::ptr_eq(&first, &second));
/// assert_eq!(cache.len(), 1);
/// ```
#[derive(Default)]
pub struct ProgramCache {
    programs: RwLock<HashMap<Arc<str>, Arc<CompiledProgram>>>,
}

impl ProgramCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached program for `source`, compiling it on a miss
    ///
    /// Compilation runs without the lock held. Two threads missing on the
    /// same source may both compile; the first insert wins and both get it.
    pub fn get_or_compile(&self, source: &str) -> Result<Arc<CompiledProgram>, CompileError> {
        if let Some(program) = self.get(source) {
            tracing::trace!(source_bytes = source.len(), "program_cache_hit");
            return Ok(program);
        }

        let compiled = Arc::new(compile(source)?);
        let mut programs = self.programs.write();
        let program = Arc::clone(programs.entry(Arc::from(source)).or_insert(compiled));
        tracing::debug!(
            source_bytes = source.len(),
            cached_programs = programs.len(),
            "program_cache_insert"
        );
        Ok(program)
    }

    pub fn get(&self, source: &str) -> Option<Arc<CompiledProgram>> {
        self.programs.read().get(source).cloned()
    }

    pub fn clear(&self) {
        self.programs.write().clear();
    }

    pub fn len(&self) -> usize {
        self.programs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKER_ID: &str = r#"{"symbol": {"0": {"Variable": "U32"}}, "operation": [{"WorkerId": 0}]}"#;
    const NUM_WORKERS: &str = r#"{"symbol": {"0": {"Variable": "U32"}}, "operation": [{"NumWorkers": 0}]}"#;

    #[test]
    fn test_identical_sources_share_program() {
        let cache = ProgramCache::new();
        assert!(cache.is_empty());

        let first = cache.get_or_compile(WORKER_ID).unwrap();
        let second = cache.get_or_compile(WORKER_ID).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_distinct_sources() {
        let cache = ProgramCache::new();
        let a = cache.get_or_compile(WORKER_ID).unwrap();
        let b = cache.get_or_compile(NUM_WORKERS).unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(cache.len(), 2);
        assert!(cache.get(NUM_WORKERS).is_some());
    }

    #[test]
    fn test_rejected_source_not_stored() {
        let cache = ProgramCache::new();
        assert!(cache.get_or_compile("{").is_err());
        assert!(cache.get("{").is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_clear() {
        let cache = ProgramCache::new();
        cache.get_or_compile(WORKER_ID).unwrap();
        cache.clear();
        assert!(cache.is_empty());
    }
}
