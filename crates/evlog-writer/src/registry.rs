//! Scheme → writer constructor table.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::bulk::BulkWriter;
use crate::error::{Result, WriterError};
use crate::file::FileWriter;
use crate::stdout::StdoutWriter;
use crate::writer::{Writer, WriterConfig};

/// Builds a writer for one destination.
pub type WriterMaker = Arc<dyn Fn(&WriterConfig) -> Result<Arc<dyn Writer>> + Send + Sync>;

/// Table of writer makers keyed by URI scheme.
#[derive(Clone, Default)]
pub struct WriterRegistry {
    makers: HashMap<String, WriterMaker>,
}

impl fmt::Debug for WriterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut schemes: Vec<&str> = self.makers.keys().map(String::as_str).collect();
        schemes.sort_unstable();
        f.debug_struct("WriterRegistry")
            .field("schemes", &schemes)
            .finish()
    }
}

impl WriterRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in backends: `stdout`, `file`, `es`, `ess`.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(
            "stdout",
            |config: &WriterConfig| -> Result<Arc<dyn Writer>> {
                Ok(Arc::new(StdoutWriter::from_config(config)))
            },
        );
        registry.register("file", |config: &WriterConfig| -> Result<Arc<dyn Writer>> {
            Ok(Arc::new(FileWriter::from_config(config)?))
        });
        let bulk = |config: &WriterConfig| -> Result<Arc<dyn Writer>> {
            Ok(Arc::new(BulkWriter::from_config(config)?))
        };
        registry.register("es", bulk);
        registry.register("ess", bulk);
        registry
    }

    /// Add or replace the maker for `scheme`.
    pub fn register<F>(&mut self, scheme: impl Into<String>, maker: F)
    where
        F: Fn(&WriterConfig) -> Result<Arc<dyn Writer>> + Send + Sync + 'static,
    {
        self.makers.insert(scheme.into(), Arc::new(maker));
    }

    pub fn contains(&self, scheme: &str) -> bool {
        self.makers.contains_key(scheme)
    }

    /// Build the writer for `config.destination`.
    pub fn new_writer(&self, config: &WriterConfig) -> Result<Arc<dyn Writer>> {
        let scheme = config.scheme();
        let maker = self
            .makers
            .get(scheme)
            .ok_or_else(|| WriterError::UnknownScheme(scheme.to_string()))?;
        maker(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::FlushMode;
    use std::sync::Mutex;

    #[derive(Default)]
    struct MemoryWriter {
        lines: Mutex<Vec<String>>,
    }

    impl Writer for MemoryWriter {
        fn scheme(&self) -> &str {
            "mem"
        }
        fn log(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
        }
        fn run(&self, _mode: FlushMode) {}
    }

    #[test]
    fn test_defaults_dispatch_by_scheme() {
        let registry = WriterRegistry::with_defaults();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.log");

        let writer = registry.new_writer(&WriterConfig::new("")).unwrap();
        assert_eq!(writer.scheme(), "stdout");

        let writer = registry
            .new_writer(&WriterConfig::new(path.to_string_lossy()))
            .unwrap();
        assert_eq!(writer.scheme(), "file");

        let writer = registry
            .new_writer(&WriterConfig::new("ess://localhost:9200/g"))
            .unwrap();
        assert_eq!(writer.scheme(), "ess");
        assert!(writer.is_remote());
    }

    #[test]
    fn test_unknown_scheme() {
        let registry = WriterRegistry::with_defaults();
        let err = match registry.new_writer(&WriterConfig::new("kafka://broker:9092")) {
            Err(e) => e,
            Ok(_) => panic!("kafka should not be registered"),
        };
        assert!(matches!(err, WriterError::UnknownScheme(ref s) if s == "kafka"));
    }

    #[test]
    fn test_custom_maker() {
        let mut registry = WriterRegistry::new();
        assert!(!registry.contains("mem"));
        registry.register("mem", |_: &WriterConfig| -> Result<Arc<dyn Writer>> {
            Ok(Arc::new(MemoryWriter::default()))
        });
        let writer = registry.new_writer(&WriterConfig::new("mem://x")).unwrap();
        writer.log("hello");
        assert_eq!(writer.scheme(), "mem");
    }
}
