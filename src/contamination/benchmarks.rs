//! Benchmark test-set registries.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;
use walkdir::WalkDir;

use crate::error::{FtlintError, Result};

/// Well-known benchmarks and their descriptions.
pub const BUILTIN_BENCHMARKS: [(&str, &str); 6] = [
    ("mmlu", "Massive Multitask Language Understanding"),
    ("hellaswag", "HellaSwag commonsense reasoning"),
    ("arc", "AI2 Reasoning Challenge"),
    ("truthfulqa", "TruthfulQA"),
    ("gsm8k", "Grade School Math 8K"),
    ("humaneval", "HumanEval code generation"),
];

/// Record fields holding the test string in JSONL benchmark files.
const TEXT_FIELDS: [&str; 3] = ["text", "question", "prompt"];

/// Description of a built-in benchmark.
pub fn builtin_description(name: &str) -> Option<&'static str> {
    BUILTIN_BENCHMARKS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, d)| *d)
}

/// A benchmark name as shown to users.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BenchmarkEntry {
    pub name: String,
    pub description: Option<&'static str>,
    /// Whether the registry can load it.
    pub available: bool,
}

/// Built-in benchmarks merged with everything `registry` can load, sorted
/// by name.
pub fn catalog(registry: &dyn BenchmarkRegistry) -> Vec<BenchmarkEntry> {
    let available = registry.names();
    let mut names: Vec<String> = BUILTIN_BENCHMARKS
        .iter()
        .map(|(name, _)| name.to_string())
        .chain(available.iter().cloned())
        .collect();
    names.sort();
    names.dedup();
    names
        .into_iter()
        .map(|name| BenchmarkEntry {
            description: builtin_description(&name),
            available: available.contains(&name),
            name,
        })
        .collect()
}

/// Source of benchmark test strings.
pub trait BenchmarkRegistry: Send + Sync {
    /// Names of benchmarks this registry can load, sorted.
    fn names(&self) -> Vec<String>;

    /// Test strings of `name`. Unknown names fail with
    /// [`FtlintError::BenchmarkNotFound`].
    fn load(&self, name: &str) -> Result<Vec<String>>;

    fn contains(&self, name: &str) -> bool {
        self.names().iter().any(|n| n == name)
    }
}

/// Registry holding test strings in memory.
#[derive(Debug, Clone, Default)]
pub struct InMemoryRegistry {
    benchmarks: BTreeMap<String, Vec<String>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_benchmark<S: Into<String>>(
        mut self,
        name: impl Into<String>,
        strings: impl IntoIterator<Item = S>,
    ) -> Self {
        self.insert(name, strings);
        self
    }

    pub fn insert<S: Into<String>>(
        &mut self,
        name: impl Into<String>,
        strings: impl IntoIterator<Item = S>,
    ) {
        self.benchmarks
            .insert(name.into(), strings.into_iter().map(Into::into).collect());
    }
}

impl BenchmarkRegistry for InMemoryRegistry {
    fn names(&self) -> Vec<String> {
        self.benchmarks.keys().cloned().collect()
    }

    fn load(&self, name: &str) -> Result<Vec<String>> {
        self.benchmarks
            .get(name)
            .cloned()
            .ok_or_else(|| FtlintError::BenchmarkNotFound {
                name: name.to_string(),
            })
    }
}

/// Registry reading `<dir>/<name>.jsonl` or `<dir>/<name>.txt`.
///
/// JSONL lines are JSON strings or objects with a `text`, `question` or
/// `prompt` field. Text files hold one test string per line.
#[derive(Debug, Clone)]
pub struct DirectoryRegistry {
    root: PathBuf,
}

impl DirectoryRegistry {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Test-set file for `name`. Names that are not a plain file stem
    /// (empty, containing a path separator, or `..`) never resolve.
    fn file_for(&self, name: &str) -> Option<PathBuf> {
        if name.is_empty() || name.contains(['/', '\\']) || name.contains("..") {
            return None;
        }
        ["jsonl", "txt"]
            .iter()
            .map(|ext| self.root.join(format!("{name}.{ext}")))
            .find(|p| p.is_file())
    }
}

fn parse_jsonl_line(line: &str) -> Option<String> {
    match serde_json::from_str::<Value>(line).ok()? {
        Value::String(s) => Some(s),
        Value::Object(map) => TEXT_FIELDS
            .iter()
            .find_map(|f| map.get(*f).and_then(Value::as_str))
            .map(str::to_string),
        _ => None,
    }
}

impl BenchmarkRegistry for DirectoryRegistry {
    fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = WalkDir::new(&self.root)
            .max_depth(1)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let path = entry.path();
                let ext = path.extension()?.to_str()?;
                if ext != "jsonl" && ext != "txt" {
                    return None;
                }
                Some(path.file_stem()?.to_str()?.to_string())
            })
            .collect();
        names.sort();
        names.dedup();
        names
    }

    fn load(&self, name: &str) -> Result<Vec<String>> {
        let path = self
            .file_for(name)
            .ok_or_else(|| FtlintError::BenchmarkNotFound {
                name: name.to_string(),
            })?;
        let content =
            fs::read_to_string(&path).map_err(|e| FtlintError::load(path.display().to_string(), e))?;

        let is_jsonl = path.extension().is_some_and(|e| e == "jsonl");
        let strings: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .filter_map(|line| {
                if is_jsonl {
                    parse_jsonl_line(line)
                } else {
                    Some(line.to_string())
                }
            })
            .collect();
        tracing::debug!(benchmark = name, path = %path.display(), strings = strings.len(), "Benchmark loaded");
        Ok(strings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_builtin_catalog() {
        assert_eq!(builtin_description("gsm8k"), Some("Grade School Math 8K"));
        assert_eq!(builtin_description("squad"), None);
    }

    #[test]
    fn test_catalog_merges_builtins_with_registry() {
        let registry = InMemoryRegistry::new()
            .with_benchmark("gsm8k", ["How many apples?"])
            .with_benchmark("internal_eval", ["held out"]);
        let entries = catalog(&registry);
        assert_eq!(entries.len(), BUILTIN_BENCHMARKS.len() + 1);

        let find = |name: &str| entries.iter().find(|e| e.name == name).expect("entry");
        assert_eq!(find("gsm8k").description, Some("Grade School Math 8K"));
        assert!(find("gsm8k").available);
        assert!(!find("mmlu").available);
        assert_eq!(find("internal_eval").description, None);
        assert!(find("internal_eval").available);

        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        let mut sorted = names.clone();
        sorted.sort();
        assert_eq!(names, sorted);
    }

    #[test]
    fn test_in_memory_unknown_benchmark() {
        let registry = InMemoryRegistry::new().with_benchmark("toy", ["a b c"]);
        assert!(registry.contains("toy"));
        let err = registry.load("squad").unwrap_err();
        assert!(matches!(err, FtlintError::BenchmarkNotFound { name } if name == "squad"));
    }

    #[test]
    fn test_directory_registry_reads_jsonl_and_txt() {
        let dir = TempDir::new().expect("tempdir");
        fs::write(
            dir.path().join("gsm8k.jsonl"),
            "{\"question\": \"How many apples?\"}\n\"plain string\"\n\n{\"other\": 1}\n",
        )
        .expect("write");
        fs::write(dir.path().join("arc.txt"), "first line\nsecond line\n").expect("write");
        fs::write(dir.path().join("notes.md"), "ignored").expect("write");

        let registry = DirectoryRegistry::new(dir.path());
        assert_eq!(registry.names(), vec!["arc", "gsm8k"]);
        assert_eq!(
            registry.load("gsm8k").expect("load"),
            vec!["How many apples?", "plain string"]
        );
        assert_eq!(registry.load("arc").expect("load").len(), 2);
        assert!(matches!(
            registry.load("mmlu"),
            Err(FtlintError::BenchmarkNotFound { .. })
        ));
    }

    #[test]
    fn test_directory_registry_stays_inside_root() {
        let dir = TempDir::new().expect("tempdir");
        let root = dir.path().join("benchmarks");
        fs::create_dir(&root).expect("mkdir");
        fs::create_dir(root.join("nested")).expect("mkdir");
        fs::write(dir.path().join("secret.txt"), "outside the root\n").expect("write");
        fs::write(root.join("nested").join("inner.txt"), "nested line\n").expect("write");

        let registry = DirectoryRegistry::new(&root);
        for name in ["../secret", "nested/inner", "nested\\inner", "..", ""] {
            let err = registry.load(name).unwrap_err();
            assert!(
                matches!(&err, FtlintError::BenchmarkNotFound { name: n } if n == name),
                "{name:?} resolved: {err:?}"
            );
        }
    }
}
