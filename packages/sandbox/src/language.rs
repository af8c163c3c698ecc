// ABOUTME: Registry of languages the sandbox can execute
// ABOUTME: Maps a language tag to the interpreter command and script file name

use std::collections::HashMap;

/// How to run one language
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageSpec {
    pub tag: String,
    pub program: String,
    pub args: Vec<String>,
    /// Name of the script file written into the scratch directory
    pub file_name: String,
}

impl LanguageSpec {
    /// Python in isolated mode (-I ignores PYTHON* env and user site-packages),
    /// no bytecode files, unbuffered so output survives a timeout kill.
    pub fn python(program: impl Into<String>) -> Self {
        Self {
            tag: "python".to_string(),
            program: program.into(),
            args: vec!["-I".to_string(), "-B".to_string(), "-u".to_string()],
            file_name: "main.py".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LanguageRegistry {
    languages: HashMap<String, LanguageSpec>,
}

impl LanguageRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the single supported language
    pub fn with_python(program: impl Into<String>) -> Self {
        let mut registry = Self::new();
        registry.register(LanguageSpec::python(program));
        registry
    }

    pub fn register(&mut self, spec: LanguageSpec) {
        self.languages.insert(normalize(&spec.tag), spec);
    }

    /// Look up a language tag, ignoring case and surrounding whitespace
    pub fn get(&self, tag: &str) -> Option<&LanguageSpec> {
        self.languages.get(&normalize(tag))
    }

    pub fn supports(&self, tag: &str) -> bool {
        self.get(tag).is_some()
    }

    pub fn tags(&self) -> Vec<&str> {
        let mut tags: Vec<&str> = self.languages.keys().map(String::as_str).collect();
        tags.sort_unstable();
        tags
    }
}

fn normalize(tag: &str) -> String {
    tag.trim().to_lowercase()
}
