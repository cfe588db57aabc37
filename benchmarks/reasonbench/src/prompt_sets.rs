//! Prompt sets
//!
//! A prompt set is one JSON file in the prompts directory: a system
//! instruction, a seed problem, and optional per-node templates.

use std::path::Path;

use anyhow::{Context, Result};
use indexmap::IndexMap;
use orchestrator::{NodePrompt, StateSeed};
use serde::Deserialize;

/// On-disk shape of a prompt set
#[derive(Debug, Clone, Default, Deserialize)]
struct PromptFile {
    #[serde(default)]
    system_prompt: String,
    #[serde(default)]
    test_prompt: String,
    #[serde(default, alias = "nodes")]
    agents: IndexMap<String, NodePrompt>,
    #[serde(default)]
    max_revisions: Option<u32>,
}

/// A named set of prompts for one sweep row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    /// File stem
    pub name: String,
    pub system_prompt: String,
    /// The seed problem
    pub test_prompt: String,
    /// Per-node templates and system-prompt flags
    pub nodes: IndexMap<String, NodePrompt>,
    /// Revision budget for workflows that loop
    pub max_revisions: Option<u32>,
}

impl PromptSet {
    pub fn new(name: impl Into<String>, test_prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            system_prompt: String::new(),
            test_prompt: test_prompt.into(),
            nodes: IndexMap::new(),
            max_revisions: None,
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_node(mut self, node: impl Into<String>, prompt: NodePrompt) -> Self {
        self.nodes.insert(node.into(), prompt);
        self
    }

    /// Parse from JSON text
    pub fn from_json(name: impl Into<String>, json: &str) -> Result<Self> {
        let file: PromptFile = serde_json::from_str(json)?;
        Ok(Self {
            name: name.into(),
            system_prompt: file.system_prompt,
            test_prompt: file.test_prompt,
            nodes: file.agents,
            max_revisions: file.max_revisions,
        })
    }

    /// Load from a file; the name is the file stem
    pub fn load(path: &Path) -> Result<Self> {
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .with_context(|| format!("Invalid prompt file name: {}", path.display()))?
            .to_string();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json(name, &content).with_context(|| format!("Invalid prompt set {}", path.display()))
    }

    /// Seed for the initial workflow state
    pub fn seed(&self) -> StateSeed {
        let mut seed = StateSeed::new(&self.name, &self.test_prompt)
            .with_system_prompt(&self.system_prompt);
        for (node, prompt) in &self.nodes {
            seed = seed.with_node(node, prompt.clone());
        }
        seed.max_revisions = self.max_revisions;
        seed
    }
}

/// All prompt sets of a sweep, in name order
#[derive(Debug, Clone, Default)]
pub struct PromptLibrary {
    sets: Vec<PromptSet>,
}

impl PromptLibrary {
    pub fn new(mut sets: Vec<PromptSet>) -> Self {
        sets.sort_by(|a, b| a.name.cmp(&b.name));
        Self { sets }
    }

    /// Load every `*.json` file of `dir`
    ///
    /// Files that fail to parse are skipped with a warning so one bad
    /// prompt set does not block the sweep.
    pub fn load_dir(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let entries = std::fs::read_dir(dir)
            .with_context(|| format!("Failed to read prompts directory {}", dir.display()))?;

        let mut sets = Vec::new();
        for entry in entries {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match PromptSet::load(&path) {
                Ok(set) => {
                    if set.test_prompt.trim().is_empty() {
                        tracing::warn!(prompt = %set.name, "Prompt set has an empty test_prompt");
                    }
                    sets.push(set);
                }
                Err(e) => tracing::warn!("Skipping prompt set: {:#}", e),
            }
        }

        tracing::debug!(count = sets.len(), dir = %dir.display(), "Loaded prompt sets");
        Ok(Self::new(sets))
    }

    pub fn sets(&self) -> &[PromptSet] {
        &self.sets
    }

    pub fn names(&self) -> Vec<&str> {
        self.sets.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&PromptSet> {
        self.sets.iter().find(|s| s.name == name)
    }

    /// Library restricted to one set
    pub fn only(&self, name: &str) -> Option<Self> {
        self.get(name).map(|set| Self {
            sets: vec![set.clone()],
        })
    }

    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }
}
