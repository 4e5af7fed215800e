//! Prompt template collection.
//!
//! [`PromptStore`] owns the templates and the selected id. The selected id
//! is a weak reference: when it dangles, [`PromptStore::selected`] falls back
//! to the first template.
//!
//! Every mutation writes the new state first and commits it to memory only
//! once the write succeeded, so a storage failure leaves both unchanged.

pub mod autosave;
mod defaults;

pub use autosave::{AutoSaver, SaveGate, Snapshot};
pub use defaults::default_templates;

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::{Result, TexSauceError};
use crate::storage::{KeyValueStore, keys};

/// A named, user-editable instruction sent along with the images.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Opaque, unique, stable id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Template body.
    pub content: String,
}

impl PromptTemplate {
    /// Create a template.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            content: content.into(),
        }
    }
}

/// How an imported collection combines with the current one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImportStrategy {
    /// Discard the current collection.
    Replace,
    /// Keep the current collection; imported entries get fresh ids.
    Append,
}

impl std::str::FromStr for ImportStrategy {
    type Err = TexSauceError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "replace" => Ok(Self::Replace),
            "append" => Ok(Self::Append),
            other => Err(TexSauceError::Validation(format!(
                "unknown import strategy '{other}' (expected replace or append)"
            ))),
        }
    }
}

/// User answer to a destructive-action prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    /// Go ahead.
    Confirmed,
    /// Leave everything as it is.
    Declined,
}

/// File name for an export made on `date`.
pub fn export_file_name(date: NaiveDate) -> String {
    format!("tex_sauce_prompts_{}.json", date.format("%Y-%m-%d"))
}

/// Template collection backed by a [`KeyValueStore`].
pub struct PromptStore {
    store: Arc<dyn KeyValueStore>,
    gate: SaveGate,
    templates: Vec<PromptTemplate>,
    selected_id: Option<String>,
    editing_id: Option<String>,
}

impl std::fmt::Debug for PromptStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptStore")
            .field("templates", &self.templates.len())
            .field("selected_id", &self.selected_id)
            .field("editing_id", &self.editing_id)
            .finish()
    }
}

impl PromptStore {
    /// Load the collection, seeding the built-in templates on first use.
    ///
    /// # Errors
    ///
    /// [`TexSauceError::Storage`] if the stored collection cannot be parsed;
    /// store I/O failures otherwise.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let templates = match store.get(keys::PROMPTS)? {
            Some(json) => serde_json::from_str::<Vec<PromptTemplate>>(&json).map_err(|e| {
                TexSauceError::Storage(format!("stored prompt collection is corrupt: {e}"))
            })?,
            None => {
                info!("no stored prompts, seeding built-in templates");
                let seeded = default_templates();
                store.set(keys::PROMPTS, &to_json(&seeded)?)?;
                seeded
            }
        };

        let stored_selection = store.get(keys::SELECTED_PROMPT)?;
        let mut prompts = Self {
            store,
            gate: SaveGate::default(),
            templates,
            selected_id: stored_selection,
            editing_id: None,
        };
        let resolved = prompts.resolved_selection();
        if resolved != prompts.selected_id {
            prompts.set_selection(resolved)?;
        }
        debug!(
            templates = prompts.templates.len(),
            selected = ?prompts.selected_id,
            "prompt store loaded"
        );
        Ok(prompts)
    }

    /// All templates in display order.
    pub fn templates(&self) -> &[PromptTemplate] {
        &self.templates
    }

    /// Look up a template by id.
    pub fn get(&self, id: &str) -> Option<&PromptTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// Selected id as stored, which may be `None` when the collection is empty.
    pub fn selected_id(&self) -> Option<&str> {
        self.selected_id.as_deref()
    }

    /// The selected template, or the first one if the selection dangles.
    pub fn selected(&self) -> Option<&PromptTemplate> {
        self.selected_id
            .as_deref()
            .and_then(|id| self.get(id))
            .or_else(|| self.templates.first())
    }

    /// Template currently open in the editor, `None` for a blank "new" editor.
    pub fn editing_id(&self) -> Option<&str> {
        self.editing_id.as_deref()
    }

    /// Open a template in the editor.
    pub fn begin_edit(&mut self, id: &str) -> Option<&PromptTemplate> {
        let found = self.templates.iter().position(|t| t.id == id)?;
        self.editing_id = Some(id.to_owned());
        self.templates.get(found)
    }

    /// Reset the editor to an empty "new" state.
    pub fn start_new(&mut self) {
        self.editing_id = None;
    }

    /// Persist the full collection.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub fn save(&self) -> Result<()> {
        self.write_templates(&self.templates)
    }

    /// Snapshot of the collection for an [`AutoSaver`] started with
    /// [`PromptStore::autosaver`].
    ///
    /// # Errors
    ///
    /// Only if serialization fails.
    pub fn snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot::new(self.gate.revision(), self.snapshot_json()?))
    }

    /// Start a debounced writer that yields to this store's full saves.
    pub fn autosaver(&self, debounce: Duration) -> AutoSaver {
        AutoSaver::spawn(Arc::clone(&self.store), self.gate.clone(), debounce)
    }

    /// Serialized collection, as persisted.
    ///
    /// # Errors
    ///
    /// Only if serialization fails.
    pub fn snapshot_json(&self) -> Result<String> {
        to_json(&self.templates)
    }

    /// Create a template; it becomes selected and open in the editor.
    ///
    /// # Errors
    ///
    /// [`TexSauceError::Validation`] if the trimmed name or content is empty.
    pub fn create(&mut self, name: &str, content: &str) -> Result<&PromptTemplate> {
        let (name, content) = validate_fields(name, content)?;
        let id = format!("prompt-{}", Uuid::new_v4().simple());
        let mut next = self.templates.clone();
        next.push(PromptTemplate::new(id.clone(), name, content));
        self.write_templates(&next)?;
        self.templates = next;

        self.editing_id = Some(id.clone());
        self.set_selection(Some(id.clone()))?;
        info!(template_id = %id, "prompt created");

        self.get(&id)
            .ok_or_else(|| TexSauceError::Storage("created prompt vanished".into()))
    }

    /// Replace the name and content of an existing template.
    ///
    /// # Errors
    ///
    /// [`TexSauceError::Validation`] on empty fields or an unknown id.
    pub fn update(&mut self, id: &str, name: &str, content: &str) -> Result<&PromptTemplate> {
        let (name, content) = validate_fields(name, content)?;
        let idx = self
            .templates
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| TexSauceError::Validation(format!("no prompt with id '{id}'")))?;
        let mut next = self.templates.clone();
        next[idx].name = name;
        next[idx].content = content;
        self.write_templates(&next)?;
        self.templates = next;
        self.editing_id = Some(id.to_owned());
        info!(template_id = %id, "prompt updated");
        Ok(&self.templates[idx])
    }

    /// Delete a template after confirmation.
    ///
    /// Returns `false` when the user declined. The editor is reset to a
    /// blank state and a dangling selection falls back to the first template.
    ///
    /// # Errors
    ///
    /// [`TexSauceError::Validation`] for an unknown id.
    pub fn delete(&mut self, id: &str, confirmation: Confirmation) -> Result<bool> {
        if self.get(id).is_none() {
            return Err(TexSauceError::Validation(format!("no prompt with id '{id}'")));
        }
        if confirmation == Confirmation::Declined {
            debug!(template_id = %id, "delete declined");
            return Ok(false);
        }

        let next: Vec<PromptTemplate> = self
            .templates
            .iter()
            .filter(|t| t.id != id)
            .cloned()
            .collect();
        self.write_templates(&next)?;
        self.templates = next;
        self.start_new();

        let resolved = self.resolved_selection();
        if resolved != self.selected_id {
            self.set_selection(resolved)?;
        }
        info!(template_id = %id, remaining = self.templates.len(), "prompt deleted");
        Ok(true)
    }

    /// Make `id` the selected template.
    ///
    /// # Errors
    ///
    /// [`TexSauceError::Validation`] for an unknown id.
    pub fn select(&mut self, id: &str) -> Result<&PromptTemplate> {
        let idx = self
            .templates
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| TexSauceError::Validation(format!("no prompt with id '{id}'")))?;
        self.set_selection(Some(id.to_owned()))?;
        Ok(&self.templates[idx])
    }

    /// Apply a live edit to the selected template's content in memory.
    ///
    /// Persistence is left to the caller (usually through an [`AutoSaver`]).
    /// Returns the edited template id, or `None` if nothing is selected.
    pub fn edit_selected_content(&mut self, content: &str) -> Option<String> {
        let id = self.selected()?.id.clone();
        let template = self.templates.iter_mut().find(|t| t.id == id)?;
        template.content = content.to_owned();
        Some(id)
    }

    /// Serialize the whole collection for download.
    ///
    /// # Errors
    ///
    /// Only if serialization fails.
    pub fn export(&self) -> Result<String> {
        self.snapshot_json()
    }

    /// Write an export named for `date` into `dir`, returning its path.
    ///
    /// # Errors
    ///
    /// I/O failures creating the directory or writing the file.
    pub fn export_to_dir(
        &self,
        dir: &std::path::Path,
        date: NaiveDate,
    ) -> Result<std::path::PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(export_file_name(date));
        std::fs::write(&path, self.export()?)?;
        info!(path = %path.display(), templates = self.templates.len(), "prompts exported");
        Ok(path)
    }

    /// Import a JSON document. Returns the number of imported templates.
    ///
    /// Nothing changes when the document is malformed.
    ///
    /// # Errors
    ///
    /// [`TexSauceError::MalformedImport`] if the document is not a JSON array
    /// of objects with non-empty `id`, `name` and `content` strings.
    pub fn import(&mut self, document: &str, strategy: ImportStrategy) -> Result<usize> {
        let imported = parse_import(document)?;
        let count = imported.len();

        let next = match strategy {
            ImportStrategy::Replace => {
                let mut seen = std::collections::HashSet::new();
                if let Some(dup) = imported.iter().find(|t| !seen.insert(t.id.as_str())) {
                    return Err(TexSauceError::MalformedImport(format!(
                        "duplicate id '{}' in import",
                        dup.id
                    )));
                }
                imported
            }
            ImportStrategy::Append => {
                let mut next = self.templates.clone();
                next.extend(imported.into_iter().map(|t| PromptTemplate {
                    id: format!("imported-{}", Uuid::new_v4().simple()),
                    ..t
                }));
                next
            }
        };
        self.write_templates(&next)?;
        self.templates = next;
        self.start_new();

        let resolved = self.resolved_selection();
        if resolved != self.selected_id {
            self.set_selection(resolved)?;
        }
        info!(?strategy, count, total = self.templates.len(), "prompts imported");
        Ok(count)
    }

    fn write_templates(&self, templates: &[PromptTemplate]) -> Result<()> {
        let json = to_json(templates)?;
        self.gate.save(|| self.store.set(keys::PROMPTS, &json))
    }

    /// The current selection, or the first template if it dangles.
    fn resolved_selection(&self) -> Option<String> {
        match self.selected_id.as_deref() {
            Some(id) if self.get(id).is_some() => Some(id.to_owned()),
            stale => {
                if let Some(stale) = stale {
                    warn!(template_id = %stale, "selected prompt no longer exists");
                }
                self.templates.first().map(|t| t.id.clone())
            }
        }
    }

    fn set_selection(&mut self, id: Option<String>) -> Result<()> {
        match &id {
            Some(id) => self.store.set(keys::SELECTED_PROMPT, id)?,
            None => self.store.remove(keys::SELECTED_PROMPT)?,
        }
        self.selected_id = id;
        Ok(())
    }
}

fn to_json(templates: &[PromptTemplate]) -> Result<String> {
    serde_json::to_string_pretty(templates)
        .map_err(|e| TexSauceError::Storage(format!("failed to serialize prompts: {e}")))
}

fn validate_fields(name: &str, content: &str) -> Result<(String, String)> {
    let name = name.trim();
    let content = content.trim();
    if name.is_empty() || content.is_empty() {
        return Err(TexSauceError::Validation(
            "name and content are required".into(),
        ));
    }
    Ok((name.to_owned(), content.to_owned()))
}

/// Parse and validate an import document.
fn parse_import(document: &str) -> Result<Vec<PromptTemplate>> {
    let value: serde_json::Value = serde_json::from_str(document)
        .map_err(|e| TexSauceError::MalformedImport(format!("not valid JSON: {e}")))?;
    let items = value
        .as_array()
        .ok_or_else(|| TexSauceError::MalformedImport("expected a JSON array".into()))?;

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let field = |name: &str| -> Result<String> {
                item.get(name)
                    .and_then(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .ok_or_else(|| {
                        TexSauceError::MalformedImport(format!(
                            "entry {i} is missing a non-empty '{name}'"
                        ))
                    })
            };
            Ok(PromptTemplate {
                id: field("id")?,
                name: field("name")?,
                content: field("content")?,
            })
        })
        .collect()
}
