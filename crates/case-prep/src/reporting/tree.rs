//! In-memory tree of results, dumped as `data.json`.
//!
//! Results are addressed by dotted ids: the child `warnings` of the root
//! container is `root.warnings`. Re-adding an existing id replaces the
//! result in place and keeps its children.

use super::sink::{ReportSink, ResultContainer};
use crate::error::{CasePrepError, Result, ResultExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Id of the root container.
pub const ROOT_RESULT_ID: &str = "root";

/// File name of the dumped tree.
pub const RESULTS_FILE_NAME: &str = "data.json";

/// Colored tag attached to a result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub color: String,
    pub text: String,
}

/// Rows of a table result.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableData {
    pub headings: Vec<String>,
    pub rows: Vec<Vec<String>>,
    /// Text shown before the table.
    pub pre: String,
    /// Text shown after the table.
    pub post: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResultKind {
    Container,
    Table(TableData),
}

impl ResultKind {
    fn type_name(&self) -> &'static str {
        match self {
            ResultKind::Container => "ContainerResult",
            ResultKind::Table(_) => "TableResult",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultNode {
    pub id: String,
    pub name: String,
    pub labels: Vec<Label>,
    pub children: Vec<String>,
    pub kind: ResultKind,
}

impl ResultNode {
    pub fn is_container(&self) -> bool {
        matches!(self.kind, ResultKind::Container)
    }

    pub fn table(&self) -> Option<&TableData> {
        match &self.kind {
            ResultKind::Table(data) => Some(data),
            ResultKind::Container => None,
        }
    }
}

/// Declaration of a container created up front, with nested containers.
#[derive(Debug, Clone)]
pub struct ContainerSpec {
    pub id: String,
    pub name: String,
    pub children: Vec<ContainerSpec>,
}

impl ContainerSpec {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            children: Vec::new(),
        }
    }

    pub fn with_child(mut self, child: ContainerSpec) -> Self {
        self.children.push(child);
        self
    }
}

/// Serialized form of one result in `data.json`.
#[derive(Debug, Serialize, Deserialize)]
struct ResultRecord {
    id: String,
    name: String,
    #[serde(rename = "type")]
    result_type: String,
    data: serde_json::Value,
    labels: Vec<Label>,
    children: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct ResultsDocument {
    results: Vec<ResultRecord>,
    root_result: String,
}

/// The result tree.
#[derive(Debug, Clone)]
pub struct ResultTree {
    results: Vec<ResultNode>,
    index: HashMap<String, usize>,
}

impl Default for ResultTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ResultTree {
    /// A tree holding only the root container.
    pub fn new() -> Self {
        let mut tree = Self {
            results: Vec::new(),
            index: HashMap::new(),
        };
        tree.insert(ResultNode {
            id: ROOT_RESULT_ID.to_string(),
            name: "Root result".to_string(),
            labels: Vec::new(),
            children: Vec::new(),
            kind: ResultKind::Container,
        });
        tree
    }

    /// A tree with the given containers created under the root.
    pub fn with_containers(specs: &[ContainerSpec]) -> Result<Self> {
        let mut tree = Self::new();
        tree.create_containers(ROOT_RESULT_ID, specs)?;
        Ok(tree)
    }

    fn create_containers(&mut self, parent: &str, specs: &[ContainerSpec]) -> Result<()> {
        for spec in specs {
            let id = self.add_container(parent, &spec.id, &spec.name)?;
            self.create_containers(&id, &spec.children)?;
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&ResultNode> {
        self.index.get(id).map(|&i| &self.results[i])
    }

    /// All results in insertion order.
    pub fn results(&self) -> &[ResultNode] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Add a container under `parent`, returning its full id.
    pub fn add_container(&mut self, parent: &str, id: &str, name: &str) -> Result<String> {
        self.add_child(parent, id, name, ResultKind::Container)
    }

    /// Add a table under `parent`, returning its full id.
    pub fn add_table(
        &mut self,
        parent: &str,
        id: &str,
        title: &str,
        headings: Vec<String>,
        rows: Vec<Vec<String>>,
    ) -> Result<String> {
        let data = TableData {
            headings,
            rows,
            ..Default::default()
        };
        self.add_child(parent, id, title, ResultKind::Table(data))
    }

    /// Tag the result `id` with a colored label.
    ///
    /// Labels belong to the result: re-adding the id clears them.
    pub fn add_label(&mut self, id: &str, color: &str, text: &str) -> Result<()> {
        let &i = self
            .index
            .get(id)
            .ok_or_else(|| CasePrepError::ResultNotFound(id.to_string()))?;
        self.results[i].labels.push(Label {
            color: color.to_string(),
            text: text.to_string(),
        });
        Ok(())
    }

    fn add_child(&mut self, parent: &str, id: &str, name: &str, kind: ResultKind) -> Result<String> {
        if id.is_empty() || id.contains('.') {
            return Err(CasePrepError::InvalidConfig(format!(
                "result id '{}' must be non-empty and cannot contain dots",
                id
            )));
        }
        let parent_index = self.container_index(parent)?;
        let child_id = format!("{}.{}", parent, id);

        if !self.results[parent_index].children.contains(&child_id) {
            self.results[parent_index].children.push(child_id.clone());
        }

        let node = ResultNode {
            id: child_id.clone(),
            name: name.to_string(),
            labels: Vec::new(),
            children: Vec::new(),
            kind,
        };
        self.insert(node);
        debug!("Added result '{}'", child_id);
        Ok(child_id)
    }

    fn container_index(&self, id: &str) -> Result<usize> {
        match self.index.get(id) {
            Some(&i) if self.results[i].is_container() => Ok(i),
            _ => Err(CasePrepError::ResultNotFound(id.to_string())),
        }
    }

    fn insert(&mut self, mut node: ResultNode) {
        let existing = self.index.get(&node.id).copied();
        match existing {
            Some(i) => {
                node.children = std::mem::take(&mut self.results[i].children);
                self.results[i] = node;
            }
            None => {
                self.index.insert(node.id.clone(), self.results.len());
                self.results.push(node);
            }
        }
    }

    /// The tree in its `data.json` shape.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        let mut records = Vec::with_capacity(self.results.len());
        for node in &self.results {
            let data = match &node.kind {
                ResultKind::Container => json!({}),
                ResultKind::Table(table) => serde_json::to_value(table)?,
            };
            records.push(ResultRecord {
                id: node.id.clone(),
                name: node.name.clone(),
                result_type: node.kind.type_name().to_string(),
                data,
                labels: node.labels.clone(),
                children: node.children.clone(),
            });
        }

        let document = ResultsDocument {
            results: records,
            root_result: ROOT_RESULT_ID.to_string(),
        };
        Ok(serde_json::to_value(document)?)
    }

    /// Write `data.json` into `dir`, creating it if needed.
    pub fn dump(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).context(format!("Creating result directory {}", dir.display()))?;

        let path = dir.join(RESULTS_FILE_NAME);
        let content = serde_json::to_string_pretty(&self.to_json()?)?;
        let mut file = File::create(&path)?;
        file.write_all(content.as_bytes())?;

        info!("Results saved: {}", path.display());
        Ok(path)
    }
}

/// Handle on one container of a [`ResultTree`].
struct ContainerHandle<'a> {
    tree: &'a mut ResultTree,
    id: String,
}

impl ResultContainer for ContainerHandle<'_> {
    fn add_table(
        &mut self,
        id: &str,
        title: &str,
        headings: Vec<String>,
        rows: Vec<Vec<String>>,
    ) -> Result<()> {
        self.tree.add_table(&self.id, id, title, headings, rows)?;
        Ok(())
    }
}

impl ReportSink for ResultTree {
    fn get_result(&mut self, id: &str) -> Result<Box<dyn ResultContainer + '_>> {
        self.container_index(id)?;
        Ok(Box::new(ContainerHandle {
            tree: self,
            id: id.to_string(),
        }))
    }
}
