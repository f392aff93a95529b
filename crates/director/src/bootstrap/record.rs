use std::collections::HashMap;

use crate::bootstrap::selector::FileIndexSelector;
use crate::bootstrap::volume::VolumeParams;
use crate::bootstrap::writer::{self, BootstrapOutput, BuildOptions};
use crate::catalog::Catalog;
use crate::error::BootstrapError;
use crate::job::JobId;

/// Selection for one source job.
#[derive(Debug, Clone)]
pub struct BootstrapNode {
    pub job_id: JobId,
    pub selector: FileIndexSelector,
    pub file_regex: Option<String>,
    pub vol_session_id: u32,
    pub vol_session_time: u32,
    pub volumes: Vec<VolumeParams>,
}

impl BootstrapNode {
    fn new(job_id: JobId) -> Self {
        Self {
            job_id,
            selector: FileIndexSelector::new(),
            file_regex: None,
            vol_session_id: 0,
            vol_session_time: 0,
            volumes: Vec::new(),
        }
    }
}

/// Per-job selections, kept in the order each job was first referenced.
#[derive(Debug, Clone, Default)]
pub struct BootstrapRecord {
    nodes: Vec<BootstrapNode>,
    index: HashMap<JobId, usize>,
}

impl BootstrapRecord {
    pub fn new() -> Self {
        Self::default()
    }

    fn node_mut(&mut self, job_id: JobId) -> &mut BootstrapNode {
        let slot = match self.index.get(&job_id) {
            Some(&slot) => slot,
            None => {
                self.nodes.push(BootstrapNode::new(job_id));
                let slot = self.nodes.len() - 1;
                self.index.insert(job_id, slot);
                slot
            }
        };
        &mut self.nodes[slot]
    }

    pub fn add_selection(&mut self, job_id: JobId, file_index: u32) {
        self.node_mut(job_id).selector.insert(file_index);
    }

    pub fn add_all_selection(&mut self, job_id: JobId) {
        self.node_mut(job_id).selector.select_all();
    }

    /// Restricts a job's restored files to names matching `pattern`.
    pub fn set_file_regex(&mut self, job_id: JobId, pattern: &str) -> Result<(), BootstrapError> {
        regex::Regex::new(pattern).map_err(|e| BootstrapError::InvalidFileRegex {
            pattern: pattern.to_string(),
            reason: e.to_string(),
        })?;
        self.node_mut(job_id).file_regex = Some(pattern.to_string());
        Ok(())
    }

    pub fn set_media(&mut self, job_id: JobId, vol_session_id: u32, vol_session_time: u32, volumes: Vec<VolumeParams>) {
        let node = self.node_mut(job_id);
        node.vol_session_id = vol_session_id;
        node.vol_session_time = vol_session_time;
        node.volumes = volumes;
    }

    pub fn nodes(&self) -> &[BootstrapNode] {
        &self.nodes
    }

    pub fn node(&self, job_id: JobId) -> Option<&BootstrapNode> {
        self.index.get(&job_id).map(|&slot| &self.nodes[slot])
    }

    pub fn job_ids(&self) -> Vec<JobId> {
        self.nodes.iter().map(|n| n.job_id).collect()
    }

    /// True when no job contributes a single selected index.
    pub fn is_empty(&self) -> bool {
        self.nodes.iter().all(|n| n.selector.is_empty())
    }

    /// Fills each node's volume list and session identity from the catalog.
    pub fn complete(&mut self, catalog: &dyn Catalog) -> Result<(), BootstrapError> {
        for node in self.nodes.iter_mut().filter(|n| n.volumes.is_empty()) {
            let media = catalog.job_media(node.job_id)?;
            if media.volumes.is_empty() {
                return Err(BootstrapError::NoVolumes(node.job_id));
            }
            node.vol_session_id = media.vol_session_id;
            node.vol_session_time = media.vol_session_time;
            node.volumes = media.volumes;
        }
        Ok(())
    }

    /// Renders the instruction text; fails with `ZeroFiles` when nothing
    /// matched any volume.
    pub fn build(&mut self, options: &BuildOptions<'_>) -> Result<BootstrapOutput, BootstrapError> {
        if self.is_empty() {
            return Err(BootstrapError::EmptySelection);
        }
        for node in &mut self.nodes {
            node.selector.sort();
        }
        writer::render(self, options)
    }
}
