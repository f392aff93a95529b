//! Bootstrap instruction text, the file consumed by the storage agent.

use std::collections::HashSet;
use std::fmt::Write as _;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

use crate::bootstrap::record::{BootstrapNode, BootstrapRecord};
use crate::bootstrap::selector::IndexRange;
use crate::bootstrap::volume::{RequiredVolume, VolumeParams};
use crate::config::StorageResource;
use crate::error::BootstrapError;
use crate::job::JobId;

#[derive(Debug, Clone, Default)]
pub struct BuildOptions<'a> {
    /// Configured storages, used to resolve device-group membership.
    pub storages: &'a [StorageResource],
    /// Storage already chosen for the operation, if any.
    pub storage: Option<String>,
    /// Jobs to emit first, in this order.
    pub job_order: Vec<JobId>,
}

#[derive(Debug, Clone, Default)]
pub struct BootstrapOutput {
    pub text: String,
    pub total_files: u64,
    pub required_volumes: Vec<RequiredVolume>,
    /// Storage the operation reads from.
    pub storage: Option<String>,
    /// Device bound through a device group.
    pub device: Option<String>,
}

struct StorageBinding {
    storage: Option<String>,
    device: Option<String>,
}

impl StorageBinding {
    fn resolve(&mut self, volume: &VolumeParams, storages: &[StorageResource]) {
        if self.storage.is_some() {
            return;
        }
        self.storage = Some(volume.storage.clone());
        if let Some(res) = storages.iter().find(|s| s.name == volume.storage) {
            if res.device_group.is_some() {
                self.device = res.devices.first().cloned();
            }
        }
    }
}

fn emission_order<'r>(record: &'r BootstrapRecord, job_order: &[JobId]) -> Vec<&'r BootstrapNode> {
    let mut seen = HashSet::new();
    let mut ordered = Vec::with_capacity(record.nodes().len());
    for id in job_order {
        if let Some(node) = record.node(*id) {
            if seen.insert(*id) {
                ordered.push(node);
            }
        }
    }
    for node in record.nodes() {
        if seen.insert(node.job_id) {
            ordered.push(node);
        }
    }
    ordered
}

/// Writes one `FileIndex=` line per selection range clipped to
/// `[first, last]`; returns how many indexes were written.
fn write_findex(out: &mut String, ranges: &[IndexRange], first: u32, last: u32) -> u64 {
    let mut count = 0;
    for range in ranges {
        if let Some(clipped) = range.clip(first, last) {
            let _ = writeln!(out, "FileIndex={}", clipped);
            count += clipped.count();
        }
    }
    count
}

fn overlaps(ranges: &[IndexRange], first: u32, last: u32) -> bool {
    ranges.iter().any(|r| r.clip(first, last).is_some())
}

fn selected(ranges: &[IndexRange], index: u32) -> bool {
    ranges.iter().any(|r| r.contains(index))
}

pub(crate) fn render(
    record: &BootstrapRecord,
    options: &BuildOptions<'_>,
) -> Result<BootstrapOutput, BootstrapError> {
    let mut out = String::new();
    let mut total: u64 = 0;
    let mut required: Vec<RequiredVolume> = Vec::new();
    let mut binding = StorageBinding {
        storage: options.storage.clone(),
        device: None,
    };
    let mut first_emitted = true;

    for node in emission_order(record, &options.job_order) {
        let mut selector = node.selector.clone();
        let ranges = selector.ranges();
        let mut prev_last: Option<u32> = None;

        for volume in &node.volumes {
            if !overlaps(&ranges, volume.first_index, volume.last_index) {
                log::debug!(
                    "JobId {}: volume {} holds no selected files, skipping",
                    node.job_id,
                    volume.volume_name
                );
                continue;
            }

            binding.resolve(volume, options.storages);
            let _ = writeln!(out, "Storage=\"{}\"", volume.storage);
            if binding.storage.as_deref() == Some(volume.storage.as_str()) {
                if let Some(device) = &binding.device {
                    let _ = writeln!(out, "Device=\"{}\"", device);
                }
            }
            let _ = writeln!(out, "Volume=\"{}\"", volume.volume_name);
            let _ = writeln!(out, "MediaType=\"{}\"", volume.media_type);
            if volume.slot > 0 {
                let _ = writeln!(out, "Slot={}", volume.slot);
            }
            let _ = writeln!(out, "VolSessionId={}", node.vol_session_id);
            let _ = writeln!(out, "VolSessionTime={}", node.vol_session_time);
            let _ = writeln!(out, "VolAddr={}-{}", volume.start_addr, volume.end_addr);
            if let Some(regex) = &node.file_regex {
                let _ = writeln!(out, "FileRegex={}", regex);
            }

            let count = write_findex(&mut out, &ranges, volume.first_index, volume.last_index);
            if count > 0 {
                let _ = writeln!(out, "Count={}", count);
            }
            total += count;

            // A file split across two volumes is listed on both but restored once.
            if !first_emitted
                && prev_last == Some(volume.first_index)
                && selected(&ranges, volume.first_index)
            {
                total = total.saturating_sub(1);
            }
            first_emitted = false;
            prev_last = Some(volume.last_index);

            let needed = RequiredVolume {
                volume_name: volume.volume_name.clone(),
                storage: volume.storage.clone(),
                media_type: volume.media_type.clone(),
            };
            if !required.contains(&needed) {
                required.push(needed);
            }
        }
    }

    if total == 0 {
        return Err(BootstrapError::ZeroFiles);
    }

    Ok(BootstrapOutput {
        text: out,
        total_files: total,
        required_volumes: required,
        storage: binding.storage,
        device: binding.device,
    })
}

/// Writes the bootstrap to `<working_dir>/<director>.restore.<N>.bsr`, taking
/// `N` from `seq` and skipping numbers whose file already exists.
pub fn write_bootstrap_file(
    working_dir: &Path,
    director_name: &str,
    output: &BootstrapOutput,
    seq: &AtomicU32,
) -> Result<PathBuf, BootstrapError> {
    std::fs::create_dir_all(working_dir).map_err(|e| BootstrapError::Write {
        path: working_dir.to_path_buf(),
        source: e,
    })?;

    loop {
        let n = seq.fetch_add(1, Ordering::Relaxed);
        let path = working_dir.join(format!("{}.restore.{}.bsr", director_name, n));
        match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(mut file) => {
                file.write_all(output.text.as_bytes())
                    .map_err(|e| BootstrapError::Write {
                        path: path.clone(),
                        source: e,
                    })?;
                log::debug!("Wrote bootstrap {} ({} files)", path.display(), output.total_files);
                return Ok(path);
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
            Err(e) => return Err(BootstrapError::Write { path, source: e }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record_with(indexes: &[u32], volumes: Vec<VolumeParams>) -> BootstrapRecord {
        let mut bsr = BootstrapRecord::new();
        for &fi in indexes {
            bsr.add_selection(JobId(1), fi);
        }
        bsr.set_media(JobId(1), 7, 1_700_000_000, volumes);
        bsr
    }

    #[test]
    fn test_full_volume_text_layout() {
        let volume = VolumeParams::new("Full-0001", "File", "File")
            .with_indexes(1, 20)
            .with_addresses(100, 9000);
        let mut bsr = record_with(&[3, 4, 5, 9, 10, 12], vec![volume]);
        let out = bsr.build(&BuildOptions::default()).unwrap();
        assert_eq!(
            out.text,
            "Storage=\"File\"\n\
             Volume=\"Full-0001\"\n\
             MediaType=\"File\"\n\
             VolSessionId=7\n\
             VolSessionTime=1700000000\n\
             VolAddr=100-9000\n\
             FileIndex=3-5\n\
             FileIndex=9-10\n\
             FileIndex=12\n\
             Count=6\n"
        );
        assert_eq!(out.total_files, 6);
    }

    #[test]
    fn test_slot_and_file_regex_lines() {
        let volume = VolumeParams::new("Tape-1", "LTO", "Tape")
            .with_indexes(1, 5)
            .in_slot(3);
        let mut bsr = record_with(&[2], vec![volume]);
        bsr.set_file_regex(JobId(1), r"\.conf$").unwrap();
        let out = bsr.build(&BuildOptions::default()).unwrap();
        assert!(out.text.contains("Slot=3\n"));
        assert!(out.text.contains("FileRegex=\\.conf$\n"));
    }

    #[test]
    fn test_device_group_binds_first_device() {
        let storages = vec![StorageResource {
            name: "Auto".to_string(),
            address: "sd:9103".to_string(),
            media_type: "LTO".to_string(),
            devices: vec!["Drive-0".to_string(), "Drive-1".to_string()],
            device_group: Some("changer".to_string()),
            max_concurrent_jobs: 1,
        }];
        let volume = VolumeParams::new("Tape-1", "LTO", "Auto").with_indexes(1, 5);
        let mut bsr = record_with(&[1], vec![volume]);
        let out = bsr
            .build(&BuildOptions {
                storages: &storages,
                ..Default::default()
            })
            .unwrap();
        assert_eq!(out.storage.as_deref(), Some("Auto"));
        assert_eq!(out.device.as_deref(), Some("Drive-0"));
        assert!(out.text.contains("Device=\"Drive-0\"\n"));
    }

    #[test]
    fn test_pinned_storage_is_kept() {
        let volume = VolumeParams::new("Full-0001", "File", "File").with_indexes(1, 5);
        let mut bsr = record_with(&[1], vec![volume]);
        let out = bsr
            .build(&BuildOptions {
                storage: Some("Other".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(out.storage.as_deref(), Some("Other"));
    }

    #[test]
    fn test_bootstrap_file_names_are_unique() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = BootstrapOutput {
            text: "Volume=\"x\"\n".to_string(),
            total_files: 1,
            ..Default::default()
        };
        let seq = AtomicU32::new(1);
        let a = write_bootstrap_file(dir.path(), "bdir", &out, &seq).unwrap();
        let b = write_bootstrap_file(dir.path(), "bdir", &out, &seq).unwrap();
        assert_eq!(a, dir.path().join("bdir.restore.1.bsr"));
        assert_eq!(b, dir.path().join("bdir.restore.2.bsr"));
        assert_eq!(std::fs::read_to_string(&a).unwrap(), "Volume=\"x\"\n");

        // A second director over the same directory skips taken numbers.
        let other = AtomicU32::new(1);
        let c = write_bootstrap_file(dir.path(), "bdir", &out, &other).unwrap();
        assert_eq!(c, dir.path().join("bdir.restore.3.bsr"));
    }
}
