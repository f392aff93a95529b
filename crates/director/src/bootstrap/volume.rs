use serde::{Deserialize, Serialize};

/// Where one job's data sits on one volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeParams {
    pub volume_name: String,
    pub media_type: String,
    pub storage: String,
    pub start_addr: u64,
    pub end_addr: u64,
    pub first_index: u32,
    pub last_index: u32,
    #[serde(default)]
    pub slot: u32,
    #[serde(default)]
    pub in_changer: bool,
}

impl VolumeParams {
    pub fn new(volume_name: &str, media_type: &str, storage: &str) -> Self {
        Self {
            volume_name: volume_name.to_string(),
            media_type: media_type.to_string(),
            storage: storage.to_string(),
            start_addr: 0,
            end_addr: 0,
            first_index: 1,
            last_index: 1,
            slot: 0,
            in_changer: false,
        }
    }

    pub fn with_indexes(mut self, first: u32, last: u32) -> Self {
        self.first_index = first;
        self.last_index = last;
        self
    }

    pub fn with_addresses(mut self, start: u64, end: u64) -> Self {
        self.start_addr = start;
        self.end_addr = end;
        self
    }

    pub fn in_slot(mut self, slot: u32) -> Self {
        self.slot = slot;
        self.in_changer = slot > 0;
        self
    }
}

/// Media placement of a job as recorded in the catalog.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobMedia {
    pub vol_session_id: u32,
    pub vol_session_time: u32,
    pub volumes: Vec<VolumeParams>,
}

/// A volume a restore will need mounted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequiredVolume {
    pub volume_name: String,
    pub storage: String,
    pub media_type: String,
}
