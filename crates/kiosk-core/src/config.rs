use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct KioskConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub location_id: Option<String>,
    #[serde(default)]
    pub location_name: Option<String>,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Set on kiosks whose browser blocks unprompted media start.
    #[serde(default)]
    pub media_gesture_required: bool,
    #[serde(default = "default_legacy_meeting_base_url")]
    pub legacy_meeting_base_url: String,
}

fn default_api_base_url() -> String {
    "http://localhost:8000".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_legacy_meeting_base_url() -> String {
    "https://zoom.us".to_string()
}

impl Default for KioskConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            location_id: None,
            location_name: None,
            poll_interval_ms: default_poll_interval_ms(),
            media_gesture_required: false,
            legacy_meeting_base_url: default_legacy_meeting_base_url(),
        }
    }
}

pub struct ConfigStore {
    config: Mutex<KioskConfig>,
    file_path: PathBuf,
}

impl ConfigStore {
    pub fn new(data_dir: &str) -> Self {
        let file_path = PathBuf::from(data_dir).join("kiosk.json");
        let config = Self::load(&file_path);
        Self {
            config: Mutex::new(config),
            file_path,
        }
    }

    pub fn get(&self) -> KioskConfig {
        self.config.lock().unwrap().clone()
    }

    pub fn set_api_base_url(&self, url: String) {
        self.config.lock().unwrap().api_base_url = url;
        self.save();
    }

    pub fn set_location(&self, id: Option<String>, name: Option<String>) {
        {
            let mut config = self.config.lock().unwrap();
            config.location_id = id;
            config.location_name = name;
        }
        self.save();
    }

    pub fn set_media_gesture_required(&self, required: bool) {
        self.config.lock().unwrap().media_gesture_required = required;
        self.save();
    }

    fn save(&self) {
        let config = self.config.lock().unwrap().clone();
        if let Some(parent) = self.file_path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Ok(json) = serde_json::to_string_pretty(&config) {
            let _ = std::fs::write(&self.file_path, json);
        }
    }

    fn load(path: &PathBuf) -> KioskConfig {
        match std::fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => KioskConfig::default(),
        }
    }
}
