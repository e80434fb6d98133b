use anyhow::Result;
use log::info;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Version reported by the loader when it finishes probing the host.
pub const SDK_VERSION: &str = "1.0.2";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct SdkConfig {
    pub resolver: ResolverConfig,
    pub loader: LoaderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ResolverConfig {
    /// Modules appended as `", Module"` when a bare type name does not resolve.
    pub fallback_modules: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            fallback_modules: vec!["Assembly-CSharp".to_string()],
        }
    }
}

/// Names the loader probes for on the host's content-loading API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoaderConfig {
    pub root_type: String,
    /// Prefix of the module(s) scanned when direct lookup of the root fails.
    pub root_module: String,

    pub load_method: String,
    pub instantiate_method: String,
    pub release_method: String,

    pub completed_event: String,
    pub status_member: String,
    pub result_member: String,
    pub exception_member: String,
    #[serde(default = "default_succeeded_status")]
    pub succeeded_status: i64,

    pub key_type: String,
    pub position_type: String,
    pub rotation_type: String,
    pub parent_type: String,
}

fn default_succeeded_status() -> i64 {
    1
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            root_type: "UnityEngine.AddressableAssets.Addressables".to_string(),
            root_module: "Unity.Addressables".to_string(),
            load_method: "LoadAssetAsync".to_string(),
            instantiate_method: "InstantiateAsync".to_string(),
            release_method: "Release".to_string(),
            completed_event: "Completed".to_string(),
            status_member: "Status".to_string(),
            result_member: "Result".to_string(),
            exception_member: "OperationException".to_string(),
            succeeded_status: default_succeeded_status(),
            key_type: "System.Object".to_string(),
            position_type: "UnityEngine.Vector3".to_string(),
            rotation_type: "UnityEngine.Quaternion".to_string(),
            parent_type: "UnityEngine.Transform".to_string(),
        }
    }
}

/// Reads the config at `path`, writing the defaults there first if it is missing.
pub fn load_config(path: &Path) -> Result<SdkConfig> {
    if path.exists() {
        info!("Loading config from {:?}", path);
        let file = fs::File::open(path)?;
        let reader = std::io::BufReader::new(file);
        let config = serde_json::from_reader(reader)?;
        Ok(config)
    } else {
        info!("Config not found. Creating default at {:?}", path);
        let config = SdkConfig::default();
        let file = fs::File::create(path)?;
        let writer = std::io::BufWriter::new(file);
        serde_json::to_writer_pretty(writer, &config)?;
        Ok(config)
    }
}
