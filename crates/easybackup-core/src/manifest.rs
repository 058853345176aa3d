//! `manifest.json` written into every backup

use serde::{Deserialize, Serialize};

use crate::config::AppInfo;
use crate::error::Result;

/// File name of the manifest inside a backup
pub const MANIFEST_FILENAME: &str = "manifest.json";

/// Placeholder when the git revision cannot be determined
pub const GIT_NOT_AVAILABLE: &str = "not available";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    #[serde(rename = "git")]
    pub git_revision: String,
    #[serde(rename = "version")]
    pub app_version: String,
    #[serde(rename = "software")]
    pub app_full_description: String,
}

impl Manifest {
    pub fn new(app: &AppInfo, git_revision: Option<String>) -> Self {
        Self {
            git_revision: git_revision.unwrap_or_else(|| GIT_NOT_AVAILABLE.to_string()),
            app_version: app.version.clone(),
            app_full_description: app.description.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_and_default_revision() {
        let app = AppInfo::new("2.0.0", "Kimai - 2.0.0 (Mauerfall)");
        let manifest = Manifest::new(&app, None);
        let json = manifest.to_json().unwrap();

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["git"], "not available");
        assert_eq!(value["version"], "2.0.0");
        assert_eq!(value["software"], "Kimai - 2.0.0 (Mauerfall)");
        assert!(json.contains('\n'), "manifest should be pretty-printed");
        assert_eq!(Manifest::from_json(&json).unwrap(), manifest);
    }
}
