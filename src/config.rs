//! # Pointing configuration
//!
//! [`SpiceInfo`] describes which target, spacecraft, auxiliary bodies and instruments a
//! pointing provider is built for. It is stored as JSON alongside the kernels:
//!
//! ```json
//! {
//!   "scId": "DART_SPACECRAFT",
//!   "bodyName": "DIDYMOS",
//!   "bodyFrameName": "DIDYMOS_SYSTEM_BARYCENTER",
//!   "scFrameName": "DART_SPACECRAFT",
//!   "bodyNamesToBind": ["DIMORPHOS"],
//!   "instrumentNamesToBind": ["DART_DRACO"]
//! }
//! ```
//!
//! The four `*ToBind` lists are optional and default to empty.
//!
//! See [`SpicePointingProviderBuilder::from_spice_info`](crate::pointing::builder::SpicePointingProviderBuilder::from_spice_info).
use std::fs;

use camino::Utf8Path;
use serde::{Deserialize, Serialize};

use crate::pointing_errors::PointingError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpiceInfo {
    /// Spacecraft name.
    pub sc_id: String,
    /// Target body name.
    pub body_name: String,
    /// Body-fixed frame of the target.
    pub body_frame_name: String,
    pub sc_frame_name: String,

    #[serde(default)]
    pub body_names_to_bind: Vec<String>,
    #[serde(default)]
    pub body_frames_to_bind: Vec<String>,
    #[serde(default)]
    pub instrument_names_to_bind: Vec<String>,
    /// Every instrument using one of these FOV frames is included.
    #[serde(default)]
    pub instrument_frame_names_to_bind: Vec<String>,
}

impl SpiceInfo {
    pub fn new(sc_id: &str, sc_frame_name: &str, body_name: &str, body_frame_name: &str) -> Self {
        SpiceInfo {
            sc_id: sc_id.to_string(),
            body_name: body_name.to_string(),
            body_frame_name: body_frame_name.to_string(),
            sc_frame_name: sc_frame_name.to_string(),
            body_names_to_bind: Vec::new(),
            body_frames_to_bind: Vec::new(),
            instrument_names_to_bind: Vec::new(),
            instrument_frame_names_to_bind: Vec::new(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, PointingError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, PointingError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Utf8Path) -> Result<Self, PointingError> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn save(&self, path: &Utf8Path) -> Result<(), PointingError> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }
}
