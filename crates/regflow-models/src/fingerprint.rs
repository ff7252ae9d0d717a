use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Geolocation {
    pub latitude: f64,
    pub longitude: f64,
    pub accuracy: f64,
}

/// Read-only browser identity applied to exactly one session.
///
/// Generated fresh per attempt from a small pool of plausible profiles plus
/// randomized jitter, so no two sessions present the same values verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fingerprint {
    pub user_agent: String,
    pub platform: String,
    pub vendor: String,
    pub locale: String,
    pub languages: Vec<String>,
    pub timezone: String,
    pub geolocation: Geolocation,
    pub viewport: Viewport,
    pub device_scale_factor: f64,
    pub has_touch: bool,
    pub hardware_concurrency: u32,
    pub device_memory_gb: u32,
    pub webgl_vendor: String,
    pub webgl_renderer: String,
}
