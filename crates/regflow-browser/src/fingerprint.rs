//! Per-attempt fingerprint generation.
//!
//! Identities are drawn from a small pool of plausible desktop profiles and
//! then jittered (viewport, geolocation, hardware hints) so that no two
//! sessions present identical values while every individual value stays
//! self-consistent with the rest of the profile.

use rand::Rng;
use rand::seq::SliceRandom;
use regflow_models::{Fingerprint, Geolocation, Viewport};

struct BaseProfile {
    user_agent: &'static str,
    platform: &'static str,
    vendor: &'static str,
    locale: &'static str,
    languages: &'static [&'static str],
    timezone: &'static str,
    // City-center anchor; jittered per session.
    latitude: f64,
    longitude: f64,
    webgl: &'static [(&'static str, &'static str)],
}

const PROFILES: &[BaseProfile] = &[
    BaseProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                     (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
        platform: "Win32",
        vendor: "Google Inc.",
        locale: "en-US",
        languages: &["en-US", "en"],
        timezone: "America/New_York",
        latitude: 40.71,
        longitude: -74.01,
        webgl: &[
            ("Google Inc. (NVIDIA)", "ANGLE (NVIDIA, NVIDIA GeForce RTX 3060 Direct3D11 vs_5_0 ps_5_0, D3D11)"),
            ("Google Inc. (Intel)", "ANGLE (Intel, Intel(R) UHD Graphics 630 Direct3D11 vs_5_0 ps_5_0, D3D11)"),
        ],
    },
    BaseProfile {
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 \
                     (KHTML, like Gecko) Chrome/126.0.0.0 Safari/537.36",
        platform: "MacIntel",
        vendor: "Google Inc.",
        locale: "en-US",
        languages: &["en-US", "en"],
        timezone: "America/Los_Angeles",
        latitude: 37.77,
        longitude: -122.42,
        webgl: &[
            ("Google Inc. (Apple)", "ANGLE (Apple, Apple M2, OpenGL 4.1)"),
            ("Google Inc. (Apple)", "ANGLE (Apple, Apple M1 Pro, OpenGL 4.1)"),
        ],
    },
    BaseProfile {
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                     (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36 Edg/125.0.0.0",
        platform: "Win32",
        vendor: "Google Inc.",
        locale: "en-GB",
        languages: &["en-GB", "en-US", "en"],
        timezone: "Europe/London",
        latitude: 51.51,
        longitude: -0.13,
        webgl: &[
            ("Google Inc. (AMD)", "ANGLE (AMD, AMD Radeon RX 6600 Direct3D11 vs_5_0 ps_5_0, D3D11)"),
        ],
    },
];

const VIEWPORTS: &[(u32, u32)] = &[(1920, 1080), (1680, 1050), (1600, 900), (1536, 864), (1440, 900)];
const CONCURRENCY: &[u32] = &[4, 8, 12, 16];
const MEMORY_GB: &[u32] = &[4, 8, 16];

/// Produces a fresh randomized identity per attempt.
#[derive(Debug, Default)]
pub struct FingerprintGenerator;

impl FingerprintGenerator {
    pub fn new() -> Self {
        Self
    }

    pub fn generate(&self) -> Fingerprint {
        let mut rng = rand::thread_rng();
        let profile = PROFILES
            .choose(&mut rng)
            .expect("profile pool is non-empty");
        let (width, height) = *VIEWPORTS.choose(&mut rng).expect("viewport pool");
        let (webgl_vendor, webgl_renderer) =
            *profile.webgl.choose(&mut rng).expect("webgl pool");

        Fingerprint {
            user_agent: profile.user_agent.to_string(),
            platform: profile.platform.to_string(),
            vendor: profile.vendor.to_string(),
            locale: profile.locale.to_string(),
            languages: profile.languages.iter().map(|s| s.to_string()).collect(),
            timezone: profile.timezone.to_string(),
            geolocation: Geolocation {
                latitude: profile.latitude + rng.gen_range(-0.5..0.5),
                longitude: profile.longitude + rng.gen_range(-0.5..0.5),
                accuracy: rng.gen_range(20.0..120.0),
            },
            viewport: Viewport {
                // Small per-session offset on top of the common resolutions.
                width: width - rng.gen_range(0..16),
                height: height - rng.gen_range(0..12),
            },
            device_scale_factor: if profile.platform == "MacIntel" { 2.0 } else { 1.0 },
            has_touch: false,
            hardware_concurrency: *CONCURRENCY.choose(&mut rng).expect("pool"),
            device_memory_gb: *MEMORY_GB.choose(&mut rng).expect("pool"),
            webgl_vendor: webgl_vendor.to_string(),
            webgl_renderer: webgl_renderer.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_fingerprint_is_self_consistent() {
        let generator = FingerprintGenerator::new();
        let fp = generator.generate();

        assert!(!fp.user_agent.is_empty());
        assert!(fp.languages.first().map(String::as_str) == Some(fp.locale.as_str()));
        assert!(fp.viewport.width >= 1424 && fp.viewport.width <= 1920);
        assert!(fp.geolocation.accuracy >= 20.0);
        assert!(fp.webgl_renderer.contains("ANGLE"));
    }

    #[test]
    fn successive_fingerprints_differ() {
        let generator = FingerprintGenerator::new();
        let a = generator.generate();
        // Viewport jitter alone makes verbatim reuse astronomically unlikely;
        // sample a few to keep the test deterministic in practice.
        let distinct = (0..8).any(|_| {
            let b = generator.generate();
            b.viewport != a.viewport || b.geolocation != a.geolocation
        });
        assert!(distinct);
    }
}
