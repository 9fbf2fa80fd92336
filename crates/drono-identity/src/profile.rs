//! Simulated client fingerprints.
//!
//! An identity profile is selected once per iteration (fresh random draw
//! when randomization is enabled, otherwise a fixed profile reused for the
//! whole session) and attached to the fetch. Profiles are never persisted
//! beyond the iteration that uses them.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientType {
    Mobile,
    Tablet,
    Desktop,
}

impl fmt::Display for ClientType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientType::Mobile => write!(f, "mobile"),
            ClientType::Tablet => write!(f, "tablet"),
            ClientType::Desktop => write!(f, "desktop"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Android,
    Ios,
    Windows,
    Macos,
    Linux,
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Platform::Android => write!(f, "android"),
            Platform::Ios => write!(f, "ios"),
            Platform::Windows => write!(f, "windows"),
            Platform::Macos => write!(f, "macos"),
            Platform::Linux => write!(f, "linux"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceTier {
    LowEnd,
    MidRange,
    HighEnd,
}

impl fmt::Display for DeviceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceTier::LowEnd => write!(f, "low_end"),
            DeviceTier::MidRange => write!(f, "mid_range"),
            DeviceTier::HighEnd => write!(f, "high_end"),
        }
    }
}

const MOBILE_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Linux; Android 13; SM-G991B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 12; Pixel 6) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/110.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (Linux; Android 11; Redmi Note 10 Pro) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/109.0.0.0 Mobile Safari/537.36",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 16_4 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.4 Mobile/15E148 Safari/604.1",
];

const DESKTOP_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/112.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/16.3 Safari/605.1.15",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/111.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:109.0) Gecko/20100101 Firefox/111.0",
];

const REGIONS: &[&str] = &["slovakia", "czechia", "poland", "hungary", "austria"];

/// Simulated client fingerprint attached to a fetch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityProfile {
    pub client_type: ClientType,
    pub platform: Platform,
    pub tier: DeviceTier,
    pub user_agent: String,
    pub region: String,
}

impl IdentityProfile {
    /// The fixed profile used when randomization is disabled: a mid-range
    /// Android handset, matching the dominant profile in the target
    /// demographic.
    pub fn fixed() -> Self {
        Self {
            client_type: ClientType::Mobile,
            platform: Platform::Android,
            tier: DeviceTier::MidRange,
            user_agent: MOBILE_USER_AGENTS[0].to_string(),
            region: REGIONS[0].to_string(),
        }
    }

    /// Draw a fresh random fingerprint from the demographic pools.
    pub fn randomized() -> Self {
        let mut rng = rand::thread_rng();

        // Weighted towards mobile: the simulated audience browses on phones.
        let client_type = match rng.gen_range(0..10) {
            0..=6 => ClientType::Mobile,
            7..=8 => ClientType::Desktop,
            _ => ClientType::Tablet,
        };

        let (platform, user_agent) = match client_type {
            ClientType::Mobile | ClientType::Tablet => {
                let ua = MOBILE_USER_AGENTS[rng.gen_range(0..MOBILE_USER_AGENTS.len())];
                let platform = if ua.contains("iPhone") {
                    Platform::Ios
                } else {
                    Platform::Android
                };
                (platform, ua)
            }
            ClientType::Desktop => {
                let ua = DESKTOP_USER_AGENTS[rng.gen_range(0..DESKTOP_USER_AGENTS.len())];
                let platform = if ua.contains("Macintosh") {
                    Platform::Macos
                } else if ua.contains("X11") {
                    Platform::Linux
                } else {
                    Platform::Windows
                };
                (platform, ua)
            }
        };

        let tier = match rng.gen_range(0..10) {
            0..=1 => DeviceTier::LowEnd,
            2..=7 => DeviceTier::MidRange,
            _ => DeviceTier::HighEnd,
        };

        Self {
            client_type,
            platform,
            tier,
            user_agent: user_agent.to_string(),
            region: REGIONS[rng.gen_range(0..REGIONS.len())].to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_profile_is_stable() {
        let a = IdentityProfile::fixed();
        let b = IdentityProfile::fixed();
        assert_eq!(a, b);
        assert_eq!(a.client_type, ClientType::Mobile);
        assert_eq!(a.platform, Platform::Android);
    }

    #[test]
    fn test_randomized_profiles_are_internally_consistent() {
        for _ in 0..200 {
            let profile = IdentityProfile::randomized();
            match profile.platform {
                Platform::Ios => assert!(profile.user_agent.contains("iPhone")),
                Platform::Android => assert!(profile.user_agent.contains("Android")),
                _ => assert_eq!(profile.client_type, ClientType::Desktop),
            }
            assert!(REGIONS.contains(&profile.region.as_str()));
        }
    }
}
