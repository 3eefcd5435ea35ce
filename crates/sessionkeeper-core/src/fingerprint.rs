//! Device identity: a persisted device id plus an environment fingerprint.
//!
//! The fingerprint is a hash over what the runtime environment reports about
//! itself. It is a correlation signal sent along with refresh requests, not a
//! credential: it is neither unique nor hard to spoof.

use std::sync::Arc;

use chrono::{Local, Utc};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

/// Separator between fingerprint components
const COMPONENT_SEPARATOR: &str = "|";

/// Length of the random suffix in generated device ids
const DEVICE_ID_SUFFIX_LEN: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScreenGeometry {
    pub width: u32,
    pub height: u32,
    pub color_depth: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GpuInfo {
    pub vendor: Option<String>,
    pub renderer: Option<String>,
}

/// What the runtime environment can tell us about itself.
///
/// Every attribute is optional; a probe returns `None` for anything it cannot
/// read and the fingerprint simply leaves it out.
pub trait EnvironmentProbe: Send + Sync {
    fn user_agent(&self) -> Option<String>;
    fn language(&self) -> Option<String>;
    fn platform(&self) -> Option<String>;
    fn screen(&self) -> Option<ScreenGeometry>;
    fn timezone_offset_minutes(&self) -> Option<i32>;
    fn canvas_signature(&self) -> Option<String>;
    fn gpu(&self) -> Option<GpuInfo>;
}

/// Probe for a native process: crate identity, locale, OS and timezone.
/// There is no screen, canvas or GPU to read.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemProbe;

impl EnvironmentProbe for SystemProbe {
    fn user_agent(&self) -> Option<String> {
        Some(format!(
            "{}/{} ({})",
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS
        ))
    }

    fn language(&self) -> Option<String> {
        ["LC_ALL", "LC_MESSAGES", "LANG"]
            .iter()
            .filter_map(|var| std::env::var(var).ok())
            .find(|value| !value.is_empty())
    }

    fn platform(&self) -> Option<String> {
        Some(format!("{}-{}", std::env::consts::OS, std::env::consts::ARCH))
    }

    fn screen(&self) -> Option<ScreenGeometry> {
        None
    }

    fn timezone_offset_minutes(&self) -> Option<i32> {
        // Same sign convention as a browser: minutes to add to local time to get UTC
        Some(-Local::now().offset().local_minus_utc() / 60)
    }

    fn canvas_signature(&self) -> Option<String> {
        None
    }

    fn gpu(&self) -> Option<GpuInfo> {
        None
    }
}

/// Probe with fixed answers, for embedders that collect the attributes
/// themselves and for tests.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StaticProbe {
    pub user_agent: Option<String>,
    pub language: Option<String>,
    pub platform: Option<String>,
    pub screen: Option<ScreenGeometry>,
    pub timezone_offset_minutes: Option<i32>,
    pub canvas_signature: Option<String>,
    pub gpu: Option<GpuInfo>,
}

impl EnvironmentProbe for StaticProbe {
    fn user_agent(&self) -> Option<String> {
        self.user_agent.clone()
    }

    fn language(&self) -> Option<String> {
        self.language.clone()
    }

    fn platform(&self) -> Option<String> {
        self.platform.clone()
    }

    fn screen(&self) -> Option<ScreenGeometry> {
        self.screen
    }

    fn timezone_offset_minutes(&self) -> Option<i32> {
        self.timezone_offset_minutes
    }

    fn canvas_signature(&self) -> Option<String> {
        self.canvas_signature.clone()
    }

    fn gpu(&self) -> Option<GpuInfo> {
        self.gpu.clone()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    #[default]
    Sha256,
    /// 32-bit rolling hash, for targets without a digest implementation.
    Rolling,
}

#[derive(Clone)]
pub struct DeviceFingerprinter {
    probe: Arc<dyn EnvironmentProbe>,
    algorithm: HashAlgorithm,
}

impl std::fmt::Debug for DeviceFingerprinter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceFingerprinter")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl DeviceFingerprinter {
    pub fn new(probe: Arc<dyn EnvironmentProbe>) -> Self {
        Self {
            probe,
            algorithm: HashAlgorithm::default(),
        }
    }

    pub fn with_algorithm(mut self, algorithm: HashAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// The readable environment attributes, in fixed order.
    pub fn components(&self) -> Vec<String> {
        let probe = &self.probe;
        let mut components = Vec::with_capacity(9);

        components.extend(probe.user_agent());
        components.extend(probe.language());
        components.extend(probe.platform());
        if let Some(screen) = probe.screen() {
            components.push(format!("{}x{}", screen.width, screen.height));
            components.push(screen.color_depth.to_string());
        }
        components.extend(probe.timezone_offset_minutes().map(|m| m.to_string()));
        components.extend(probe.canvas_signature());
        if let Some(gpu) = probe.gpu() {
            components.extend(gpu.vendor);
            components.extend(gpu.renderer);
        }

        components
    }

    /// Hash the environment attributes into a fingerprint string.
    pub fn generate_fingerprint(&self) -> String {
        let components = self.components();
        debug!(
            components = components.len(),
            algorithm = ?self.algorithm,
            "Generating device fingerprint"
        );
        let joined = components.join(COMPONENT_SEPARATOR);
        match self.algorithm {
            HashAlgorithm::Sha256 => format!("{:x}", Sha256::digest(joined.as_bytes())),
            HashAlgorithm::Rolling => rolling_hash(&joined),
        }
    }
}

/// `h = h * 31 + c` over the characters, wrapping at 32 bits.
fn rolling_hash(input: &str) -> String {
    let hash = input
        .chars()
        .fold(0i32, |h, c| h.wrapping_mul(31).wrapping_add(c as i32));
    format!("{:x}", hash.unsigned_abs())
}

/// New device id: `device_<unix millis>_<random alphanumerics>`.
pub fn generate_device_id() -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(DEVICE_ID_SUFFIX_LEN)
        .map(char::from)
        .collect::<String>()
        .to_lowercase();
    format!("device_{}_{}", Utc::now().timestamp_millis(), suffix)
}

/// The device id is persistent; the fingerprint is recomputed per process
/// and is absent until computed (or when fingerprinting is disabled).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceIdentity {
    pub device_id: String,
    pub fingerprint: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_probe() -> StaticProbe {
        StaticProbe {
            user_agent: Some("Mozilla/5.0".to_string()),
            language: Some("en-US".to_string()),
            platform: Some("Linux x86_64".to_string()),
            screen: Some(ScreenGeometry {
                width: 1920,
                height: 1080,
                color_depth: 24,
            }),
            timezone_offset_minutes: Some(-60),
            canvas_signature: Some("data:image/png;base64,AAAA".to_string()),
            gpu: Some(GpuInfo {
                vendor: Some("Intel".to_string()),
                renderer: None,
            }),
        }
    }

    #[test]
    fn test_components_fixed_order() {
        let fingerprinter = DeviceFingerprinter::new(Arc::new(full_probe()));
        assert_eq!(
            fingerprinter.components(),
            vec![
                "Mozilla/5.0",
                "en-US",
                "Linux x86_64",
                "1920x1080",
                "24",
                "-60",
                "data:image/png;base64,AAAA",
                "Intel",
            ]
        );
    }

    #[test]
    fn test_missing_attributes_are_omitted() {
        let probe = StaticProbe {
            language: Some("de".to_string()),
            ..StaticProbe::default()
        };
        let fingerprinter = DeviceFingerprinter::new(Arc::new(probe));
        assert_eq!(fingerprinter.components(), vec!["de"]);
        assert_eq!(fingerprinter.generate_fingerprint().len(), 64);
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = DeviceFingerprinter::new(Arc::new(full_probe()));
        let b = DeviceFingerprinter::new(Arc::new(full_probe()));
        assert_eq!(a.generate_fingerprint(), b.generate_fingerprint());

        let mut other = full_probe();
        other.language = Some("fr-FR".to_string());
        let c = DeviceFingerprinter::new(Arc::new(other));
        assert_ne!(a.generate_fingerprint(), c.generate_fingerprint());
    }

    #[test]
    fn test_sha256_of_known_input() {
        let probe = StaticProbe {
            user_agent: Some("abc".to_string()),
            ..StaticProbe::default()
        };
        assert_eq!(
            DeviceFingerprinter::new(Arc::new(probe)).generate_fingerprint(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_rolling_hash() {
        assert_eq!(rolling_hash(""), "0");
        // 'a' = 97, 97 * 31 + 98 = 3105
        assert_eq!(rolling_hash("ab"), format!("{:x}", 3105));

        let fingerprinter = DeviceFingerprinter::new(Arc::new(full_probe()))
            .with_algorithm(HashAlgorithm::Rolling);
        let first = fingerprinter.generate_fingerprint();
        assert_eq!(first, fingerprinter.generate_fingerprint());
        assert!(first.len() <= 8);
    }

    #[test]
    fn test_system_probe_never_panics() {
        let fingerprinter = DeviceFingerprinter::new(Arc::new(SystemProbe));
        assert!(!fingerprinter.components().is_empty());
        assert_eq!(fingerprinter.generate_fingerprint().len(), 64);
    }

    #[test]
    fn test_generate_device_id_format() {
        let id = generate_device_id();
        let parts: Vec<&str> = id.splitn(3, '_').collect();
        assert_eq!(parts[0], "device");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), DEVICE_ID_SUFFIX_LEN);
        assert_ne!(id, generate_device_id());
    }
}
