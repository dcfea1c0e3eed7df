//! Host environment hints consulted by the preload scheduler.

use serde::{Deserialize, Serialize};

/// Coarse network quality as reported by the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkHint {
    #[default]
    Unknown,
    Offline,
    Slow,
    Fast,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryHint {
    #[default]
    Unknown,
    Low,
    Ample,
}

/// Available memory below this counts as [`MemoryHint::Low`].
const LOW_MEMORY_BYTES: u64 = 512 * 1024 * 1024;

pub trait EnvironmentProbe: Send + Sync {
    /// The OS locale, e.g. `ja-JP`.
    fn system_locale(&self) -> Option<String>;
    fn network(&self) -> NetworkHint;
    fn memory(&self) -> MemoryHint;
}

/// Reads the OS locale through `sys-locale` and available memory from
/// `/proc/meminfo` where it exists.
///
/// There is no portable network quality signal, so the host supplies one.
#[derive(Debug, Clone, Default)]
pub struct SystemProbe {
    network: NetworkHint,
}

impl SystemProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_network(mut self, network: NetworkHint) -> Self {
        self.network = network;
        self
    }
}

impl EnvironmentProbe for SystemProbe {
    fn system_locale(&self) -> Option<String> {
        sys_locale::get_locale()
    }

    fn network(&self) -> NetworkHint {
        self.network
    }

    fn memory(&self) -> MemoryHint {
        match std::fs::read_to_string("/proc/meminfo") {
            Ok(meminfo) => parse_meminfo(&meminfo),
            Err(_) => MemoryHint::Unknown,
        }
    }
}

fn parse_meminfo(meminfo: &str) -> MemoryHint {
    let available_kib = meminfo.lines().find_map(|line| {
        let rest = line.strip_prefix("MemAvailable:")?;
        rest.split_whitespace().next()?.parse::<u64>().ok()
    });

    match available_kib {
        Some(kib) if kib * 1024 < LOW_MEMORY_BYTES => MemoryHint::Low,
        Some(_) => MemoryHint::Ample,
        None => MemoryHint::Unknown,
    }
}

/// Fixed answers, for tests and hosts that already know their environment.
#[derive(Debug, Clone, Default)]
pub struct StaticProbe {
    pub locale: Option<String>,
    pub network: NetworkHint,
    pub memory: MemoryHint,
}

impl StaticProbe {
    pub fn new(locale: Option<&str>, network: NetworkHint, memory: MemoryHint) -> Self {
        Self {
            locale: locale.map(str::to_string),
            network,
            memory,
        }
    }
}

impl EnvironmentProbe for StaticProbe {
    fn system_locale(&self) -> Option<String> {
        self.locale.clone()
    }

    fn network(&self) -> NetworkHint {
        self.network
    }

    fn memory(&self) -> MemoryHint {
        self.memory
    }
}
