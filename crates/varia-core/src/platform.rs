/// The platform native artifacts are selected for, in node naming.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPlatform {
    /// `linux`, `darwin`, `win32`, ...
    pub platform: String,
    /// `x64`, `arm64`, `ia32`, ...
    pub arch: String,
    /// Suffix appended to the platform in artifact names, e.g. `musl`.
    pub libc: String,
}

impl HostPlatform {
    pub fn new(platform: impl Into<String>, arch: impl Into<String>) -> Self {
        Self {
            platform: platform.into(),
            arch: arch.into(),
            libc: String::new(),
        }
    }

    pub fn with_libc(mut self, libc: impl Into<String>) -> Self {
        self.libc = libc.into();
        self
    }

    /// The running host. `LIBC` overrides the (normally empty) libc suffix.
    pub fn detect() -> Self {
        let platform = match std::env::consts::OS {
            "macos" => "darwin",
            "windows" => "win32",
            other => other,
        };
        let arch = match std::env::consts::ARCH {
            "x86_64" => "x64",
            "aarch64" => "arm64",
            "x86" => "ia32",
            "arm" => "arm",
            other => other,
        };
        Self::new(platform, arch).with_libc(std::env::var("LIBC").unwrap_or_default())
    }
}
