use varia_schema::{Package, PackageVersion};

use crate::error::ResolveError;
use crate::settings::Settings;

/// Electron major version to `NODE_MODULE_VERSION`.
const ELECTRON_ABIS: &[(u64, u32)] = &[
    (2, 57),
    (3, 64),
    (4, 69),
    (5, 70),
    (6, 73),
    (7, 75),
    (8, 76),
    (9, 80),
    (10, 82),
    (11, 85),
    (12, 87),
    (13, 89),
    (14, 97),
    (15, 98),
    (16, 99),
    (17, 101),
    (18, 103),
    (19, 106),
    (20, 107),
    (21, 109),
    (22, 110),
    (23, 113),
    (24, 114),
    (25, 116),
    (26, 116),
    (27, 118),
    (28, 119),
    (29, 121),
    (30, 123),
    (31, 125),
    (32, 128),
];

/// The ABI an electron version ships with, if known.
pub fn electron_abi(version: &str) -> Option<u32> {
    let major = semver::Version::parse(version.trim_start_matches('v'))
        .map(|v| v.major)
        .or_else(|_| version.split('.').next().unwrap_or_default().parse())
        .ok()?;
    ELECTRON_ABIS
        .iter()
        .find(|(m, _)| *m == major)
        .map(|(_, abi)| *abi)
}

/// Runtime and ABI the native artifact is built against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeTarget {
    /// `node` or `electron`.
    pub runtime: String,
    pub abi: String,
}

/// Electron when an `electron` package was resolved, the host node otherwise.
pub fn runtime_target(packages: &[Package], settings: &Settings) -> Result<RuntimeTarget, ResolveError> {
    let electron = packages.iter().find(|pkg| {
        let ident = pkg.locator().ident();
        ident.scope().is_none() && ident.name() == "electron"
    });

    let Some(electron) = electron else {
        return Ok(RuntimeTarget {
            runtime: "node".to_string(),
            abi: settings.node_abi.to_string(),
        });
    };

    let PackageVersion::Known(version) = electron.version() else {
        return Err(ResolveError::UpstreamLookup {
            ident: electron.locator().to_string(),
            reason: "electron has no concrete version".to_string(),
        });
    };
    let abi = electron_abi(version).ok_or_else(|| ResolveError::UpstreamLookup {
        ident: electron.locator().to_string(),
        reason: format!("unknown ABI for electron {version}"),
    })?;

    Ok(RuntimeTarget {
        runtime: "electron".to_string(),
        abi: abi.to_string(),
    })
}
