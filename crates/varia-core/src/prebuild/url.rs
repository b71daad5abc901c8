//! Download URL derivation for prebuilt artifacts.

use regex::Regex;
use std::sync::LazyLock;

use varia_schema::Ident;

use super::RuntimeTarget;
use crate::error::ResolveError;
use crate::platform::HostPlatform;
use crate::settings::{SettingKey, Settings};

static GITHUB_REPOSITORY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"github\.com/([^/]+)/([^/.]+)\.git").expect("repository pattern is valid")
});

/// `https://github.com/<owner>/<repo>` from a git repository URL.
pub fn github_link(repository: &str) -> Option<String> {
    let captures = GITHUB_REPOSITORY.captures(repository)?;
    Some(format!("https://github.com/{}/{}", &captures[1], &captures[2]))
}

/// Replace every `{key}` in `template`.
pub fn render_template(template: &str, values: &[(&str, &str)]) -> String {
    values.iter().fold(template.to_string(), |rendered, (key, value)| {
        rendered.replace(&format!("{{{key}}}"), value)
    })
}

/// What the URL is derived from.
#[derive(Debug, Clone)]
pub struct PrebuildTarget<'a> {
    pub ident: &'a Ident,
    pub version: &'a str,
    pub platform: &'a str,
    pub arch: &'a str,
    pub runtime: &'a RuntimeTarget,
}

/// The mirror configured for `ident`'s scope, or globally.
pub fn mirror_url<'a>(settings: &'a Settings, ident: &Ident) -> Option<&'a str> {
    settings
        .get_scoped(ident.scope(), SettingKey::PrebuildHostMirrorUrl)
        .filter(|url| !url.is_empty())
}

/// The artifact URL for `target`.
///
/// A mirror renders the mirror template. Otherwise the URL points at the
/// GitHub release derived from `repository`, which is only required in
/// that case.
pub fn prebuild_url(
    target: &PrebuildTarget<'_>,
    host: &HostPlatform,
    settings: &Settings,
    repository: Option<&str>,
) -> Result<String, ResolveError> {
    let scope = target.ident.scope();
    let tag_prefix = settings
        .get_scoped(scope, SettingKey::PrebuildTagPrefix)
        .unwrap_or_default();

    if let Some(mirror_url) = mirror_url(settings, target.ident) {
        let template = settings
            .get_scoped(scope, SettingKey::PrebuildHostMirrorTemplate)
            .unwrap_or_default();
        let scope = scope.unwrap_or_default();
        let (with_at, with_at_and_slash, with_slash) = if scope.is_empty() {
            (String::new(), String::new(), String::new())
        } else {
            (format!("@{scope}"), format!("@{scope}/"), format!("{scope}/"))
        };

        return Ok(render_template(
            template,
            &[
                ("mirror_url", mirror_url.trim_end_matches('/')),
                ("name", target.ident.name()),
                ("version", target.version),
                ("abi", &target.runtime.abi),
                ("runtime", &target.runtime.runtime),
                ("platform", target.platform),
                ("arch", target.arch),
                ("libc", &host.libc),
                ("tag_prefix", tag_prefix),
                ("scope_with_at_and_slash", &with_at_and_slash),
                ("scope_with_at", &with_at),
                ("scope_with_slash", &with_slash),
                ("scope", scope),
            ],
        ));
    }

    let repository = repository.ok_or_else(|| ResolveError::UpstreamLookup {
        ident: target.ident.to_string(),
        reason: "package has no repository link".to_string(),
    })?;
    let github = github_link(repository).ok_or_else(|| ResolveError::UpstreamLookup {
        ident: target.ident.to_string(),
        reason: format!("cannot derive a GitHub link from `{repository}`"),
    })?;

    Ok(format!(
        "{github}/releases/download/{tag_prefix}{version}/{name}-v{version}-{runtime}-v{abi}-{platform}{libc}-{arch}.tar.gz",
        version = target.version,
        name = target.ident.name(),
        runtime = target.runtime.runtime,
        abi = target.runtime.abi,
        platform = target.platform,
        libc = host.libc,
        arch = target.arch,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node() -> RuntimeTarget {
        RuntimeTarget {
            runtime: "node".into(),
            abi: "115".into(),
        }
    }

    #[test]
    fn github_link_from_common_spellings() {
        for url in [
            "git+https://github.com/acme/native.git",
            "git://github.com/acme/native.git",
            "git+ssh://git@github.com/acme/native.git",
        ] {
            assert_eq!(github_link(url).as_deref(), Some("https://github.com/acme/native"));
        }
        assert_eq!(github_link("https://gitlab.com/acme/native.git"), None);
        assert_eq!(github_link("https://github.com/acme/native"), None);
    }

    #[test]
    fn default_url_uses_github_release() {
        let ident = Ident::parse("native").unwrap();
        let runtime = node();
        let target = PrebuildTarget {
            ident: &ident,
            version: "2.1.0",
            platform: "linux",
            arch: "x64",
            runtime: &runtime,
        };
        let host = HostPlatform::new("linux", "x64");
        let repository = Some("git+https://github.com/acme/native.git");
        let url = prebuild_url(&target, &host, &Settings::default(), repository).unwrap();
        assert_eq!(
            url,
            "https://github.com/acme/native/releases/download/v2.1.0/native-v2.1.0-node-v115-linux-x64.tar.gz"
        );
    }

    #[test]
    fn scoped_mirror_renders_template() {
        let settings = Settings::from_toml(
            r#"
            [prebuild_scopes."@acme"]
            prebuild_host_mirror_url = "https://mirror.example/"
            prebuild_host_mirror_template = "{mirror_url}/{scope_with_at_and_slash}{name}/{tag_prefix}{version}/{runtime}-{abi}-{platform}{libc}-{arch}"
            prebuild_tag_prefix = "release-"
            "#,
        )
        .unwrap();
        let ident = Ident::parse("@acme/native").unwrap();
        let runtime = node();
        let target = PrebuildTarget {
            ident: &ident,
            version: "1.0.0",
            platform: "linux",
            arch: "arm64",
            runtime: &runtime,
        };
        let host = HostPlatform::new("linux", "arm64").with_libc("musl");

        assert_eq!(mirror_url(&settings, &ident), Some("https://mirror.example/"));
        let url = prebuild_url(&target, &host, &settings, None).unwrap();
        assert_eq!(
            url,
            "https://mirror.example/@acme/native/release-1.0.0/node-115-linuxmusl-arm64"
        );
    }

    #[test]
    fn missing_repository_is_an_upstream_error() {
        let ident = Ident::parse("native").unwrap();
        let runtime = node();
        let target = PrebuildTarget {
            ident: &ident,
            version: "1.0.0",
            platform: "linux",
            arch: "x64",
            runtime: &runtime,
        };
        let host = HostPlatform::new("linux", "x64");
        let settings = Settings::default();

        let err = prebuild_url(&target, &host, &settings, None).unwrap_err();
        assert!(matches!(err, ResolveError::UpstreamLookup { .. }));

        let err = prebuild_url(&target, &host, &settings, Some("https://example.com/native")).unwrap_err();
        assert!(err.to_string().contains("GitHub"));
    }
}
