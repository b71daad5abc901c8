#![allow(dead_code)]

use flate2::Compression;
use flate2::write::GzEncoder;
use mockito::{Mock, ServerGuard};
use serde_json::{Value, json};
use std::path::Path;
use std::sync::Arc;

use varia_core::fetch::{
    Cache, CacheOptions, FetchOptions, Fetcher, HttpTransport, MultiFetcher, RegistryFetcher,
    TarballFetcher, WorkspaceFetcher,
};
use varia_core::prebuild::{PrebuildFetcher, PrebuildHook, PrebuildResolver};
use varia_core::registry::HttpRegistry;
use varia_core::resolver::{MultiResolver, RegistryResolver, ResolveOptions, WorkspaceResolver};
use varia_core::{Comparators, HostPlatform, NullReporter, ResolveContext, Settings};

/// Build a gzip tarball in memory from `(path, contents)` pairs.
pub fn tar_gz(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(GzEncoder::new(Vec::new(), Compression::default()));
    for (path, contents) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *contents).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

/// Mocks of one published package. Mocks stop matching once dropped.
pub struct Published {
    pub document: Mock,
    pub tarball: Mock,
}

/// Serve a single-version registry document for `name` and its tarball.
///
/// `extra` is merged into the version manifest.
pub async fn publish(server: &mut ServerGuard, name: &str, version: &str, extra: Value) -> Published {
    let tarball_path = format!("/tarballs/{name}-{version}.tgz");
    let mut manifest = json!({
        "name": name,
        "version": version,
        "dist": {"tarball": format!("{}{tarball_path}", server.url())},
    });
    if let (Some(fields), Value::Object(extra)) = (manifest.as_object_mut(), extra) {
        fields.extend(extra);
    }
    let package_json = serde_json::to_vec(&manifest).unwrap();
    let document = json!({
        "name": name,
        "dist-tags": {"latest": version},
        "versions": {version: manifest},
    });

    let document = server
        .mock("GET", format!("/{name}").as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(document.to_string())
        .create_async()
        .await;

    let index = format!("module.exports = {name:?};");
    let tarball = server
        .mock("GET", tarball_path.as_str())
        .with_status(200)
        .with_body(tar_gz(&[
            ("package/package.json", package_json.as_slice()),
            ("package/index.js", index.as_bytes()),
        ]))
        .create_async()
        .await;

    Published { document, tarball }
}

/// Write the root `package.json` of a project.
pub fn write_project(root: &Path, manifest: &Value) {
    std::fs::write(root.join("package.json"), manifest.to_string()).unwrap();
}

/// The full resolver and fetcher stack against `settings.registry`.
pub struct Session {
    pub context: ResolveContext,
    pub fetcher: Arc<dyn Fetcher>,
    pub options: FetchOptions,
}

pub fn session(root: &Path, cache: &Path, settings: Settings) -> Session {
    let host = HostPlatform::new("linux", "x64");
    let registry = Arc::new(HttpRegistry::new(&settings.registry).unwrap());
    let fetcher: Arc<dyn Fetcher> = Arc::new(MultiFetcher::new(vec![
        Arc::new(WorkspaceFetcher),
        Arc::new(PrebuildFetcher),
        Arc::new(RegistryFetcher),
        Arc::new(TarballFetcher),
    ]));
    let resolver = MultiResolver::new(vec![
        Arc::new(WorkspaceResolver::new(root)),
        Arc::new(PrebuildResolver),
        Arc::new(RegistryResolver::new(registry.clone())),
    ]);

    let context = ResolveContext {
        resolver: Arc::new(resolver),
        options: ResolveOptions {
            reporter: Arc::new(NullReporter),
            fetcher: Some(fetcher.clone()),
        },
        hooks: vec![Arc::new(PrebuildHook::new(host.clone()))],
        comparators: Comparators::default(),
    };
    let options = FetchOptions {
        cache: Arc::new(Cache::new(cache, CacheOptions::default())),
        registry,
        transport: Arc::new(HttpTransport::new().unwrap()),
        settings: Arc::new(settings),
        host,
        project_root: root.to_path_buf(),
        packages: Arc::default(),
        checksums: Arc::default(),
        reporter: Arc::new(NullReporter),
    };

    Session {
        context,
        fetcher,
        options,
    }
}

/// Names of the visible cache entries.
pub fn cache_entries(options: &FetchOptions) -> Vec<String> {
    options
        .cache
        .list()
        .unwrap()
        .into_iter()
        .map(|entry| entry.name)
        .collect()
}
