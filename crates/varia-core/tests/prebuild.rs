mod common;

use mockito::Server;
use serde_json::json;
use tempfile::TempDir;

use varia_core::{Project, Settings};
use varia_schema::Locator;

use common::{cache_entries, publish, session, tar_gz, write_project};

#[tokio::test]
async fn bindings_resolve_to_a_synthesized_prebuild() {
    let mut server = Server::new_async().await;
    let _native = publish(
        &mut server,
        "native",
        "1.0.0",
        json!({"dependencies": {"bindings": "^1.5.0"}}),
    )
    .await;
    let _electron = publish(&mut server, "electron", "8.0.3", json!({})).await;
    let bindings_document = server.mock("GET", "/bindings").expect(0).create_async().await;
    let artifact = server
        .mock("GET", "/v1.0.0/native-v1.0.0-electron-v76-linux-x64.tar.gz")
        .with_status(200)
        .with_body(tar_gz(&[("build/Release/native.node", b"\x7fELF".as_slice())]))
        .create_async()
        .await;

    let project_dir = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    write_project(
        project_dir.path(),
        &json!({
            "name": "app",
            "dependencies": {"native": "1.0.0", "electron": "8.0.3"}
        }),
    );
    let settings = Settings {
        registry: server.url(),
        prebuild_host_mirror_url: Some(server.url()),
        ..Settings::default()
    };
    let session = session(project_dir.path(), cache_dir.path(), settings);

    let mut project = Project::load(project_dir.path()).await.unwrap();
    project.resolve(&session.context).await.unwrap();

    let bindings = Locator::parse("bindings@prebuild:native#linux-x64").unwrap();
    assert!(project.package(&bindings).is_some());
    assert!(
        project
            .persisted_resolutions()
            .all(|resolution| resolution.locator != bindings)
    );
    bindings_document.assert_async().await;

    let fetched = project.fetch_all(session.fetcher.as_ref(), &session.options).await.unwrap();
    artifact.assert_async().await;

    let (_, result) = fetched
        .iter()
        .find(|(locator, _)| *locator == bindings)
        .unwrap();
    assert_eq!(result.package_fs.read("bindings.node").unwrap(), b"\x7fELF");
    assert!(result.package_fs.exists("index.js"));
    assert!(result.package_fs.exists("package.json"));

    let entries = cache_entries(&session.options);
    assert!(
        entries
            .iter()
            .any(|entry| entry.starts_with("@prebuilds-native-v1.0.0-linux-x64-electron-76-")),
        "{entries:?}"
    );
    assert!(
        entries
            .iter()
            .any(|entry| entry.starts_with("bindings-prebuild-native-linux-x64-")),
        "{entries:?}"
    );
}

#[tokio::test]
async fn missing_prebuild_fails_the_fetch() {
    let mut server = Server::new_async().await;
    let _native = publish(
        &mut server,
        "native",
        "1.0.0",
        json!({"dependencies": {"bindings": "^1.5.0"}}),
    )
    .await;
    let artifact = server
        .mock("GET", "/v1.0.0/native-v1.0.0-node-v115-linux-x64.tar.gz")
        .with_status(404)
        .create_async()
        .await;

    let project_dir = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    write_project(
        project_dir.path(),
        &json!({"name": "app", "dependencies": {"native": "1.0.0"}}),
    );
    let settings = Settings {
        registry: server.url(),
        prebuild_host_mirror_url: Some(server.url()),
        ..Settings::default()
    };
    let session = session(project_dir.path(), cache_dir.path(), settings);

    let mut project = Project::load(project_dir.path()).await.unwrap();
    project.resolve(&session.context).await.unwrap();

    let err = project
        .fetch_all(session.fetcher.as_ref(), &session.options)
        .await
        .unwrap_err();
    artifact.assert_async().await;
    assert_eq!(err.failures.len(), 1);
    assert_eq!(err.failures[0].subject, "bindings@prebuild:native#linux-x64");
    assert!(
        !cache_entries(&session.options)
            .iter()
            .any(|entry| entry.starts_with("@prebuilds-"))
    );
}
