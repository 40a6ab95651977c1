mod common;

use std::sync::Arc;

use anvil_lib::server::core::validator::PatternBuildIdValidator;
use anvil_lib::server::resolver::SystemClock;
use anvil_lib::{
    Entrypoint, InstallRequest, InstallStage, ProvisionError, ProvisioningEngine, SoftwareType,
};
use common::{config_for, init_logging, write_zip, zip_bytes, FixedJava, RecordingReporter};
use serde_json::json;
use sha1::{Digest, Sha1};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn engine_for(server: &MockServer) -> ProvisioningEngine {
    ProvisioningEngine::with_collaborators(
        config_for(&server.uri()),
        Arc::new(FixedJava("java".into())),
        Arc::new(PatternBuildIdValidator),
        Arc::new(SystemClock),
    )
    .unwrap()
}

fn fabric_mod_jar() -> Vec<u8> {
    zip_bytes(&[
        ("fabric.mod.json", r#"{"schemaVersion":1,"id":"example"}"#.as_bytes()),
        ("example/Main.class", "cafebabe".as_bytes()),
    ])
}

async fn mount_fabric(server: &MockServer, mc: &str) {
    Mock::given(method("GET"))
        .and(path(format!("/fabric/v2/versions/loader/{}", mc)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "loader": { "version": "0.16.0", "stable": true } },
            { "loader": { "version": "0.15.11", "stable": true } }
        ])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fabric/v2/versions/installer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "version": "1.0.1", "stable": true }])))
        .mount(server)
        .await;
    Mock::given(method("GET"))
        .and(path(format!("/fabric/v2/versions/loader/{}/0.16.0/1.0.1/server/jar", mc)))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"fabric launcher".to_vec()))
        .mount(server)
        .await;
}

#[tokio::test]
async fn client_pack_gets_its_loader_installed() {
    init_logging();
    let server = MockServer::start().await;
    mount_fabric(&server, "1.21.1").await;

    let uploads = tempfile::tempdir().unwrap();
    let archive = uploads.path().join("client-pack.zip");
    let jar = fabric_mod_jar();
    std::fs::write(
        &archive,
        zip_bytes(&[
            ("mods/example.jar", jar.as_slice()),
            ("config/example.toml", "enabled = true".as_bytes()),
        ]),
    )
    .unwrap();

    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().join("server");
    let reporter = Arc::new(RecordingReporter::default());
    let entrypoint = engine_for(&server)
        .install(
            InstallRequest::new(SoftwareType::ModpackZip, &target, "latest")
                .with_modpack_source(archive.to_str().unwrap())
                .with_mc_version("1.21.1"),
            reporter.clone(),
        )
        .await
        .unwrap();

    assert_eq!(entrypoint, Entrypoint::ServerJar);
    assert_eq!(std::fs::read(target.join("server.jar")).unwrap(), b"fabric launcher");
    assert_eq!(std::fs::read(target.join("mods/example.jar")).unwrap(), jar);
    assert!(target.join("config/example.toml").is_file());
    assert!(!target.join("temp_extract").exists());
    assert!(archive.exists(), "local uploads are never deleted");

    let stages = reporter.stages();
    for stage in [
        InstallStage::Extracting,
        InstallStage::Classifying,
        InstallStage::Normalizing,
        InstallStage::InstallingLoader,
        InstallStage::Complete,
    ] {
        assert!(stages.contains(&stage), "missing {:?} in {:?}", stage, stages);
    }
}

#[tokio::test]
async fn wrapped_server_pack_is_flattened_and_started_by_script() {
    let server = MockServer::start().await;
    let uploads = tempfile::tempdir().unwrap();
    let archive = uploads.path().join("server-pack.zip");
    write_zip(
        &archive,
        &[
            ("My Pack 1.2/run.sh", "#!/bin/sh\njava -jar server.jar\n"),
            ("My Pack 1.2/mods/a.jar", "not inspected"),
            ("My Pack 1.2/config/a.toml", "x = 1"),
        ],
    );

    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().to_path_buf();
    let entrypoint = engine_for(&server)
        .install(
            InstallRequest::new(SoftwareType::ModpackZip, &target, "latest")
                .with_modpack_source(archive.to_str().unwrap()),
            Arc::new(RecordingReporter::default()),
        )
        .await
        .unwrap();

    assert_eq!(entrypoint, Entrypoint::Script("run.sh".to_string()));
    assert!(target.join("run.sh").is_file());
    assert!(target.join("mods/a.jar").is_file());
    assert!(!target.join("My Pack 1.2").exists());
    assert!(target.join("eula.txt").is_file());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn modrinth_pack_downloads_server_files_and_loader() {
    init_logging();
    let server = MockServer::start().await;
    let uri = server.uri();
    let lib_jar = fabric_mod_jar();
    let index = json!({
        "formatVersion": 1,
        "game": "minecraft",
        "versionId": "2.0.0",
        "name": "Example Pack",
        "files": [
            {
                "path": "mods/lib.jar",
                "hashes": { "sha1": format!("{:x}", Sha1::digest(&lib_jar)) },
                "env": { "client": "required", "server": "required" },
                "downloads": [format!("{}/cdn/lib.jar", uri)],
                "fileSize": lib_jar.len()
            },
            {
                "path": "mods/shaders.jar",
                "hashes": {},
                "env": { "client": "required", "server": "unsupported" },
                "downloads": [format!("{}/cdn/shaders.jar", uri)],
                "fileSize": 1
            }
        ],
        "dependencies": { "minecraft": "1.21.1", "fabric-loader": "0.15.11" }
    })
    .to_string();
    let pack = zip_bytes(&[
        ("modrinth.index.json", index.as_bytes()),
        ("overrides/config/pack.toml", "from = \"overrides\"".as_bytes()),
    ]);

    Mock::given(method("GET"))
        .and(path("/modrinth/v2/project/example-pack/version"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{
            "id": "AbCdEf12",
            "version_number": "2.0.0",
            "game_versions": ["1.21.1"],
            "loaders": ["fabric"],
            "files": [{ "url": format!("{}/cdn/example-pack.mrpack", uri), "filename": "example-pack.mrpack", "primary": true }]
        }])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cdn/example-pack.mrpack"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(pack))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cdn/lib.jar"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(lib_jar.clone()))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/cdn/shaders.jar"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"x".to_vec()))
        .expect(0)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fabric/v2/versions/loader/1.21.1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            { "loader": { "version": "0.16.0", "stable": true } },
            { "loader": { "version": "0.15.11", "stable": true } }
        ])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fabric/v2/versions/installer"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{ "version": "1.0.1", "stable": true }])))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/fabric/v2/versions/loader/1.21.1/0.15.11/1.0.1/server/jar"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"pinned loader".to_vec()))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().to_path_buf();
    let entrypoint = engine_for(&server)
        .install(
            InstallRequest::new(SoftwareType::ModpackZip, &target, "latest")
                .with_modpack_source("example-pack"),
            Arc::new(RecordingReporter::default()),
        )
        .await
        .unwrap();

    assert_eq!(entrypoint, Entrypoint::ServerJar);
    assert_eq!(std::fs::read(target.join("mods/lib.jar")).unwrap(), lib_jar);
    assert!(!target.join("mods/shaders.jar").exists());
    assert!(target.join("config/pack.toml").is_file());
    assert_eq!(std::fs::read(target.join("server.jar")).unwrap(), b"pinned loader");
    assert!(!target.join("example-pack.mrpack").exists());
    assert!(!target.join("temp_extract").exists());
}

#[tokio::test]
async fn missing_source_fails_while_resolving() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    let engine = engine_for(&server);

    let failure = engine
        .install(
            InstallRequest::new(SoftwareType::ModpackZip, tmp.path(), "latest")
                .with_modpack_source("/no/such/pack.zip"),
            Arc::new(RecordingReporter::default()),
        )
        .await
        .unwrap_err();
    assert_eq!(failure.stage, InstallStage::Resolving);
    assert!(matches!(failure.error, ProvisionError::InvalidRequest(_)));

    let failure = engine
        .install(
            InstallRequest::new(SoftwareType::ModpackZip, tmp.path(), "latest"),
            Arc::new(RecordingReporter::default()),
        )
        .await
        .unwrap_err();
    assert!(matches!(failure.error, ProvisionError::InvalidRequest(_)));
}

#[tokio::test]
async fn client_pack_without_minecraft_version_is_rejected() {
    let server = MockServer::start().await;
    let uploads = tempfile::tempdir().unwrap();
    let archive = uploads.path().join("bare.zip");
    let jar = fabric_mod_jar();
    std::fs::write(&archive, zip_bytes(&[("mods/example.jar", jar.as_slice())])).unwrap();

    let tmp = tempfile::tempdir().unwrap();
    let failure = engine_for(&server)
        .install(
            InstallRequest::new(SoftwareType::ModpackZip, tmp.path(), "latest")
                .with_modpack_source(archive.to_str().unwrap()),
            Arc::new(RecordingReporter::default()),
        )
        .await
        .unwrap_err();

    assert!(matches!(failure.error, ProvisionError::InvalidRequest(_)));
    assert!(failure.to_string().contains("mc_version"));
    assert!(!tmp.path().join("temp_extract").exists());
}

#[tokio::test]
async fn downloaded_pack_is_removed_when_the_install_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/cdn/odd-pack.zip"))
        .respond_with(
            ResponseTemplate::new(200).set_body_bytes(zip_bytes(&[("readme.txt", "nothing to run".as_bytes())])),
        )
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let failure = engine_for(&server)
        .install(
            InstallRequest::new(SoftwareType::ModpackZip, tmp.path(), "latest")
                .with_modpack_source(format!("{}/cdn/odd-pack.zip", server.uri())),
            Arc::new(RecordingReporter::default()),
        )
        .await
        .unwrap_err();

    assert!(matches!(failure.error, ProvisionError::InvalidRequest(_)));
    assert!(!tmp.path().join("odd-pack.zip").exists());
    assert!(!tmp.path().join("temp_extract").exists());
}
