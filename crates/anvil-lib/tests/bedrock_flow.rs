mod common;

use std::sync::Arc;

use anvil_lib::server::core::validator::PatternBuildIdValidator;
use anvil_lib::server::resolver::ManualClock;
use anvil_lib::{Entrypoint, InstallRequest, InstallStage, ProvisioningEngine, SoftwareType};
use common::{config_for, init_logging, zip_bytes, FixedJava, RecordingReporter};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const PAGE: &str = r#"<html><body>
<a href="https://www.minecraft.net/bedrockdedicatedserver/bin-linux/bedrock-server-1.21.11.01.zip">Ubuntu</a>
<a href="https://www.minecraft.net/bedrockdedicatedserver/bin-win/bedrock-server-1.21.11.01.zip">Windows</a>
</body></html>"#;

fn engine_with_clock(base: &str, clock: Arc<ManualClock>) -> ProvisioningEngine {
    ProvisioningEngine::with_collaborators(
        config_for(base),
        Arc::new(FixedJava("java".into())),
        Arc::new(PatternBuildIdValidator),
        clock,
    )
    .unwrap()
}

async fn mount_page(server: &MockServer, expected_hits: u64) {
    Mock::given(method("GET"))
        .and(path("/en-us/download/server/bedrock"))
        .respond_with(ResponseTemplate::new(200).set_body_string(PAGE))
        .expect(expected_hits)
        .mount(server)
        .await;
}

#[tokio::test]
async fn latest_resolves_from_the_download_page() {
    init_logging();
    let server = MockServer::start().await;
    mount_page(&server, 1).await;
    let engine = engine_with_clock(&server.uri(), Arc::new(ManualClock::default()));

    let artifact = engine
        .resolver()
        .resolve(SoftwareType::Bedrock, "latest", None)
        .await
        .unwrap();

    assert_eq!(artifact.version, "1.21.11.01");
    assert_eq!(artifact.file_name, "bedrock-server-1.21.11.01.zip");
    assert!(artifact.url.ends_with("/bedrock-server-1.21.11.01.zip"));
}

#[tokio::test]
async fn version_feed_is_cached_until_the_ttl_passes() {
    let server = MockServer::start().await;
    mount_page(&server, 2).await;
    let clock = Arc::new(ManualClock::default());
    let engine = engine_with_clock(&server.uri(), clock.clone());

    let first = engine.bedrock_versions().await.unwrap();
    clock.advance(chrono::Duration::minutes(59));
    let cached = engine.bedrock_versions().await.unwrap();
    assert_eq!(first, cached);

    clock.advance(chrono::Duration::minutes(2));
    let refreshed = engine.bedrock_versions().await.unwrap();
    assert_eq!(refreshed.latest, "1.21.11.01");
    assert!(refreshed.fetched_at > first.fetched_at);
}

#[tokio::test]
async fn invalidating_the_feed_forces_a_refetch() {
    let server = MockServer::start().await;
    mount_page(&server, 2).await;
    let engine = engine_with_clock(&server.uri(), Arc::new(ManualClock::default()));

    engine.bedrock_versions().await.unwrap();
    engine.bedrock_versions().await.unwrap();
    engine.resolver().invalidate_bedrock_cache();
    let refreshed = engine.bedrock_versions().await.unwrap();
    assert_eq!(refreshed.latest, "1.21.11.01");
}

#[tokio::test]
async fn fallback_versions_are_not_cached() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/en-us/download/server/bedrock"))
        .respond_with(ResponseTemplate::new(403))
        .expect(2)
        .mount(&server)
        .await;
    let engine = engine_with_clock(&server.uri(), Arc::new(ManualClock::default()));

    let first = engine.bedrock_versions().await.unwrap();
    let second = engine.bedrock_versions().await.unwrap();
    assert_eq!(first.latest, "1.20.0.01");
    assert_eq!(second.latest, "1.20.0.01");
}

#[cfg(unix)]
#[tokio::test]
async fn wrapped_archive_lands_flat_and_executable() {
    use std::os::unix::fs::PermissionsExt;

    init_logging();
    let server = MockServer::start().await;
    mount_page(&server, 1).await;
    let archive = zip_bytes(&[
        ("bedrock-server-1.21.11.01/", "".as_bytes()),
        ("bedrock-server-1.21.11.01/bedrock_server", "\x7fELF".as_bytes()),
        ("bedrock-server-1.21.11.01/server.properties", "server-name=Dedicated Server\n".as_bytes()),
        ("bedrock-server-1.21.11.01/behavior_packs/vanilla/manifest.json", "{}".as_bytes()),
    ]);
    Mock::given(method("GET"))
        .and(path("/bin-linux/bedrock-server-1.21.11.01.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().join("bedrock");
    let engine = engine_with_clock(&server.uri(), Arc::new(ManualClock::default()));
    let reporter = Arc::new(RecordingReporter::default());

    let entrypoint = engine
        .install(
            InstallRequest::new(SoftwareType::Bedrock, &target, "latest"),
            reporter.clone(),
        )
        .await
        .unwrap();

    assert_eq!(entrypoint, Entrypoint::Executable("bedrock_server".to_string()));
    let binary = target.join("bedrock_server");
    assert!(binary.is_file());
    assert_eq!(std::fs::metadata(&binary).unwrap().permissions().mode() & 0o777, 0o755);
    assert!(target.join("behavior_packs/vanilla/manifest.json").is_file());
    assert!(!target.join("bedrock-server-1.21.11.01").exists());
    assert!(!target.join("bedrock-server-1.21.11.01.zip").exists());
    assert_eq!(std::fs::read_to_string(target.join("eula.txt")).unwrap(), "eula=true\n");

    assert_eq!(
        reporter.stages(),
        vec![
            InstallStage::Resolving,
            InstallStage::Downloading,
            InstallStage::Extracting,
            InstallStage::Normalizing,
            InstallStage::Finalizing,
            InstallStage::Complete,
        ]
    );
    assert_eq!(reporter.finished_with(), Some(true));
}

#[cfg(unix)]
#[tokio::test]
async fn update_keeps_operator_config_and_replaces_the_binary() {
    let server = MockServer::start().await;
    let archive = zip_bytes(&[
        ("bedrock-server-1.21.11.01/bedrock_server", "new build".as_bytes()),
        ("bedrock-server-1.21.11.01/server.properties", "server-name=Dedicated Server\n".as_bytes()),
        ("bedrock-server-1.21.11.01/allowlist.json", "[]".as_bytes()),
    ]);
    Mock::given(method("GET"))
        .and(path("/bin-linux/bedrock-server-1.21.11.01.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
        .expect(1)
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().to_path_buf();
    std::fs::write(target.join("bedrock_server"), "old build").unwrap();
    std::fs::write(target.join("server.properties"), "server-name=Mine\n").unwrap();
    std::fs::create_dir(target.join("worlds")).unwrap();

    let engine = engine_with_clock(&server.uri(), Arc::new(ManualClock::default()));
    engine
        .install(
            InstallRequest::new(SoftwareType::Bedrock, &target, "1.21.11.01"),
            Arc::new(RecordingReporter::default()),
        )
        .await
        .unwrap();

    assert_eq!(std::fs::read_to_string(target.join("bedrock_server")).unwrap(), "new build");
    assert_eq!(
        std::fs::read_to_string(target.join("server.properties")).unwrap(),
        "server-name=Mine\n"
    );
    assert!(target.join("allowlist.json").is_file());
    assert!(target.join("worlds").is_dir());
    assert!(!target.join("bedrock-server-1.21.11.01").exists());
}

#[cfg(unix)]
#[tokio::test]
async fn retry_after_an_interrupted_extraction_still_flattens() {
    let server = MockServer::start().await;
    let archive = zip_bytes(&[
        ("bedrock-server-1.21.11.01/bedrock_server", "\x7fELF".as_bytes()),
        ("bedrock-server-1.21.11.01/server.properties", "server-name=Dedicated Server\n".as_bytes()),
        ("bedrock-server-1.21.11.01/resource_packs/vanilla/manifest.json", "{}".as_bytes()),
    ]);
    Mock::given(method("GET"))
        .and(path("/bin-linux/bedrock-server-1.21.11.01.zip"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(archive))
        .mount(&server)
        .await;

    // what an earlier run left behind before it failed
    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().to_path_buf();
    let leftover = target.join("bedrock-server-1.21.11.01");
    std::fs::create_dir(&leftover).unwrap();
    std::fs::write(leftover.join("server.properties"), "half").unwrap();
    std::fs::create_dir(target.join("worlds")).unwrap();

    let engine = engine_with_clock(&server.uri(), Arc::new(ManualClock::default()));
    let entrypoint = engine
        .install(
            InstallRequest::new(SoftwareType::Bedrock, &target, "1.21.11.01"),
            Arc::new(RecordingReporter::default()),
        )
        .await
        .unwrap();

    assert_eq!(entrypoint, Entrypoint::Executable("bedrock_server".to_string()));
    assert!(target.join("bedrock_server").is_file());
    assert!(target.join("resource_packs/vanilla/manifest.json").is_file());
    assert_eq!(
        std::fs::read_to_string(target.join("server.properties")).unwrap(),
        "server-name=Dedicated Server\n"
    );
    assert!(target.join("worlds").is_dir());
    assert!(!leftover.exists());
}

#[tokio::test]
async fn failed_install_removes_the_downloaded_archive() {
    let server = MockServer::start().await;
    let serverless = zip_bytes(&[("readme.txt", "no server here".as_bytes())]);
    for platform in ["linux", "win"] {
        Mock::given(method("GET"))
            .and(path(format!("/bin-{}/bedrock-server-1.21.11.01.zip", platform)))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(serverless.clone()))
            .mount(&server)
            .await;
    }

    let tmp = tempfile::tempdir().unwrap();
    let engine = engine_with_clock(&server.uri(), Arc::new(ManualClock::default()));
    let failure = engine
        .install(
            InstallRequest::new(SoftwareType::Bedrock, tmp.path(), "1.21.11.01"),
            Arc::new(RecordingReporter::default()),
        )
        .await
        .unwrap_err();

    assert_eq!(failure.stage, InstallStage::Finalizing);
    assert!(!tmp.path().join("bedrock-server-1.21.11.01.zip").exists());
    assert!(tmp.path().join("readme.txt").is_file());
}

#[tokio::test]
async fn manual_archive_skips_the_network() {
    let server = MockServer::start().await;
    let tmp = tempfile::tempdir().unwrap();
    let target = tmp.path().to_path_buf();
    let binary = if cfg!(windows) { "bedrock_server.exe" } else { "bedrock_server" };
    std::fs::write(
        target.join("bedrock-server-manual.zip"),
        zip_bytes(&[(binary, "bin".as_bytes())]),
    )
    .unwrap();

    let engine = engine_with_clock(&server.uri(), Arc::new(ManualClock::default()));
    let entrypoint = engine
        .install(
            InstallRequest::new(SoftwareType::Bedrock, &target, "latest"),
            Arc::new(RecordingReporter::default()),
        )
        .await
        .unwrap();

    assert_eq!(entrypoint, Entrypoint::Executable(binary.to_string()));
    assert!(target.join("bedrock-server-manual.zip").exists());
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn blocked_download_suggests_a_manual_upload() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(403))
        .mount(&server)
        .await;

    let tmp = tempfile::tempdir().unwrap();
    let engine = engine_with_clock(&server.uri(), Arc::new(ManualClock::default()));
    let reporter = Arc::new(RecordingReporter::default());
    let failure = engine
        .install(
            InstallRequest::new(SoftwareType::Bedrock, tmp.path(), "1.21.11.01"),
            reporter.clone(),
        )
        .await
        .unwrap_err();

    assert_eq!(failure.stage, InstallStage::Downloading);
    assert!(failure.hint.unwrap().contains("bedrock-server-manual.zip"));
    assert_eq!(reporter.stages().last(), Some(&InstallStage::Failed));
    assert_eq!(reporter.finished_with(), Some(false));
    let leftovers: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
    assert!(leftovers.is_empty());
}
