//! ScriptRunner against mock shell scripts written into a temp folder.
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use stowage_backup::scripts::{self, ScriptRunner};
use stowage_backup::ExternalScripts;
use stowage_core::types::VolumeRef;
use stowage_core::Error;
use tempfile::TempDir;

/// Write an executable script that records its argv and stdin to
/// `<scripts>/<name>.log` before running `body`
fn mock_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    let script = format!(
        "#!/bin/sh\necho \"$@\" > \"{name}.log\"\nif [ ! -t 0 ]; then cat >> \"{name}.log\"; fi\n{body}\n"
    );
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

fn recorded(dir: &Path, name: &str) -> String {
    std::fs::read_to_string(dir.join(format!("{}.log", name))).unwrap()
}

#[tokio::test]
async fn test_volume_backup_parses_statistics() {
    let dir = TempDir::new().unwrap();
    mock_script(
        dir.path(),
        scripts::VOLUME_BACKUP,
        "echo 'Original size: 2048 bytes'\necho 'Final size: 512 bytes'\necho 'Compression ratio: 4.00'\necho 'Time elapsed: 1.5s'",
    );
    let runner = ScriptRunner::new(dir.path());

    let report = runner
        .volume_backup("pgdata", Path::new("/tmp/app-pgdata.tar.gz"), false)
        .await
        .unwrap();

    assert_eq!(report.original_size, 2048);
    assert_eq!(report.final_size, 512);
    assert_eq!(
        recorded(dir.path(), scripts::VOLUME_BACKUP).lines().next(),
        Some("pgdata /tmp/app-pgdata.tar.gz --no-compression")
    );
}

#[tokio::test]
async fn test_capture_without_final_size_fails() {
    let dir = TempDir::new().unwrap();
    mock_script(dir.path(), scripts::VOLUME_BACKUP, "echo 'done'");
    let runner = ScriptRunner::new(dir.path());

    let err = runner
        .capture_volume(&VolumeRef::from("pgdata".to_string()), Path::new("a.tar.gz"), true)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::ScriptOutput { .. }));
}

#[tokio::test]
async fn test_password_travels_over_stdin_only() {
    let dir = TempDir::new().unwrap();
    mock_script(dir.path(), scripts::FILE_ENCRYPT, "");
    let runner = ScriptRunner::new(dir.path());

    runner
        .file_encrypt(Path::new("in.bin"), Path::new("out.cpt"), "s3cret")
        .await
        .unwrap();

    let log = recorded(dir.path(), scripts::FILE_ENCRYPT);
    let mut lines = log.lines();
    assert_eq!(lines.next(), Some("in.bin out.cpt"));
    assert_eq!(lines.next(), Some("s3cret"));
}

#[tokio::test]
async fn test_derive_key_reads_json_summary() {
    let dir = TempDir::new().unwrap();
    mock_script(
        dir.path(),
        scripts::DERIVE_KEY,
        r#"echo 'deriving...'
echo '{"Salt":"abcd","Iterations":"1000","Key":"deadbeef","Time taken":"0.1s"}'"#,
    );
    let runner = ScriptRunner::new(dir.path());

    let derived = runner.derive_key("pw", None, Some(1000)).await.unwrap();

    assert_eq!(derived.key, "deadbeef");
    assert_eq!(derived.iterations, "1000");
    let args = recorded(dir.path(), scripts::DERIVE_KEY);
    let first: Vec<&str> = args.lines().next().unwrap().split(' ').collect();
    assert_eq!(first.len(), 2, "salt and iterations expected: {:?}", first);
    assert_eq!(first[0].len(), 16);
    assert_eq!(first[1], "1000");
}

#[tokio::test]
async fn test_non_zero_exit_carries_output() {
    let dir = TempDir::new().unwrap();
    mock_script(dir.path(), scripts::KEY_GENERATE, "echo 'openssl: bad key' >&2\nexit 3");
    let runner = ScriptRunner::new(dir.path());

    match runner.key_generate().await.unwrap_err() {
        Error::Subprocess { output, .. } => assert!(output.contains("bad key")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_hung_script_times_out() {
    let dir = TempDir::new().unwrap();
    mock_script(dir.path(), scripts::KEY_GENERATE, "sleep 5");
    let runner = ScriptRunner::new(dir.path()).with_timeout(Some(Duration::from_millis(200)));

    match runner.key_generate().await.unwrap_err() {
        Error::Subprocess { status, .. } => assert!(status.contains("timed out")),
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn test_decrypt_folder_removes_encrypted_pairs() {
    let scripts_dir = TempDir::new().unwrap();
    mock_script(scripts_dir.path(), scripts::KEY_DECRYPT2, "cp \"$1\" \"$2\"");
    let data = TempDir::new().unwrap();
    std::fs::write(data.path().join("app-0.tar.gz.cpt"), b"payload").unwrap();
    std::fs::write(data.path().join("app-0.tar.gz.cpt.pass"), b"pass").unwrap();
    std::fs::write(data.path().join("orphan.cpt"), b"no pass").unwrap();

    let runner = ScriptRunner::new(scripts_dir.path())
        .with_keys(None, Some(PathBuf::from("/keys/private.pem.enc")));
    let decrypted = runner.decrypt_folder(data.path(), "pw").await.unwrap();

    assert_eq!(decrypted, vec![data.path().join("app-0.tar.gz")]);
    assert_eq!(std::fs::read(&decrypted[0]).unwrap(), b"payload");
    assert!(!data.path().join("app-0.tar.gz.cpt").exists());
    assert!(!data.path().join("app-0.tar.gz.cpt.pass").exists());
    assert!(data.path().join("orphan.cpt").exists());
}
