use assert_cmd::{Command, cargo_bin_cmd};
use predicates::prelude::predicate;

fn forwarder() -> Command {
    cargo_bin_cmd!("firestore-forwarder")
}

mod help_and_version {
    use super::*;

    #[test]
    fn test_help_lists_options() {
        forwarder()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Usage:"))
            .stdout(predicate::str::contains("--url"))
            .stdout(predicate::str::contains("--webhookName"))
            .stdout(predicate::str::contains("--fireStoreCollection"))
            .stdout(predicate::str::contains("--secretsFile"))
            .stdout(predicate::str::contains("--requestId"));
    }

    #[test]
    fn test_short_help_flag() {
        forwarder()
            .arg("-h")
            .assert()
            .success()
            .stdout(predicate::str::contains("Usage:"));
    }

    #[test]
    fn test_version_flag() {
        forwarder()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("firestore-forwarder"));
    }
}

mod configuration_errors {
    use super::*;

    #[test]
    fn test_missing_url_fails() {
        forwarder()
            .args(["--secretsFile", "service-account.json"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No Forwarder URL provided"));
    }

    #[test]
    fn test_missing_url_checked_before_secrets() {
        forwarder()
            .assert()
            .failure()
            .stderr(predicate::str::contains("No Forwarder URL provided"));
    }

    #[test]
    fn test_missing_secrets_flag_fails() {
        forwarder()
            .args(["--url", "http://127.0.0.1:9/hook"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No secrets file provided"));
    }

    #[test]
    fn test_nonexistent_secrets_file_names_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.json");

        forwarder()
            .args(["-u", "http://127.0.0.1:9/hook", "-s"])
            .arg(&missing)
            .assert()
            .failure()
            .stderr(predicate::str::contains(missing.display().to_string()));
    }

    #[test]
    fn test_unparseable_secrets_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let secrets = dir.path().join("key.json");
        std::fs::write(&secrets, "not json").unwrap();

        forwarder()
            .args(["-u", "http://127.0.0.1:9/hook", "-s"])
            .arg(&secrets)
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid service account file"));
    }
}
