//! Integration tests for gitcache

mod cli_tests {
    use assert_cmd::Command;
    use predicates::prelude::*;
    use tempfile::TempDir;

    fn gitcache() -> Command {
        let mut cmd = Command::cargo_bin("gitcache").unwrap();
        // Keep the host's CI identity out of the tests
        for var in [
            "GITCACHE_AGENT_ADDR",
            "GITCACHE_BROKER_PORT",
            "GITCACHE_REGION",
            "GITCACHE_INSTALLATION_ID",
            "GITCACHE_VM_ID",
            "GITCACHE_TOKEN",
            "GITCACHE_CONFIG",
        ] {
            cmd.env_remove(var);
        }
        cmd
    }

    #[test]
    fn help_displays() {
        gitcache()
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Persistent git mirror cache"));
    }

    #[test]
    fn version_displays() {
        gitcache()
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("gitcache"));
    }

    #[test]
    fn prepare_bypassed_without_vm_id() {
        let state = TempDir::new().unwrap();
        gitcache()
            .env("GITCACHE_STATE_DIR", state.path())
            .args(["prepare", "--owner", "acme", "--repo", "widgets"])
            .assert()
            .success()
            .stdout(predicate::str::contains("git mirror cache disabled"));
    }

    #[test]
    fn prepare_misconfigured_falls_back() {
        let state = TempDir::new().unwrap();
        gitcache()
            .env("GITCACHE_STATE_DIR", state.path())
            .env("GITCACHE_VM_ID", "vm-42")
            .args(["prepare", "--owner", "acme", "--repo", "widgets"])
            .assert()
            .success()
            .stdout(predicate::str::contains("falling back to uncached checkout"));
    }

    #[test]
    fn cleanup_bypassed_without_vm_id() {
        let state = TempDir::new().unwrap();
        gitcache()
            .env("GITCACHE_STATE_DIR", state.path())
            .args(["cleanup", "--owner", "acme", "--repo", "widgets"])
            .assert()
            .success()
            .stdout(predicate::str::contains("nothing to clean up"));
    }

    #[test]
    fn cleanup_without_lease_is_quiet_success() {
        let state = TempDir::new().unwrap();
        gitcache()
            .env("GITCACHE_STATE_DIR", state.path())
            .env("GITCACHE_VM_ID", "vm-42")
            .env("GITCACHE_REGION", "us-east-1")
            .env("GITCACHE_INSTALLATION_ID", "inst-1")
            .env("GITCACHE_TOKEN", "tok")
            .args(["cleanup", "--owner", "acme", "--repo", "widgets"])
            .assert()
            .success()
            .stdout(predicate::str::contains("No mirror lease"));
    }

    #[test]
    fn status_missing_lease_fails() {
        let state = TempDir::new().unwrap();
        gitcache()
            .env("GITCACHE_STATE_DIR", state.path())
            .args(["status", "--owner", "acme", "--repo", "widgets"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("No lease state found"));
    }

    #[test]
    fn dissociate_rejects_non_repository() {
        let state = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();
        gitcache()
            .env("GITCACHE_STATE_DIR", state.path())
            .args(["dissociate", "--workspace"])
            .arg(workspace.path())
            .assert()
            .failure()
            .stderr(predicate::str::contains("no .git directory"));
    }

    #[test]
    fn dissociate_unlinked_workspace_succeeds() {
        let state = TempDir::new().unwrap();
        let workspace = TempDir::new().unwrap();
        std::fs::create_dir_all(workspace.path().join(".git")).unwrap();

        gitcache()
            .env("GITCACHE_STATE_DIR", state.path())
            .args(["dissociate", "--workspace"])
            .arg(workspace.path())
            .assert()
            .success()
            .stdout(predicate::str::contains("self-contained"));
    }

    #[test]
    fn prepare_requires_owner_and_repo() {
        gitcache().arg("prepare").assert().failure();
    }
}
