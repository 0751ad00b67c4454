// ABOUTME: Integration tests for configuration discovery and loading.
// ABOUTME: Uses temporary directories and scoped environment variables.

use haul::config::Config;
use haul::error::Error;
use haul::tunnel::Transport;
use std::fs;
use std::path::PathBuf;

/// Test: no file anywhere.
/// Expected: defaults.
#[test]
fn missing_file_means_defaults() {
    let project = tempfile::tempdir().unwrap();
    let xdg = tempfile::tempdir().unwrap();

    temp_env::with_vars(
        [
            ("XDG_CONFIG_HOME", Some(xdg.path().as_os_str())),
            ("HOME", Some(xdg.path().as_os_str())),
        ],
        || {
            assert!(Config::discover(project.path()).is_none());
            let config = Config::resolve(None, project.path()).unwrap();
            assert_eq!(config, Config::default());
        },
    );
}

/// Test: project file and user file both present.
/// Expected: the project file wins; haul.yml beats haul.yaml.
#[test]
fn project_file_wins_over_user_file() {
    let project = tempfile::tempdir().unwrap();
    let xdg = tempfile::tempdir().unwrap();
    fs::create_dir_all(xdg.path().join("haul")).unwrap();
    fs::write(xdg.path().join("haul/config.yml"), "registry:\n  port: 7000\n").unwrap();
    fs::write(project.path().join("haul.yaml"), "registry:\n  port: 6001\n").unwrap();
    fs::write(project.path().join("haul.yml"), "registry:\n  port: 6000\n").unwrap();

    temp_env::with_var("XDG_CONFIG_HOME", Some(xdg.path().as_os_str()), || {
        let config = Config::resolve(None, project.path()).unwrap();
        assert_eq!(config.registry.port, 6000);
    });
}

/// Test: only the dot-directory project file exists.
/// Expected: it is found.
#[test]
fn dot_directory_config() {
    let project = tempfile::tempdir().unwrap();
    let xdg = tempfile::tempdir().unwrap();
    fs::create_dir_all(project.path().join(".haul")).unwrap();
    fs::write(
        project.path().join(".haul/config.yml"),
        "ssh:\n  transport: native\n",
    )
    .unwrap();

    temp_env::with_var("XDG_CONFIG_HOME", Some(xdg.path().as_os_str()), || {
        let config = Config::resolve(None, project.path()).unwrap();
        assert_eq!(config.ssh.transport, Transport::Native);
    });
}

/// Test: only the user config exists, located through HOME.
/// Expected: ~/.config/haul/config.yml is used, with ~ expanded in key paths.
#[test]
fn user_config_under_home() {
    let project = tempfile::tempdir().unwrap();
    let home = tempfile::tempdir().unwrap();
    fs::create_dir_all(home.path().join(".config/haul")).unwrap();
    fs::write(
        home.path().join(".config/haul/config.yml"),
        "ssh:\n  key: ~/.ssh/deploy\n",
    )
    .unwrap();

    temp_env::with_vars(
        [
            ("XDG_CONFIG_HOME", None),
            ("HOME", Some(home.path().as_os_str())),
        ],
        || {
            let config = Config::resolve(None, project.path()).unwrap();
            assert_eq!(config.ssh.key, Some(home.path().join(".ssh/deploy")));
        },
    );
}

/// Test: --config pointing at a missing file.
/// Expected: ConfigRead error naming the path, even though defaults would work.
#[test]
fn explicit_missing_file_is_an_error() {
    let project = tempfile::tempdir().unwrap();
    let missing = PathBuf::from("/nonexistent/haul.yml");

    let err = Config::resolve(Some(&missing), project.path()).unwrap_err();

    match err {
        Error::ConfigRead { path, .. } => assert_eq!(path, missing),
        other => panic!("expected ConfigRead, got {other:?}"),
    }
}

/// Test: malformed YAML.
/// Expected: ConfigParse error naming the file.
#[test]
fn malformed_yaml_is_reported_with_path() {
    let project = tempfile::tempdir().unwrap();
    let path = project.path().join("haul.yml");
    fs::write(&path, "registry: [unclosed\n").unwrap();

    let err = Config::resolve(Some(&path), project.path()).unwrap_err();

    assert!(matches!(err, Error::ConfigParse { .. }));
    assert!(err.to_string().contains("haul.yml"));
}
