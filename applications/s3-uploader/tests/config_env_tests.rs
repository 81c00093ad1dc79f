//! Environment variables sit between the config file and command-line
//! overrides. Kept in its own test binary, as a single test, since it changes
//! the process environment.

use s3_uploader::{AppConfig, ConfigOverrides};
use tempfile::TempDir;

#[test]
fn test_environment_layer() {
    let temp_dir = TempDir::new().unwrap();

    // Flat names
    std::env::set_var("S3U_DIRECTORY", temp_dir.path());
    std::env::set_var("S3U_INTERVAL", "3");
    std::env::set_var("S3U_LOGLEVEL", "debug");
    std::env::set_var("S3U_PARALLELUPLOADS", "2");
    std::env::set_var("S3U_UPLOADQUEUESIZE", "20");
    std::env::set_var("S3U_S3_REGION", "eu-west-1");
    std::env::set_var("S3U_S3_BUCKET", "flat");
    std::env::set_var("S3U_S3_ENDPOINT", "http://127.0.0.1:9000");
    std::env::set_var("S3U_S3_ACCESSKEYID", "AKIA");
    std::env::set_var("S3U_S3_SECRETACCESSKEY", "secret");
    std::env::set_var("S3U_S3_SESSIONTOKEN", "");

    let config = AppConfig::load(None, &ConfigOverrides::default()).unwrap();

    assert_eq!(config.watch.directory, temp_dir.path());
    assert_eq!(config.watch.interval_secs, 3);
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.upload.parallel_uploads, 2);
    assert_eq!(config.upload.queue_size, 20);
    assert_eq!(config.s3.region, "eu-west-1");
    assert_eq!(config.s3.bucket, "flat");
    assert_eq!(config.s3.endpoint.as_deref(), Some("http://127.0.0.1:9000"));
    assert_eq!(config.s3.access_key_id.as_deref(), Some("AKIA"));
    assert_eq!(config.s3.secret_access_key.as_deref(), Some("secret"));
    assert_eq!(config.s3.session_token, None);
    assert!(config.validate().is_ok());

    // Sectioned names win over flat ones
    std::env::set_var("S3U_WATCH__INTERVAL_SECS", "42");
    std::env::set_var("S3U_UPLOAD__PARALLEL_UPLOADS", "3");
    std::env::set_var("S3U_S3__BUCKET", "sectioned");
    std::env::set_var("S3U_LOG_LEVEL", "warn");

    let config = AppConfig::load(None, &ConfigOverrides::default()).unwrap();

    assert_eq!(config.watch.interval_secs, 42);
    assert_eq!(config.upload.parallel_uploads, 3);
    assert_eq!(config.s3.bucket, "sectioned");
    assert_eq!(config.s3.region, "eu-west-1");
    assert_eq!(config.log_level, "warn");
    assert!(config.validate().is_ok());

    // Command-line overrides win over both
    let overrides = ConfigOverrides {
        s3_bucket: Some("from-cli".to_string()),
        interval_secs: Some(5),
        ..ConfigOverrides::default()
    };
    let config = AppConfig::load(None, &overrides).unwrap();

    assert_eq!(config.s3.bucket, "from-cli");
    assert_eq!(config.watch.interval_secs, 5);
    assert_eq!(config.s3.region, "eu-west-1");
}
