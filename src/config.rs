use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use clap_serde_derive::ClapSerde;

pub const DEFAULT_CONFIG_FILE: &str = "MedicalModelRunner.toml";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the configuration file
    #[arg(short, long, env, default_value = DEFAULT_CONFIG_FILE)]
    pub config_file: String,

    /// Configuration options
    #[command(flatten)]
    pub opt_config: <Config as ClapSerde>::Opt,
}

// Defaults live in `#[default]` so unset flags stay `None` and never mask the file.
#[derive(ClapSerde, Debug)]
pub struct Config {
    /// The address the listener binds to
    #[default("0.0.0.0".to_string())]
    #[arg(short, long, env)]
    pub address: String,

    /// The port the listener binds to
    #[default(8000)]
    #[arg(short, long, env)]
    pub port: u16,

    /// OTLP collector endpoint, traces and metrics are only exported when set
    #[default(String::new())]
    #[arg(long, env)]
    pub otlp_endpoint: String,

    /// Keep logging to the console while exporting to OTLP
    #[default(false)]
    #[arg(long, env)]
    pub console_log: bool,

    /// PEM certificate, TLS is enabled when both the certificate and key are set
    #[default(String::new())]
    #[arg(long, env)]
    pub tls_cert_path: String,

    /// PEM private key matching the certificate
    #[default(String::new())]
    #[arg(long, env)]
    pub tls_key_path: String,

    /// Hugging Face repository of the model, empty selects the service default
    #[default(String::new())]
    #[arg(long, env)]
    pub model_repo: String,

    /// Revision of the model repository
    #[default("main".to_string())]
    #[arg(long, env)]
    pub model_revision: String,

    /// Number of inference calls allowed to run at the same time
    #[default(2)]
    #[arg(long, env)]
    pub max_concurrent_inferences: usize,

    /// Upper bound in seconds for a single inference call, including queueing
    #[default(120)]
    #[arg(long, env)]
    pub inference_timeout_secs: u64,

    /// Largest max_length a summarization request may ask for, 0 accepts any length
    #[default(0)]
    #[arg(long, env)]
    pub max_summary_length: usize,
}

impl Config {
    /// Reads a TOML file, keys it leaves out keep their defaults.
    pub fn from_toml(path: &str) -> Result<Self> {
        let str = std::fs::read_to_string(path)?;
        Self::from_toml_str(&str)
    }

    fn from_toml_str(str: &str) -> Result<Self> {
        let opt: <Config as ClapSerde>::Opt = toml::from_str(str)?;
        Ok(Config::from(opt))
    }

    /// Reads the configuration file named in `args` and merges the CLI and env options over it.
    /// Only the default file is allowed to be missing, a file that exists must parse.
    pub fn load(args: Args) -> Result<Self> {
        let config = if args.config_file == DEFAULT_CONFIG_FILE
            && !Path::new(&args.config_file).exists()
        {
            Config::default()
        } else {
            Config::from_toml(&args.config_file).with_context(|| {
                format!("Failed to read configuration file {}", args.config_file)
            })?
        };
        Ok(config.merge(args.opt_config))
    }

    pub fn otlp_endpoint(&self) -> Option<&str> {
        non_empty(&self.otlp_endpoint)
    }

    pub fn tls_paths(&self) -> Option<(&str, &str)> {
        non_empty(&self.tls_cert_path).zip(non_empty(&self.tls_key_path))
    }

    pub fn model_repo_or<'a>(&'a self, default: &'a str) -> &'a str {
        non_empty(&self.model_repo).unwrap_or(default)
    }

    pub fn inference_timeout(&self) -> Duration {
        Duration::from_secs(self.inference_timeout_secs)
    }

    pub fn summary_length_cap(&self) -> Option<usize> {
        (self.max_summary_length > 0).then_some(self.max_summary_length)
    }
}

fn non_empty(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    const FULL_CONFIG: &str = r#"
        address = "127.0.0.1"
        port = 9000
        otlp_endpoint = "http://collector:4317"
        console_log = true
        tls_cert_path = ""
        tls_key_path = "key.pem"
        model_repo = ""
        model_revision = "main"
        max_concurrent_inferences = 4
        inference_timeout_secs = 30
        max_summary_length = 256
    "#;

    fn write_config(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("medical_model_runner_{name}.toml"));
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn load(path: &Path, flags: &[&str]) -> Result<Config> {
        let mut argv = vec!["medical_qa", "--config-file", path.to_str().unwrap()];
        argv.extend_from_slice(flags);
        Config::load(Args::parse_from(argv))
    }

    #[test]
    fn parses_toml_file() {
        let path = write_config("parse", FULL_CONFIG);

        let config = Config::from_toml(path.to_str().unwrap()).unwrap();
        assert_eq!(config.address, "127.0.0.1");
        assert_eq!(config.port, 9000);
        assert!(config.console_log);
        assert_eq!(config.max_concurrent_inferences, 4);
        assert_eq!(config.inference_timeout(), Duration::from_secs(30));
        assert_eq!(config.summary_length_cap(), Some(256));

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn file_values_survive_without_flags() {
        let path = write_config("load_file", FULL_CONFIG);

        let config = load(&path, &[]).unwrap();
        assert_eq!(config.max_concurrent_inferences, 4);
        assert_eq!(config.inference_timeout_secs, 30);
        assert_eq!(config.max_summary_length, 256);
        assert_eq!(config.model_revision, "main");

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn flags_override_file_values() {
        let path = write_config("load_flags", FULL_CONFIG);

        let config = load(
            &path,
            &["--max-concurrent-inferences", "8", "--model-revision", "v2"],
        )
        .unwrap();
        assert_eq!(config.max_concurrent_inferences, 8);
        assert_eq!(config.model_revision, "v2");
        assert_eq!(config.inference_timeout_secs, 30);

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let path = write_config("load_partial", "max_concurrent_inferences = 6\n");

        let config = load(&path, &[]).unwrap();
        assert_eq!(config.max_concurrent_inferences, 6);
        assert_eq!(config.inference_timeout_secs, 120);
        assert_eq!(config.model_revision, "main");
        assert_eq!(config.summary_length_cap(), None);
        assert!(!config.console_log);

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn malformed_file_is_an_error() {
        let path = write_config("load_malformed", "max_concurrent_inferences = \"many\"\n");

        let err = load(&path, &[]).unwrap_err();
        assert!(err.to_string().starts_with("Failed to read configuration file"));

        std::fs::remove_file(path).unwrap();
    }

    #[test]
    fn empty_strings_disable_optional_features() {
        let config = Config::from_toml_str(FULL_CONFIG).unwrap();

        assert_eq!(config.otlp_endpoint(), Some("http://collector:4317"));
        assert_eq!(config.tls_paths(), None);
        assert_eq!(config.model_repo_or("google-t5/t5-small"), "google-t5/t5-small");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        assert!(load(Path::new("/nonexistent/medical.toml"), &[]).is_err());
    }
}
