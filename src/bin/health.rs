use std::env;
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use reqwest::Url;
use serde::Deserialize;

#[derive(Deserialize)]
struct HealthResponse {
    status: String,
}

fn check(url: &str) -> Result<()> {
    let url = Url::parse(url).context("Invalid URL")?;

    let response = reqwest::blocking::get(url)?;
    if !response.status().is_success() {
        bail!("Request failed with status {}", response.status())
    }
    let body: HealthResponse = serde_json::from_str(&response.text()?)?;
    if body.status != "healthy" {
        bail!("Service reported status {}", body.status)
    }
    Ok(())
}

fn main() -> ExitCode {
    let Some(url) = env::args().nth(1) else {
        eprintln!("Missing URL argument");
        return ExitCode::FAILURE;
    };

    match check(&url) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{err:#}");
            ExitCode::FAILURE
        }
    }
}
