//! # ta-submit
//!
//! Field client: logs in, uploads photos one at a time, then files the
//! report that references them.

mod client;
mod error;
mod report;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use crate::client::Client;
use crate::error::SubmitError;
use crate::report::{report_payload, LocalPhoto, ReportArgs};

#[derive(Parser)]
#[command(name = "ta-submit")]
#[command(about = "Submit a trail work report", long_about = None)]
#[command(version)]
struct Cli {
    /// Server origin, e.g. https://trails.example.org
    #[arg(long, env = "TA_SERVER", default_value = "http://127.0.0.1:8080")]
    server: String,
    /// Username or email
    #[arg(long, env = "TA_LOGIN")]
    login: String,
    #[arg(long, env = "TA_PASSWORD", hide_env_values = true)]
    password: String,

    #[command(flatten)]
    report: ReportArgs,

    /// Photo to attach (repeatable, uploaded in order)
    #[arg(long = "photo", value_name = "PATH")]
    photos: Vec<PathBuf>,
    /// Caption for the photo at the same position (repeatable)
    #[arg(long = "caption", value_name = "TEXT")]
    captions: Vec<String>,
}

async fn run(cli: Cli) -> Result<i64, SubmitError> {
    let mut photos = Vec::with_capacity(cli.photos.len());
    for (i, path) in cli.photos.iter().enumerate() {
        let caption = cli.captions.get(i).map(String::as_str).unwrap_or_default();
        let photo = LocalPhoto::load(path, caption).await?;
        if let Some(gps) = photo.gps {
            log::info!("{}: GPS {:.6}, {:.6}", photo.file_name, gps.lat, gps.lng);
        }
        photos.push(photo);
    }

    let mut client = Client::new(&cli.server)?;
    let who = client.login(&cli.login, &cli.password).await?;
    println!("Logged in as {who}");

    let mut uploads = Vec::with_capacity(photos.len());
    for (i, photo) in photos.iter().enumerate() {
        let id = client.upload(photo).await?;
        println!("Uploaded {} ({}/{})", photo.file_name, i + 1, photos.len());
        uploads.push((id, photo));
    }

    client.submit(&report_payload(&cli.report, &uploads)).await
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("warn"));
    let cli = Cli::parse();
    if cli.captions.len() > cli.photos.len() {
        eprintln!("error: more --caption values than --photo values");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(id) => {
            println!("Report #{id} submitted");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}
