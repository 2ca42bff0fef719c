use clap::{Args, Parser, Subcommand};
use log::info;
use presigned_put::{download, init, presign, uninit, upload};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{process::ExitCode, sync::Arc};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
    /// write logs to this directory instead of stderr
    #[arg(long, default_value_t = String::new(), global = true)]
    log_path: String,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// PUT a local file to a presigned url
    Upload(TransferArgs),
    /// GET a presigned url into a local file
    Download(TransferArgs),
    /// print a presigned url for bucket/object
    Presign(PresignArgs),
}

#[derive(Args, Debug, Serialize, Deserialize)]
struct TransferArgs {
    #[arg(long)]
    url: String,
    #[arg(long)]
    file_path: String,
    /// accept plain http urls
    #[arg(long)]
    allow_http: bool,
    #[arg(long)]
    connect_timeout_secs: Option<u64>,
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[derive(Args, Debug, Serialize, Deserialize)]
struct PresignArgs {
    /// bucket/object
    target: String,
    #[arg(long)]
    endpoint: String,
    #[arg(long)]
    region: Option<String>,
    #[arg(long, env = "S3_ACCESS_KEY_ID")]
    access_key_id: String,
    #[arg(long, env = "S3_SECRET_ACCESS_KEY", hide_env_values = true)]
    secret_access_key: String,
    #[arg(long)]
    session_token: Option<String>,
    /// e.g. 15m, 1h, 24h
    #[arg(long, default_value = "1h")]
    expiry: String,
    /// GET for download, PUT for upload
    #[arg(long, default_value = "GET")]
    method: String,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    if let Err(err) = init(&json!({ "log_path": cli.log_path }).to_string()) {
        eprintln!("{}", err);
        return ExitCode::FAILURE;
    }
    let code = run(cli.command);
    uninit();
    code
}

fn run(command: Command) -> ExitCode {
    let outcome = match command {
        Command::Upload(args) => {
            let progress_callback = |progress: f64| {
                info!("put object progress: {:.2}%", progress);
            };
            serde_json::to_string(&args)
                .map_err(Into::into)
                .and_then(|params| upload(&params, Some(Arc::new(progress_callback))))
                .map(|result| {
                    println!("{}", result.status().as_u16());
                    result.is_success()
                })
        }
        Command::Download(args) => serde_json::to_string(&args)
            .map_err(Into::into)
            .and_then(|params| download(&params))
            .map(|result| {
                println!("{}", result.status().as_u16());
                result.is_success()
            }),
        Command::Presign(args) => serde_json::to_string(&args)
            .map_err(Into::into)
            .and_then(|params| presign(&params))
            .map(|url| {
                println!("{}", url.as_str());
                true
            }),
    };
    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("{}", err);
            ExitCode::FAILURE
        }
    }
}
