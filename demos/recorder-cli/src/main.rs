mod commands;
mod console;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use media_capture_ffmpeg::InputFormat;

/// Record from a camera with ffmpeg, optionally converting to MP4 and uploading.
#[derive(Debug, Parser)]
#[command(name = "recorder-cli", version, about)]
struct Cli {
    /// ffmpeg executable.
    #[arg(long, env = "MEDIA_CAPTURE_FFMPEG", default_value = "ffmpeg", global = true)]
    ffmpeg: PathBuf,

    /// Capture input family (defaults to the platform's).
    #[arg(long, value_enum, global = true)]
    input: Option<InputArg>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List cameras and microphones.
    Devices {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Record a clip and save it.
    Record(commands::RecordArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum InputArg {
    V4l2,
    Avfoundation,
    Dshow,
}

impl From<InputArg> for InputFormat {
    fn from(arg: InputArg) -> Self {
        match arg {
            InputArg::V4l2 => InputFormat::V4l2,
            InputArg::Avfoundation => InputFormat::AvFoundation,
            InputArg::Dshow => InputFormat::Dshow,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    let input = cli.input.map(InputFormat::from).unwrap_or_default();

    match cli.command {
        Command::Devices { json } => commands::list_devices(&cli.ffmpeg, input, json).await,
        Command::Record(args) => commands::record(&cli.ffmpeg, input, args).await,
    }
}
