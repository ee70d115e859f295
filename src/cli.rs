use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Decode: image 0.25 (png, jpeg, webp)\n",
    "Fetch:  ureq 3\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Headless frame streaming player
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Item manifest (JSON) to play
    #[arg(value_name = "MANIFEST")]
    pub manifest: PathBuf,

    /// Start frame (zero-based position)
    #[arg(long = "frame", value_name = "N")]
    pub start_frame: Option<usize>,

    /// Start playback after the first frame is shown
    #[arg(short = 'a', long = "autoplay")]
    pub autoplay: bool,

    /// Run for this many seconds, then stop and exit
    #[arg(short = 's', long = "seconds", value_name = "S", default_value_t = 5.0)]
    pub seconds: f64,

    /// Playback fps override
    #[arg(long = "fps", value_name = "F")]
    pub fps: Option<f32>,

    /// Restrict playback to these origin frames
    #[arg(short = 'g', long = "group", value_name = "A,B,..", value_delimiter = ',')]
    pub group: Option<Vec<i32>>,

    /// Scheduled fetches in flight at once
    #[arg(long = "concurrency", value_name = "N")]
    pub concurrency: Option<usize>,

    /// Enable logging to file (default: framestream.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

impl Args {
    /// `--seconds` as a duration. Infinite runs until interrupted; negative or NaN is zero.
    pub fn run_duration(&self) -> Duration {
        let seconds = if self.seconds.is_nan() { 0.0 } else { self.seconds.max(0.0) };
        Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX)
    }
}
