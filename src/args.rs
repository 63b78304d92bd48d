use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Configuration file (built-in defaults are used when it does not exist)
    #[arg(short, long, default_value = "config/default.toml")]
    pub config: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print live channel values (default)
    Monitor,

    /// Run the guided calibration and store the result
    Calibrate,

    /// Learn axis ranges from live movement and merge them into the calibration
    Track {
        /// Tracking duration in seconds
        #[arg(short, long, default_value_t = 10)]
        seconds: u64,
    },

    /// List HID interfaces of the configured vendor
    List {
        /// Show every HID interface regardless of vendor
        #[arg(long)]
        all: bool,
    },
}

impl Args {
    /// Subcommand to run, defaulting to `monitor`.
    pub fn command(&self) -> Command {
        self.command.clone().unwrap_or(Command::Monitor)
    }
}
