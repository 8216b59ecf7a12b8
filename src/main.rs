use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;
use log::{info, warn};

use x11_capture::backend::CancelToken;
use x11_capture::capture::{self, SystemClock};
use x11_capture::display::X11Backend;
use x11_capture::settings::{self, CaptureSettings};

const TOOL_NAME: &str = "x11-capture";

#[derive(Parser)]
#[command(name = TOOL_NAME)]
#[command(version)]
#[command(about = "Capture a single X11 window to a PNG file")]
struct Cli {
    /// Connect to this display instead of $DISPLAY
    #[arg(short = 'd', long)]
    display: Option<String>,

    /// Seconds to wait before the pixels are read
    #[arg(long, default_value_t = 0)]
    delay: u64,

    /// Output file
    #[arg(short = 'o', long, default_value = "screenshot.png")]
    output: PathBuf,

    /// Window id, decimal or 0x-prefixed hex; picked by clicking when omitted
    #[arg(short = 'w', long)]
    window: Option<String>,
}

fn run(cli: Cli) -> Result<(), capture::Error> {
    let window = cli.window.as_deref().map(settings::parse_window_id).transpose()?;
    let settings = CaptureSettings {
        display: cli.display,
        delay: Duration::from_secs(cli.delay),
        output: cli.output,
        window,
    };

    let mut backend = X11Backend::connect(settings.display.as_deref())?;

    let target = match settings.window {
        Some(id) => id,
        None => {
            let cancel = CancelToken::new();
            let handler_token = cancel.clone();
            if let Err(err) = ctrlc::set_handler(move || handler_token.cancel()) {
                warn!("Ctrl-C will not cancel the selection: {err}");
            }
            println!("Click on the window to capture (any other button aborts)...");
            let handle = capture::pick_window(&mut backend, &cancel)?;
            info!("selected window {handle}");
            handle.id
        }
    };

    capture::capture_window(&backend, &SystemClock, &settings, target)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        // `run` has returned, so the grab, the connection, and any partial
        // output are already torn down.
        eprintln!("{TOOL_NAME}: Error: {err}");
        process::exit(1);
    }
}
