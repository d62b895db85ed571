//! Lumenray Viewer
//!
//! Path traces a scene of spheres. Real-time mode shows one sample per pixel
//! and follows the camera; progressive mode averages samples while the camera
//! holds still.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p lumenray-viewer -- [OPTIONS]
//! ```
//!
//! ## Controls
//!
//! - `W`/`A`/`S`/`D`: move, `Space`/`Shift`: up/down
//! - `J`/`K`/`H`/`L` or arrow keys: pitch and yaw
//! - `R`: toggle real-time / progressive
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod app;
mod free_look;

use lumenray_app::{run_app, AppConfig};

use crate::app::Viewer;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;

fn main() -> anyhow::Result<()> {
    if std::env::args().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    let vsync = std::env::args().any(|arg| arg == "--vsync");
    run_app::<Viewer>(
        AppConfig::new("Lumenray")
            .with_size(WIDTH, HEIGHT)
            .with_vsync(vsync),
    )
}

fn print_help() {
    eprintln!(
        "Lumenray path tracing viewer

USAGE:
    cargo run -p lumenray-viewer -- [OPTIONS]

RENDER OPTIONS:
    --scene <PATH>          TOML scene description (default: built-in demo)
    --sky <PATH>            Equirectangular sky image (default: procedural gradient)
    --progressive           Start in progressive mode
    --max-samples <N>       Stop accumulating after N samples (default: 0, unbounded)
    --seed <N>              Fixed seed for sample jitter
    --vsync                 Enable vsync

SCREENSHOT OPTIONS:
    -S, --screenshot        Enable screenshot capture mode
    -o, --output <PATTERN>  Output path pattern (use {{}} for frame number)
                            Default: lumenray_{{}}.png
    -f, --frames <FRAMES>   Frame indices to capture
                            Examples: \"0\" \"0,10,20\" \"0-5\" \"0,5-10,20\"
                            Default: 0
    --at-samples <N>        Capture once a still image has N samples
    --exit-after            Exit after capturing all requested images

CONTROLS:
    W/A/S/D                 Move
    Space / Shift           Move up / down
    J/K or Down/Up          Pitch
    H/L or Left/Right       Yaw
    R                       Toggle real-time / progressive

OTHER:
    -h, --help              Print this help message

EXAMPLES:
    # Converge the demo scene and save it
    cargo run -p lumenray-viewer -- --progressive --max-samples 512 --at-samples 512 -o demo_{{}}.png --exit-after

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}
