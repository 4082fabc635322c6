pub mod camera;
mod console;
pub mod events;
pub mod preview;
pub mod scanner;
pub mod session;
pub mod settings;
mod utils;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};

use camera::{Camera, StillImageCamera};
use preview::Viewport;
use scanner::RqrrDecoder;
use session::commands::{dispatch, CommandReply, SessionCommand};
use session::SessionController;
use settings::{ScannerSettings, SettingsStore};

#[derive(Debug, Parser)]
#[command(
    name = "qrscan",
    version,
    about = "Scan QR codes from a camera into a de-duplicated history"
)]
pub struct Cli {
    /// Image files or directories played back as the camera feed.
    #[arg(long = "images", value_name = "PATH", num_args = 1..)]
    pub images: Vec<PathBuf>,

    /// Native camera index (needs the `native-camera` feature).
    #[arg(long, value_name = "N")]
    pub device: Option<u32>,

    /// JSON settings file.
    #[arg(long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Screen size used to fit the preview box, e.g. 390x844.
    #[arg(long, value_name = "WxH", value_parser = parse_viewport)]
    pub viewport: Option<Viewport>,

    /// Save the annotated frame of every read as PNG into this directory.
    #[arg(long, value_name = "DIR")]
    pub snapshot_dir: Option<PathBuf>,

    /// Print events as JSON lines.
    #[arg(long)]
    pub json: bool,

    /// Start with the camera off.
    #[arg(long)]
    pub saving_mode: bool,

    /// Write the effective settings to --config and exit.
    #[arg(long, requires = "config")]
    pub write_config: bool,
}

fn parse_viewport(value: &str) -> Result<Viewport, String> {
    let (width, height) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got {value:?}"))?;
    let width = width.trim().parse().map_err(|_| format!("bad width in {value:?}"))?;
    let height = height.trim().parse().map_err(|_| format!("bad height in {value:?}"))?;
    Ok(Viewport { width, height })
}

fn build_camera(cli: &Cli, settings: &ScannerSettings) -> Result<Arc<dyn Camera>> {
    if !cli.images.is_empty() {
        return Ok(Arc::new(StillImageCamera::new(
            cli.images.clone(),
            settings.still_frame_interval(),
        )));
    }

    #[cfg(feature = "native-camera")]
    {
        let index = cli.device.unwrap_or(settings.device_index);
        Ok(Arc::new(camera::NativeCamera::new(index)))
    }

    #[cfg(not(feature = "native-camera"))]
    {
        if cli.device.is_some() {
            log::warn!("--device ignored: built without the `native-camera` feature");
        }
        Err(anyhow::anyhow!(
            "no camera backend available: pass --images or build with --features native-camera"
        ))
    }
}

pub async fn run() -> Result<()> {
    // Initialize logging (reads RUST_LOG env var); stdout is reserved for the session itself.
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    log::info!("qrscan starting up...");

    let store = SettingsStore::new(cli.config.clone())?;
    if cli.write_config {
        store.persist()?;
        log::info!("Settings written");
        return Ok(());
    }
    let settings = store.scanner();

    let camera = build_camera(&cli, &settings)?;
    let decoder = Arc::new(RqrrDecoder::new(settings.inversion));
    let controller = SessionController::new(&settings, camera, decoder, cli.viewport)?;

    let printer = tokio::spawn(console::print_events(controller.subscribe(), cli.json));
    let snapshots = cli
        .snapshot_dir
        .clone()
        .map(|dir| tokio::spawn(console::write_snapshots(controller.subscribe_detections(), dir)));

    if cli.saving_mode {
        controller.toggle_saving_mode().await?;
    }

    let outcome = match controller.start().await {
        Ok(()) => {
            console::print_view(&controller.view().await, cli.json);
            command_loop(&controller, cli.json).await
        }
        Err(err) => Err(err.context("camera unavailable for this session")),
    };

    controller.shutdown().await?;
    printer.abort();
    if let Some(snapshots) = snapshots {
        snapshots.abort();
    }
    outcome
}

async fn command_loop(controller: &SessionController, json: bool) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    break;
                };
                let command = match line.parse::<SessionCommand>() {
                    Ok(command) => command,
                    Err(message) => {
                        eprintln!("{message}");
                        continue;
                    }
                };
                match dispatch(controller, command).await {
                    Ok(CommandReply::Quit) => break,
                    Ok(CommandReply::View(view)) => console::print_view(&view, json),
                    Ok(CommandReply::Done) => {}
                    Err(message) => eprintln!("{message}"),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn viewport_argument_parses() {
        assert_eq!(
            parse_viewport("390x844").unwrap(),
            Viewport {
                width: 390,
                height: 844
            }
        );
        assert!(parse_viewport("390").is_err());
        assert!(parse_viewport("wide x 10").is_err());
    }

    #[test]
    fn cli_accepts_multiple_image_paths() {
        let cli = Cli::try_parse_from(["qrscan", "--images", "a.png", "dir", "--json"]).unwrap();
        assert_eq!(cli.images.len(), 2);
        assert!(cli.json);
        assert!(Cli::try_parse_from(["qrscan", "--write-config"]).is_err());
    }
}
