use std::path::PathBuf;
use color_eyre::eyre::eyre;
use color_eyre::Result;

pub const USAGE: &str = "\
Usage: objview <model.obj> [--width W] [--height H] [--frames N]

  --width W    window width in pixels (default 1024)
  --height H   window height in pixels (default 768)
  --frames N   exit after N frames (default: run until closed)";

#[derive(Debug, Clone, PartialEq)]
pub struct AppArgs {
    pub model: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frames: Option<u64>,
}

impl AppArgs {
    const DEFAULT_WIDTH: u32 = 1024;
    const DEFAULT_HEIGHT: u32 = 768;

    /// `None` when help was requested
    pub fn from_env() -> Result<Option<Self>> {
        Self::parse(pico_args::Arguments::from_env())
    }

    fn parse(mut args: pico_args::Arguments) -> Result<Option<Self>> {
        if args.contains(["-h", "--help"]) {
            return Ok(None);
        }

        let width = args.opt_value_from_str("--width")?.unwrap_or(Self::DEFAULT_WIDTH);
        let height = args.opt_value_from_str("--height")?.unwrap_or(Self::DEFAULT_HEIGHT);
        let frames = args.opt_value_from_str("--frames")?;
        if width == 0 || height == 0 {
            return Err(eyre!("window size must be non-zero, got {}x{}", width, height));
        }

        let model: PathBuf = args
            .opt_free_from_str()?
            .ok_or_else(|| eyre!("missing model path\n\n{}", USAGE))?;

        let rest = args.finish();
        if !rest.is_empty() {
            return Err(eyre!("unexpected arguments: {:?}", rest));
        }

        Ok(Some(Self {
            model,
            width,
            height,
            frames,
        }))
    }
}
