pub mod app;
pub mod renderer;

use color_eyre::Result;
use app::App;
use app::args::{AppArgs, USAGE};

fn main() -> Result<()> {
    color_eyre::install()?;
    env_logger::init();

    let Some(args) = AppArgs::from_env()? else {
        println!("{}", USAGE);
        return Ok(());
    };

    let app = App::new(args)?;
    app.run()?;

    Ok(())
}
