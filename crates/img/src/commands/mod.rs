pub mod image;

#[derive(clap::Subcommand)]
pub enum Commands {
    /// Handle IMG archives
    Image {
        #[command(subcommand)]
        command: image::ImageCommands,
    },
}

impl Commands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            Commands::Image { command } => command.handle(),
        }
    }
}
