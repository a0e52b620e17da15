use clap::Args;
use img_archive::{Image, ImageEntry, Tag};
use miette::{Context, Result};
use owo_colors::OwoColorize;
use std::path::PathBuf;

use super::slot_name;

#[derive(Args)]
pub struct ListArgs {
    /// An input IMG file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,
}

impl ListArgs {
    pub fn handle(&self) -> Result<()> {
        let image = Image::open(&self.file).context(format!("path: {}", &self.file.display()))?;

        for (i, entry) in image.entries().iter().enumerate() {
            match entry {
                None => println!("{} {}", slot_name(i), "vacant".dimmed()),
                Some(ImageEntry::Resource(resource)) => {
                    println!(
                        "{} [{}] {} bytes",
                        slot_name(i),
                        resource.tag(),
                        resource.len()
                    )
                }
                Some(ImageEntry::Package(package)) => {
                    println!(
                        "{} [{}] {} elements, {} bytes",
                        slot_name(i),
                        Tag::PACKAGE,
                        package.len(),
                        package.decompressed_length()
                    );
                    for element in package.elements() {
                        let compressed = if element.is_compressed() { " zlib" } else { "" };
                        println!(
                            "    [{}] {}{}",
                            element.tag(),
                            element.name().bold(),
                            compressed.dimmed()
                        );
                    }
                }
            }
        }

        Ok(())
    }
}
