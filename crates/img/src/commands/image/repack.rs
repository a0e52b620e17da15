use clap::Args;
use img_archive::{Image, ImageEntry, Object};
use miette::{miette, Context, IntoDiagnostic, Result};
use std::path::{Component, Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

use super::Format;

#[derive(Args)]
pub struct RepackArgs {
    /// An input IMG file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A target IMG file
    #[arg(short, long, value_name = "FILE")]
    output: PathBuf,

    /// A directory of extracted, possibly edited, elements
    #[arg(short, long, value_name = "DIR")]
    directory: Option<PathBuf>,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl RepackArgs {
    pub fn handle(&self) -> Result<()> {
        if !self.overwrite && self.output.exists() {
            return Err(miette!("{} already exists", self.output.display()));
        }

        let mut image = Image::open(&self.file).context(format!("path: {}", &self.file.display()))?;

        if let Some(directory) = &self.directory {
            let files = WalkDir::new(directory)
                .into_iter()
                .filter_map(|e| e.ok())
                .filter(|e| !e.file_type().is_dir())
                .collect::<Vec<_>>();

            let mut updated = 0;
            for file in files {
                let name = file.path().strip_prefix(directory).into_diagnostic()?;
                if self
                    .ingest(&mut image, name, file.path())
                    .context(format!("ingesting {}", name.display()))?
                {
                    info!("updated {}", name.display());
                    updated += 1;
                }
            }
            info!("{updated} entries updated");
        }

        let written = image
            .save(&self.output)
            .context(format!("writing {}", &self.output.display()))?;
        info!("wrote {} bytes to {}", written, self.output.display());

        Ok(())
    }

    /// Replace the entry `name` refers to with the contents of `path`, if they differ
    fn ingest(&self, image: &mut Image, name: &Path, path: &Path) -> Result<bool> {
        let parts = name
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part),
                _ => None,
            })
            .map(|part| {
                part.to_str()
                    .ok_or(miette!("unable to convert {} to a string", name.display()))
            })
            .collect::<Result<Vec<_>>>()?;

        match parts.as_slice() {
            [file] => {
                let Some(slot) = file
                    .strip_suffix(".bin")
                    .and_then(|s| s.parse::<usize>().ok())
                else {
                    warn!("skipping {}", name.display());
                    return Ok(false);
                };
                let Some(ImageEntry::Resource(resource)) = image.entry_mut(slot) else {
                    warn!("slot {slot} does not hold a resource");
                    return Ok(false);
                };

                let data = std::fs::read(path).into_diagnostic()?;
                if resource.read()? == data {
                    return Ok(false);
                }
                resource.set_bytes(data);
                Ok(true)
            }
            [slot, rest @ ..] if !rest.is_empty() => {
                let Ok(slot) = slot.parse::<usize>() else {
                    warn!("skipping {}", name.display());
                    return Ok(false);
                };
                let Some(ImageEntry::Package(package)) = image.entry_mut(slot) else {
                    warn!("slot {slot} does not hold a package");
                    return Ok(false);
                };

                let file_name = rest.join("/");
                let Some((element_name, format)) = Format::split(&file_name) else {
                    warn!("skipping {}", name.display());
                    return Ok(false);
                };
                let Ok(element) = package.by_name_mut(element_name) else {
                    warn!("slot {slot} has no element {element_name}");
                    return Ok(false);
                };

                match format {
                    Format::Yaml => {
                        let text = std::fs::read_to_string(path).into_diagnostic()?;
                        let value: Object = serde_yaml::from_str(&text).into_diagnostic()?;
                        if element.value() == Some(&value) {
                            return Ok(false);
                        }
                        element.set_value(value);
                    }
                    Format::Text => {
                        let text = std::fs::read_to_string(path).into_diagnostic()?;
                        if element.text()? == text {
                            return Ok(false);
                        }
                        element.set_text(&text)?;
                    }
                    Format::Binary => {
                        let data = std::fs::read(path).into_diagnostic()?;
                        if element.read()? == data {
                            return Ok(false);
                        }
                        element.set_bytes(data);
                    }
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
