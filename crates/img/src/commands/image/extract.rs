use clap::Args;
use img_archive::{ElementKind, Image, ImageEntry};
use miette::{miette, Context, IntoDiagnostic, Result};
use std::{
    fs::File,
    io::Write,
    path::{Path, PathBuf},
};
use tracing::info;

use super::{element_file, slot_name};

#[derive(Args)]
pub struct ExtractArgs {
    /// An input IMG file
    #[arg(short, long, value_name = "FILE")]
    file: PathBuf,

    /// A target directory
    #[arg(short, long, value_name = "DIR")]
    directory: PathBuf,

    /// Allow overwriting the target
    #[arg(long, default_value_t = false)]
    overwrite: bool,
}

impl ExtractArgs {
    pub fn handle(&self) -> Result<()> {
        let image = Image::open(&self.file).context(format!("path: {}", &self.file.display()))?;

        for (i, entry) in image.entries().iter().enumerate() {
            match entry {
                None => continue,
                Some(ImageEntry::Resource(resource)) => {
                    let p = self.directory.join(format!("{}.bin", slot_name(i)));
                    self.write(&p, &resource.read()?)?;
                }
                Some(ImageEntry::Package(package)) => {
                    for element in package.elements() {
                        let Some(file_name) = element_file(element) else {
                            continue;
                        };
                        let p = self.directory.join(slot_name(i)).join(file_name);

                        let contents = match element.kind() {
                            ElementKind::Seri => {
                                let value = element
                                    .value()
                                    .ok_or(miette!("{} holds no record", element.name()))?;
                                serde_yaml::to_string(value).into_diagnostic()?.into_bytes()
                            }
                            ElementKind::Text => element
                                .text()
                                .context(format!("decoding {}", element.name()))?
                                .into_bytes(),
                            _ => element.read()?,
                        };
                        self.write(&p, &contents)?;
                    }
                }
            }
        }

        Ok(())
    }

    fn write(&self, p: &Path, contents: &[u8]) -> Result<()> {
        info!("writing {}", p.display());

        if let Some(parent) = p.parent() {
            std::fs::create_dir_all(parent)
                .into_diagnostic()
                .context(format!("creating {}", parent.display()))?;
        }

        let mut out = if !self.overwrite {
            File::create_new(p)
                .into_diagnostic()
                .context(format!("creating {}", p.display()))?
        } else {
            File::create(p)
                .into_diagnostic()
                .context(format!("creating {}", p.display()))?
        };

        out.write_all(contents).into_diagnostic()
    }
}
