use img_archive::{Element, ElementKind};

pub mod diff;
pub mod extract;
pub mod list;
pub mod repack;

#[derive(clap::Subcommand)]
pub enum ImageCommands {
    /// Compare two IMG archives
    Diff(diff::DiffArgs),
    /// Extract every element of an IMG archive into a directory
    Extract(extract::ExtractArgs),
    /// List the slots of an IMG archive
    List(list::ListArgs),
    /// Write an IMG archive, taking edited elements from a directory
    Repack(repack::RepackArgs),
}

impl ImageCommands {
    pub fn handle(&self) -> miette::Result<()> {
        match self {
            ImageCommands::Diff(diff) => diff.handle(),
            ImageCommands::Extract(extract) => extract.handle(),
            ImageCommands::List(list) => list.handle(),
            ImageCommands::Repack(repack) => repack.handle(),
        }
    }
}

/// Directory (or file stem for resources) used for a slot
pub(crate) fn slot_name(index: usize) -> String {
    format!("{index:04}")
}

/// How an element is laid out on disk once extracted
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum Format {
    Yaml,
    Text,
    Binary,
}

impl Format {
    pub(crate) fn for_kind(kind: ElementKind) -> Option<Format> {
        match kind {
            ElementKind::Empty => None,
            ElementKind::Seri => Some(Format::Yaml),
            ElementKind::Text => Some(Format::Text),
            _ => Some(Format::Binary),
        }
    }

    pub(crate) fn extension(&self) -> &'static str {
        match self {
            Format::Yaml => "yaml",
            Format::Text => "txt",
            Format::Binary => "bin",
        }
    }

    /// Split an extracted file name back into the element name and its format
    pub(crate) fn split(file_name: &str) -> Option<(&str, Format)> {
        [Format::Yaml, Format::Text, Format::Binary]
            .into_iter()
            .find_map(|f| {
                file_name
                    .strip_suffix(f.extension())
                    .and_then(|s| s.strip_suffix('.'))
                    .map(|name| (name, f))
            })
    }
}

/// File name an element is extracted to, `None` for elements without content
pub(crate) fn element_file(element: &Element) -> Option<String> {
    Format::for_kind(element.kind()).map(|f| format!("{}.{}", element.name(), f.extension()))
}

#[cfg(test)]
mod test {
    use super::Format;

    #[test]
    fn split_file_names() {
        assert_eq!(Format::split("config.yaml"), Some(("config", Format::Yaml)));
        assert_eq!(Format::split("a.b.txt"), Some(("a.b", Format::Text)));
        assert_eq!(Format::split("mesh.bin"), Some(("mesh", Format::Binary)));
        assert_eq!(Format::split("notes.md"), None);
        assert_eq!(Format::split("bin"), None);
    }
}
