use clap::{Args, ValueEnum};
use img_archive::{Element, ElementKind, Image, ImageEntry, Package, Resource};
use itertools::Itertools;
use miette::{miette, Context, IntoDiagnostic, Result};
use owo_colors::OwoColorize;
use similar::{ChangeTag, TextDiff};
use std::{collections::HashSet, fmt::Display, path::PathBuf};
use tracing::info;

use super::slot_name;

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
enum Mode {
    /// Report changed values with a few lines of context
    #[default]
    Semantic,
    /// Also compare storage details and show whole payloads
    Full,
}

#[derive(Debug, Eq, PartialEq)]
enum Change {
    Added(String),
    Removed(String),
    Comparison(String, String, String),
    Lines(Vec<String>),
    Modified(String, Vec<Change>),
}

impl Change {
    fn comparison(key: &str, old: impl Display, new: impl Display) -> Change {
        Change::Comparison(key.into(), old.to_string(), new.to_string())
    }

    /// Wrap `children` under `name`, or nothing when there are none
    fn modified(name: impl Into<String>, children: Vec<Change>) -> Option<Change> {
        (!children.is_empty()).then(|| Change::Modified(name.into(), children))
    }

    fn write(&self, f: &mut std::fmt::Formatter<'_>, depth: usize) -> std::fmt::Result {
        let indent = "  ".repeat(depth);
        match self {
            Change::Added(v) => writeln!(f, "{indent}✅ {}", v.green()),
            Change::Removed(v) => writeln!(f, "{indent}❌ {}", v.red()),
            Change::Comparison(key, old, new) => {
                writeln!(f, "{indent}* {}: {} vs {}", key, old.red(), new.green())
            }
            Change::Lines(lines) => writeln!(
                f,
                "{}",
                lines.iter().map(|l| format!("{indent}{l}")).join("\n")
            ),
            Change::Modified(name, children) => {
                writeln!(f, "{indent}🔃 {}", name.blue())?;
                children.iter().try_for_each(|c| c.write(f, depth + 1))
            }
        }
    }
}

impl Display for Change {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.write(f, 0)
    }
}

/// Comparable form of an element's content
enum Rendered {
    Text(String),
    Bytes(Vec<u8>),
}

fn render(element: &Element) -> Result<Rendered> {
    Ok(match element.kind() {
        ElementKind::Seri => {
            let value = element
                .value()
                .ok_or(miette!("{} holds no record", element.name()))?;
            Rendered::Text(serde_yaml::to_string(value).into_diagnostic()?)
        }
        ElementKind::Text => Rendered::Text(element.text()?),
        ElementKind::Empty => Rendered::Bytes(Vec::new()),
        _ => Rendered::Bytes(element.read()?),
    })
}

#[derive(Args)]
pub struct DiffArgs {
    /// The original IMG file
    #[arg(short, long, value_name = "FILE")]
    old: PathBuf,

    /// The changed IMG file
    #[arg(short, long, value_name = "FILE")]
    new: PathBuf,

    /// Comparison mode
    #[arg(short, long, value_enum, default_value_t = Mode::Semantic)]
    mode: Mode,
}

impl DiffArgs {
    fn lines(&self, old: &str, new: &str) -> Vec<String> {
        let diff = TextDiff::from_lines(old, new);
        let groups = match self.mode {
            Mode::Semantic => diff.grouped_ops(2),
            Mode::Full => vec![diff.ops().to_vec()],
        };

        let mut lines = Vec::new();
        for (i, group) in groups.iter().enumerate() {
            if i > 0 {
                lines.push(format!("{}", "...".dimmed()));
            }
            for op in group {
                for change in diff.iter_inline_changes(op) {
                    let mut line = match change.tag() {
                        ChangeTag::Delete => format!("{}", "-".red()),
                        ChangeTag::Insert => format!("{}", "+".green()),
                        ChangeTag::Equal => " ".to_string(),
                    };
                    for (emphasized, value) in change.iter_strings_lossy() {
                        let value = value.trim_end_matches('\n');
                        let styled = match (change.tag(), emphasized) {
                            (ChangeTag::Insert, true) => format!("{}", value.green().underline()),
                            (ChangeTag::Insert, false) => format!("{}", value.green()),
                            (ChangeTag::Delete, true) => format!("{}", value.red().underline()),
                            (ChangeTag::Delete, false) => format!("{}", value.red()),
                            (ChangeTag::Equal, _) => format!("{}", value.dimmed()),
                        };
                        line.push_str(&styled);
                    }
                    lines.push(line);
                }
            }
        }
        lines
    }

    fn handle_element(&self, old: &Element, new: &Element) -> Result<Option<Change>> {
        let mut children = Vec::new();

        if old.tag() != new.tag() {
            children.push(Change::comparison("tag", old.tag(), new.tag()));
        }
        if old.flags() != new.flags() {
            children.push(Change::comparison(
                "flags",
                format!("{:#x}", old.flags()),
                format!("{:#x}", new.flags()),
            ));
        }
        if self.mode == Mode::Full && old.is_compressed() != new.is_compressed() {
            children.push(Change::comparison(
                "compressed",
                old.is_compressed(),
                new.is_compressed(),
            ));
        }

        match (
            render(old).context(format!("reading {}", old.name()))?,
            render(new).context(format!("reading {}", new.name()))?,
        ) {
            (Rendered::Text(o), Rendered::Text(n)) if o != n => {
                children.push(Change::Lines(self.lines(&o, &n)));
            }
            (Rendered::Bytes(o), Rendered::Bytes(n)) if o != n => {
                children.push(Change::comparison(
                    "content",
                    format!("{} bytes", o.len()),
                    format!("{} bytes", n.len()),
                ));
            }
            _ => {}
        }

        Ok(Change::modified(old.name(), children))
    }

    fn handle_package(&self, name: &str, old: &Package, new: &Package) -> Result<Option<Change>> {
        let mut children = Vec::new();

        if old.typ0() != new.typ0() {
            children.push(Change::comparison("variant", old.typ0(), new.typ0()));
        }
        if self.mode == Mode::Full {
            if old.unknown_flag() != new.unknown_flag() {
                children.push(Change::comparison(
                    "flag",
                    old.unknown_flag(),
                    new.unknown_flag(),
                ));
            }
            if old.decompressed_length() != new.decompressed_length() {
                children.push(Change::comparison(
                    "decompressed length",
                    old.decompressed_length(),
                    new.decompressed_length(),
                ));
            }
        }

        let old_names = old.elements().iter().map(Element::name).collect::<HashSet<_>>();
        let new_names = new.elements().iter().map(Element::name).collect::<HashSet<_>>();

        new.elements()
            .iter()
            .map(Element::name)
            .filter(|n| !old_names.contains(n))
            .map(|n| Change::Added(n.to_string()))
            .for_each(|c| children.push(c));

        old.elements()
            .iter()
            .map(Element::name)
            .filter(|n| !new_names.contains(n))
            .map(|n| Change::Removed(n.to_string()))
            .for_each(|c| children.push(c));

        for element in old.elements() {
            if !new_names.contains(element.name()) {
                continue;
            }
            if let Some(c) = self.handle_element(element, new.by_name(element.name())?)? {
                children.push(c);
            }
        }

        Ok(Change::modified(name, children))
    }

    fn handle_resource(&self, name: &str, old: &Resource, new: &Resource) -> Result<Option<Change>> {
        let mut children = Vec::new();

        if old.tag() != new.tag() {
            children.push(Change::comparison("tag", old.tag(), new.tag()));
        }
        if old.read()? != new.read()? {
            children.push(Change::comparison(
                "content",
                format!("{} bytes", old.len()),
                format!("{} bytes", new.len()),
            ));
        }

        Ok(Change::modified(name, children))
    }

    fn handle_image(&self, old: &Image, new: &Image) -> Result<Vec<Change>> {
        let mut result = Vec::new();

        if old.len() != new.len() {
            result.push(Change::comparison("slots", old.len(), new.len()));
        }

        for i in 0..old.len().max(new.len()) {
            let name = slot_name(i);
            let change = match (old.entry(i), new.entry(i)) {
                (None, None) => None,
                (None, Some(e)) => Some(Change::Added(format!("{name} [{}]", e.tag()))),
                (Some(e), None) => Some(Change::Removed(format!("{name} [{}]", e.tag()))),
                (Some(ImageEntry::Package(o)), Some(ImageEntry::Package(n))) => {
                    self.handle_package(&name, o, n)?
                }
                (Some(ImageEntry::Resource(o)), Some(ImageEntry::Resource(n))) => {
                    self.handle_resource(&name, o, n)?
                }
                (Some(o), Some(n)) => Change::modified(
                    name,
                    vec![Change::comparison("tag", o.tag(), n.tag())],
                ),
            };
            result.extend(change);
        }

        Ok(result)
    }

    pub fn handle(&self) -> Result<()> {
        let old = Image::open(&self.old).context(format!("path: {}", &self.old.display()))?;
        let new = Image::open(&self.new).context(format!("path: {}", &self.new.display()))?;

        let changes = self.handle_image(&old, &new)?;
        if changes.is_empty() {
            info!("no differences");
        }
        for change in changes {
            print!("{}", change);
        }

        Ok(())
    }
}
