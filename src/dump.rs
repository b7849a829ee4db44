//! Tag dump: one line per accepted item, written once at the end of a run.
//!
//! Line format: `<prefix><id>: (<subfolder>) <tag> <tag> ...`

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::info;

use crate::queue::{ItemId, ItemRecord};

/// Collected dump lines, kept sorted by id.
#[derive(Debug, Default, Clone)]
pub struct TagDump {
    prefix: String,
    entries: Vec<(ItemId, String)>,
}

impl TagDump {
    /// Creates an empty dump using `prefix` before each id.
    #[must_use]
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            entries: Vec::new(),
        }
    }

    /// Appends an item if it passed classification (has a filename).
    pub fn append(&mut self, item: &ItemRecord) {
        if item.filename.is_none() {
            return;
        }
        let line = format!(
            "{}: ({}) {}",
            item.label(&self.prefix),
            item.subfolder,
            item.tags.join(" ")
        );
        let at = self.entries.partition_point(|(id, _)| *id < item.id);
        self.entries.insert(at, (item.id, line.trim_end().to_string()));
    }

    /// Appends every item in `items`.
    pub fn extend<'a>(&mut self, items: impl IntoIterator<Item = &'a ItemRecord>) {
        for item in items {
            self.append(item);
        }
    }

    /// Number of lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing was appended.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Writes all lines to `out`.
    ///
    /// # Errors
    ///
    /// Propagates write errors.
    pub fn write_to<W: Write>(&self, out: &mut W) -> io::Result<()> {
        for (_, line) in &self.entries {
            writeln!(out, "{line}")?;
        }
        out.flush()
    }

    /// Default file name: `<prefix>!tags_<first>-<last>.txt`.
    #[must_use]
    pub fn file_name(&self) -> Option<String> {
        let first = self.entries.first()?.0;
        let last = self.entries.last()?.0;
        Some(format!("{}!tags_{first}-{last}.txt", self.prefix))
    }

    /// Writes the dump into `dir`, returning the file path.
    ///
    /// Does nothing for an empty dump.
    ///
    /// # Errors
    ///
    /// Propagates file creation and write errors.
    pub fn save(&self, dir: &Path) -> io::Result<Option<PathBuf>> {
        let Some(name) = self.file_name() else {
            return Ok(None);
        };
        std::fs::create_dir_all(dir)?;
        let path = dir.join(name);
        let mut file = io::BufWriter::new(std::fs::File::create(&path)?);
        self.write_to(&mut file)?;
        info!(path = %path.display(), lines = self.len(), "tags saved");
        Ok(Some(path))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn item(id: ItemId, subfolder: &str, tags: &[&str]) -> ItemRecord {
        let mut item = ItemRecord::new(id, "360p");
        item.subfolder = subfolder.to_string();
        item.set_tags(tags.iter().map(ToString::to_string));
        item.filename = Some(format!("id_{id}.mp4"));
        item
    }

    #[test]
    fn test_lines_sorted_by_id() {
        let mut dump = TagDump::new("id_");
        dump.append(&item(9, "a", &["z", "b"]));
        dump.append(&item(3, "", &["x"]));

        let mut out = Vec::new();
        dump.write_to(&mut out).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "id_3: () x\nid_9: (a) b z\n"
        );
        assert_eq!(dump.file_name().as_deref(), Some("id_!tags_3-9.txt"));
    }

    #[test]
    fn test_unclassified_items_skipped() {
        let mut dump = TagDump::new("id_");
        dump.append(&ItemRecord::new(1, "360p"));
        assert!(dump.is_empty());
        assert!(dump.file_name().is_none());
    }

    #[test]
    fn test_save_writes_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut dump = TagDump::new("id_");
        dump.extend([&item(1, "", &["t"])]);
        let path = dump.save(dir.path()).unwrap().unwrap();
        assert_eq!(std::fs::read_to_string(path).unwrap(), "id_1: () t\n");
    }
}
