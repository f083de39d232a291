use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use subdec::structs::item::{ItemPayload, SubtitleItem};
use subdec::structs::params::SubtitleType;

use crate::bmp;

pub const INDEX_FILE_NAME: &str = "index.yaml";

/// `<stem>_subs` next to the input, or the requested directory.
pub fn output_dir(input: &Path, requested: Option<&Path>) -> PathBuf {
    if let Some(dir) = requested {
        return dir.to_path_buf();
    }
    match input.file_stem() {
        Some(stem) if input.as_os_str() != "-" => {
            input.with_file_name(format!("{}_subs", stem.to_string_lossy()))
        }
        _ => PathBuf::from("subdecd_subs"),
    }
}

#[derive(Debug, Serialize)]
pub struct ItemIndex {
    pub input: String,
    pub subtitle_type: String,
    pub items: Vec<IndexEntry>,
}

#[derive(Debug, Serialize)]
pub struct IndexEntry {
    pub index: usize,
    pub pts: String,
    pub pts_ticks: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end: Option<String>,
    #[serde(flatten)]
    pub content: EntryContent,
    pub immediate_present: bool,
    pub keep_showing: bool,
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryContent {
    Bitmap {
        file: String,
        width: usize,
        height: usize,
        x: i32,
        y: i32,
        video_width: usize,
        video_height: usize,
    },
    Text {
        text: String,
    },
}

/// Writes bitmap items as BMP files and records every item in the index.
pub struct ItemWriter {
    dir: PathBuf,
    index: ItemIndex,
    bitmaps: usize,
    texts: usize,
}

impl ItemWriter {
    pub fn create(dir: &Path, input: &Path, subtitle_type: SubtitleType) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Cannot create output directory {}", dir.display()))?;
        log::info!("Writing items to {}", dir.display());

        Ok(Self {
            dir: dir.to_path_buf(),
            index: ItemIndex {
                input: input.display().to_string(),
                subtitle_type: subtitle_type.to_string(),
                items: Vec::new(),
            },
            bitmaps: 0,
            texts: 0,
        })
    }

    pub fn write(&mut self, item: &SubtitleItem) -> Result<()> {
        let index = self.index.items.len();
        let content = match &item.payload {
            ItemPayload::Bitmap(pixels) => {
                let file = format!("{index:05}_{}.bmp", item.pts.0);
                bmp::write(&self.dir.join(&file), item.width, item.height, pixels)?;
                self.bitmaps += 1;
                EntryContent::Bitmap {
                    file,
                    width: item.width,
                    height: item.height,
                    x: item.x,
                    y: item.y,
                    video_width: item.video_width,
                    video_height: item.video_height,
                }
            }
            ItemPayload::Text(text) => {
                self.texts += 1;
                EntryContent::Text { text: text.clone() }
            }
        };

        log::debug!("Item {index}: {item}");
        self.index.items.push(IndexEntry {
            index,
            pts: item.pts.to_string(),
            pts_ticks: item.pts.0,
            end: item.end.map(|end| end.to_string()),
            content,
            immediate_present: item.immediate_present,
            keep_showing: item.keep_showing,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.index.items.len()
    }

    /// Writes the index and returns its path.
    pub fn finish(self) -> Result<PathBuf> {
        let path = self.dir.join(INDEX_FILE_NAME);
        let mut writer = BufWriter::new(File::create(&path)?);
        serde_yaml_ng::to_writer(&mut writer, &self.index)?;
        writer.flush()?;

        log::info!(
            "Wrote {} items ({} bitmaps, {} text) to {}",
            self.index.items.len(),
            self.bitmaps,
            self.texts,
            path.display()
        );
        Ok(path)
    }
}
