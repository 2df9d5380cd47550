//! Zip assembly for SCORM and xAPI packages.
//!
//! Entry order is fixed: manifest, `index.html`, then each `module_{n}/` directory with its
//! lesson pages, then the assets.

use std::io::{Cursor, Write};
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::assets::Asset;
use super::ExportError;

pub struct LessonPage {
    /// 1-based module position.
    pub module: usize,
    /// 1-based lesson position within the module.
    pub lesson: usize,
    pub html: String,
}

impl LessonPage {
    pub fn path(&self) -> String {
        lesson_path(self.module, self.lesson)
    }
}

pub fn lesson_path(module: usize, lesson: usize) -> String {
    format!("module_{module}/lesson_{lesson}.html")
}

pub struct PackageLayout<'a> {
    pub manifest_name: &'static str,
    pub manifest: String,
    pub index: String,
    pub module_count: usize,
    pub lessons: Vec<LessonPage>,
    pub assets: &'a [Asset],
}

pub fn assemble(layout: &PackageLayout<'_>) -> Result<Vec<u8>, ExportError> {
    let mut zip = ZipWriter::new(Cursor::new(Vec::new()));
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    zip.start_file(layout.manifest_name, options)?;
    zip.write_all(layout.manifest.as_bytes())?;
    zip.start_file("index.html", options)?;
    zip.write_all(layout.index.as_bytes())?;

    for module in 1..=layout.module_count {
        zip.add_directory(format!("module_{module}/"), options)?;
        for page in layout.lessons.iter().filter(|p| p.module == module) {
            zip.start_file(page.path(), options)?;
            zip.write_all(page.html.as_bytes())?;
        }
    }

    for asset in layout.assets {
        zip.start_file(asset.path.as_str(), options)?;
        zip.write_all(&asset.bytes)?;
    }

    Ok(zip.finish()?.into_inner())
}
