// src/packages/archive.rs

//! `.goo` package archives (gzip-compressed tar)

use crate::error::{Error, Result};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::fs::{self, File};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Unpack an archive into `dest`, creating it if necessary
///
/// Entries that would escape `dest` are rejected by `tar`.
pub fn unpack(archive: &Path, dest: &Path) -> Result<Vec<PathBuf>> {
    debug!("Unpacking {} into {}", archive.display(), dest.display());
    fs::create_dir_all(dest)?;

    let file = File::open(archive)?;
    let mut tar = tar::Archive::new(GzDecoder::new(BufReader::new(file)));
    let mut unpacked = Vec::new();

    let entries = tar
        .entries()
        .map_err(|e| Error::ParseError(format!("{}: {}", archive.display(), e)))?;
    for entry in entries {
        let mut entry =
            entry.map_err(|e| Error::ParseError(format!("{}: {}", archive.display(), e)))?;
        let path = entry.path()?.into_owned();
        if !entry.unpack_in(dest)? {
            return Err(Error::ParseError(format!(
                "{}: entry {} escapes the unpack directory",
                archive.display(),
                path.display()
            )));
        }
        unpacked.push(path);
    }

    debug!("Unpacked {} entries", unpacked.len());
    Ok(unpacked)
}

/// Build a `.goo` archive from in-memory files
///
/// Used by repository tooling and tests to publish packages.
pub fn pack<W: Write>(writer: W, files: &[(&str, &[u8])]) -> Result<W> {
    let mut builder = tar::Builder::new(GzEncoder::new(writer, Compression::default()));
    for (path, data) in files {
        let mut header = tar::Header::new_gnu();
        header.set_size(data.len() as u64);
        header.set_mode(if path.ends_with(".sh") { 0o755 } else { 0o644 });
        header.set_cksum();
        builder.append_data(&mut header, path, *data)?;
    }
    let encoder = builder.into_inner()?;
    Ok(encoder.finish()?)
}
