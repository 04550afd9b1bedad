use bincode::{deserialize_from, serialize_into};
use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use std::collections::BTreeMap;
use std::fs::{File, create_dir_all};
use std::io::Write;
use std::path::Path;

/// On-disk image of a key-value store: key -> JSON text.
pub type Snapshot = BTreeMap<String, String>;

/// Write a snapshot as a gzip-compressed bincode file.
///
/// The parent directory is created when missing. The file is written to a
/// sibling temporary path first and then renamed over the target, so a
/// reader never observes a half-written snapshot.
pub fn save_snapshot(snapshot: &Snapshot, filename: impl AsRef<Path>) -> std::io::Result<()> {
    let path = filename.as_ref();
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            create_dir_all(parent)?;
        }
    }

    let tmp = path.with_extension("tmp");
    {
        let file = File::create(&tmp)?;
        let encoder = GzEncoder::new(file, Compression::default());
        let mut writer = std::io::BufWriter::new(encoder);

        serialize_into(&mut writer, snapshot)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

        let encoder = writer.into_inner().map_err(|e| e.into_error())?;
        encoder.finish()?.flush()?;
    }
    std::fs::rename(&tmp, path)?;

    Ok(())
}

pub fn load_snapshot(filename: impl AsRef<Path>) -> std::io::Result<Snapshot> {
    let file = File::open(filename)?;
    let decoder = GzDecoder::new(file);
    let mut reader = std::io::BufReader::new(decoder);

    let snapshot: Snapshot = deserialize_from(&mut reader)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

    Ok(snapshot)
}
