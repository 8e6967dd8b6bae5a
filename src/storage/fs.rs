use std::fs::File;
use std::io;
use std::path::Path;

/// Fsyncs a directory so renames and file creations inside it survive a
/// crash. Called after every snapshot rename and WAL rotation.
pub fn sync_directory(path: &Path) -> io::Result<()> {
    let dir = File::open(path)?;
    dir.sync_all()
}
