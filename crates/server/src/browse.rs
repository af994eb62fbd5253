//! Directory listing.

use std::io;
use std::path::Path;

/// Direct children of a directory, split by type.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub directories: Vec<String>,
    pub files: Vec<String>,
}

/// Lists the direct children of `dir`.
///
/// Symbolic links are classified by what they point to. Entries that are
/// neither directories nor regular files (dangling links, sockets, FIFOs)
/// are left out. Both lists are sorted by name.
pub fn list_directory(dir: &Path) -> io::Result<Listing> {
    let mut listing = Listing::default();

    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let Ok(metadata) = std::fs::metadata(entry.path()) else {
            continue;
        };
        let name = entry.file_name().to_string_lossy().into_owned();
        if metadata.is_dir() {
            listing.directories.push(name);
        } else if metadata.is_file() {
            listing.files.push(name);
        }
    }

    listing.directories.sort();
    listing.files.sort();
    Ok(listing)
}
