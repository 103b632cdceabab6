//! Builds gzip-compressed tarballs for installer tests.

use std::fs;
use std::path::Path;

use flate2::Compression;
use flate2::write::GzEncoder;

/// Entry as `(path, contents, mode)`.
pub(crate) type ArchiveEntry<'a> = (&'a str, &'a [u8], u32);

/// Encodes `entries` as a `.tar.gz` byte stream.
pub(crate) fn tar_gz_bytes(entries: &[ArchiveEntry<'_>]) -> Vec<u8> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents, mode) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(*mode);
        header.set_entry_type(tar::EntryType::Regular);
        header.set_cksum();
        builder
            .append_data(&mut header, path, *contents)
            .expect("append archive entry");
    }
    builder
        .into_inner()
        .expect("finish tar stream")
        .finish()
        .expect("finish gzip stream")
}

/// Writes a `.tar.gz` containing `entries` to `path`.
pub(crate) fn write_tar_gz(path: &Path, entries: &[ArchiveEntry<'_>]) {
    fs::write(path, tar_gz_bytes(entries)).expect("write archive");
}
