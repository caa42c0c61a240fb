//! Disk I/O for a download's destination file (§4.C, §6).
//!
//! Resume is keyed off the existing file's length, so there is no `.part`
//! suffix or finalize/rename step here (unlike the teacher's segmented
//! writer): the path the caller opens is already the final path, and its
//! length on disk at open time is the byte offset to resume a `Range`
//! request from.

mod builder;
mod writer;

pub use builder::StorageWriterBuilder;
pub use writer::StorageWriter;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn fresh_file_has_zero_resume_offset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");
        let builder = StorageWriterBuilder::open(&path).unwrap();
        assert_eq!(builder.resume_offset(), 0);
    }

    #[test]
    fn write_then_reopen_resumes_from_existing_length() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.bin");

        let builder = StorageWriterBuilder::open(&path).unwrap();
        let mut writer = builder.build().unwrap();
        writer.write_chunk(b"hello ").unwrap();
        writer.write_chunk(b"world").unwrap();
        writer.sync().unwrap();
        assert_eq!(writer.written(), 11);
        drop(writer);

        let resumed = StorageWriterBuilder::open(&path).unwrap();
        assert_eq!(resumed.resume_offset(), 11);
        let mut writer = resumed.build().unwrap();
        writer.write_chunk(b"!").unwrap();
        writer.sync().unwrap();

        let mut f = std::fs::File::open(&path).unwrap();
        let mut buf = Vec::new();
        f.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hello world!");
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/sub/out.bin");
        let builder = StorageWriterBuilder::open(&path).unwrap();
        let mut writer = builder.build().unwrap();
        writer.write_chunk(b"x").unwrap();
        assert!(path.exists());
    }
}
