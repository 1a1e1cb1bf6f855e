use crate::core::io::Storage;
use anyhow::Result;
use std::io::{Cursor, Read, Seek, SeekFrom, Write};

pub trait ReadSeek: Read + Seek {}
impl<T: Read + Seek> ReadSeek for T {}

/// Length of a leading ID3v2 tag, footer included, read from the first ten
/// bytes of a stream.
pub fn id3v2_len(header: &[u8]) -> Option<usize> {
    if header.len() < 10 || &header[..3] != b"ID3" {
        return None;
    }
    let size = header[6..10]
        .iter()
        .fold(0usize, |acc, b| (acc << 7) | (*b as usize & 0x7f));
    let footer = if header[5] & 0x10 != 0 { 10 } else { 0 };
    Some(10 + size + footer)
}

/// Merges multiple audio streams via simple binary concatenation.
/// Suitable for MP3 or other stream-based formats. Leading ID3v2 tags are
/// dropped from every input after the first.
pub fn merge_binary_files(inputs: &mut [&mut dyn ReadSeek], output: &mut dyn Write) -> Result<u64> {
    let mut written = 0u64;
    for (i, input) in inputs.iter_mut().enumerate() {
        if i > 0 {
            let mut header = [0u8; 10];
            let n = input.read(&mut header)?;
            let start = id3v2_len(&header[..n]).unwrap_or(0);
            input.seek(SeekFrom::Start(start as u64))?;
        }
        written += std::io::copy(input, output)?;
    }
    output.flush()?;
    Ok(written)
}

/// Concatenates in-memory segments into one clip.
pub fn concat_segments(segments: Vec<Vec<u8>>) -> Result<Vec<u8>> {
    if segments.len() == 1 {
        return Ok(segments.into_iter().next().unwrap_or_default());
    }
    let mut buffers: Vec<Cursor<Vec<u8>>> = segments.into_iter().map(Cursor::new).collect();
    let mut output = Vec::new();
    {
        let mut readers: Vec<&mut dyn ReadSeek> =
            buffers.iter_mut().map(|c| c as &mut dyn ReadSeek).collect();
        merge_binary_files(&mut readers, &mut output)?;
    }
    Ok(output)
}

/// Concatenates stored clips, in the given order, into `output`.
pub async fn merge_stored_files(inputs: &[String], output: &str, storage: &dyn Storage) -> Result<()> {
    let mut segments = Vec::with_capacity(inputs.len());
    for input in inputs {
        segments.push(storage.read(input).await?);
    }
    let merged = concat_segments(segments)?;
    storage.write(output, &merged).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::io::NativeStorage;

    fn tagged(body: &[u8]) -> Vec<u8> {
        // ID3v2.3 header with a 4-byte tag body
        let mut data = vec![b'I', b'D', b'3', 3, 0, 0, 0, 0, 0, 4, 1, 2, 3, 4];
        data.extend_from_slice(body);
        data
    }

    #[test]
    fn test_id3_len() {
        assert_eq!(id3v2_len(&tagged(b"xx")), Some(14));
        assert_eq!(id3v2_len(b"\xff\xfb\x90\x00"), None);
    }

    #[test]
    fn test_concat_strips_inner_tags_only() {
        let merged = concat_segments(vec![tagged(b"AA"), tagged(b"BB"), b"CC".to_vec()]).unwrap();
        let mut expected = tagged(b"AA");
        expected.extend_from_slice(b"BBCC");
        assert_eq!(merged, expected);
    }

    #[test]
    fn test_concat_single_segment_is_identity() {
        assert_eq!(concat_segments(vec![b"abc".to_vec()]).unwrap(), b"abc");
        assert!(concat_segments(Vec::new()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_merge_stored_files_in_order() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let storage = NativeStorage::new();
        let a = temp_dir.path().join("000_NARRATOR.mp3");
        let b = temp_dir.path().join("001_SARAH.mp3");
        storage.write(a.to_str().unwrap(), b"one").await?;
        storage.write(b.to_str().unwrap(), b"two").await?;

        let out = temp_dir.path().join("voice-act-one.mp3");
        merge_stored_files(
            &[a.to_str().unwrap().to_string(), b.to_str().unwrap().to_string()],
            out.to_str().unwrap(),
            &storage,
        )
        .await?;
        assert_eq!(storage.read(out.to_str().unwrap()).await?, b"onetwo");
        Ok(())
    }
}
