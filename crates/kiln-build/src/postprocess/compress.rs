//! Gzip compression of the packaged image

use crate::error::{BuildError, BuildResult};
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// `<path>.gz` next to the input
pub fn compressed_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".gz");
    PathBuf::from(name)
}

/// Stream `path` through gzip at `level` (0-9) into `<path>.gz`
pub fn compress_file(path: &Path, level: u32) -> BuildResult<PathBuf> {
    let output = compressed_path(path);
    let input = File::open(path).map_err(|e| BuildError::io(path, e))?;
    let out_file = File::create(&output).map_err(|e| BuildError::io(&output, e))?;

    let mut encoder = GzEncoder::new(BufWriter::new(out_file), Compression::new(level.min(9)));
    io::copy(&mut BufReader::new(input), &mut encoder).map_err(|e| BuildError::io(&output, e))?;
    encoder
        .finish()
        .and_then(|mut writer| writer.flush())
        .map_err(|e| BuildError::io(&output, e))?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::read::GzDecoder;
    use std::fs;
    use std::io::Read;
    use tempfile::TempDir;

    #[test]
    fn test_compress_writes_gz_sibling() {
        let temp = TempDir::new().unwrap();
        let iso = temp.path().join("deer.iso");
        let payload = vec![0x42u8; 64 * 1024];
        fs::write(&iso, &payload).unwrap();

        let out = compress_file(&iso, 6).unwrap();
        assert_eq!(out, temp.path().join("deer.iso.gz"));
        assert!(fs::metadata(&out).unwrap().len() < payload.len() as u64);

        let mut decoded = Vec::new();
        GzDecoder::new(File::open(&out).unwrap())
            .read_to_end(&mut decoded)
            .unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn test_missing_input() {
        let temp = TempDir::new().unwrap();
        assert!(compress_file(&temp.path().join("none.iso"), 6).is_err());
    }
}
