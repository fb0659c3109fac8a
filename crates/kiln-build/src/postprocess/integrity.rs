//! ELF64 segment permission check
//!
//! Reads the program header table directly and flags loadable segments that
//! are both writable and executable.

use crate::error::{BuildError, BuildResult};
use std::fs;
use std::path::Path;

const PT_LOAD: u32 = 1;
const PF_X: u32 = 0x1;
const PF_W: u32 = 0x2;

const ELF_MAGIC: &[u8; 4] = b"\x7fELF";
const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const ELFDATA2MSB: u8 = 2;

/// Findings for one image; empty means clean
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrityReport {
    pub findings: Vec<String>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }
}

/// Inspect the image at `path`
pub fn inspect(path: &Path) -> BuildResult<IntegrityReport> {
    let bytes = fs::read(path).map_err(|e| BuildError::io(path, e))?;
    Ok(inspect_bytes(&bytes))
}

pub fn inspect_bytes(bytes: &[u8]) -> IntegrityReport {
    let mut report = IntegrityReport::default();

    if bytes.len() < 64 || &bytes[..4] != ELF_MAGIC {
        report.findings.push("not an ELF image".to_string());
        return report;
    }
    if bytes[4] != ELFCLASS64 {
        report.findings.push("not an ELF64 image".to_string());
        return report;
    }
    let big_endian = match bytes[5] {
        ELFDATA2LSB => false,
        ELFDATA2MSB => true,
        other => {
            report
                .findings
                .push(format!("unknown ELF data encoding {}", other));
            return report;
        }
    };
    let reader = Reader { bytes, big_endian };

    let (Some(phoff), Some(phentsize), Some(phnum)) =
        (reader.u64(0x20), reader.u16(0x36), reader.u16(0x38))
    else {
        report.findings.push("truncated ELF header".to_string());
        return report;
    };

    for index in 0..phnum as usize {
        let header = usize::try_from(phoff)
            .ok()
            .and_then(|off| off.checked_add(index.checked_mul(phentsize as usize)?))
            .and_then(|base| {
                Some((
                    reader.u32(base)?,
                    reader.u32(base.checked_add(4)?)?,
                    reader.u64(base.checked_add(0x10)?)?,
                ))
            });
        let Some((p_type, p_flags, vaddr)) = header else {
            report
                .findings
                .push(format!("program header {} lies outside the file", index));
            break;
        };
        if p_type == PT_LOAD && p_flags & PF_W != 0 && p_flags & PF_X != 0 {
            report.findings.push(format!(
                "segment {} at {:#x} is both writable and executable",
                index, vaddr
            ));
        }
    }

    report
}

struct Reader<'a> {
    bytes: &'a [u8],
    big_endian: bool,
}

impl Reader<'_> {
    fn take<const N: usize>(&self, at: usize) -> Option<[u8; N]> {
        let slice = self.bytes.get(at..at.checked_add(N)?)?;
        let mut out = [0u8; N];
        out.copy_from_slice(slice);
        Some(out)
    }

    fn u16(&self, at: usize) -> Option<u16> {
        let b = self.take::<2>(at)?;
        Some(if self.big_endian {
            u16::from_be_bytes(b)
        } else {
            u16::from_le_bytes(b)
        })
    }

    fn u32(&self, at: usize) -> Option<u32> {
        let b = self.take::<4>(at)?;
        Some(if self.big_endian {
            u32::from_be_bytes(b)
        } else {
            u32::from_le_bytes(b)
        })
    }

    fn u64(&self, at: usize) -> Option<u64> {
        let b = self.take::<8>(at)?;
        Some(if self.big_endian {
            u64::from_be_bytes(b)
        } else {
            u64::from_le_bytes(b)
        })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// Minimal little-endian ELF64 with the given (type, flags) program headers
    pub(crate) fn elf64(segments: &[(u32, u32)]) -> Vec<u8> {
        let mut bytes = vec![0u8; 64];
        bytes[..4].copy_from_slice(ELF_MAGIC);
        bytes[4] = ELFCLASS64;
        bytes[5] = ELFDATA2LSB;
        bytes[0x20..0x28].copy_from_slice(&64u64.to_le_bytes());
        bytes[0x36..0x38].copy_from_slice(&56u16.to_le_bytes());
        bytes[0x38..0x3a].copy_from_slice(&(segments.len() as u16).to_le_bytes());
        for (i, (p_type, p_flags)) in segments.iter().enumerate() {
            let mut ph = vec![0u8; 56];
            ph[0..4].copy_from_slice(&p_type.to_le_bytes());
            ph[4..8].copy_from_slice(&p_flags.to_le_bytes());
            ph[0x10..0x18].copy_from_slice(&(0xffff_ffff_8000_0000u64 + i as u64 * 0x1000).to_le_bytes());
            bytes.extend(ph);
        }
        bytes
    }

    #[test]
    fn test_clean_image() {
        let report = inspect_bytes(&elf64(&[(PT_LOAD, PF_X | 0x4), (PT_LOAD, PF_W | 0x4)]));
        assert!(report.is_clean());
    }

    #[test]
    fn test_writable_executable_segment() {
        let report = inspect_bytes(&elf64(&[(PT_LOAD, 0x4), (PT_LOAD, PF_W | PF_X)]));
        assert_eq!(report.findings.len(), 1);
        assert!(report.findings[0].contains("segment 1"));
        assert!(report.findings[0].contains("0xffffffff80001000"));
    }

    #[test]
    fn test_non_load_segments_ignored() {
        // PT_GNU_STACK with RWX is not a loadable segment
        let report = inspect_bytes(&elf64(&[(0x6474_e551, PF_W | PF_X)]));
        assert!(report.is_clean());
    }

    #[test]
    fn test_not_elf() {
        let report = inspect_bytes(b"MZ\x90\x00 this is not an elf file at all, it is long enough to pass");
        assert_eq!(report.findings, vec!["not an ELF image"]);
    }

    #[test]
    fn test_program_header_offset_past_address_space() {
        let mut bytes = elf64(&[(PT_LOAD, PF_W)]);
        bytes[0x20..0x28].copy_from_slice(&u64::MAX.to_le_bytes());
        let report = inspect_bytes(&bytes);
        assert_eq!(report.findings.len(), 1);
        assert!(report.findings[0].contains("outside the file"));
    }

    #[test]
    fn test_truncated_headers() {
        let mut bytes = elf64(&[(PT_LOAD, PF_W | PF_X)]);
        bytes.truncate(80);
        let report = inspect_bytes(&bytes);
        assert!(report.findings[0].contains("outside the file"));
    }
}
