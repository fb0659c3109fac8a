//! Project initialization command (kiln init)

use anyhow::{bail, Context, Result};
use colored::*;
use kiln_config::{KilnConfig, CONFIG_FILE_NAME};
use std::fs;
use std::path::Path;

/// Higher-half x86_64 layout with a dedicated segment for limine requests
pub const DEFAULT_LINKER_SCRIPT: &str = r#"OUTPUT_FORMAT(elf64-x86-64)

ENTRY(kernel_main)

PHDRS
{
    limine_requests PT_LOAD;
    text PT_LOAD;
    rodata PT_LOAD;
    data PT_LOAD;
}

SECTIONS
{
    . = 0xffffffff80000000;

    .limine_requests : {
        KEEP(*(.limine_requests_start))
        KEEP(*(.limine_requests))
        KEEP(*(.limine_requests_end))
    } :limine_requests

    . = ALIGN(CONSTANT(MAXPAGESIZE));

    .text : {
        *(.text .text.*)
    } :text

    . = ALIGN(CONSTANT(MAXPAGESIZE));

    .rodata : {
        *(.rodata .rodata.*)
    } :rodata

    .note.gnu.build-id : {
        *(.note.gnu.build-id)
    } :rodata

    . = ALIGN(CONSTANT(MAXPAGESIZE));

    .data : {
        *(.data .data.*)
    } :data

    .bss : {
        *(.bss .bss.*)
        *(COMMON)
    } :data

    /DISCARD/ : {
        *(.eh_frame*)
        *(.note .note.*)
    }
}
"#;

/// Write `kiln.toml` and the linker script into `path`
///
/// An existing `kiln.toml` is an error unless `force` is set. An existing
/// linker script is always left alone.
pub fn run(path: &Path, force: bool) -> Result<()> {
    let manifest = path.join(CONFIG_FILE_NAME);
    if manifest.exists() && !force {
        bail!(
            "Project already initialized: {} exists at {}",
            CONFIG_FILE_NAME,
            manifest.display()
        );
    }

    let toml = KilnConfig::default_toml().context("Failed to render default configuration")?;
    fs::create_dir_all(path).with_context(|| format!("Failed to create {}", path.display()))?;
    fs::write(&manifest, toml)
        .with_context(|| format!("Failed to write {}", manifest.display()))?;
    println!("{} Wrote {}", "ok".green().bold(), manifest.display());

    let script = path.join(&KilnConfig::default().paths.linker_script);
    if script.exists() {
        println!("   Linker script already exists: {}", script.display());
    } else {
        if let Some(parent) = script.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        fs::write(&script, DEFAULT_LINKER_SCRIPT)
            .with_context(|| format!("Failed to write {}", script.display()))?;
        println!("{} Wrote {}", "ok".green().bold(), script.display());
    }

    Ok(())
}
