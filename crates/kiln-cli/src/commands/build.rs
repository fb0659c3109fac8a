//! Build command - run the full pipeline and report the outcome

use crate::console::{ConsoleSink, Verbosity};
use anyhow::{anyhow, bail, Result};
use kiln_build::{
    BuildConfig, BuildOverrides, BuildReport, OptLevel, Pipeline, PipelineFailure, Profile,
};
use std::path::PathBuf;
use std::sync::Arc;

/// Build command arguments
#[derive(Debug, Default)]
pub struct BuildArgs {
    /// Build profile (dev or release)
    pub profile: Option<String>,
    /// Shorthand for --profile=release
    pub release: bool,
    /// Force debug info on (`Some(true)`) or off (`Some(false)`)
    pub debug_info: Option<bool>,
    /// Optimization level (0, 1, 2, 3, s)
    pub opt_level: Option<String>,
    pub no_parallel: bool,
    pub jobs: Option<usize>,
    pub no_incremental: bool,
    pub compress: bool,
    pub backup: bool,
    pub verbose: bool,
    pub quiet: bool,
    pub json: bool,
    /// Project directory (defaults to current directory)
    pub project_dir: Option<PathBuf>,
}

/// Run the build command
pub fn run(args: BuildArgs) -> Result<()> {
    let project_dir = args
        .project_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let overrides = overrides(&args)?;
    let config = super::resolve_config(&project_dir, &overrides)?;

    // JSON owns stdout; only errors reach the console
    let verbosity = if args.json {
        Verbosity::Quiet
    } else {
        Verbosity::from_flags(args.quiet, args.verbose)
    };
    let pipeline = Pipeline::new(config).with_sink(Arc::new(ConsoleSink::new(verbosity)));

    match pipeline.run() {
        Ok(report) => {
            if args.json {
                println!("{}", success_json(pipeline.config(), &report));
            } else if !args.quiet {
                print_summary(pipeline.config(), &report);
            }
            Ok(())
        }
        Err(failure) => {
            if args.json {
                println!("{}", failure_json(pipeline.config(), &failure));
            }
            bail!("build failed in the {} stage", failure.stage)
        }
    }
}

/// Translate CLI flags into pipeline overrides
fn overrides(args: &BuildArgs) -> Result<BuildOverrides> {
    Ok(BuildOverrides {
        profile: determine_profile(args)?,
        debug_info: args.debug_info,
        opt_level: args
            .opt_level
            .as_deref()
            .map(OptLevel::from_str)
            .transpose()
            .map_err(|e| anyhow!("Invalid optimization level: {}", e))?,
        parallel: args.no_parallel.then_some(false),
        jobs: args.jobs,
        incremental: args.no_incremental.then_some(false),
        compress: args.compress.then_some(true),
        backup: args.backup.then_some(true),
    })
}

/// Determine build profile from arguments
///
/// `--release` wins over `--profile`, which wins over `KILN_PROFILE`. `None`
/// leaves the choice to `kiln.toml`.
fn determine_profile(args: &BuildArgs) -> Result<Option<Profile>> {
    if args.release {
        return Ok(Some(Profile::Release));
    }
    if let Some(ref name) = args.profile {
        return Profile::from_str(name)
            .map(Some)
            .map_err(|e| anyhow!("Invalid profile: {}", e));
    }
    match std::env::var("KILN_PROFILE") {
        Ok(name) if !name.trim().is_empty() => Profile::from_str(&name)
            .map(Some)
            .map_err(|e| anyhow!("Invalid KILN_PROFILE: {}", e)),
        _ => Ok(None),
    }
}

fn print_summary(config: &BuildConfig, report: &BuildReport) {
    let stats = &report.stats;
    println!("\n{}", "=".repeat(60));
    println!("Build succeeded in {:.2}s", stats.elapsed().as_secs_f64());
    println!("{}", "=".repeat(60));
    println!("  Profile:  {}", config.profile.name);
    println!(
        "  Units:    {} ({} compiled, {} cached)",
        stats.total_files, stats.compiled, stats.cache_hits
    );
    println!(
        "  Kernel:   {}{}",
        config.display_path(&report.linked_image).display(),
        if report.relinked { "" } else { " (up to date)" }
    );
    if let Some(image) = &report.postprocess.image {
        println!("  Image:    {}", config.display_path(image).display());
    }
    if !report.warnings.is_empty() {
        println!("  Warnings: {}", report.warnings.len());
    }
    println!("{}", "=".repeat(60));
}

fn success_json(config: &BuildConfig, report: &BuildReport) -> serde_json::Value {
    let stats = &report.stats;
    let path = |p: &Option<PathBuf>| p.as_ref().map(|p| p.display().to_string());
    serde_json::json!({
        "success": true,
        "profile": config.profile.name,
        "elapsed": stats.elapsed().as_secs_f64(),
        "total_files": stats.total_files,
        "compiled": stats.compiled,
        "cache_hits": stats.cache_hits,
        "cache_misses": stats.cache_misses,
        "relinked": report.relinked,
        "kernel": report.linked_image.display().to_string(),
        "binary": path(&report.postprocess.binary),
        "image": path(&report.postprocess.image),
        "compressed": path(&report.postprocess.compressed),
        "backup": path(&report.postprocess.backup),
        "warnings": report
            .warnings
            .iter()
            .map(|w| serde_json::json!({ "stage": w.stage, "message": w.message }))
            .collect::<Vec<_>>(),
    })
}

fn failure_json(config: &BuildConfig, failure: &PipelineFailure) -> serde_json::Value {
    serde_json::json!({
        "success": false,
        "profile": config.profile.name,
        "stage": failure.stage,
        "error": failure.error.to_string(),
        "elapsed": failure.stats.elapsed().as_secs_f64(),
        "compiled": failure.stats.compiled,
        "cleaned": failure
            .cleaned
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_determine_profile_release_priority() {
        let args = BuildArgs {
            release: true,
            profile: Some("dev".to_string()),
            ..Default::default()
        };
        assert_eq!(determine_profile(&args).unwrap(), Some(Profile::Release));
    }

    #[test]
    fn test_determine_profile_named() {
        let args = BuildArgs {
            profile: Some("release".to_string()),
            ..Default::default()
        };
        assert_eq!(determine_profile(&args).unwrap(), Some(Profile::Release));
    }

    #[test]
    fn test_determine_profile_invalid() {
        let args = BuildArgs {
            profile: Some("turbo".to_string()),
            ..Default::default()
        };
        assert!(determine_profile(&args).is_err());
    }

    #[test]
    fn test_overrides_from_flags() {
        let args = BuildArgs {
            debug_info: Some(false),
            opt_level: Some("s".to_string()),
            no_parallel: true,
            no_incremental: true,
            compress: true,
            ..Default::default()
        };
        let o = overrides(&args).unwrap();
        assert_eq!(o.debug_info, Some(false));
        assert_eq!(o.opt_level, Some(OptLevel::Os));
        assert_eq!(o.parallel, Some(false));
        assert_eq!(o.incremental, Some(false));
        assert_eq!(o.compress, Some(true));
        assert_eq!(o.backup, None);
        assert_eq!(o.jobs, None);
    }

    #[test]
    fn test_unset_flags_leave_config_alone() {
        let args = BuildArgs {
            profile: Some("dev".to_string()),
            ..Default::default()
        };
        let o = overrides(&args).unwrap();
        assert_eq!(o.parallel, None);
        assert_eq!(o.incremental, None);
        assert_eq!(o.compress, None);
    }

    #[test]
    fn test_invalid_opt_level() {
        let args = BuildArgs {
            opt_level: Some("9".to_string()),
            ..Default::default()
        };
        assert!(overrides(&args).is_err());
    }
}
