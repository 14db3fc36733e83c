//! Concurrency planning module
//!
//! Derives how many source files may be in flight at once from the CPU core
//! count and the configured `jobs` value.

/// Which pipeline a plan is derived for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    Image,
    Video,
}

/// Concurrency plan derived from configuration and system resources
#[derive(Debug, Clone, PartialEq)]
pub struct ConcurrencyPlan {
    /// Total logical CPU cores available
    pub total_cores: u32,
    /// Maximum number of source files processed concurrently
    pub max_concurrent_files: u32,
}

impl ConcurrencyPlan {
    /// Derive a concurrency plan
    ///
    /// Uses the following rules:
    /// - Detects CPU cores via num_cpus if not specified
    /// - Uses `jobs` verbatim when non-zero
    /// - Images: one file per core (each file fans out to a few short encodes)
    /// - Video: one file per 8 cores, at least 1 (each file runs three
    ///   multi-threaded ffmpeg processes)
    pub fn derive(kind: PipelineKind, jobs: u32, logical_cores: Option<u32>) -> Self {
        let total_cores = logical_cores
            .unwrap_or_else(|| num_cpus::get() as u32)
            .max(1);

        let max_concurrent_files = if jobs > 0 {
            jobs
        } else {
            derive_max_files(kind, total_cores)
        };

        Self {
            total_cores,
            max_concurrent_files,
        }
    }
}

fn derive_max_files(kind: PipelineKind, cores: u32) -> u32 {
    match kind {
        PipelineKind::Image => cores,
        PipelineKind::Video => (cores / 8).max(1),
    }
}

/// Public function to derive a concurrency plan for the current machine
pub fn derive_plan(kind: PipelineKind, jobs: u32) -> ConcurrencyPlan {
    ConcurrencyPlan::derive(kind, jobs, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_auto_derivation(cores in 1u32..256) {
            let image = ConcurrencyPlan::derive(PipelineKind::Image, 0, Some(cores));
            let video = ConcurrencyPlan::derive(PipelineKind::Video, 0, Some(cores));

            prop_assert_eq!(image.total_cores, cores);
            prop_assert_eq!(image.max_concurrent_files, cores);

            let expected_video = std::cmp::max(cores / 8, 1);
            prop_assert_eq!(
                video.max_concurrent_files, expected_video,
                "For {} cores, expected {} video files in flight but got {}",
                cores, expected_video, video.max_concurrent_files
            );
            prop_assert!(video.max_concurrent_files >= 1);
        }

        #[test]
        fn prop_explicit_jobs_override(
            cores in 1u32..256,
            jobs in 1u32..64,
            video in proptest::bool::ANY,
        ) {
            let kind = if video { PipelineKind::Video } else { PipelineKind::Image };
            let plan = ConcurrencyPlan::derive(kind, jobs, Some(cores));
            prop_assert_eq!(plan.max_concurrent_files, jobs);
        }
    }

    #[test]
    fn test_zero_cores_is_clamped() {
        let plan = ConcurrencyPlan::derive(PipelineKind::Image, 0, Some(0));
        assert_eq!(plan.total_cores, 1);
        assert_eq!(plan.max_concurrent_files, 1);
    }

    #[test]
    fn test_detected_cores_are_positive() {
        let plan = derive_plan(PipelineKind::Video, 0);
        assert!(plan.total_cores >= 1);
        assert!(plan.max_concurrent_files >= 1);
    }
}
