#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Terminal plumbing shared by the crime spatial binaries.
//!
//! [`IndicatifProgress`] renders a [`ProgressCallback`] as an `indicatif`
//! bar. [`init_logger`] installs `pretty_env_logger` behind
//! `indicatif-log-bridge`, so log lines are printed above the bars instead
//! of through them.

use std::sync::Arc;
use std::time::Duration;

use crime_spatial_ingest::progress::ProgressCallback;
use indicatif::{ProgressBar, ProgressStyle};
use log::LevelFilter;

pub use indicatif::MultiProgress;

/// What a bar counts, which decides how it is drawn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarKind {
    /// Input files. Spins until the file count is known.
    Records,
    /// Pipeline stages. The count is known up front.
    Stages,
}

impl BarKind {
    const fn spinner_template(self) -> &'static str {
        match self {
            Self::Records => "{spinner:.cyan} {msg}",
            Self::Stages => "{spinner:.green} {msg}",
        }
    }

    const fn bar_template(self) -> &'static str {
        match self {
            Self::Records => "  {msg} {wide_bar:.cyan/dim} {pos}/{len} files [{eta}]",
            Self::Stages => "{msg} {wide_bar:.green/dim} stage {pos}/{len} [{elapsed_precise}]",
        }
    }

    fn bar_style(self) -> ProgressStyle {
        ProgressStyle::with_template(self.bar_template())
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> ")
    }
}

/// An `indicatif` [`ProgressBar`] driven through [`ProgressCallback`].
pub struct IndicatifProgress {
    bar: ProgressBar,
    kind: BarKind,
}

impl IndicatifProgress {
    /// Adds a bar of the given kind to `multi`.
    ///
    /// With `total` unknown the bar starts as a spinner and switches to a
    /// bar on the first [`ProgressCallback::set_total`].
    #[must_use]
    pub fn new(
        multi: &MultiProgress,
        kind: BarKind,
        message: &str,
        total: Option<u64>,
    ) -> Arc<dyn ProgressCallback> {
        let bar = match total {
            Some(total) => {
                let bar = multi.add(ProgressBar::new(total));
                bar.set_style(kind.bar_style());
                bar
            }
            None => {
                let bar = multi.add(ProgressBar::new_spinner());
                bar.enable_steady_tick(Duration::from_millis(100));
                bar.set_style(
                    ProgressStyle::with_template(kind.spinner_template())
                        .unwrap_or_else(|_| ProgressStyle::default_spinner()),
                );
                bar
            }
        };
        bar.set_message(message.to_string());

        Arc::new(Self { bar, kind })
    }

    /// A spinner-then-bar for incident files.
    #[must_use]
    pub fn records_bar(multi: &MultiProgress, message: &str) -> Arc<dyn ProgressCallback> {
        Self::new(multi, BarKind::Records, message, None)
    }

    /// A bar over `total` pipeline stages.
    #[must_use]
    pub fn steps_bar(
        multi: &MultiProgress,
        message: &str,
        total: u64,
    ) -> Arc<dyn ProgressCallback> {
        Self::new(multi, BarKind::Stages, message, Some(total))
    }
}

impl ProgressCallback for IndicatifProgress {
    fn set_total(&self, total: u64) {
        self.bar.set_length(total);
        self.bar.reset();
        self.bar.set_style(self.kind.bar_style());
    }

    fn inc(&self, delta: u64) {
        self.bar.inc(delta);
    }

    fn set_message(&self, msg: String) {
        self.bar.set_message(msg);
    }

    fn finish(&self, msg: String) {
        self.bar.finish_with_message(msg);
    }
}

/// Installs the global logger and returns the [`MultiProgress`] every bar
/// must be added to.
///
/// Logs at `info` unless `RUST_LOG` says otherwise.
#[must_use]
pub fn init_logger() -> MultiProgress {
    let multi = MultiProgress::new();

    let logger = pretty_env_logger::formatted_builder()
        .filter_level(LevelFilter::Info)
        .parse_env("RUST_LOG")
        .build();
    let level = logger.filter();

    if indicatif_log_bridge::LogWrapper::new(multi.clone(), logger)
        .try_init()
        .is_ok()
    {
        log::set_max_level(level);
    }

    multi
}
